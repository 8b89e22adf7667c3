//! Cross-resource references
//!
//! Products point at billable metrics; rates point at rate cards and
//! products. Each link is an explicit id, a `*_ref` naming another declared
//! resource, or a `*_selector` matching labels. Refs and selectors are
//! resolved to the target's external name before a pass touches the remote
//! side.

use reconcile::{Declared, Error, Reference, Selector};

use crate::kinds::{
    BillableMetricResource, ProductParams, ProductResource, RateCardResource, RateParams,
};

/// Fill `id` from a ref or selector over `targets`.
///
/// An explicit id is kept. With neither ref nor selector the id stays unset.
/// Targets without an external name, or marked for deletion, never match.
pub fn resolve<P, O>(
    field: &str,
    id: &mut Option<String>,
    reference: Option<&Reference>,
    selector: Option<&Selector>,
    targets: &[Declared<P, O>],
) -> Result<(), Error> {
    if id.as_deref().is_some_and(|s| !s.is_empty()) {
        return Ok(());
    }

    let live = || {
        targets
            .iter()
            .filter(|t| !t.is_deleting() && t.external_name().is_some())
    };

    let found = if let Some(reference) = reference {
        live().find(|t| t.name() == reference.name)
    } else if let Some(selector) = selector {
        live()
            .filter(|t| selector.matches(t.labels()))
            .min_by(|a, b| a.name().cmp(b.name()))
    } else {
        return Ok(());
    };

    match found.and_then(|t| t.external_name()) {
        Some(external_name) => {
            log::debug!("{field} resolved to {external_name}");
            *id = Some(external_name.to_string());
            Ok(())
        }
        None => Err(Error::Unresolvable {
            field: field.to_string(),
        }),
    }
}

pub fn resolve_product(
    params: &mut ProductParams,
    metrics: &[BillableMetricResource],
) -> Result<(), Error> {
    resolve(
        "billable_metric_id",
        &mut params.billable_metric_id,
        params.billable_metric_ref.as_ref(),
        params.billable_metric_selector.as_ref(),
        metrics,
    )
}

/// Resolve both links of a rate, then check it is complete.
pub fn resolve_rate(
    params: &mut RateParams,
    cards: &[RateCardResource],
    products: &[ProductResource],
) -> Result<(), Error> {
    resolve(
        "rate_card_id",
        &mut params.rate_card_id,
        params.rate_card_ref.as_ref(),
        params.rate_card_selector.as_ref(),
        cards,
    )?;
    resolve(
        "product_id",
        &mut params.product_id,
        params.product_ref.as_ref(),
        params.product_selector.as_ref(),
        products,
    )?;
    params.validate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::{BillableMetricParams, RateCardParams};
    use reconcile::ErrorClass;
    use std::collections::BTreeMap;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn metric(name: &str, id: Option<&str>, team: &str) -> BillableMetricResource {
        Declared::new("billable metric", name, BillableMetricParams::default())
            .with_labels(labels(&[("team", team)]))
            .with_external_name(id.map(String::from))
    }

    fn card(name: &str, id: &str) -> RateCardResource {
        Declared::new("rate card", name, RateCardParams::default())
            .with_external_name(Some(id.to_string()))
    }

    fn product(name: &str, id: &str) -> ProductResource {
        Declared::new("product", name, ProductParams::default())
            .with_external_name(Some(id.to_string()))
    }

    #[test]
    fn test_ref_resolves_external_name() {
        let metrics = vec![metric("api-calls", Some("m-1"), "platform")];
        let mut params = ProductParams {
            billable_metric_ref: Some(Reference {
                name: "api-calls".to_string(),
            }),
            ..Default::default()
        };
        resolve_product(&mut params, &metrics).unwrap();
        assert_eq!(params.billable_metric_id.as_deref(), Some("m-1"));
    }

    #[test]
    fn test_explicit_id_wins() {
        let metrics = vec![metric("api-calls", Some("m-1"), "platform")];
        let mut params = ProductParams {
            billable_metric_id: Some("m-explicit".to_string()),
            billable_metric_ref: Some(Reference {
                name: "api-calls".to_string(),
            }),
            ..Default::default()
        };
        resolve_product(&mut params, &metrics).unwrap();
        assert_eq!(params.billable_metric_id.as_deref(), Some("m-explicit"));
    }

    #[test]
    fn test_selector_takes_first_by_name() {
        let metrics = vec![
            metric("storage", Some("m-2"), "platform"),
            metric("compute", Some("m-1"), "platform"),
            metric("seats", Some("m-3"), "sales"),
        ];
        let mut params = ProductParams {
            billable_metric_selector: Some(Selector {
                match_labels: labels(&[("team", "platform")]),
            }),
            ..Default::default()
        };
        resolve_product(&mut params, &metrics).unwrap();
        assert_eq!(params.billable_metric_id.as_deref(), Some("m-1"));
    }

    #[test]
    fn test_target_not_created_yet() {
        let metrics = vec![metric("api-calls", None, "platform")];
        let mut params = ProductParams {
            billable_metric_ref: Some(Reference {
                name: "api-calls".to_string(),
            }),
            ..Default::default()
        };
        let err = resolve_product(&mut params, &metrics).unwrap_err();
        assert_eq!(err.to_string(), "billable_metric_id not yet resolvable");
        assert_eq!(err.class(), ErrorClass::Recoverable);
        assert!(params.billable_metric_id.is_none());
    }

    #[test]
    fn test_deleting_target_skipped() {
        let mut gone = metric("api-calls", Some("m-1"), "platform");
        gone.mark_deleting();
        let mut params = ProductParams {
            billable_metric_ref: Some(Reference {
                name: "api-calls".to_string(),
            }),
            ..Default::default()
        };
        assert!(resolve_product(&mut params, &[gone]).is_err());
    }

    #[test]
    fn test_no_link_leaves_id_unset() {
        let mut params = ProductParams::default();
        resolve_product(&mut params, &Vec::<BillableMetricResource>::new()).unwrap();
        assert!(params.billable_metric_id.is_none());
    }

    #[test]
    fn test_rate_resolved_and_validated() {
        let cards = vec![card("list", "rc-1")];
        let products = vec![product("api", "p-1")];
        let mut params = RateParams {
            rate_card_ref: Some(Reference {
                name: "list".to_string(),
            }),
            product_ref: Some(Reference {
                name: "api".to_string(),
            }),
            starting_at: Some("2024-01-01T00:00:00Z".to_string()),
            rate_type: Some("flat".to_string()),
            ..Default::default()
        };
        resolve_rate(&mut params, &cards, &products).unwrap();
        assert_eq!(params.rate_card_id.as_deref(), Some("rc-1"));
        assert_eq!(params.product_id.as_deref(), Some("p-1"));
    }

    #[test]
    fn test_rate_missing_product_link() {
        let cards = vec![card("list", "rc-1")];
        let mut params = RateParams {
            rate_card_ref: Some(Reference {
                name: "list".to_string(),
            }),
            starting_at: Some("2024-01-01T00:00:00Z".to_string()),
            rate_type: Some("flat".to_string()),
            ..Default::default()
        };
        let err = resolve_rate(&mut params, &cards, &[]).unwrap_err();
        assert_eq!(err.to_string(), "product_id required for rate");
        assert_eq!(err.class(), ErrorClass::Fatal);
    }
}
