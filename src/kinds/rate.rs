//! Rates: structural identity.
//!
//! A rate has no identifier of its own. It is found by searching its rate
//! card at `starting_at`, narrowed to its product and pricing group values,
//! and taking the first candidate that matches the declaration. Rates cannot
//! be updated or removed; delete succeeds without a remote call.

use metronome::Rates;
use metronome::types::{AddRateInput, CommitRate, Rate, RateQuery, RateSelector, Tier};
use reconcile::diff::{blank_to_none, empty_map_to_none, false_to_none, lowercase, opt_float_eq};
use reconcile::{
    Adapter, CancelToken, DeclaredOf, Error, Identity, Reference, RemoteError, Selector,
    find_first,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Desired rate on a rate card
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_card_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_card_ref: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_card_selector: Option<Selector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_ref: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_selector: Option<Selector>,
    /// RFC 3339; also the point in time the rate is searched at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starting_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ending_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entitled: Option<bool>,
    /// `flat`, `percentage`, `subscription`, `tiered`, or `custom`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiers: Option<Vec<Tier>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_prorated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_list_prices: Option<bool>,
    /// Filled from the remote rate when left unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit_type_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing_group_values: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_rate: Option<CommitRate>,
}

impl RateParams {
    /// Check the fields a rate cannot be searched for or added without.
    pub fn validate(&self) -> Result<(), Error> {
        let required = [
            ("rate_card_id", &self.rate_card_id),
            ("product_id", &self.product_id),
            ("starting_at", &self.starting_at),
            ("rate_type", &self.rate_type),
        ];
        for (field, value) in required {
            if value.as_deref().is_none_or(str::is_empty) {
                return Err(Error::MissingField {
                    operation: "rate",
                    field,
                });
            }
        }
        Ok(())
    }

    fn query(&self) -> RateQuery {
        RateQuery {
            rate_card_id: self.rate_card_id.clone().unwrap_or_default(),
            at: self.starting_at.clone().unwrap_or_default(),
            selectors: Some(vec![RateSelector {
                product_id: self.product_id.clone(),
                pricing_group_values: self.pricing_group_values.clone(),
                ..Default::default()
            }]),
        }
    }
}

impl From<&RateParams> for AddRateInput {
    fn from(p: &RateParams) -> Self {
        Self {
            entitled: p.entitled.unwrap_or_default(),
            product_id: p.product_id.clone().unwrap_or_default(),
            rate_card_id: p.rate_card_id.clone().unwrap_or_default(),
            rate_type: p.rate_type.clone().unwrap_or_default().to_uppercase(),
            starting_at: p.starting_at.clone().unwrap_or_default(),
            commit_rate: p.commit_rate.clone(),
            credit_type_id: p.credit_type_id.clone(),
            ending_before: p.ending_before.clone(),
            is_prorated: p.is_prorated,
            price: p.price,
            pricing_group_values: p.pricing_group_values.clone(),
            quantity: p.quantity,
            tiers: p.tiers.clone(),
            use_list_prices: p.use_list_prices,
        }
    }
}

impl From<&Rate> for RateParams {
    fn from(rate: &Rate) -> Self {
        let details = &rate.rate;
        Self {
            product_id: Some(rate.product_id.clone()),
            starting_at: rate.starting_at.clone(),
            ending_before: rate.ending_before.clone(),
            entitled: Some(rate.entitled),
            rate_type: Some(details.rate_type.clone()),
            price: details.price,
            tiers: details.tiers.clone(),
            quantity: details.quantity,
            is_prorated: details.is_prorated,
            use_list_prices: details.use_list_prices,
            credit_type_id: details.credit_type.as_ref().map(|c| c.id.clone()),
            pricing_group_values: rate
                .pricing_group_values
                .clone()
                .or_else(|| details.pricing_group_values.clone()),
            commit_rate: rate.commit_rate.clone(),
            ..Default::default()
        }
    }
}

/// Exact order; tolerance applies only in `tiers_eq`
fn tier_order(a: &Tier, b: &Tier) -> Ordering {
    a.price
        .total_cmp(&b.price)
        .then_with(|| a.size.unwrap_or_default().total_cmp(&b.size.unwrap_or_default()))
}

fn sort_tiers(tiers: &mut Option<Vec<Tier>>) {
    if let Some(t) = tiers.as_mut() {
        t.sort_by(tier_order);
    }
    if tiers.as_ref().is_some_and(Vec::is_empty) {
        *tiers = None;
    }
}

fn tiers_eq(a: &Option<Vec<Tier>>, b: &Option<Vec<Tier>>) -> bool {
    let (a, b) = (a.as_deref().unwrap_or_default(), b.as_deref().unwrap_or_default());
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
            opt_float_eq(Some(x.price), Some(y.price)) && opt_float_eq(x.size, y.size)
        })
}

fn commit_rate_eq(a: &Option<CommitRate>, b: &Option<CommitRate>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            a.rate_type == b.rate_type
                && opt_float_eq(a.price, b.price)
                && tiers_eq(&a.tiers, &b.tiers)
        }
        _ => false,
    }
}

/// Copy of `p` with every float-bearing field cleared
fn without_floats(p: &RateParams) -> RateParams {
    RateParams {
        price: None,
        quantity: None,
        tiers: None,
        commit_rate: None,
        ..p.clone()
    }
}

pub struct RateAdapter<C> {
    client: C,
}

impl<C> RateAdapter<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

impl<C: Rates + 'static> Adapter for RateAdapter<C> {
    type Params = RateParams;
    type Observed = Rate;
    type Remote = Rate;

    const KIND: &'static str = "rate";
    const IDENTITY: Identity = Identity::Structural;

    fn locate(
        &self,
        declared: &DeclaredOf<Self>,
        cancel: &CancelToken,
    ) -> Result<Option<Rate>, RemoteError> {
        let params = declared.parameters();
        if params.rate_card_id.is_none() || params.starting_at.is_none() {
            log::debug!("{}: rate card or starting_at unset, nothing to search", declared.key());
            return Ok(None);
        }

        let query = params.query();
        find_first(
            cancel,
            |page| {
                self.client
                    .list_rates(&query, page, cancel)
                    .map_err(RemoteError::from)
            },
            |candidate| self.is_match(params, candidate),
        )
    }

    fn to_parameters(&self, remote: &Rate) -> RateParams {
        remote.into()
    }

    fn to_observed(&self, remote: &Rate) -> Rate {
        remote.clone()
    }

    fn normalize(&self, declared: &RateParams, params: &mut RateParams) {
        params.rate_card_id = None;
        params.rate_card_ref = None;
        params.rate_card_selector = None;
        params.product_ref = None;
        params.product_selector = None;
        params.starting_at = None;
        if declared.credit_type_id.is_none() {
            params.credit_type_id = None;
        }

        lowercase(&mut params.rate_type);
        blank_to_none(&mut params.ending_before);
        false_to_none(&mut params.entitled);
        false_to_none(&mut params.is_prorated);
        false_to_none(&mut params.use_list_prices);
        empty_map_to_none(&mut params.pricing_group_values);
        sort_tiers(&mut params.tiers);

        if let Some(commit) = params.commit_rate.as_mut() {
            commit.rate_type = commit.rate_type.to_lowercase();
            sort_tiers(&mut commit.tiers);
        }
    }

    fn equivalent(&self, a: &RateParams, b: &RateParams) -> bool {
        without_floats(a) == without_floats(b)
            && opt_float_eq(a.price, b.price)
            && opt_float_eq(a.quantity, b.quantity)
            && tiers_eq(&a.tiers, &b.tiers)
            && commit_rate_eq(&a.commit_rate, &b.commit_rate)
    }

    fn late_initialize(&self, params: &mut RateParams, remote: &Rate) -> bool {
        match (&params.credit_type_id, &remote.rate.credit_type) {
            (None, Some(credit)) if !credit.id.is_empty() => {
                params.credit_type_id = Some(credit.id.clone());
                true
            }
            _ => false,
        }
    }

    fn structural_key(&self, params: &RateParams) -> Option<String> {
        let card = params.rate_card_id.as_deref()?;
        let product = params.product_id.as_deref()?;
        let starting_at = params.starting_at.as_deref()?;
        Some(format!("{card}/{product}/{starting_at}"))
    }

    fn create(
        &self,
        params: &RateParams,
        cancel: &CancelToken,
    ) -> Result<Option<String>, RemoteError> {
        self.client.add_rate(&params.into(), cancel)?;
        Ok(None)
    }
}
