//! Rate cards: nominal identity, archived on delete.

use metronome::RateCards;
use metronome::types::{CreditTypeConversion, CustomFields, RateCard, RateCardAlias, RateCardInput};
use reconcile::diff::{blank_to_none, empty_map_to_none, empty_to_none, sort_by_key};
use reconcile::{Adapter, CancelToken, DeclaredOf, Identity, RemoteError, find_by_id};
use serde::{Deserialize, Serialize};

/// Desired rate card
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateCardParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Filled from the remote card when left unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fiat_credit_type_id: Option<String>,
    /// Sent on create only; the API does not return them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit_type_conversions: Option<Vec<CreditTypeConversion>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aliases: Option<Vec<RateCardAlias>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<CustomFields>,
}

impl From<&RateCardParams> for RateCardInput {
    fn from(p: &RateCardParams) -> Self {
        let mut conversions = p.credit_type_conversions.clone();
        sort_by_key(&mut conversions, |c| c.custom_credit_type_id.clone());
        Self {
            name: p.name.clone(),
            description: p.description.clone(),
            fiat_credit_type_id: p.fiat_credit_type_id.clone(),
            credit_type_conversions: conversions,
            aliases: p.aliases.clone(),
            custom_fields: p.custom_fields.clone(),
        }
    }
}

impl From<&RateCard> for RateCardParams {
    fn from(card: &RateCard) -> Self {
        Self {
            name: card.name.clone(),
            description: card.description.clone(),
            fiat_credit_type_id: card.fiat_credit_type.as_ref().map(|t| t.id.clone()),
            credit_type_conversions: None,
            aliases: card.aliases.clone(),
            custom_fields: card.custom_fields.clone(),
        }
    }
}

pub struct RateCardAdapter<C> {
    client: C,
}

impl<C> RateCardAdapter<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

impl<C: RateCards + 'static> Adapter for RateCardAdapter<C> {
    type Params = RateCardParams;
    type Observed = RateCard;
    type Remote = RateCard;

    const KIND: &'static str = "rate card";
    const IDENTITY: Identity = Identity::Nominal;

    fn locate(
        &self,
        declared: &DeclaredOf<Self>,
        cancel: &CancelToken,
    ) -> Result<Option<RateCard>, RemoteError> {
        let Some(id) = declared.external_name() else {
            return Ok(None);
        };
        find_by_id(
            || self.client.get_rate_card(id, cancel).map_err(RemoteError::from),
            |card| card.archived_at.is_some(),
        )
    }

    fn to_parameters(&self, remote: &RateCard) -> RateCardParams {
        remote.into()
    }

    fn to_observed(&self, remote: &RateCard) -> RateCard {
        remote.clone()
    }

    fn normalize(&self, declared: &RateCardParams, params: &mut RateCardParams) {
        params.credit_type_conversions = None;
        if declared.fiat_credit_type_id.is_none() {
            params.fiat_credit_type_id = None;
        }

        blank_to_none(&mut params.name);
        blank_to_none(&mut params.description);
        sort_by_key(&mut params.aliases, |a| a.name.clone());
        empty_to_none(&mut params.aliases);
        empty_map_to_none(&mut params.custom_fields);
    }

    fn late_initialize(&self, params: &mut RateCardParams, remote: &RateCard) -> bool {
        match (&params.fiat_credit_type_id, &remote.fiat_credit_type) {
            (None, Some(fiat)) if !fiat.id.is_empty() => {
                params.fiat_credit_type_id = Some(fiat.id.clone());
                true
            }
            _ => false,
        }
    }

    fn create(
        &self,
        params: &RateCardParams,
        cancel: &CancelToken,
    ) -> Result<Option<String>, RemoteError> {
        let id = self.client.create_rate_card(&params.into(), cancel)?;
        Ok(Some(id))
    }

    fn delete(
        &self,
        external_name: &str,
        _params: &RateCardParams,
        cancel: &CancelToken,
    ) -> Result<(), RemoteError> {
        Ok(self.client.archive_rate_card(external_name, cancel)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metronome::types::CreditType;
    use metronome::{DEFAULT_CREDIT_TYPE_ID, MockClient};
    use reconcile::{Declared, Error, Reconciler};

    fn alias(name: &str) -> RateCardAlias {
        RateCardAlias {
            name: name.to_string(),
        }
    }

    fn params() -> RateCardParams {
        RateCardParams {
            name: Some("List prices".to_string()),
            aliases: Some(vec![alias("standard"), alias("list")]),
            credit_type_conversions: Some(vec![CreditTypeConversion {
                custom_credit_type_id: "c5b4c4a2-6a3e-4c8e-9b8e-3f2f0e6f4b11".to_string(),
                fiat_per_custom_credit: "0.5".to_string(),
            }]),
            ..Default::default()
        }
    }

    fn setup() -> (MockClient, Reconciler<RateCardAdapter<MockClient>>) {
        let mock = MockClient::new();
        let reconciler = Reconciler::new(RateCardAdapter::new(mock.clone()));
        (mock, reconciler)
    }

    #[test]
    fn test_create_then_observe_late_initializes_fiat() {
        let (_mock, reconciler) = setup();
        let cancel = CancelToken::new();
        let mut card: DeclaredOf<RateCardAdapter<MockClient>> =
            Declared::new("rate card", "list", params()).with_provider_config("default");

        reconciler.create(&mut card, &cancel).unwrap();
        let observation = reconciler.observe(&mut card, &cancel).unwrap();

        assert!(observation.exists);
        assert!(observation.up_to_date);
        assert!(observation.late_initialized);
        assert_eq!(
            card.parameters().fiat_credit_type_id.as_deref(),
            Some(DEFAULT_CREDIT_TYPE_ID)
        );

        let again = reconciler.observe(&mut card, &cancel).unwrap();
        assert!(!again.late_initialized);
    }

    #[test]
    fn test_late_init_never_overwrites() {
        let adapter = RateCardAdapter::new(MockClient::new());
        let mut declared = RateCardParams {
            fiat_credit_type_id: Some("mine".to_string()),
            ..params()
        };
        let remote = RateCard {
            fiat_credit_type: Some(CreditType {
                id: "theirs".to_string(),
                name: None,
            }),
            ..Default::default()
        };

        assert!(!adapter.late_initialize(&mut declared, &remote));
        assert_eq!(declared.fiat_credit_type_id.as_deref(), Some("mine"));
    }

    #[test]
    fn test_alias_order_ignored() {
        let adapter = RateCardAdapter::new(MockClient::new());
        let remote = RateCard {
            id: "c".to_string(),
            name: Some("List prices".to_string()),
            aliases: Some(vec![alias("list"), alias("standard")]),
            fiat_credit_type: Some(CreditType {
                id: DEFAULT_CREDIT_TYPE_ID.to_string(),
                name: Some("USD (cents)".to_string()),
            }),
            custom_fields: Some(CustomFields::new()),
            ..Default::default()
        };

        assert!(adapter.is_match(&params(), &remote));
    }

    #[test]
    fn test_renamed_alias_drifts() {
        let adapter = RateCardAdapter::new(MockClient::new());
        let remote = RateCard {
            name: Some("List prices".to_string()),
            aliases: Some(vec![alias("list"), alias("legacy")]),
            ..Default::default()
        };

        assert!(!adapter.is_match(&params(), &remote));
    }

    #[test]
    fn test_create_sends_conversions() {
        let (mock, reconciler) = setup();
        let mut card: DeclaredOf<RateCardAdapter<MockClient>> =
            Declared::new("rate card", "list", params()).with_provider_config("default");

        reconciler.create(&mut card, &CancelToken::new()).unwrap();

        let body = &mock.calls()[0].body;
        assert_eq!(
            body["credit_type_conversions"][0]["fiat_per_custom_credit"],
            "0.5"
        );
        assert!(body.get("fiat_credit_type_id").is_none());
    }

    #[test]
    fn test_update_unsupported() {
        let (mock, reconciler) = setup();
        let mut card: DeclaredOf<RateCardAdapter<MockClient>> =
            Declared::new("rate card", "list", params())
                .with_external_name(Some("00000000-0000-4000-8000-000000000001".to_string()));

        let err = reconciler
            .update(&mut card, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, Error::UpdateUnsupported { .. }));
        assert_eq!(err.to_string(), "updating a rate card is not supported");
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_delete_archives_once() {
        let (mock, reconciler) = setup();
        let cancel = CancelToken::new();
        let mut card: DeclaredOf<RateCardAdapter<MockClient>> =
            Declared::new("rate card", "list", params()).with_provider_config("default");
        reconciler.create(&mut card, &cancel).unwrap();

        reconciler.delete(&mut card, &cancel).unwrap();
        reconciler.delete(&mut card, &cancel).unwrap();
        let observation = reconciler.observe(&mut card, &cancel).unwrap();

        assert!(!observation.exists);
        assert_eq!(
            mock.operations(),
            vec![
                "create_rate_card",
                "archive_rate_card",
                "archive_rate_card",
                "get_rate_card"
            ]
        );
    }
}
