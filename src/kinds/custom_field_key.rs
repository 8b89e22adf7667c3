//! Custom field keys: structural identity by `(entity, key)`.

use metronome::CustomFieldKeys;
use metronome::types::CustomFieldKey;
use reconcile::{Adapter, CancelToken, DeclaredOf, Identity, RemoteError, find_first};
use serde::{Deserialize, Serialize};

/// Desired custom field key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomFieldKeyParams {
    /// Entity the key applies to, e.g. `customer`
    pub entity: String,
    pub key: String,
    #[serde(default)]
    pub enforce_uniqueness: bool,
}

impl From<&CustomFieldKeyParams> for CustomFieldKey {
    fn from(p: &CustomFieldKeyParams) -> Self {
        Self {
            entity: p.entity.clone(),
            key: p.key.clone(),
            enforce_uniqueness: p.enforce_uniqueness,
        }
    }
}

impl From<&CustomFieldKey> for CustomFieldKeyParams {
    fn from(k: &CustomFieldKey) -> Self {
        Self {
            entity: k.entity.clone(),
            key: k.key.clone(),
            enforce_uniqueness: k.enforce_uniqueness,
        }
    }
}

pub struct CustomFieldKeyAdapter<C> {
    client: C,
}

impl<C> CustomFieldKeyAdapter<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

impl<C: CustomFieldKeys + 'static> Adapter for CustomFieldKeyAdapter<C> {
    type Params = CustomFieldKeyParams;
    type Observed = CustomFieldKey;
    type Remote = CustomFieldKey;

    const KIND: &'static str = "custom field key";
    const IDENTITY: Identity = Identity::Structural;

    fn locate(
        &self,
        declared: &DeclaredOf<Self>,
        cancel: &CancelToken,
    ) -> Result<Option<CustomFieldKey>, RemoteError> {
        let params = declared.parameters();
        let entities = [params.entity.clone()];
        find_first(
            cancel,
            |page| {
                self.client
                    .list_custom_field_keys(&entities, page, cancel)
                    .map_err(RemoteError::from)
            },
            |candidate| candidate.entity == params.entity && candidate.key == params.key,
        )
    }

    fn to_parameters(&self, remote: &CustomFieldKey) -> CustomFieldKeyParams {
        remote.into()
    }

    fn to_observed(&self, remote: &CustomFieldKey) -> CustomFieldKey {
        remote.clone()
    }

    fn normalize(&self, _declared: &CustomFieldKeyParams, _params: &mut CustomFieldKeyParams) {}

    fn structural_key(&self, params: &CustomFieldKeyParams) -> Option<String> {
        Some(format!("{}/{}", params.entity, params.key))
    }

    fn create(
        &self,
        params: &CustomFieldKeyParams,
        cancel: &CancelToken,
    ) -> Result<Option<String>, RemoteError> {
        self.client.add_custom_field_key(&params.into(), cancel)?;
        Ok(None)
    }

    fn delete(
        &self,
        _external_name: &str,
        params: &CustomFieldKeyParams,
        cancel: &CancelToken,
    ) -> Result<(), RemoteError> {
        Ok(self
            .client
            .remove_custom_field_key(&params.entity, &params.key, cancel)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metronome::MockClient;
    use reconcile::{Declared, Reconciler};

    type Declaration = DeclaredOf<CustomFieldKeyAdapter<MockClient>>;

    fn declared(entity: &str, key: &str, enforce_uniqueness: bool) -> Declaration {
        Declared::new(
            "custom field key",
            key,
            CustomFieldKeyParams {
                entity: entity.to_string(),
                key: key.to_string(),
                enforce_uniqueness,
            },
        )
        .with_provider_config("default")
    }

    fn setup() -> (MockClient, Reconciler<CustomFieldKeyAdapter<MockClient>>) {
        let mock = MockClient::new();
        let reconciler = Reconciler::new(CustomFieldKeyAdapter::new(mock.clone()));
        (mock, reconciler)
    }

    #[test]
    fn test_match_on_second_page() {
        let (mock, reconciler) = setup();
        mock.script_custom_field_key_pages(vec![
            vec![CustomFieldKey {
                key: "key0".to_string(),
                ..Default::default()
            }],
            vec![CustomFieldKey {
                key: "key1".to_string(),
                entity: "entity1".to_string(),
                enforce_uniqueness: true,
            }],
        ]);
        let mut field = declared("entity1", "key1", true);

        let observation = reconciler.observe(&mut field, &CancelToken::new()).unwrap();

        assert!(observation.exists);
        assert!(observation.up_to_date);
        assert_eq!(
            mock.operations(),
            vec!["list_custom_field_keys", "list_custom_field_keys"]
        );
        assert_eq!(field.external_name(), Some("entity1/key1"));
        assert!(field.conditions().ready.as_ref().unwrap().status);
    }

    #[test]
    fn test_uniqueness_drift() {
        let (mock, reconciler) = setup();
        mock.insert_custom_field_key(CustomFieldKey {
            entity: "customer".to_string(),
            key: "region".to_string(),
            enforce_uniqueness: false,
        });
        let mut field = declared("customer", "region", true);

        let observation = reconciler.observe(&mut field, &CancelToken::new()).unwrap();
        assert!(observation.exists);
        assert!(!observation.up_to_date);
        assert!(observation.diff.unwrap().contains("enforce_uniqueness"));
    }

    #[test]
    fn test_no_match_leaves_external_name_unset() {
        let (mock, reconciler) = setup();
        mock.insert_custom_field_key(CustomFieldKey {
            entity: "contract".to_string(),
            key: "region".to_string(),
            enforce_uniqueness: false,
        });
        let mut field = declared("customer", "region", false);

        let observation = reconciler.observe(&mut field, &CancelToken::new()).unwrap();
        assert!(!observation.exists);
        assert_eq!(field.external_name(), None);
        assert_eq!(mock.calls()[0].body["entities"][0], "customer");
    }

    #[test]
    fn test_create_and_remove() {
        let (mock, reconciler) = setup();
        let cancel = CancelToken::new();
        let mut field = declared("customer", "region", false);

        reconciler.create(&mut field, &cancel).unwrap();
        assert_eq!(field.external_name(), Some("customer/region"));
        assert!(reconciler.observe(&mut field, &cancel).unwrap().up_to_date);

        reconciler.delete(&mut field, &cancel).unwrap();
        reconciler.delete(&mut field, &cancel).unwrap();
        assert_eq!(
            mock.operations(),
            vec![
                "add_custom_field_key",
                "list_custom_field_keys",
                "remove_custom_field_key",
                "remove_custom_field_key"
            ]
        );
    }

    #[test]
    fn test_duplicate_add_is_fatal() {
        let (mock, reconciler) = setup();
        mock.insert_custom_field_key(CustomFieldKey {
            entity: "customer".to_string(),
            key: "region".to_string(),
            enforce_uniqueness: false,
        });
        let mut field = declared("customer", "region", false);

        let err = reconciler
            .create(&mut field, &CancelToken::new())
            .unwrap_err();
        assert!(err.to_string().starts_with("failed to create custom field key"));
        assert!(!err.is_retryable());
        assert_eq!(field.external_name(), None);
    }
}
