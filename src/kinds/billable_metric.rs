//! Billable metrics: nominal identity, archived on delete, never updated.

use metronome::BillableMetrics;
use metronome::types::{
    AggregationType, BillableMetric, BillableMetricInput, EventTypeFilter, PropertyFilter,
};
use reconcile::diff::{blank_to_none, empty_map_to_none, empty_to_none, sort_by_key, sort_strings};
use reconcile::{Adapter, CancelToken, DeclaredOf, Identity, RemoteError, find_by_id};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Desired billable metric
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BillableMetricParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation_type: Option<AggregationType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type_filter: Option<EventTypeFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_filters: Option<Vec<PropertyFilter>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_keys: Option<Vec<Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
}

impl From<&BillableMetricParams> for BillableMetricInput {
    fn from(p: &BillableMetricParams) -> Self {
        Self {
            name: p.name.clone(),
            aggregation_type: p.aggregation_type,
            aggregation_key: p.aggregation_key.clone(),
            event_type_filter: p.event_type_filter.clone(),
            property_filters: p.property_filters.clone(),
            group_keys: p.group_keys.clone(),
            custom_fields: p.custom_fields.clone(),
            sql: p.sql.clone(),
        }
    }
}

impl From<&BillableMetric> for BillableMetricParams {
    fn from(m: &BillableMetric) -> Self {
        let definition = &m.definition;
        Self {
            name: definition.name.clone(),
            aggregation_type: definition.aggregation_type,
            aggregation_key: definition.aggregation_key.clone(),
            event_type_filter: definition.event_type_filter.clone(),
            property_filters: definition.property_filters.clone(),
            group_keys: definition.group_keys.clone(),
            custom_fields: definition.custom_fields.clone(),
            sql: definition.sql.clone(),
        }
    }
}

pub struct BillableMetricAdapter<C> {
    client: C,
}

impl<C> BillableMetricAdapter<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

impl<C: BillableMetrics + 'static> Adapter for BillableMetricAdapter<C> {
    type Params = BillableMetricParams;
    type Observed = BillableMetric;
    type Remote = BillableMetric;

    const KIND: &'static str = "billable metric";
    const IDENTITY: Identity = Identity::Nominal;

    fn locate(
        &self,
        declared: &DeclaredOf<Self>,
        cancel: &CancelToken,
    ) -> Result<Option<BillableMetric>, RemoteError> {
        let Some(id) = declared.external_name() else {
            return Ok(None);
        };
        find_by_id(
            || {
                self.client
                    .get_billable_metric(id, cancel)
                    .map_err(RemoteError::from)
            },
            |metric| metric.archived_at.is_some(),
        )
    }

    fn to_parameters(&self, remote: &BillableMetric) -> BillableMetricParams {
        remote.into()
    }

    fn to_observed(&self, remote: &BillableMetric) -> BillableMetric {
        remote.clone()
    }

    fn normalize(&self, _declared: &BillableMetricParams, params: &mut BillableMetricParams) {
        blank_to_none(&mut params.name);
        blank_to_none(&mut params.aggregation_key);
        blank_to_none(&mut params.sql);

        if let Some(filter) = params.event_type_filter.as_mut() {
            sort_strings(&mut filter.in_values);
            sort_strings(&mut filter.not_in_values);
        }
        if params.event_type_filter == Some(EventTypeFilter::default()) {
            params.event_type_filter = None;
        }

        if let Some(filters) = params.property_filters.as_mut() {
            for filter in filters.iter_mut() {
                sort_strings(&mut filter.in_values);
                sort_strings(&mut filter.not_in_values);
            }
        }
        sort_by_key(&mut params.property_filters, |f| {
            (
                f.name.clone(),
                f.exists,
                f.in_values.clone(),
                f.not_in_values.clone(),
            )
        });

        if let Some(groups) = params.group_keys.as_mut() {
            groups.iter_mut().for_each(|g| g.sort());
            groups.retain(|g| !g.is_empty());
            groups.sort();
        }
        empty_to_none(&mut params.group_keys);
        empty_map_to_none(&mut params.custom_fields);
    }

    fn create(
        &self,
        params: &BillableMetricParams,
        cancel: &CancelToken,
    ) -> Result<Option<String>, RemoteError> {
        let id = self
            .client
            .create_billable_metric(&params.into(), cancel)?;
        Ok(Some(id))
    }

    fn delete(
        &self,
        external_name: &str,
        _params: &BillableMetricParams,
        cancel: &CancelToken,
    ) -> Result<(), RemoteError> {
        Ok(self
            .client
            .archive_billable_metric(external_name, cancel)?)
    }
}
