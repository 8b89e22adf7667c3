//! Wire types for the Metronome API.
//!
//! Request types skip unset fields entirely, so a request carries exactly
//! the fields the caller set. Response types default every optional field.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Custom field values keyed by field name.
pub type CustomFields = BTreeMap<String, String>;

/// Response envelope `{"data": ...}`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Data<T> {
    pub data: T,
}

/// Body of a create response.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Created {
    #[serde(default)]
    pub id: String,
}

/// Paged list response.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Listed<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub next_page: Option<String>,
}

/// Error body returned with non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiMessage {
    pub message: String,
}

// =============================================================================
// Billable metrics
// =============================================================================

/// How a billable metric aggregates matching events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationType {
    /// Number of events.
    #[serde(alias = "COUNT")]
    Count,
    /// Most recent value of the aggregation key.
    #[serde(alias = "LATEST")]
    Latest,
    /// Maximum value of the aggregation key.
    #[serde(alias = "MAX")]
    Max,
    /// Sum of the aggregation key.
    #[serde(alias = "SUM")]
    Sum,
    /// Distinct values of the aggregation key.
    #[serde(alias = "UNIQUE")]
    Unique,
}

/// Event types a billable metric counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTypeFilter {
    /// Event types to include.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_values: Option<Vec<String>>,
    /// Event types to exclude.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_in_values: Option<Vec<String>>,
}

/// Filter on one event property.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyFilter {
    /// Property name.
    pub name: String,
    /// Require presence (or absence) of the property.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,
    /// Allowed values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_values: Option<Vec<String>>,
    /// Disallowed values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_in_values: Option<Vec<String>>,
}

/// Billable metric fields, shared by create requests and responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillableMetricInput {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Aggregation applied to matching events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation_type: Option<AggregationType>,
    /// Event property the aggregation reads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation_key: Option<String>,
    /// Event type filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type_filter: Option<EventTypeFilter>,
    /// Property filters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_filters: Option<Vec<PropertyFilter>>,
    /// Property groupings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_keys: Option<Vec<Vec<String>>>,
    /// Custom field values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<CustomFields>,
    /// SQL definition, instead of filters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
}

/// A billable metric as returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillableMetric {
    /// Server-assigned identifier.
    pub id: String,
    /// Metric definition.
    #[serde(flatten)]
    pub definition: BillableMetricInput,
    /// Set once the metric is archived.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<String>,
}

// =============================================================================
// Products
// =============================================================================

/// Conversion applied to usage quantities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuantityConversion {
    /// Factor to multiply or divide by.
    pub conversion_factor: f64,
    /// `multiply` or `divide`.
    pub operation: String,
    /// Display name of the converted unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Rounding applied to usage quantities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuantityRounding {
    /// Decimal places kept.
    pub decimal_places: f64,
    /// `round_up`, `round_down`, or `round_half_up`.
    pub rounding_method: String,
}

/// Versioned product fields, shared by create and update requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductDetails {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Metric the product prices (usage products).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billable_metric_id: Option<String>,
    /// Products a composite product covers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite_product_ids: Option<Vec<String>>,
    /// Tags a composite product covers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite_tags: Option<Vec<String>>,
    /// Exclude free usage from composite products.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_free_usage: Option<bool>,
    /// Keys used to group line items on invoices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presentation_group_key: Option<Vec<String>>,
    /// Keys used to price by group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing_group_key: Option<Vec<String>>,
    /// Quantity conversion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity_conversion: Option<QuantityConversion>,
    /// Quantity rounding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity_rounding: Option<QuantityRounding>,
    /// Product tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// Create request for a product.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductInput {
    /// `usage`, `subscription`, `composite`, `fixed`, or `pro_service`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub product_type: Option<String>,
    /// Versioned fields.
    #[serde(flatten)]
    pub details: ProductDetails,
}

/// Update request for a product. Changes take effect at `starting_at`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateProductInput {
    /// Product to update.
    pub product_id: String,
    /// RFC 3339 timestamp the new version applies from.
    pub starting_at: String,
    /// Versioned fields.
    #[serde(flatten)]
    pub details: ProductDetails,
}

/// One version of a product as returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductVersion {
    /// Versioned fields.
    #[serde(flatten)]
    pub details: ProductDetails,
    /// When this version applies from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starting_at: Option<String>,
    /// When this version was written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// A product as returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Server-assigned identifier.
    pub id: String,
    /// Product type, in whatever case the API returns.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub product_type: Option<String>,
    /// Version in effect now.
    #[serde(default)]
    pub current: ProductVersion,
    /// First version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<ProductVersion>,
    /// Custom field values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<CustomFields>,
    /// Set once the product is archived.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<String>,
}

// =============================================================================
// Rate cards
// =============================================================================

/// Exchange rate from a custom credit type to the fiat credit type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditTypeConversion {
    /// Custom credit type being priced.
    pub custom_credit_type_id: String,
    /// Fiat amount per custom credit, as a decimal string.
    pub fiat_per_custom_credit: String,
}

/// Alternative name a rate card can be looked up by.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateCardAlias {
    /// Alias.
    pub name: String,
}

/// A credit type reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditType {
    /// Credit type identifier.
    pub id: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Create request for a rate card.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateCardInput {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Fiat credit type rates are priced in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fiat_credit_type_id: Option<String>,
    /// Custom credit type exchange rates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit_type_conversions: Option<Vec<CreditTypeConversion>>,
    /// Aliases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aliases: Option<Vec<RateCardAlias>>,
    /// Custom field values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<CustomFields>,
}

/// A rate card as returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateCard {
    /// Server-assigned identifier.
    pub id: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Fiat credit type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fiat_credit_type: Option<CreditType>,
    /// Aliases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aliases: Option<Vec<RateCardAlias>>,
    /// Custom field values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<CustomFields>,
    /// When the rate card was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Set once the rate card is archived.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<String>,
}

// =============================================================================
// Rates
// =============================================================================

/// One tier of a tiered price.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    /// Price per unit within the tier.
    pub price: f64,
    /// Units covered by the tier; the last tier is open-ended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
}

/// Rate applied when drawing down a commit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitRate {
    /// `flat` or `tiered`.
    pub rate_type: String,
    /// Flat price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    /// Tiered prices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiers: Option<Vec<Tier>>,
}

/// Narrows a rate search to matching products.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateSelector {
    /// Product identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    /// Exact pricing group values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing_group_values: Option<BTreeMap<String, String>>,
    /// Subset of pricing group values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_pricing_group_values: Option<BTreeMap<String, String>>,
    /// Product tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_tags: Option<Vec<String>>,
}

/// Rate search: rates on a card in effect at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateQuery {
    /// Rate card to search.
    pub rate_card_id: String,
    /// RFC 3339 timestamp.
    pub at: String,
    /// Product selectors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selectors: Option<Vec<RateSelector>>,
}

/// Request adding a rate to a rate card.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddRateInput {
    /// Whether the product is entitled on contracts using the card.
    pub entitled: bool,
    /// Product priced by the rate.
    pub product_id: String,
    /// Rate card the rate is added to.
    pub rate_card_id: String,
    /// `flat`, `percentage`, `subscription`, `tiered`, or `custom`.
    pub rate_type: String,
    /// RFC 3339 timestamp the rate applies from.
    pub starting_at: String,
    /// Rate for commit drawdown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_rate: Option<CommitRate>,
    /// Credit type; the card's fiat type when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit_type_id: Option<String>,
    /// RFC 3339 timestamp the rate stops applying.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ending_before: Option<String>,
    /// Prorate subscription rates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_prorated: Option<bool>,
    /// Flat price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    /// Pricing group values the rate applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing_group_values: Option<BTreeMap<String, String>>,
    /// Subscription quantity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    /// Tiered prices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiers: Option<Vec<Tier>>,
    /// Use list prices on contracts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_list_prices: Option<bool>,
}

/// Pricing details of a rate as returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateDetails {
    /// Rate type, in whatever case the API returns.
    #[serde(default)]
    pub rate_type: String,
    /// Credit type the price is in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit_type: Option<CreditType>,
    /// Prorated subscription rate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_prorated: Option<bool>,
    /// Flat price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    /// Pricing group values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing_group_values: Option<BTreeMap<String, String>>,
    /// Subscription quantity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    /// Tiered prices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiers: Option<Vec<Tier>>,
    /// Use list prices on contracts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_list_prices: Option<bool>,
}

/// A rate as returned by a rate search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rate {
    /// Product entitlement.
    #[serde(default)]
    pub entitled: bool,
    /// Product priced by the rate.
    #[serde(default)]
    pub product_id: String,
    /// Product display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    /// Product tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_tags: Option<Vec<String>>,
    /// Product custom field values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_custom_fields: Option<CustomFields>,
    /// Pricing details.
    #[serde(default)]
    pub rate: RateDetails,
    /// When the rate applies from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starting_at: Option<String>,
    /// When the rate stops applying.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ending_before: Option<String>,
    /// Rate for commit drawdown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_rate: Option<CommitRate>,
    /// Pricing group values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing_group_values: Option<BTreeMap<String, String>>,
}

// =============================================================================
// Custom field keys
// =============================================================================

/// A custom field key. Identified by `(entity, key)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomFieldKey {
    /// Entity the key applies to, e.g. `customer` or `product`.
    #[serde(default)]
    pub entity: String,
    /// Key name.
    #[serde(default)]
    pub key: String,
    /// Values must be unique across entities.
    #[serde(default)]
    pub enforce_uniqueness: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metric_request_skips_unset_fields() {
        let input = BillableMetricInput {
            aggregation_type: Some(AggregationType::Sum),
            aggregation_key: Some("agg-key".to_string()),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&input).unwrap(),
            json!({"aggregation_type": "sum", "aggregation_key": "agg-key"})
        );
    }

    #[test]
    fn test_aggregation_type_accepts_uppercase() {
        let t: AggregationType = serde_json::from_str("\"SUM\"").unwrap();
        assert_eq!(t, AggregationType::Sum);
        let t: AggregationType = serde_json::from_str("\"unique\"").unwrap();
        assert_eq!(t, AggregationType::Unique);
    }

    #[test]
    fn test_billable_metric_response() {
        let metric: BillableMetric = serde_json::from_value(json!({
            "id": "13117714-3f05-48e5-a6e9-a66093f13b4d",
            "name": "CPU hours",
            "aggregation_type": "SUM",
            "aggregation_key": "cpu_hours",
            "group_keys": [["region"]],
            "archived_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(metric.definition.name.as_deref(), Some("CPU hours"));
        assert_eq!(metric.definition.aggregation_type, Some(AggregationType::Sum));
        assert_eq!(metric.definition.group_keys, Some(vec![vec!["region".to_string()]]));
        assert!(metric.archived_at.is_some());
    }

    #[test]
    fn test_product_type_field_name() {
        let input = ProductInput {
            product_type: Some("usage".to_string()),
            details: ProductDetails {
                name: Some("Compute".to_string()),
                ..Default::default()
            },
        };
        assert_eq!(
            serde_json::to_value(&input).unwrap(),
            json!({"type": "usage", "name": "Compute"})
        );
    }

    #[test]
    fn test_product_response_current_version() {
        let product: Product = serde_json::from_value(json!({
            "id": "d7b8a1e2-8c1f-4a55-9f2a-5d1c1e0b7a01",
            "type": "USAGE",
            "initial": {"name": "Compute", "starting_at": "2024-01-01T00:00:00Z"},
            "current": {"name": "Compute v2", "tags": ["b", "a"], "starting_at": "2024-06-01T00:00:00Z"}
        }))
        .unwrap();
        assert_eq!(product.product_type.as_deref(), Some("USAGE"));
        assert_eq!(product.current.details.name.as_deref(), Some("Compute v2"));
        assert_eq!(
            product.current.starting_at.as_deref(),
            Some("2024-06-01T00:00:00Z")
        );
        assert!(product.archived_at.is_none());
    }

    #[test]
    fn test_update_product_request() {
        let input = UpdateProductInput {
            product_id: "p".to_string(),
            starting_at: "2024-06-01T00:00:00Z".to_string(),
            details: ProductDetails {
                tags: Some(vec!["a".to_string()]),
                ..Default::default()
            },
        };
        assert_eq!(
            serde_json::to_value(&input).unwrap(),
            json!({"product_id": "p", "starting_at": "2024-06-01T00:00:00Z", "tags": ["a"]})
        );
    }

    #[test]
    fn test_rate_response() {
        let rate: Rate = serde_json::from_value(json!({
            "entitled": true,
            "product_id": "p1",
            "product_name": "Compute",
            "rate": {
                "rate_type": "TIERED",
                "credit_type": {"id": "usd", "name": "USD (cents)"},
                "tiers": [{"price": 1.06, "size": 30.0}, {"price": 1.07}]
            },
            "starting_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert!(rate.entitled);
        assert_eq!(rate.rate.rate_type, "TIERED");
        assert_eq!(rate.rate.credit_type.unwrap().id, "usd");
        assert_eq!(rate.rate.tiers.unwrap()[1].size, None);
    }

    #[test]
    fn test_listed_defaults() {
        let listed: Listed<CustomFieldKey> = serde_json::from_value(json!({
            "data": [{"entity": "customer", "key": "region"}]
        }))
        .unwrap();
        assert_eq!(listed.data.len(), 1);
        assert!(!listed.data[0].enforce_uniqueness);
        assert!(listed.next_page.is_none());
    }

    #[test]
    fn test_created_missing_id_defaults_empty() {
        let created: Data<Created> = serde_json::from_value(json!({"data": {}})).unwrap();
        assert!(created.data.id.is_empty());
    }
}
