//! Per-kind API traits and implementations.
//!
//! Each resource kind has its own trait so adapters depend only on the
//! operations they call. [`Api`] bundles all of them for code that holds a
//! single client. [`http::Client`] talks to the real API.
//!
//! # Testing
//!
//! Use [`MockClient`] for testing without network access:
//!
//! ```
//! use metronome::backend::{BillableMetrics, MockClient};
//! use metronome::types::{AggregationType, BillableMetricInput};
//! use reconcile::CancelToken;
//!
//! let mock = MockClient::new();
//! let input = BillableMetricInput {
//!     aggregation_type: Some(AggregationType::Count),
//!     ..Default::default()
//! };
//! let id = mock.create_billable_metric(&input, &CancelToken::new()).unwrap();
//! assert!(mock.get_billable_metric(&id, &CancelToken::new()).is_ok());
//! ```

pub mod http;

use crate::error::{Error, Result};
use crate::types::{
    AddRateInput, BillableMetric, BillableMetricInput, CreditType, CustomFieldKey, Product,
    ProductDetails, ProductInput, ProductVersion, Rate, RateCard, RateCardInput, RateDetails,
    RateQuery, UpdateProductInput,
};
use reconcile::{CancelToken, Page};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

/// Credit type Metronome prices in when none is given (USD cents).
pub const DEFAULT_CREDIT_TYPE_ID: &str = "2714e483-4ff1-48e4-9e25-ac732e8f24f2";

/// Billable metric operations.
pub trait BillableMetrics: Send + Sync {
    /// Create a metric and return its id.
    fn create_billable_metric(
        &self,
        input: &BillableMetricInput,
        cancel: &CancelToken,
    ) -> Result<String>;

    /// Fetch a metric by id.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidId` without calling the API if `id` is not a
    /// UUID, and `Error::NotFound` if the API has no such metric.
    fn get_billable_metric(&self, id: &str, cancel: &CancelToken) -> Result<BillableMetric>;

    /// Archive a metric.
    fn archive_billable_metric(&self, id: &str, cancel: &CancelToken) -> Result<()>;
}

/// Product operations.
pub trait Products: Send + Sync {
    /// Create a product and return its id.
    fn create_product(&self, input: &ProductInput, cancel: &CancelToken) -> Result<String>;

    /// Fetch a product by id.
    fn get_product(&self, id: &str, cancel: &CancelToken) -> Result<Product>;

    /// Write a new product version and return the product id.
    fn update_product(&self, input: &UpdateProductInput, cancel: &CancelToken) -> Result<String>;

    /// Archive a product.
    fn archive_product(&self, id: &str, cancel: &CancelToken) -> Result<()>;
}

/// Rate card operations.
pub trait RateCards: Send + Sync {
    /// Create a rate card and return its id.
    fn create_rate_card(&self, input: &RateCardInput, cancel: &CancelToken) -> Result<String>;

    /// Fetch a rate card by id.
    fn get_rate_card(&self, id: &str, cancel: &CancelToken) -> Result<RateCard>;

    /// Archive a rate card.
    fn archive_rate_card(&self, id: &str, cancel: &CancelToken) -> Result<()>;
}

/// Rate operations. Rates have no identifier and cannot be removed.
pub trait Rates: Send + Sync {
    /// Fetch one page of rates matching `query`.
    fn list_rates(
        &self,
        query: &RateQuery,
        page: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<Page<Rate>>;

    /// Add a rate to a rate card.
    fn add_rate(&self, input: &AddRateInput, cancel: &CancelToken) -> Result<()>;
}

/// Custom field key operations. Keys are identified by `(entity, key)`.
pub trait CustomFieldKeys: Send + Sync {
    /// Fetch one page of keys for the given entities.
    fn list_custom_field_keys(
        &self,
        entities: &[String],
        page: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<Page<CustomFieldKey>>;

    /// Add a key.
    fn add_custom_field_key(&self, key: &CustomFieldKey, cancel: &CancelToken) -> Result<()>;

    /// Remove a key.
    fn remove_custom_field_key(&self, entity: &str, key: &str, cancel: &CancelToken)
    -> Result<()>;
}

/// Every API operation.
pub trait Api: BillableMetrics + Products + RateCards + Rates + CustomFieldKeys {}

impl<T: BillableMetrics + Products + RateCards + Rates + CustomFieldKeys> Api for T {}

/// Check that `id` is a UUID before it is sent anywhere.
pub fn validate_id(id: &str) -> Result<()> {
    uuid::Uuid::parse_str(id)
        .map(|_| ())
        .map_err(|_| Error::InvalidId(id.to_string()))
}

// =============================================================================
// Mock client
// =============================================================================

/// One recorded API call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    /// Operation name, e.g. `create_billable_metric`.
    pub operation: &'static str,
    /// Request body as it would be sent.
    pub body: serde_json::Value,
}

const ARCHIVED_AT: &str = "2024-01-01T00:00:00Z";

#[derive(Debug, Default)]
struct MockState {
    next_id: u64,
    queued_ids: Vec<String>,
    metrics: BTreeMap<String, BillableMetric>,
    products: BTreeMap<String, Product>,
    rate_cards: BTreeMap<String, RateCard>,
    rates: Vec<(String, Rate)>,
    custom_field_keys: Vec<CustomFieldKey>,
    scripted_key_pages: Option<Vec<Vec<CustomFieldKey>>>,
    page_size: usize,
    failures: HashMap<&'static str, Error>,
    calls: Vec<Call>,
}

impl MockState {
    fn new_id(&mut self) -> String {
        if !self.queued_ids.is_empty() {
            return self.queued_ids.remove(0);
        }
        self.next_id += 1;
        format!("00000000-0000-4000-8000-{:012x}", self.next_id)
    }
}

/// In-memory client for testing without network access.
///
/// Records every call, validates identifiers like the real API, and can be
/// told to fail the next call to a given operation.
#[derive(Debug, Clone, Default)]
pub struct MockClient {
    state: Arc<Mutex<MockState>>,
}

impl MockClient {
    /// Create a new empty mock client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `id` from the next create or product update call instead of
    /// the generated or stored one.
    pub fn queue_id(&self, id: impl Into<String>) {
        self.state.lock().unwrap().queued_ids.push(id.into());
    }

    /// Split list responses into pages of `size` items (0 disables paging).
    pub fn set_page_size(&self, size: usize) {
        self.state.lock().unwrap().page_size = size;
    }

    /// Fail the next call to `operation` with `error`.
    pub fn fail_next(&self, operation: &'static str, error: Error) {
        self.state.lock().unwrap().failures.insert(operation, error);
    }

    /// Serve custom field key listings from fixed pages, ignoring filters.
    pub fn script_custom_field_key_pages(&self, pages: Vec<Vec<CustomFieldKey>>) {
        self.state.lock().unwrap().scripted_key_pages = Some(pages);
    }

    /// Store a metric as if it had been created earlier.
    pub fn insert_billable_metric(&self, metric: BillableMetric) {
        let mut state = self.state.lock().unwrap();
        state.metrics.insert(metric.id.clone(), metric);
    }

    /// Store a product as if it had been created earlier.
    pub fn insert_product(&self, product: Product) {
        let mut state = self.state.lock().unwrap();
        state.products.insert(product.id.clone(), product);
    }

    /// Store a rate card as if it had been created earlier.
    pub fn insert_rate_card(&self, card: RateCard) {
        let mut state = self.state.lock().unwrap();
        state.rate_cards.insert(card.id.clone(), card);
    }

    /// Store a rate on a card as if it had been added earlier.
    pub fn insert_rate(&self, rate_card_id: impl Into<String>, rate: Rate) {
        self.state.lock().unwrap().rates.push((rate_card_id.into(), rate));
    }

    /// Store a custom field key as if it had been added earlier.
    pub fn insert_custom_field_key(&self, key: CustomFieldKey) {
        self.state.lock().unwrap().custom_field_keys.push(key);
    }

    /// All calls made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Names of the operations called so far, in order.
    #[must_use]
    pub fn operations(&self) -> Vec<&'static str> {
        self.calls().iter().map(|c| c.operation).collect()
    }

    fn enter(
        &self,
        operation: &'static str,
        body: serde_json::Value,
        cancel: &CancelToken,
    ) -> Result<MutexGuard<'_, MockState>> {
        cancel.check().map_err(|_| Error::Cancelled)?;
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call { operation, body });
        match state.failures.remove(operation) {
            Some(err) => Err(err),
            None => Ok(state),
        }
    }

    fn paginate<T: Clone>(items: &[T], page_size: usize, page: Option<&str>) -> Page<T> {
        let start = page.and_then(|p| p.parse::<usize>().ok()).unwrap_or(0);
        if page_size == 0 {
            return Page::last(items.iter().skip(start).cloned().collect());
        }
        let end = (start + page_size).min(items.len());
        let slice = items.get(start..end).unwrap_or_default().to_vec();
        Page {
            items: slice,
            next_page: (end < items.len()).then(|| end.to_string()),
        }
    }
}

fn body<T: serde::Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

fn not_found(kind: &str, id: &str) -> Error {
    Error::NotFound(format!("{kind} {id} not found"))
}

fn already_archived(kind: &str) -> Error {
    Error::AlreadyArchived(format!("{kind} is already archived"))
}

impl BillableMetrics for MockClient {
    fn create_billable_metric(
        &self,
        input: &BillableMetricInput,
        cancel: &CancelToken,
    ) -> Result<String> {
        let mut state = self.enter("create_billable_metric", body(input), cancel)?;
        let id = state.new_id();
        state.metrics.insert(
            id.clone(),
            BillableMetric {
                id: id.clone(),
                definition: input.clone(),
                archived_at: None,
            },
        );
        Ok(id)
    }

    fn get_billable_metric(&self, id: &str, cancel: &CancelToken) -> Result<BillableMetric> {
        validate_id(id)?;
        let state = self.enter("get_billable_metric", json!({ "id": id }), cancel)?;
        state
            .metrics
            .get(id)
            .cloned()
            .ok_or_else(|| not_found("billable metric", id))
    }

    fn archive_billable_metric(&self, id: &str, cancel: &CancelToken) -> Result<()> {
        validate_id(id)?;
        let mut state = self.enter("archive_billable_metric", json!({ "id": id }), cancel)?;
        let metric = state
            .metrics
            .get_mut(id)
            .ok_or_else(|| not_found("billable metric", id))?;
        if metric.archived_at.is_some() {
            return Err(already_archived("billable metric"));
        }
        metric.archived_at = Some(ARCHIVED_AT.to_string());
        Ok(())
    }
}

fn overlay(current: &mut ProductDetails, update: &ProductDetails) {
    fn set<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
        if value.is_some() {
            target.clone_from(value);
        }
    }
    set(&mut current.name, &update.name);
    set(&mut current.billable_metric_id, &update.billable_metric_id);
    set(&mut current.composite_product_ids, &update.composite_product_ids);
    set(&mut current.composite_tags, &update.composite_tags);
    set(&mut current.exclude_free_usage, &update.exclude_free_usage);
    set(&mut current.presentation_group_key, &update.presentation_group_key);
    set(&mut current.pricing_group_key, &update.pricing_group_key);
    set(&mut current.quantity_conversion, &update.quantity_conversion);
    set(&mut current.quantity_rounding, &update.quantity_rounding);
    set(&mut current.tags, &update.tags);
}

impl Products for MockClient {
    fn create_product(&self, input: &ProductInput, cancel: &CancelToken) -> Result<String> {
        let mut state = self.enter("create_product", body(input), cancel)?;
        let id = state.new_id();
        let version = ProductVersion {
            details: input.details.clone(),
            ..Default::default()
        };
        state.products.insert(
            id.clone(),
            Product {
                id: id.clone(),
                product_type: input.product_type.as_ref().map(|t| t.to_uppercase()),
                current: version.clone(),
                initial: Some(version),
                ..Default::default()
            },
        );
        Ok(id)
    }

    fn get_product(&self, id: &str, cancel: &CancelToken) -> Result<Product> {
        validate_id(id)?;
        let state = self.enter("get_product", json!({ "id": id }), cancel)?;
        state
            .products
            .get(id)
            .cloned()
            .ok_or_else(|| not_found("product", id))
    }

    fn update_product(&self, input: &UpdateProductInput, cancel: &CancelToken) -> Result<String> {
        validate_id(&input.product_id)?;
        let mut state = self.enter("update_product", body(input), cancel)?;
        let product = state
            .products
            .get_mut(&input.product_id)
            .ok_or_else(|| not_found("product", &input.product_id))?;
        overlay(&mut product.current.details, &input.details);
        product.current.starting_at = Some(input.starting_at.clone());
        let id = product.id.clone();
        if !state.queued_ids.is_empty() {
            return Ok(state.queued_ids.remove(0));
        }
        Ok(id)
    }

    fn archive_product(&self, id: &str, cancel: &CancelToken) -> Result<()> {
        validate_id(id)?;
        let mut state = self.enter("archive_product", json!({ "product_id": id }), cancel)?;
        let product = state
            .products
            .get_mut(id)
            .ok_or_else(|| not_found("product", id))?;
        if product.archived_at.is_some() {
            return Err(already_archived("product"));
        }
        product.archived_at = Some(ARCHIVED_AT.to_string());
        Ok(())
    }
}

impl RateCards for MockClient {
    fn create_rate_card(&self, input: &RateCardInput, cancel: &CancelToken) -> Result<String> {
        let mut state = self.enter("create_rate_card", body(input), cancel)?;
        let id = state.new_id();
        let fiat = input
            .fiat_credit_type_id
            .clone()
            .unwrap_or_else(|| DEFAULT_CREDIT_TYPE_ID.to_string());
        state.rate_cards.insert(
            id.clone(),
            RateCard {
                id: id.clone(),
                name: input.name.clone(),
                description: input.description.clone(),
                fiat_credit_type: Some(CreditType { id: fiat, name: None }),
                aliases: input.aliases.clone(),
                custom_fields: input.custom_fields.clone(),
                ..Default::default()
            },
        );
        Ok(id)
    }

    fn get_rate_card(&self, id: &str, cancel: &CancelToken) -> Result<RateCard> {
        validate_id(id)?;
        let state = self.enter("get_rate_card", json!({ "id": id }), cancel)?;
        state
            .rate_cards
            .get(id)
            .cloned()
            .ok_or_else(|| not_found("rate card", id))
    }

    fn archive_rate_card(&self, id: &str, cancel: &CancelToken) -> Result<()> {
        validate_id(id)?;
        let mut state = self.enter("archive_rate_card", json!({ "id": id }), cancel)?;
        let card = state
            .rate_cards
            .get_mut(id)
            .ok_or_else(|| not_found("rate card", id))?;
        if card.archived_at.is_some() {
            return Err(already_archived("rate card"));
        }
        card.archived_at = Some(ARCHIVED_AT.to_string());
        Ok(())
    }
}

impl Rates for MockClient {
    fn list_rates(
        &self,
        query: &RateQuery,
        page: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<Page<Rate>> {
        let state = self.enter("list_rates", body(query), cancel)?;
        let products: Vec<&str> = query
            .selectors
            .iter()
            .flatten()
            .filter_map(|s| s.product_id.as_deref())
            .collect();
        let matching: Vec<Rate> = state
            .rates
            .iter()
            .filter(|(card, _)| *card == query.rate_card_id)
            .filter(|(_, rate)| products.is_empty() || products.contains(&rate.product_id.as_str()))
            .map(|(_, rate)| rate.clone())
            .collect();
        Ok(Self::paginate(&matching, state.page_size, page))
    }

    fn add_rate(&self, input: &AddRateInput, cancel: &CancelToken) -> Result<()> {
        let mut state = self.enter("add_rate", body(input), cancel)?;
        let credit_type = input.credit_type_id.clone().unwrap_or_else(|| {
            state
                .rate_cards
                .get(&input.rate_card_id)
                .and_then(|c| c.fiat_credit_type.as_ref())
                .map(|c| c.id.clone())
                .unwrap_or_else(|| DEFAULT_CREDIT_TYPE_ID.to_string())
        });
        let rate = Rate {
            entitled: input.entitled,
            product_id: input.product_id.clone(),
            rate: RateDetails {
                rate_type: input.rate_type.to_uppercase(),
                credit_type: Some(CreditType {
                    id: credit_type,
                    name: None,
                }),
                is_prorated: input.is_prorated,
                price: input.price,
                pricing_group_values: input.pricing_group_values.clone(),
                quantity: input.quantity,
                tiers: input.tiers.clone(),
                use_list_prices: input.use_list_prices,
            },
            starting_at: Some(input.starting_at.clone()),
            ending_before: input.ending_before.clone(),
            commit_rate: input.commit_rate.clone(),
            pricing_group_values: input.pricing_group_values.clone(),
            ..Default::default()
        };
        state.rates.push((input.rate_card_id.clone(), rate));
        Ok(())
    }
}

impl CustomFieldKeys for MockClient {
    fn list_custom_field_keys(
        &self,
        entities: &[String],
        page: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<Page<CustomFieldKey>> {
        let state = self.enter("list_custom_field_keys", json!({ "entities": entities }), cancel)?;

        if let Some(pages) = &state.scripted_key_pages {
            let index = page.and_then(|p| p.parse::<usize>().ok()).unwrap_or(0);
            let items = pages.get(index).cloned().unwrap_or_default();
            let next_page = (index + 1 < pages.len()).then(|| (index + 1).to_string());
            return Ok(Page { items, next_page });
        }

        let matching: Vec<CustomFieldKey> = state
            .custom_field_keys
            .iter()
            .filter(|k| entities.is_empty() || entities.contains(&k.entity))
            .cloned()
            .collect();
        Ok(Self::paginate(&matching, state.page_size, page))
    }

    fn add_custom_field_key(&self, key: &CustomFieldKey, cancel: &CancelToken) -> Result<()> {
        let mut state = self.enter("add_custom_field_key", body(key), cancel)?;
        if state
            .custom_field_keys
            .iter()
            .any(|k| k.entity == key.entity && k.key == key.key)
        {
            return Err(Error::Api {
                status: 409,
                message: format!("key {} already exists for {}", key.key, key.entity),
            });
        }
        state.custom_field_keys.push(key.clone());
        Ok(())
    }

    fn remove_custom_field_key(
        &self,
        entity: &str,
        key: &str,
        cancel: &CancelToken,
    ) -> Result<()> {
        let mut state = self.enter(
            "remove_custom_field_key",
            json!({ "entity": entity, "key": key }),
            cancel,
        )?;
        let before = state.custom_field_keys.len();
        state
            .custom_field_keys
            .retain(|k| !(k.entity == entity && k.key == key));
        if state.custom_field_keys.len() == before {
            return Err(Error::NotFound(format!("key {key} not found for {entity}")));
        }
        Ok(())
    }
}
