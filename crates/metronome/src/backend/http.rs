//! HTTP client for the Metronome REST API.
//!
//! JSON over HTTPS with bearer-token auth. Non-2xx responses are read (not
//! turned into transport errors) so the `{"message": ...}` body can be
//! classified into not-found and already-archived sentinels.
//!
//! Every call takes a [`CancelToken`]; its remaining time caps the request
//! timeout, so a cancelled pass aborts in-flight calls at its deadline.

use crate::backend::{BillableMetrics, CustomFieldKeys, Products, RateCards, Rates, validate_id};
use crate::error::{Error, Result};
use crate::types::{
    AddRateInput, BillableMetric, BillableMetricInput, Created, CustomFieldKey, Data, Listed,
    Product, ProductInput, Rate, RateCard, RateCardInput, RateQuery, UpdateProductInput,
};
use reconcile::{CancelToken, Page};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;

/// Production API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.metronome.com";

/// Request timeout when the cancellation token has no deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const BILLABLE_METRICS: &str = "/v1/billable-metrics";
const PRODUCTS: &str = "/v1/contract-pricing/products";
const RATE_CARDS: &str = "/v1/contract-pricing/rate-cards";
const CUSTOM_FIELDS: &str = "/v1/customFields";

/// Metronome API client.
///
/// Cheap to clone; clones share the underlying connection pool.
///
/// # Example
///
/// ```no_run
/// use metronome::backend::BillableMetrics;
/// use metronome::backend::http::Client;
/// use reconcile::CancelToken;
///
/// let client = Client::new("https://api.metronome.com", "token").unwrap();
/// let metric = client
///     .get_billable_metric("13117714-3f05-48e5-a6e9-a66093f13b4d", &CancelToken::new())
///     .unwrap();
/// println!("{:?}", metric.definition.name);
/// ```
#[derive(Clone)]
pub struct Client {
    /// HTTP agent for requests.
    agent: ureq::Agent,
    /// API base URL without trailing slash.
    base_url: String,
    /// Bearer token.
    token: String,
    /// Upper bound for a single request.
    timeout: Duration,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a client for `base_url` authenticating with `token`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidBaseUrl` unless `base_url` is an http(s) URL.
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/');
        let host = base_url
            .strip_prefix("https://")
            .or_else(|| base_url.strip_prefix("http://"));
        if host.is_none_or(str::is_empty) {
            return Err(Error::InvalidBaseUrl(base_url.to_string()));
        }

        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(DEFAULT_TIMEOUT))
            .build();

        Ok(Self {
            agent: ureq::Agent::new_with_config(config),
            base_url: base_url.to_string(),
            token: token.to_string(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Use `timeout` as the per-request upper bound.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the API base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// Timeout for the next request, or `Cancelled` if none is left.
    fn request_timeout(&self, cancel: &CancelToken) -> Result<Duration> {
        cancel.check().map_err(|_| Error::Cancelled)?;
        Ok(cancel
            .remaining()
            .map_or(self.timeout, |left| left.min(self.timeout)))
    }

    fn read(
        &self,
        result: std::result::Result<ureq::http::Response<ureq::Body>, ureq::Error>,
        cancel: &CancelToken,
    ) -> Result<String> {
        let mut response = match result {
            Ok(response) => response,
            Err(ureq::Error::Timeout(_)) if cancel.is_cancelled() => return Err(Error::Cancelled),
            Err(e) => return Err(e.into()),
        };

        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| Error::http(e.to_string(), Some(status)))?;

        if (200..300).contains(&status) {
            Ok(body)
        } else {
            log::debug!("status {status}: {body}");
            Err(Error::from_response(status, &body))
        }
    }

    fn send<B: Serialize>(
        &self,
        path: &str,
        page: Option<&str>,
        body: &B,
        cancel: &CancelToken,
    ) -> Result<String> {
        let timeout = self.request_timeout(cancel)?;
        let url = self.url(path);
        log::debug!("POST {url}");

        let mut request = self
            .agent
            .post(&url)
            .header("Authorization", self.bearer())
            .header("Accept", "application/json");
        if let Some(token) = page.filter(|t| !t.is_empty()) {
            request = request.query("next_page", token);
        }

        let result = request
            .config()
            .timeout_global(Some(timeout))
            .build()
            .send_json(body);
        self.read(result, cancel)
    }

    fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        page: Option<&str>,
        body: &B,
        cancel: &CancelToken,
    ) -> Result<T> {
        let text = self.send(path, page, body, cancel)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn get<T: DeserializeOwned>(&self, path: &str, cancel: &CancelToken) -> Result<T> {
        let timeout = self.request_timeout(cancel)?;
        let url = self.url(path);
        log::debug!("GET {url}");

        let result = self
            .agent
            .get(&url)
            .header("Authorization", self.bearer())
            .header("Accept", "application/json")
            .config()
            .timeout_global(Some(timeout))
            .build()
            .call();
        let text = self.read(result, cancel)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn create<B: Serialize>(&self, path: &str, body: &B, cancel: &CancelToken) -> Result<String> {
        let created: Data<Created> = self.post(path, None, body, cancel)?;
        Ok(created.data.id)
    }
}

impl BillableMetrics for Client {
    fn create_billable_metric(
        &self,
        input: &BillableMetricInput,
        cancel: &CancelToken,
    ) -> Result<String> {
        self.create(&format!("{BILLABLE_METRICS}/create"), input, cancel)
    }

    fn get_billable_metric(&self, id: &str, cancel: &CancelToken) -> Result<BillableMetric> {
        validate_id(id)?;
        let found: Data<BillableMetric> = self.get(&format!("{BILLABLE_METRICS}/{id}"), cancel)?;
        Ok(found.data)
    }

    fn archive_billable_metric(&self, id: &str, cancel: &CancelToken) -> Result<()> {
        validate_id(id)?;
        self.send(
            &format!("{BILLABLE_METRICS}/archive"),
            None,
            &json!({ "id": id }),
            cancel,
        )
        .map(drop)
    }
}

impl Products for Client {
    fn create_product(&self, input: &ProductInput, cancel: &CancelToken) -> Result<String> {
        self.create(&format!("{PRODUCTS}/create"), input, cancel)
    }

    fn get_product(&self, id: &str, cancel: &CancelToken) -> Result<Product> {
        validate_id(id)?;
        let found: Data<Product> =
            self.post(&format!("{PRODUCTS}/get"), None, &json!({ "id": id }), cancel)?;
        Ok(found.data)
    }

    fn update_product(&self, input: &UpdateProductInput, cancel: &CancelToken) -> Result<String> {
        validate_id(&input.product_id)?;
        self.create(&format!("{PRODUCTS}/update"), input, cancel)
    }

    fn archive_product(&self, id: &str, cancel: &CancelToken) -> Result<()> {
        validate_id(id)?;
        self.send(
            &format!("{PRODUCTS}/archive"),
            None,
            &json!({ "product_id": id }),
            cancel,
        )
        .map(drop)
    }
}

impl RateCards for Client {
    fn create_rate_card(&self, input: &RateCardInput, cancel: &CancelToken) -> Result<String> {
        self.create(&format!("{RATE_CARDS}/create"), input, cancel)
    }

    fn get_rate_card(&self, id: &str, cancel: &CancelToken) -> Result<RateCard> {
        validate_id(id)?;
        let found: Data<RateCard> =
            self.post(&format!("{RATE_CARDS}/get"), None, &json!({ "id": id }), cancel)?;
        Ok(found.data)
    }

    fn archive_rate_card(&self, id: &str, cancel: &CancelToken) -> Result<()> {
        validate_id(id)?;
        self.send(
            &format!("{RATE_CARDS}/archive"),
            None,
            &json!({ "id": id }),
            cancel,
        )
        .map(drop)
    }
}

impl Rates for Client {
    fn list_rates(
        &self,
        query: &RateQuery,
        page: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<Page<Rate>> {
        let listed: Listed<Rate> =
            self.post(&format!("{RATE_CARDS}/getRates"), page, query, cancel)?;
        Ok(Page {
            items: listed.data,
            next_page: listed.next_page,
        })
    }

    fn add_rate(&self, input: &AddRateInput, cancel: &CancelToken) -> Result<()> {
        self.send(&format!("{RATE_CARDS}/addRate"), None, input, cancel)
            .map(drop)
    }
}

impl CustomFieldKeys for Client {
    fn list_custom_field_keys(
        &self,
        entities: &[String],
        page: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<Page<CustomFieldKey>> {
        let body = if entities.is_empty() {
            json!({})
        } else {
            json!({ "entities": entities })
        };
        let listed: Listed<CustomFieldKey> =
            self.post(&format!("{CUSTOM_FIELDS}/listKeys"), page, &body, cancel)?;
        Ok(Page {
            items: listed.data,
            next_page: listed.next_page,
        })
    }

    fn add_custom_field_key(&self, key: &CustomFieldKey, cancel: &CancelToken) -> Result<()> {
        self.send(&format!("{CUSTOM_FIELDS}/addKey"), None, key, cancel)
            .map(drop)
    }

    fn remove_custom_field_key(
        &self,
        entity: &str,
        key: &str,
        cancel: &CancelToken,
    ) -> Result<()> {
        self.send(
            &format!("{CUSTOM_FIELDS}/removeKey"),
            None,
            &json!({ "entity": entity, "key": key }),
            cancel,
        )
        .map(drop)
    }
}
