//! Products: nominal identity, versioned updates, archived on delete.
//!
//! An update writes a new product version that takes effect at
//! `starting_at`, so updates require it. The field is write-only and never
//! compared.

use metronome::Products;
use metronome::types::{
    Product, ProductDetails, ProductInput, QuantityConversion, QuantityRounding,
    UpdateProductInput,
};
use reconcile::diff::{blank_to_none, false_to_none, lowercase, opt_float_eq, sort_strings};
use reconcile::{
    Adapter, CancelToken, DeclaredOf, Error, Identity, Reference, RemoteError, Selector,
    find_by_id,
};
use serde::{Deserialize, Serialize};

/// Desired product
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductParams {
    /// `usage`, `subscription`, `composite`, `fixed`, or `pro_service`
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub product_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billable_metric_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billable_metric_ref: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billable_metric_selector: Option<Selector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite_product_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite_tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_free_usage: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presentation_group_key: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing_group_key: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity_conversion: Option<QuantityConversion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity_rounding: Option<QuantityRounding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// When an update takes effect (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starting_at: Option<String>,
}

impl ProductParams {
    fn details(&self) -> ProductDetails {
        ProductDetails {
            name: self.name.clone(),
            billable_metric_id: self.billable_metric_id.clone(),
            composite_product_ids: self.composite_product_ids.clone(),
            composite_tags: self.composite_tags.clone(),
            exclude_free_usage: self.exclude_free_usage,
            presentation_group_key: self.presentation_group_key.clone(),
            pricing_group_key: self.pricing_group_key.clone(),
            quantity_conversion: self.quantity_conversion.clone(),
            quantity_rounding: self.quantity_rounding.clone(),
            tags: self.tags.clone(),
        }
    }
}

impl From<&ProductParams> for ProductInput {
    fn from(p: &ProductParams) -> Self {
        Self {
            product_type: p.product_type.clone(),
            details: p.details(),
        }
    }
}

impl From<&Product> for ProductParams {
    fn from(product: &Product) -> Self {
        let current = &product.current.details;
        Self {
            product_type: product.product_type.clone(),
            name: current.name.clone(),
            billable_metric_id: current.billable_metric_id.clone(),
            billable_metric_ref: None,
            billable_metric_selector: None,
            composite_product_ids: current.composite_product_ids.clone(),
            composite_tags: current.composite_tags.clone(),
            exclude_free_usage: current.exclude_free_usage,
            presentation_group_key: current.presentation_group_key.clone(),
            pricing_group_key: current.pricing_group_key.clone(),
            quantity_conversion: current.quantity_conversion.clone(),
            quantity_rounding: current.quantity_rounding.clone(),
            tags: current.tags.clone(),
            starting_at: None,
        }
    }
}

pub struct ProductAdapter<C> {
    client: C,
}

impl<C> ProductAdapter<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

/// Copy of `p` with float fields zeroed, for exact comparison of the rest
fn without_floats(p: &ProductParams) -> ProductParams {
    let mut p = p.clone();
    if let Some(c) = p.quantity_conversion.as_mut() {
        c.conversion_factor = 0.0;
    }
    if let Some(r) = p.quantity_rounding.as_mut() {
        r.decimal_places = 0.0;
    }
    p
}

impl<C: Products + 'static> Adapter for ProductAdapter<C> {
    type Params = ProductParams;
    type Observed = Product;
    type Remote = Product;

    const KIND: &'static str = "product";
    const IDENTITY: Identity = Identity::Nominal;

    fn locate(
        &self,
        declared: &DeclaredOf<Self>,
        cancel: &CancelToken,
    ) -> Result<Option<Product>, RemoteError> {
        let Some(id) = declared.external_name() else {
            return Ok(None);
        };
        find_by_id(
            || self.client.get_product(id, cancel).map_err(RemoteError::from),
            |product| product.archived_at.is_some(),
        )
    }

    fn to_parameters(&self, remote: &Product) -> ProductParams {
        remote.into()
    }

    fn to_observed(&self, remote: &Product) -> Product {
        remote.clone()
    }

    fn normalize(&self, _declared: &ProductParams, params: &mut ProductParams) {
        params.billable_metric_ref = None;
        params.billable_metric_selector = None;
        params.starting_at = None;

        lowercase(&mut params.product_type);
        blank_to_none(&mut params.name);
        blank_to_none(&mut params.billable_metric_id);
        false_to_none(&mut params.exclude_free_usage);
        sort_strings(&mut params.composite_product_ids);
        sort_strings(&mut params.composite_tags);
        sort_strings(&mut params.presentation_group_key);
        sort_strings(&mut params.pricing_group_key);
        sort_strings(&mut params.tags);

        if let Some(c) = params.quantity_conversion.as_mut() {
            c.operation = c.operation.to_lowercase();
            blank_to_none(&mut c.name);
        }
        if let Some(r) = params.quantity_rounding.as_mut() {
            r.rounding_method = r.rounding_method.to_lowercase();
        }
    }

    fn equivalent(&self, a: &ProductParams, b: &ProductParams) -> bool {
        let factor = |p: &ProductParams| p.quantity_conversion.as_ref().map(|c| c.conversion_factor);
        let places = |p: &ProductParams| p.quantity_rounding.as_ref().map(|r| r.decimal_places);

        without_floats(a) == without_floats(b)
            && opt_float_eq(factor(a), factor(b))
            && opt_float_eq(places(a), places(b))
    }

    fn create(
        &self,
        params: &ProductParams,
        cancel: &CancelToken,
    ) -> Result<Option<String>, RemoteError> {
        let id = self.client.create_product(&params.into(), cancel)?;
        Ok(Some(id))
    }

    fn update(
        &self,
        external_name: &str,
        params: &ProductParams,
        cancel: &CancelToken,
    ) -> Result<(), Error> {
        let starting_at = params
            .starting_at
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or(Error::MissingField {
                operation: "update",
                field: "starting_at",
            })?;

        let input = UpdateProductInput {
            product_id: external_name.to_string(),
            starting_at,
            details: params.details(),
        };
        let id = self
            .client
            .update_product(&input, cancel)
            .map_err(|e| Error::remote("failed to update product", e.into()))?;
        if id.is_empty() {
            return Err(Error::MissingId { kind: Self::KIND });
        }
        Ok(())
    }

    fn delete(
        &self,
        external_name: &str,
        _params: &ProductParams,
        cancel: &CancelToken,
    ) -> Result<(), RemoteError> {
        Ok(self.client.archive_product(external_name, cancel)?)
    }
}
