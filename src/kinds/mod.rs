//! Resource kinds and their adapters
//!
//! | Kind             | Identity   | Update | Delete  |
//! |------------------|------------|--------|---------|
//! | billable metric  | nominal    | no     | archive |
//! | product          | nominal    | yes    | archive |
//! | rate card        | nominal    | no     | archive |
//! | rate             | structural | no     | no-op   |
//! | custom field key | structural | no     | remove  |

pub mod billable_metric;
pub mod custom_field_key;
pub mod product;
pub mod rate;
pub mod rate_card;

pub use billable_metric::{BillableMetricAdapter, BillableMetricParams};
pub use custom_field_key::{CustomFieldKeyAdapter, CustomFieldKeyParams};
pub use product::{ProductAdapter, ProductParams};
pub use rate::{RateAdapter, RateParams};
pub use rate_card::{RateCardAdapter, RateCardParams};

use metronome::types::{BillableMetric, CustomFieldKey, Product, Rate, RateCard};
use reconcile::Declared;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;

pub type BillableMetricResource = Declared<BillableMetricParams, BillableMetric>;
pub type ProductResource = Declared<ProductParams, Product>;
pub type RateCardResource = Declared<RateCardParams, RateCard>;
pub type RateResource = Declared<RateParams, Rate>;
pub type CustomFieldKeyResource = Declared<CustomFieldKeyParams, CustomFieldKey>;

/// Parameters of any kind, as stored in the manifest and the state file
pub trait Parameters: Clone + Serialize + DeserializeOwned + Send + Sync {
    /// Keep late-initialized values from the previous pass that the
    /// manifest still leaves unset.
    fn carry_over(&mut self, _previous: &Self) {}
}

impl Parameters for BillableMetricParams {}
impl Parameters for ProductParams {}
impl Parameters for CustomFieldKeyParams {}

impl Parameters for RateCardParams {
    fn carry_over(&mut self, previous: &Self) {
        if self.fiat_credit_type_id.is_none() {
            self.fiat_credit_type_id = previous.fiat_credit_type_id.clone();
        }
    }
}

impl Parameters for RateParams {
    fn carry_over(&mut self, previous: &Self) {
        if self.credit_type_id.is_none() {
            self.credit_type_id = previous.credit_type_id.clone();
        }
    }
}

/// A managed resource kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Kind {
    BillableMetric,
    CustomFieldKey,
    Product,
    RateCard,
    Rate,
}

impl Kind {
    /// Every kind, in dependency order
    pub const ALL: [Kind; 5] = [
        Kind::BillableMetric,
        Kind::CustomFieldKey,
        Kind::Product,
        Kind::RateCard,
        Kind::Rate,
    ];

    /// Display name, also the kind recorded on declared resources
    pub fn name(self) -> &'static str {
        match self {
            Kind::BillableMetric => "billable metric",
            Kind::CustomFieldKey => "custom field key",
            Kind::Product => "product",
            Kind::RateCard => "rate card",
            Kind::Rate => "rate",
        }
    }

    /// Manifest table name
    pub fn table(self) -> &'static str {
        match self {
            Kind::BillableMetric => "billable_metric",
            Kind::CustomFieldKey => "custom_field_key",
            Kind::Product => "product",
            Kind::RateCard => "rate_card",
            Kind::Rate => "rate",
        }
    }

    /// Dependency tier: a kind only references kinds in lower tiers
    pub fn tier(self) -> u8 {
        match self {
            Kind::BillableMetric | Kind::CustomFieldKey => 0,
            Kind::Product | Kind::RateCard => 1,
            Kind::Rate => 2,
        }
    }

    /// Parse a table name or display name; `-` and `_` stand for spaces.
    pub fn parse(s: &str) -> Option<Kind> {
        let normalized = s.trim().to_lowercase().replace(['_', '-'], " ");
        let normalized = normalized.trim_end_matches('s');
        Kind::ALL
            .into_iter()
            .find(|k| k.name() == normalized)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
