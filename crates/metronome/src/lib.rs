//! # metronome
//!
//! Blocking client for the parts of the Metronome billing API that
//! `metronome-sync` reconciles: billable metrics, products, rate cards,
//! rates, and custom field keys.
//!
//! ## Example
//!
//! ```no_run
//! use metronome::{Client, Products};
//! use metronome::types::{ProductDetails, ProductInput};
//! use reconcile::CancelToken;
//!
//! let client = Client::new("https://api.metronome.com", "token")?;
//! let id = client.create_product(
//!     &ProductInput {
//!         product_type: Some("fixed".to_string()),
//!         details: ProductDetails {
//!             name: Some("Platform fee".to_string()),
//!             ..Default::default()
//!         },
//!     },
//!     &CancelToken::new(),
//! )?;
//! println!("created product {id}");
//! # Ok::<(), metronome::Error>(())
//! ```
//!
//! ## Identity
//!
//! | Kind             | Identified by        | Removal         |
//! |------------------|----------------------|-----------------|
//! | Billable metric  | server UUID          | archive         |
//! | Product          | server UUID          | archive         |
//! | Rate card        | server UUID          | archive         |
//! | Rate             | attributes only      | none            |
//! | Custom field key | `(entity, key)`      | remove          |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod error;
pub mod types;

pub use backend::http::{Client, DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
pub use backend::{
    Api, BillableMetrics, Call, CustomFieldKeys, DEFAULT_CREDIT_TYPE_ID, MockClient, Products,
    RateCards, Rates, validate_id,
};
pub use error::{Error, ErrorCategory, Result};
