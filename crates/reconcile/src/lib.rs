//! # Reconcile
//!
//! A reconciliation engine for remote resources that are only reachable
//! through an API.
//!
//! Operators declare the desired state of each resource. On every pass the
//! engine connects to the remote account, observes the remote resource,
//! diffs it against the declaration, and then creates, updates, or leaves it
//! alone. Removed declarations are deleted.
//!
//! ## Core Concepts
//!
//! - **Declared**: desired state plus the external name and observed state
//!   written back by the engine
//! - **Adapter**: per-kind plug-in providing the remote client, converters,
//!   and normalization rules
//! - **Reconciler**: the generic observe/create/update/delete state machine
//! - **Connector**: resolves provider config and credentials into a
//!   connected reconciler
//! - **Identity**: nominal kinds are looked up by id; structural kinds are
//!   found by paging through a filtered collection
//!
//! ## Example
//!
//! ```ignore
//! use reconcile::{CancelToken, Connector, ExecuteOptions, NoProgress, execute};
//!
//! let connector = Connector::new(&store, &usage, &credentials, |base_url, token| {
//!     Ok(MetricAdapter::new(Client::new(base_url, token)?))
//! });
//! let outcomes = execute(
//!     &connector,
//!     &mut metrics,
//!     &ExecuteOptions::default(),
//!     &CancelToken::with_timeout(timeout),
//!     &mut NoProgress,
//! )?;
//! ```
//!
//! ## Provider Traits
//!
//! - [`ConfigStore`]: fetches provider configs
//! - [`UsageTracker`]: records provider config usage
//! - [`CredentialExtractor`]: turns a provider config into a token
//! - [`ProgressCallback`]: receives progress updates
//! - [`ConfirmCallback`]: handles user confirmations

pub mod adapter;
pub mod connector;
pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod identity;
pub mod reconciler;
pub mod resource;
pub mod types;

// Re-export main types at crate root
pub use adapter::{Adapter, DeclaredOf};
pub use connector::{
    ConfigStore, Connector, CredentialExtractor, CredentialSource, ProviderConfig, UsageTracker,
};
pub use context::{
    AutoConfirm, AutoDecline, CancelToken, ConfirmCallback, NoProgress, ProgressCallback,
};
pub use diff::{DiffSummary, ResourceDiff, group_by_kind};
pub use error::{Error, ErrorClass, RemoteError, Result};
pub use executor::{execute, failed, plan, plan_one, reconcile_one};
pub use identity::{Page, find_by_id, find_first};
pub use reconciler::Reconciler;
pub use resource::{Condition, Conditions, Declared, Reference, Selector};
pub use types::{Action, ExecuteOptions, ExecuteSummary, Identity, Observation, Outcome};
