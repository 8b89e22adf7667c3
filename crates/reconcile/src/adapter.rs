//! Per-kind adapter trait
//!
//! One [`Adapter`] implementation per resource kind plugs the kind's remote
//! client, converters, and normalization rules into the generic
//! [`Reconciler`](crate::Reconciler).

use crate::context::CancelToken;
use crate::error::{Error, RemoteError};
use crate::resource::Declared;
use crate::types::Identity;
use serde::Serialize;
use std::fmt;

/// Declared resource handled by adapter `A`
pub type DeclaredOf<A> = Declared<<A as Adapter>::Params, <A as Adapter>::Observed>;

pub trait Adapter: Send + Sync {
    /// Desired configuration
    type Params: Clone + fmt::Debug + PartialEq + Serialize + Send + Sync;
    /// Projection of the remote resource kept on the declared resource
    type Observed: Clone + fmt::Debug + Serialize + Send + Sync;
    /// Remote resource as returned by the client
    type Remote: fmt::Debug + Send;

    /// Kind name, e.g. "billable metric"
    const KIND: &'static str;
    const IDENTITY: Identity;

    /// Find the remote resource for `declared`.
    ///
    /// Expected negatives (not found, invalid identifier, archived) are
    /// `Ok(None)`. Only called for nominal kinds once an external name is set.
    fn locate(
        &self,
        declared: &DeclaredOf<Self>,
        cancel: &CancelToken,
    ) -> Result<Option<Self::Remote>, RemoteError>;

    /// Convert the remote resource into parameter shape for comparison.
    fn to_parameters(&self, remote: &Self::Remote) -> Self::Params;

    /// Convert the remote resource into observed state.
    fn to_observed(&self, remote: &Self::Remote) -> Self::Observed;

    /// Canonicalize `params` in place before comparison.
    ///
    /// `declared` is the unnormalized desired state, for rules that depend
    /// on what the operator left unset.
    fn normalize(&self, declared: &Self::Params, params: &mut Self::Params);

    /// Equality of two normalized parameter sets.
    fn equivalent(&self, a: &Self::Params, b: &Self::Params) -> bool {
        a == b
    }

    /// Fill unset parameters from the remote resource. Returns whether
    /// anything changed. Must never overwrite a value already set.
    fn late_initialize(&self, _params: &mut Self::Params, _remote: &Self::Remote) -> bool {
        false
    }

    /// External name for a structural kind, derived from its attributes.
    fn structural_key(&self, _params: &Self::Params) -> Option<String> {
        None
    }

    /// Issue the creation request. Nominal kinds return the new identifier.
    fn create(
        &self,
        params: &Self::Params,
        cancel: &CancelToken,
    ) -> Result<Option<String>, RemoteError>;

    /// Bring the remote resource in line with `params`.
    fn update(
        &self,
        _external_name: &str,
        _params: &Self::Params,
        _cancel: &CancelToken,
    ) -> Result<(), Error> {
        Err(Error::UpdateUnsupported { kind: Self::KIND })
    }

    /// Archive or remove the remote resource. Kinds without a delete
    /// endpoint keep the default, which succeeds without a remote call.
    fn delete(
        &self,
        _external_name: &str,
        _params: &Self::Params,
        _cancel: &CancelToken,
    ) -> Result<(), RemoteError> {
        Ok(())
    }

    /// Normalized (declared, observed) snapshots for `remote`.
    fn comparable(
        &self,
        declared: &Self::Params,
        remote: &Self::Remote,
    ) -> (Self::Params, Self::Params) {
        let mut desired = declared.clone();
        let mut actual = self.to_parameters(remote);
        self.normalize(declared, &mut desired);
        self.normalize(declared, &mut actual);
        (desired, actual)
    }

    /// Whether `remote` is equivalent to `declared` after normalization.
    fn is_match(&self, declared: &Self::Params, remote: &Self::Remote) -> bool {
        let (desired, actual) = self.comparable(declared, remote);
        self.equivalent(&desired, &actual)
    }
}
