//! Generic reconciler state machine
//!
//! States are implicit in a declared resource's external name and the
//! remote lookup result: Unknown (no external name, nominal kinds), Absent,
//! Present/Drifted, Present/Synced.

use crate::adapter::{Adapter, DeclaredOf};
use crate::context::CancelToken;
use crate::diff::describe;
use crate::error::{Error, Result};
use crate::types::{Identity, Observation};

/// Reconciler for one kind, bound to a connected adapter
pub struct Reconciler<A> {
    adapter: A,
}

impl<A: Adapter> Reconciler<A> {
    pub fn new(adapter: A) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Observe the remote resource and write observed state back.
    pub fn observe(&self, declared: &mut DeclaredOf<A>, cancel: &CancelToken) -> Result<Observation> {
        cancel.check().map_err(|_| Error::Cancelled)?;

        if A::IDENTITY == Identity::Nominal && declared.external_name().is_none() {
            log::debug!("{}: no external name, nothing to look up", declared.key());
            return Ok(Observation::absent());
        }

        let Some(remote) = self
            .adapter
            .locate(declared, cancel)
            .map_err(|e| Error::remote(format!("cannot get {}", A::KIND), e))?
        else {
            log::debug!("{}: remote resource absent", declared.key());
            return Ok(Observation::absent());
        };

        let late_initialized = self
            .adapter
            .late_initialize(declared.parameters_mut(), &remote);
        if late_initialized {
            log::debug!("{}: late-initialized parameters", declared.key());
        }

        if A::IDENTITY == Identity::Structural
            && let Some(key) = self.adapter.structural_key(declared.parameters())
        {
            declared.set_external_name(key);
        }

        declared.set_observed(self.adapter.to_observed(&remote));
        declared.conditions_mut().available();

        let (desired, actual) = self.adapter.comparable(declared.parameters(), &remote);
        let up_to_date = self.adapter.equivalent(&desired, &actual);
        let diff = (!up_to_date).then(|| describe(&desired, &actual));
        if !up_to_date {
            log::debug!("{}: drifted from declaration", declared.key());
        }

        Ok(Observation {
            exists: true,
            up_to_date,
            late_initialized,
            diff,
        })
    }

    /// Create the remote resource and record its external name.
    pub fn create(&self, declared: &mut DeclaredOf<A>, cancel: &CancelToken) -> Result<()> {
        cancel.check().map_err(|_| Error::Cancelled)?;
        declared.conditions_mut().creating();

        let id = self
            .adapter
            .create(declared.parameters(), cancel)
            .map_err(|e| Error::remote(format!("failed to create {}", A::KIND), e))?;

        match A::IDENTITY {
            Identity::Nominal => {
                let id = id
                    .filter(|id| !id.is_empty())
                    .ok_or(Error::MissingId { kind: A::KIND })?;
                log::info!("{}: created {} {}", declared.key(), A::KIND, id);
                declared.set_external_name(id);
            }
            Identity::Structural => {
                if let Some(key) = self.adapter.structural_key(declared.parameters()) {
                    declared.set_external_name(key);
                }
                log::info!("{}: created {}", declared.key(), A::KIND);
            }
        }
        Ok(())
    }

    /// Update the remote resource in place, where the kind supports it.
    pub fn update(&self, declared: &mut DeclaredOf<A>, cancel: &CancelToken) -> Result<()> {
        let external_name = declared.external_name().unwrap_or_default().to_string();
        self.adapter
            .update(&external_name, declared.parameters(), cancel)?;
        log::info!("{}: updated {}", declared.key(), A::KIND);
        Ok(())
    }

    /// Archive or remove the remote resource.
    ///
    /// Already archived, not found, and invalid identifiers all count as
    /// success, so repeated deletes never fail.
    pub fn delete(&self, declared: &mut DeclaredOf<A>, cancel: &CancelToken) -> Result<()> {
        declared.conditions_mut().deleting();

        let Some(external_name) = declared.external_name().map(String::from) else {
            log::debug!("{}: no external name, nothing to delete", declared.key());
            return Ok(());
        };

        cancel.check().map_err(|_| Error::Cancelled)?;
        match self
            .adapter
            .delete(&external_name, declared.parameters(), cancel)
        {
            Ok(()) => {
                log::info!("{}: deleted {} {}", declared.key(), A::KIND, external_name);
                Ok(())
            }
            Err(e) if e.is_gone() => {
                log::debug!("{}: already gone ({e})", declared.key());
                Ok(())
            }
            Err(e) => Err(Error::remote(format!("failed to delete {}", A::KIND), e)),
        }
    }

    /// Release the reconciler. The client holds no session state.
    pub fn disconnect(self) {}
}
