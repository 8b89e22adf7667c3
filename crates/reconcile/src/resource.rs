//! Declared resources
//!
//! A [`Declared`] resource is the operator-authored desired state for one
//! remote resource. Its external name and observed state are written only
//! by the reconciler.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reference to another declared resource by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub name: String,
}

/// Picks a declared resource by its labels
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
}

impl Selector {
    /// Whether `labels` contains every label this selector requires
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.match_labels
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
    }
}

/// Status of one condition on a declared resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub status: bool,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    fn new(status: bool, reason: &str, message: Option<String>) -> Self {
        Self {
            status,
            reason: reason.to_string(),
            message,
        }
    }
}

/// `Ready` tracks the remote resource, `Synced` the last pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced: Option<Condition>,
}

impl Conditions {
    pub fn available(&mut self) {
        self.ready = Some(Condition::new(true, "Available", None));
    }

    pub fn unavailable(&mut self) {
        self.ready = Some(Condition::new(false, "Unavailable", None));
    }

    pub fn creating(&mut self) {
        self.ready = Some(Condition::new(false, "Creating", None));
    }

    pub fn deleting(&mut self) {
        self.ready = Some(Condition::new(false, "Deleting", None));
    }

    pub fn reconcile_success(&mut self) {
        self.synced = Some(Condition::new(true, "ReconcileSuccess", None));
    }

    pub fn reconcile_error(&mut self, err: &Error) {
        self.synced = Some(Condition::new(
            false,
            "ReconcileError",
            Some(err.to_string()),
        ));
    }

    /// Both conditions are true
    pub fn is_healthy(&self) -> bool {
        self.ready.as_ref().is_some_and(|c| c.status)
            && self.synced.as_ref().is_some_and(|c| c.status)
    }
}

/// Desired state for one remote resource of kind `P`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declared<P, O> {
    kind: String,
    name: String,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default)]
    provider_config: Option<String>,
    parameters: P,
    #[serde(default)]
    external_name: Option<String>,
    #[serde(default)]
    observed: Option<O>,
    #[serde(default)]
    deleting: bool,
    #[serde(default)]
    conditions: Conditions,
}

impl<P, O> Declared<P, O> {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, parameters: P) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            labels: BTreeMap::new(),
            provider_config: None,
            parameters,
            external_name: None,
            observed: None,
            deleting: false,
            conditions: Conditions::default(),
        }
    }

    pub fn with_provider_config(mut self, name: impl Into<String>) -> Self {
        self.provider_config = Some(name.into());
        self
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    /// Restore the remote identifier recorded by an earlier pass
    pub fn with_external_name(mut self, external_name: Option<String>) -> Self {
        self.external_name = external_name.filter(|n| !n.is_empty());
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `kind/name`, unique across the declaration set
    pub fn key(&self) -> String {
        format!("{}/{}", self.kind, self.name)
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn provider_config(&self) -> Option<&str> {
        self.provider_config.as_deref()
    }

    pub fn parameters(&self) -> &P {
        &self.parameters
    }

    /// Mutable access for reference resolution and late-initialization
    pub fn parameters_mut(&mut self) -> &mut P {
        &mut self.parameters
    }

    /// Remote identifier; `None` until a create or structural match
    pub fn external_name(&self) -> Option<&str> {
        self.external_name.as_deref()
    }

    pub fn set_external_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.external_name = (!name.is_empty()).then_some(name);
    }

    pub fn observed(&self) -> Option<&O> {
        self.observed.as_ref()
    }

    /// Replace the observed state wholesale
    pub fn set_observed(&mut self, observed: O) {
        self.observed = Some(observed);
    }

    pub fn is_deleting(&self) -> bool {
        self.deleting
    }

    pub fn mark_deleting(&mut self) {
        self.deleting = true;
    }

    pub fn conditions(&self) -> &Conditions {
        &self.conditions
    }

    pub fn conditions_mut(&mut self) -> &mut Conditions {
        &mut self.conditions
    }
}
