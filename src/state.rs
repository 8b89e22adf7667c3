//! Persistent reconciliation state
//!
//! `state.json` remembers, per declared resource, what the engine learned
//! from the remote side: the external name, the last parameter snapshot
//! (after late-initialization and reference resolution), the observed state
//! and conditions. A resource that disappears from the manifest is rebuilt
//! from its entry here so it can be deleted.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reconcile::{Conditions, Declared, UsageTracker};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::paths;

/// State file name under the state directory
pub const STATE_FILE: &str = "state.json";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct State {
    /// Keyed by `kind/name`
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceState>,

    /// Last time the state was updated
    pub last_updated: DateTime<Utc>,
}

/// What the engine knows about one declared resource
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ResourceState {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub external_name: Option<String>,
    #[serde(default)]
    pub provider_config: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub observed: Option<serde_json::Value>,
    #[serde(default)]
    pub conditions: Conditions,
    #[serde(default)]
    pub deleting: bool,
    #[serde(default)]
    pub last_reconciled: Option<DateTime<Utc>>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            resources: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }
}

impl State {
    /// Default state file path
    pub fn default_path() -> Result<PathBuf> {
        Ok(paths::state_dir()?.join(STATE_FILE))
    }

    /// Load state from disk, or return default if the file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file does not exist, using default state");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        let state: State = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        log::debug!("Loaded state from {}", path.display());
        Ok(state)
    }

    /// Save state to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        let content =
            serde_json::to_string_pretty(&self).context("Failed to serialize state to JSON")?;

        fs::write(path, &content)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    /// Update the last_updated timestamp and save
    pub fn touch(&mut self, path: &Path) -> Result<()> {
        self.last_updated = Utc::now();
        self.save(path)
    }

    pub fn get(&self, key: &str) -> Option<&ResourceState> {
        self.resources.get(key)
    }

    /// Record a declared resource after a pass
    pub fn record<P: Serialize, O: Serialize>(&mut self, declared: &Declared<P, O>) -> Result<()> {
        let entry = ResourceState {
            kind: declared.kind().to_string(),
            name: declared.name().to_string(),
            external_name: declared.external_name().map(String::from),
            provider_config: declared.provider_config().map(String::from),
            labels: declared.labels().clone(),
            parameters: serde_json::to_value(declared.parameters())
                .with_context(|| format!("Failed to serialize parameters of {}", declared.key()))?,
            observed: declared
                .observed()
                .map(serde_json::to_value)
                .transpose()
                .with_context(|| format!("Failed to serialize observed state of {}", declared.key()))?,
            conditions: declared.conditions().clone(),
            deleting: declared.is_deleting(),
            last_reconciled: Some(Utc::now()),
        };
        self.resources.insert(declared.key(), entry);
        Ok(())
    }

    /// Forget a resource once its remote counterpart is gone
    pub fn remove(&mut self, key: &str) -> Option<ResourceState> {
        self.resources.remove(key)
    }

    /// Entries of one kind, in name order
    pub fn of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a ResourceState> + 'a {
        self.resources.values().filter(move |r| r.kind == kind)
    }

    /// Record the provider config each connected resource used
    pub fn apply_usage(&mut self, usage: &UsageLog) {
        for (key, provider_config) in usage.snapshot() {
            if let Some(entry) = self.resources.get_mut(&key) {
                entry.provider_config = Some(provider_config);
            }
        }
    }
}

impl ResourceState {
    /// Parameter snapshot, if it still fits the kind's current shape
    pub fn parameters<P: DeserializeOwned>(&self) -> Option<P> {
        match serde_json::from_value(self.parameters.clone()) {
            Ok(params) => Some(params),
            Err(e) => {
                log::warn!("{}/{}: stored parameters unreadable: {e}", self.kind, self.name);
                None
            }
        }
    }

    pub fn observed<O: DeserializeOwned>(&self) -> Option<O> {
        self.observed
            .clone()
            .and_then(|value| serde_json::from_value(value).ok())
    }

    /// Copy what the engine learned onto a freshly declared resource
    pub fn restore_into<P, O: DeserializeOwned>(&self, declared: &mut Declared<P, O>) {
        if let Some(external_name) = &self.external_name {
            declared.set_external_name(external_name.clone());
        }
        if let Some(observed) = self.observed::<O>() {
            declared.set_observed(observed);
        }
        *declared.conditions_mut() = self.conditions.clone();
    }

    /// Rebuild a declared resource whose manifest entry was removed
    pub fn orphan<P: DeserializeOwned, O: DeserializeOwned>(&self) -> Option<Declared<P, O>> {
        let params = self.parameters::<P>()?;
        let mut declared = Declared::new(self.kind.clone(), self.name.clone(), params)
            .with_labels(self.labels.clone());
        if let Some(provider_config) = &self.provider_config {
            declared = declared.with_provider_config(provider_config.clone());
        }
        self.restore_into(&mut declared);
        declared.mark_deleting();
        Some(declared)
    }
}

/// Records which provider config each resource connected through
#[derive(Debug, Default)]
pub struct UsageLog {
    used: Mutex<BTreeMap<String, String>>,
}

impl UsageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        match self.used.lock() {
            Ok(used) => used.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl UsageTracker for UsageLog {
    fn track(&self, resource_key: &str, provider_config: &str) -> Result<()> {
        let mut used = self
            .used
            .lock()
            .map_err(|_| anyhow::anyhow!("usage log lock poisoned"))?;
        used.insert(resource_key.to_string(), provider_config.to_string());
        Ok(())
    }
}
