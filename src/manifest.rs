//! Resource manifest
//!
//! ```toml
//! [[billable_metric]]
//! name = "api-calls"
//! labels = { team = "platform" }
//!
//! [billable_metric.parameters]
//! name = "API calls"
//! aggregation_type = "count"
//! ```

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::DEFAULT_PROVIDER;
use crate::kinds::{
    BillableMetricParams, CustomFieldKeyParams, Kind, ProductParams, RateCardParams, RateParams,
};
use crate::paths;

/// Manifest file name under the config directory
pub const MANIFEST_FILE: &str = "resources.toml";

/// One declared resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Entry<P> {
    pub name: String,
    #[serde(default = "default_provider")]
    pub provider_config: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub parameters: P,
}

fn default_provider() -> String {
    DEFAULT_PROVIDER.to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub billable_metric: Vec<Entry<BillableMetricParams>>,
    #[serde(default)]
    pub custom_field_key: Vec<Entry<CustomFieldKeyParams>>,
    #[serde(default)]
    pub product: Vec<Entry<ProductParams>>,
    #[serde(default)]
    pub rate_card: Vec<Entry<RateCardParams>>,
    #[serde(default)]
    pub rate: Vec<Entry<RateParams>>,
}

/// Manifest path: `--manifest` if given, else `resources.toml` in the config dir
pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(paths::expand(&path.to_string_lossy())),
        None => paths::config_file(MANIFEST_FILE),
    }
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Invalid manifest: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let manifest: Self = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Names must be non-empty and unique within a kind.
    fn validate(&self) -> Result<()> {
        check_names(Kind::BillableMetric, &self.billable_metric)?;
        check_names(Kind::CustomFieldKey, &self.custom_field_key)?;
        check_names(Kind::Product, &self.product)?;
        check_names(Kind::RateCard, &self.rate_card)?;
        check_names(Kind::Rate, &self.rate)?;
        Ok(())
    }

    /// Number of declared resources
    pub fn len(&self) -> usize {
        self.billable_metric.len()
            + self.custom_field_key.len()
            + self.product.len()
            + self.rate_card.len()
            + self.rate.len()
    }
}

fn check_names<P>(kind: Kind, entries: &[Entry<P>]) -> Result<()> {
    let mut seen = HashSet::new();
    for entry in entries {
        if entry.name.trim().is_empty() {
            bail!("{kind} with an empty name");
        }
        if entry.name.contains('/') {
            bail!("{kind} name '{}' must not contain '/'", entry.name);
        }
        if !seen.insert(entry.name.as_str()) {
            bail!("duplicate {kind} '{}'", entry.name);
        }
    }
    Ok(())
}
