//! Provider configuration and credentials
//!
//! `config.toml` names one or more Metronome accounts:
//!
//! ```toml
//! [providers.default]
//! base_url = "https://api.metronome.com"
//!
//! [providers.default.credentials]
//! source = "env"
//! env = "METRONOME_API_TOKEN"
//! ```

use anyhow::{Context, Result, bail};
use reconcile::{ConfigStore, CredentialExtractor, CredentialSource, ProviderConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::paths;

/// Config file name under the config directory
pub const CONFIG_FILE: &str = "config.toml";

/// Provider config used when a resource names none
pub const DEFAULT_PROVIDER: &str = "default";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderEntry {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub credentials: CredentialSource,
}

fn default_base_url() -> String {
    metronome::DEFAULT_BASE_URL.to_string()
}

impl Config {
    /// Load `config.toml` from the config directory
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_file(CONFIG_FILE)?)
    }

    /// Load a config file; a missing file is an empty config
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("Config file {} does not exist", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

impl ConfigStore for Config {
    fn provider_config(&self, name: &str) -> Result<ProviderConfig> {
        let Some(entry) = self.providers.get(name) else {
            bail!("provider config '{name}' is not defined in {CONFIG_FILE}");
        };
        Ok(ProviderConfig {
            name: name.to_string(),
            base_url: entry.base_url.clone(),
            credentials: entry.credentials.clone(),
        })
    }
}

/// Reads API tokens from the environment, files, or the config itself
#[derive(Debug, Clone, Copy, Default)]
pub struct Credentials;

impl CredentialExtractor for Credentials {
    fn extract(&self, config: &ProviderConfig) -> Result<String> {
        let token = match &config.credentials {
            CredentialSource::Env { env } => std::env::var(env)
                .with_context(|| format!("environment variable {env} is not set"))?,
            CredentialSource::File { path } => {
                let path = paths::expand(path);
                fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read token file: {}", path.display()))?
            }
            CredentialSource::Inline { token } => token.clone(),
        };

        let token = token.trim();
        if token.is_empty() {
            bail!("credentials for provider config '{}' are empty", config.name);
        }
        Ok(token.to_string())
    }
}
