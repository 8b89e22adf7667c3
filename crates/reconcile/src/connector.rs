//! Connector: declared resource to connected reconciler
//!
//! Resolves the declared resource's provider config reference into
//! credentials and builds a kind-specific reconciler bound to a fresh
//! remote client. The only I/O is the config and credential fetch.

use crate::adapter::{Adapter, DeclaredOf};
use crate::error::{Error, Result};
use crate::reconciler::Reconciler;
use anyhow::Result as AnyResult;
use serde::{Deserialize, Serialize};

/// Where a provider config's API token comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum CredentialSource {
    /// Environment variable holding the token
    Env { env: String },
    /// File whose trimmed contents are the token
    File { path: String },
    /// Token written in the config itself
    Inline { token: String },
}

/// Connection settings for one remote account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,
    pub credentials: CredentialSource,
}

/// Fetches provider configs by name
pub trait ConfigStore: Send + Sync {
    fn provider_config(&self, name: &str) -> AnyResult<ProviderConfig>;
}

/// Records which declared resources use which provider config
pub trait UsageTracker: Send + Sync {
    fn track(&self, resource_key: &str, provider_config: &str) -> AnyResult<()>;
}

/// Turns a provider config into an API token
pub trait CredentialExtractor: Send + Sync {
    fn extract(&self, config: &ProviderConfig) -> AnyResult<String>;
}

/// Builds an adapter from a base URL and token
pub type AdapterFactory<A> = dyn Fn(&str, &str) -> AnyResult<A> + Send + Sync;

/// Connector for one kind
pub struct Connector<'a, A> {
    store: &'a dyn ConfigStore,
    usage: &'a dyn UsageTracker,
    credentials: &'a dyn CredentialExtractor,
    new_adapter: Box<AdapterFactory<A>>,
}

impl<'a, A: Adapter + 'static> Connector<'a, A> {
    pub fn new(
        store: &'a dyn ConfigStore,
        usage: &'a dyn UsageTracker,
        credentials: &'a dyn CredentialExtractor,
        new_adapter: impl Fn(&str, &str) -> AnyResult<A> + Send + Sync + 'static,
    ) -> Self {
        Self {
            store,
            usage,
            credentials,
            new_adapter: Box::new(new_adapter),
        }
    }

    /// Connect a declared resource to its remote account.
    pub fn connect(&self, declared: &DeclaredOf<A>) -> Result<Reconciler<A>> {
        if declared.kind() != A::KIND {
            return Err(Error::WrongKind {
                expected: A::KIND,
                found: declared.kind().to_string(),
            });
        }

        let config_name = declared.provider_config().ok_or(Error::ConfigNotSet)?;

        self.usage
            .track(&declared.key(), config_name)
            .map_err(|e| Error::TrackUsage(format!("{e:#}")))?;

        let config = self
            .store
            .provider_config(config_name)
            .map_err(|e| Error::GetConfig {
                name: config_name.to_string(),
                message: format!("{e:#}"),
            })?;

        let token = self
            .credentials
            .extract(&config)
            .map_err(|e| Error::Credentials(format!("{e:#}")))?;

        let adapter = (self.new_adapter)(&config.base_url, &token)
            .map_err(|e| Error::Connect(format!("{e:#}")))?;

        log::trace!("{}: connected via {}", declared.key(), config.name);
        Ok(Reconciler::new(adapter))
    }
}
