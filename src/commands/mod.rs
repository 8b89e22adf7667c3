pub mod apply;
pub mod diff;
pub mod status;
pub mod watch;

use anyhow::Result;
use reconcile::{CancelToken, ConfirmCallback};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{Config, Credentials};
use crate::engine::executor::Printer;
use crate::engine::{ApplyOptions, ClientFactory, Engine, Http, Inventory, Report, Target};
use crate::manifest::{self, Manifest};
use crate::state::{State, UsageLog};

/// Everything a command reads from disk
pub struct Session {
    pub config: Config,
    pub manifest_path: PathBuf,
    pub manifest: Manifest,
    pub state_path: PathBuf,
    pub state: State,
}

impl Session {
    /// Load config, manifest, and state from their default locations
    pub fn load(manifest: Option<&Path>) -> Result<Self> {
        let manifest_path = manifest::resolve_path(manifest)?;
        Self::load_from(Config::load()?, &manifest_path, &State::default_path()?)
    }

    pub fn load_from(config: Config, manifest_path: &Path, state_path: &Path) -> Result<Self> {
        let manifest = Manifest::load(manifest_path)?;
        let state = State::load(state_path)?;
        log::debug!(
            "{} declared resources, {} tracked",
            manifest.len(),
            state.resources.len()
        );
        Ok(Self {
            config,
            manifest_path: manifest_path.to_path_buf(),
            manifest,
            state_path: state_path.to_path_buf(),
            state,
        })
    }

    pub fn inventory(&self) -> Inventory {
        Inventory::assemble(&self.manifest, &self.state)
    }
}

/// HTTP clients for a pass with the given deadline
pub fn http(timeout: Duration) -> Http {
    Http {
        timeout: timeout.min(metronome::DEFAULT_TIMEOUT),
    }
}

/// Run one pass and persist what it learned.
///
/// State is saved even when the pass fails partway, so ids of resources
/// created before the failure are not lost. A dry run leaves the state
/// file untouched.
pub fn pass<F, C>(
    session: &mut Session,
    factory: F,
    target: &Target,
    opts: &ApplyOptions,
    timeout: Duration,
    quiet: bool,
    confirm: &mut C,
) -> Result<Report>
where
    F: ClientFactory,
    C: ConfirmCallback,
{
    let usage = UsageLog::new();
    let engine = Engine::new(&session.config, &usage, &Credentials, factory);
    let mut inventory = session.inventory();

    let cancel = CancelToken::with_timeout(timeout);
    let mut report = Report::default();
    let result = engine.apply(
        &mut inventory,
        target,
        opts,
        &cancel,
        &mut Printer { quiet },
        confirm,
        &mut report,
    );

    if !opts.dry_run && (result.is_ok() || !report.outcomes.is_empty()) {
        inventory.write_back(&report, &mut session.state)?;
        session.state.apply_usage(&usage);
        session.state.touch(&session.state_path)?;
    }
    result?;
    Ok(report)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    pub const CONFIG: &str = r#"
[providers.default.credentials]
source = "inline"
token = "tok-test"
"#;

    pub const MANIFEST: &str = r#"
[[billable_metric]]
name = "api-calls"
parameters = { name = "API calls", aggregation_type = "count" }

[[product]]
name = "api"
parameters = { type = "usage", name = "API", billable_metric_ref = { name = "api-calls" } }
"#;

    /// A session backed by files in a temporary directory
    pub fn session(dir: &TempDir, manifest: &str) -> Session {
        let manifest_path = dir.path().join("resources.toml");
        fs::write(&manifest_path, manifest).unwrap();
        Session::load_from(
            Config::parse(CONFIG).unwrap(),
            &manifest_path,
            &dir.path().join("state").join("state.json"),
        )
        .unwrap()
    }
}
