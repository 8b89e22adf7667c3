//! Execution engine - reconciles declared resources in parallel
//!
//! Each resource goes through connect, observe, then create, update, or
//! nothing, and finally a status write-back. Resources marked for deletion
//! go through connect and delete. Resources are independent of each other;
//! within one resource every step is sequential.

use crate::adapter::{Adapter, DeclaredOf};
use crate::connector::Connector;
use crate::context::{CancelToken, ProgressCallback};
use crate::diff::ResourceDiff;
use crate::error::{Error, Result};
use crate::types::{Action, ExecuteOptions, Outcome};
use rayon::prelude::*;

/// Reconcile a batch of resources of one kind
///
/// Declared resources are updated in place: external names, observed state,
/// late-initialized parameters, and conditions.
pub fn execute<A, P>(
    connector: &Connector<'_, A>,
    resources: &mut [DeclaredOf<A>],
    opts: &ExecuteOptions,
    cancel: &CancelToken,
    progress: &mut P,
) -> anyhow::Result<Vec<Outcome>>
where
    A: Adapter + 'static,
    P: ProgressCallback,
{
    if resources.is_empty() {
        return Ok(Vec::new());
    }

    progress.on_batch_start(A::KIND, resources.len());

    let outcomes: Vec<Outcome> = if opts.jobs <= 1 || resources.len() == 1 {
        resources
            .iter_mut()
            .map(|declared| reconcile_one(connector, declared, opts, cancel))
            .collect()
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(opts.jobs)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create thread pool: {}", e))?;

        pool.install(|| {
            resources
                .par_iter_mut()
                .map(|declared| reconcile_one(connector, declared, opts, cancel))
                .collect()
        })
    };

    // Progress callbacks are not thread-safe; report after the batch.
    for (declared, outcome) in resources.iter().zip(&outcomes) {
        progress.on_resource_complete(&declared.key(), outcome);
    }
    progress.on_batch_complete();

    Ok(outcomes)
}

/// Reconcile one declared resource and write its conditions back
pub fn reconcile_one<A: Adapter + 'static>(
    connector: &Connector<'_, A>,
    declared: &mut DeclaredOf<A>,
    opts: &ExecuteOptions,
    cancel: &CancelToken,
) -> Outcome {
    match run(connector, declared, opts, cancel) {
        Ok(outcome) => {
            declared.conditions_mut().reconcile_success();
            outcome
        }
        Err(e) => {
            let class = e.class();
            if class.is_retryable() {
                log::warn!("{}: {} ({})", declared.key(), e, class);
            } else {
                log::error!("{}: {}", declared.key(), e);
            }
            declared.conditions_mut().reconcile_error(&e);
            Outcome::Failed {
                error: e.to_string(),
                class,
            }
        }
    }
}

fn run<A: Adapter + 'static>(
    connector: &Connector<'_, A>,
    declared: &mut DeclaredOf<A>,
    opts: &ExecuteOptions,
    cancel: &CancelToken,
) -> Result<Outcome> {
    let reconciler = connector.connect(declared)?;

    if declared.is_deleting() {
        if opts.dry_run {
            return Ok(Outcome::Skipped {
                reason: "would delete".to_string(),
            });
        }
        reconciler.delete(declared, cancel)?;
        reconciler.disconnect();
        return Ok(Outcome::Deleted);
    }

    let observation = reconciler.observe(declared, cancel)?;
    if !observation.exists {
        declared.conditions_mut().unavailable();
    }

    let outcome = match observation.action() {
        Action::None | Action::Delete => Outcome::NoChange,
        action if opts.dry_run => Outcome::Skipped {
            reason: format!("would {action}"),
        },
        Action::Create => {
            reconciler.create(declared, cancel)?;
            Outcome::Created
        }
        Action::Update => {
            reconciler.update(declared, cancel)?;
            Outcome::Updated
        }
    };

    reconciler.disconnect();
    Ok(outcome)
}

/// Observe a batch without changing anything
///
/// Works on snapshots; the declared resources are left untouched.
pub fn plan<A: Adapter + 'static>(
    connector: &Connector<'_, A>,
    resources: &[DeclaredOf<A>],
    jobs: usize,
    cancel: &CancelToken,
) -> anyhow::Result<Vec<(String, Result<ResourceDiff>)>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create thread pool: {}", e))?;

    Ok(pool.install(|| {
        resources
            .par_iter()
            .map(|declared| (declared.key(), plan_one(connector, declared, cancel)))
            .collect()
    }))
}

/// Observe one resource and report the action a pass would take
pub fn plan_one<A: Adapter + 'static>(
    connector: &Connector<'_, A>,
    declared: &DeclaredOf<A>,
    cancel: &CancelToken,
) -> Result<ResourceDiff> {
    let mut snapshot = declared.clone();
    let reconciler = connector.connect(&snapshot)?;

    let (action, diff) = if snapshot.is_deleting() {
        let action = if snapshot.external_name().is_some() {
            Action::Delete
        } else {
            Action::None
        };
        (action, None)
    } else {
        let observation = reconciler.observe(&mut snapshot, cancel)?;
        (observation.action(), observation.diff)
    };

    Ok(ResourceDiff {
        key: snapshot.key(),
        kind: A::KIND.to_string(),
        action,
        diff,
    })
}

/// Error for a resource whose pass could not start
pub fn failed(err: &Error) -> Outcome {
    Outcome::Failed {
        error: err.to_string(),
        class: err.class(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{
        ConfigStore, CredentialExtractor, CredentialSource, ProviderConfig, UsageTracker,
    };
    use crate::context::NoProgress;
    use crate::error::RemoteError;
    use crate::identity::find_by_id;
    use crate::resource::Declared;
    use crate::types::{ExecuteSummary, Identity};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Remote store keyed by id, values are names
    #[derive(Clone, Default)]
    struct Store {
        items: Arc<Mutex<HashMap<String, String>>>,
        next_id: Arc<Mutex<u32>>,
    }

    struct Metric {
        store: Store,
    }

    impl Adapter for Metric {
        type Params = String;
        type Observed = String;
        type Remote = (String, String);

        const KIND: &'static str = "metric";
        const IDENTITY: Identity = Identity::Nominal;

        fn locate(
            &self,
            declared: &DeclaredOf<Self>,
            _cancel: &CancelToken,
        ) -> std::result::Result<Option<(String, String)>, RemoteError> {
            let id = declared.external_name().unwrap_or_default().to_string();
            let items = self.store.items.lock().unwrap();
            let found = items.get(&id).map(|name| (id.clone(), name.clone()));
            find_by_id(|| found.ok_or(RemoteError::NotFound), |_| false)
        }

        fn to_parameters(&self, remote: &(String, String)) -> String {
            remote.1.clone()
        }

        fn to_observed(&self, remote: &(String, String)) -> String {
            remote.0.clone()
        }

        fn normalize(&self, _declared: &String, _params: &mut String) {}

        fn create(
            &self,
            params: &String,
            _cancel: &CancelToken,
        ) -> std::result::Result<Option<String>, RemoteError> {
            let mut next = self.store.next_id.lock().unwrap();
            *next += 1;
            let id = format!("id-{next}");
            self.store
                .items
                .lock()
                .unwrap()
                .insert(id.clone(), params.clone());
            Ok(Some(id))
        }

        fn delete(
            &self,
            external_name: &str,
            _params: &String,
            _cancel: &CancelToken,
        ) -> std::result::Result<(), RemoteError> {
            match self.store.items.lock().unwrap().remove(external_name) {
                Some(_) => Ok(()),
                None => Err(RemoteError::AlreadyArchived),
            }
        }
    }

    struct Config;

    impl ConfigStore for Config {
        fn provider_config(&self, name: &str) -> anyhow::Result<ProviderConfig> {
            Ok(ProviderConfig {
                name: name.to_string(),
                base_url: "https://api.example.com".to_string(),
                credentials: CredentialSource::Inline {
                    token: "t".to_string(),
                },
            })
        }
    }

    impl UsageTracker for Config {
        fn track(&self, _resource_key: &str, _provider_config: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    impl CredentialExtractor for Config {
        fn extract(&self, _config: &ProviderConfig) -> anyhow::Result<String> {
            Ok("t".to_string())
        }
    }

    fn connector(store: &Store) -> Connector<'static, Metric> {
        let store = store.clone();
        Connector::new(&Config, &Config, &Config, move |_: &str, _: &str| {
            Ok(Metric {
                store: store.clone(),
            })
        })
    }

    fn metric(name: &str) -> DeclaredOf<Metric> {
        Declared::new("metric", name, name.to_string()).with_provider_config("default")
    }

    #[test]
    fn test_execute_empty() {
        let store = Store::default();
        let outcomes = execute(
            &connector(&store),
            &mut [],
            &ExecuteOptions::default(),
            &CancelToken::new(),
            &mut NoProgress,
        )
        .unwrap();
        assert!(outcomes.is_empty());
    }

    #[test]
    fn test_execute_creates_then_no_change() {
        let store = Store::default();
        let connector = connector(&store);
        let mut resources = vec![metric("a"), metric("b"), metric("c")];

        let outcomes = execute(
            &connector,
            &mut resources,
            &ExecuteOptions::default(),
            &CancelToken::new(),
            &mut NoProgress,
        )
        .unwrap();
        assert!(outcomes.iter().all(|o| *o == Outcome::Created));
        assert!(resources.iter().all(|r| r.external_name().is_some()));
        assert_eq!(store.items.lock().unwrap().len(), 3);

        let outcomes = execute(
            &connector,
            &mut resources,
            &ExecuteOptions::default(),
            &CancelToken::new(),
            &mut NoProgress,
        )
        .unwrap();
        assert!(outcomes.iter().all(|o| *o == Outcome::NoChange));
        assert!(resources.iter().all(|r| r.conditions().is_healthy()));
    }

    #[test]
    fn test_execute_drift_update_unsupported() {
        let store = Store::default();
        let connector = connector(&store);
        let mut resources = vec![metric("a")];
        execute(
            &connector,
            &mut resources,
            &ExecuteOptions::default(),
            &CancelToken::new(),
            &mut NoProgress,
        )
        .unwrap();

        *resources[0].parameters_mut() = "renamed".to_string();
        let outcomes = execute(
            &connector,
            &mut resources,
            &ExecuteOptions::default(),
            &CancelToken::new(),
            &mut NoProgress,
        )
        .unwrap();

        let mut summary = ExecuteSummary::default();
        summary.add_result(&outcomes[0]);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.retryable, 0);
        assert!(!resources[0].conditions().is_healthy());
    }

    #[test]
    fn test_execute_dry_run_changes_nothing() {
        let store = Store::default();
        let mut resources = vec![metric("a")];
        let opts = ExecuteOptions {
            dry_run: true,
            jobs: 1,
        };

        let outcomes = execute(
            &connector(&store),
            &mut resources,
            &opts,
            &CancelToken::new(),
            &mut NoProgress,
        )
        .unwrap();
        assert_eq!(
            outcomes,
            vec![Outcome::Skipped {
                reason: "would create".to_string()
            }]
        );
        assert!(store.items.lock().unwrap().is_empty());
    }

    #[test]
    fn test_execute_delete_is_idempotent() {
        let store = Store::default();
        let connector = connector(&store);
        let mut resources = vec![metric("a")];
        let opts = ExecuteOptions::default();
        execute(&connector, &mut resources, &opts, &CancelToken::new(), &mut NoProgress).unwrap();

        resources[0].mark_deleting();
        for _ in 0..2 {
            let outcomes =
                execute(&connector, &mut resources, &opts, &CancelToken::new(), &mut NoProgress)
                    .unwrap();
            assert_eq!(outcomes, vec![Outcome::Deleted]);
        }
        assert!(store.items.lock().unwrap().is_empty());
    }

    #[test]
    fn test_execute_connect_failure_is_reported() {
        let store = Store::default();
        let mut resources = vec![Declared::new("metric", "a", "a".to_string())];

        let outcomes = execute(
            &connector(&store),
            &mut resources,
            &ExecuteOptions::default(),
            &CancelToken::new(),
            &mut NoProgress,
        )
        .unwrap();
        assert!(matches!(&outcomes[0], Outcome::Failed { error, .. } if error == "provider config is not set"));
    }

    #[test]
    fn test_execute_cancelled_is_recoverable() {
        let store = Store::default();
        let mut resources = vec![metric("a")];
        let cancel = CancelToken::new();
        cancel.cancel();

        let outcomes = execute(
            &connector(&store),
            &mut resources,
            &ExecuteOptions::default(),
            &cancel,
            &mut NoProgress,
        )
        .unwrap();
        assert!(
            matches!(&outcomes[0], Outcome::Failed { class, .. } if class.is_retryable())
        );
        assert!(store.items.lock().unwrap().is_empty());
    }

    #[test]
    fn test_plan_reports_actions_without_mutating() {
        let store = Store::default();
        let connector = connector(&store);
        let mut existing = vec![metric("a")];
        execute(
            &connector,
            &mut existing,
            &ExecuteOptions::default(),
            &CancelToken::new(),
            &mut NoProgress,
        )
        .unwrap();

        let mut drifted = existing[0].clone();
        *drifted.parameters_mut() = "renamed".to_string();
        let resources = vec![drifted, metric("b")];

        let planned = plan(&connector, &resources, 2, &CancelToken::new()).unwrap();
        let actions: Vec<Action> = planned
            .iter()
            .map(|(_, r)| r.as_ref().unwrap().action)
            .collect();
        assert_eq!(actions, vec![Action::Update, Action::Create]);
        assert!(resources[1].external_name().is_none());
        assert_eq!(store.items.lock().unwrap().len(), 1);
    }
}
