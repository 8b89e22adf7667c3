//! Execution engine - runs reconciliation passes with UI integration

use anyhow::Result;
use colored::Colorize;
use metronome::Api;
use reconcile::{
    Adapter, CancelToken, ConfigStore, ConfirmCallback, Connector, CredentialExtractor,
    DeclaredOf, Error, ExecuteOptions, ExecuteSummary, Outcome, ProgressCallback, UsageTracker,
    execute, failed,
};
use std::time::Duration;

use super::{Inventory, Target};
use crate::kinds::{
    BillableMetricAdapter, CustomFieldKeyAdapter, Kind, ProductAdapter, RateAdapter,
    RateCardAdapter,
};
use crate::references;
use crate::ui;

/// Builds a remote client from a provider config's base URL and token
pub trait ClientFactory: Clone + Send + Sync + 'static {
    type Client: Api + Clone + 'static;

    fn client(&self, base_url: &str, token: &str) -> Result<Self::Client>;
}

/// HTTP clients with a per-request timeout
#[derive(Debug, Clone, Copy)]
pub struct Http {
    pub timeout: Duration,
}

impl ClientFactory for Http {
    type Client = metronome::Client;

    fn client(&self, base_url: &str, token: &str) -> Result<Self::Client> {
        Ok(metronome::Client::new(base_url, token)?.with_timeout(self.timeout))
    }
}

/// Every connection shares the same in-memory account
#[cfg(test)]
impl ClientFactory for metronome::MockClient {
    type Client = metronome::MockClient;

    fn client(&self, _base_url: &str, _token: &str) -> Result<Self::Client> {
        Ok(self.clone())
    }
}

/// Options for one apply pass
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Observe only; report what would change
    pub dry_run: bool,
    /// Number of parallel jobs
    pub jobs: usize,
    /// Skip the deletion prompt
    pub yes: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 4,
            yes: false,
        }
    }
}

/// Outcome of every resource a pass touched, in execution order
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub outcomes: Vec<(String, Outcome)>,
}

impl Report {
    pub fn summary(&self) -> ExecuteSummary {
        let mut summary = ExecuteSummary::default();
        for (_, outcome) in &self.outcomes {
            summary.add_result(outcome);
        }
        summary
    }

    pub fn get(&self, key: &str) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, outcome)| outcome)
    }
}

/// Connects declared resources to Metronome and runs passes over them
pub struct Engine<'a, F> {
    store: &'a dyn ConfigStore,
    usage: &'a dyn UsageTracker,
    credentials: &'a dyn CredentialExtractor,
    factory: F,
}

impl<'a, F: ClientFactory> Engine<'a, F> {
    pub fn new(
        store: &'a dyn ConfigStore,
        usage: &'a dyn UsageTracker,
        credentials: &'a dyn CredentialExtractor,
        factory: F,
    ) -> Self {
        Self {
            store,
            usage,
            credentials,
            factory,
        }
    }

    fn connector<A, N>(&self, new_adapter: N) -> Connector<'a, A>
    where
        A: Adapter + 'static,
        N: Fn(F::Client) -> A + Send + Sync + 'static,
    {
        let factory = self.factory.clone();
        Connector::new(
            self.store,
            self.usage,
            self.credentials,
            move |base_url: &str, token: &str| Ok(new_adapter(factory.client(base_url, token)?)),
        )
    }

    pub(super) fn metrics(&self) -> Connector<'a, BillableMetricAdapter<F::Client>> {
        self.connector(BillableMetricAdapter::new)
    }

    pub(super) fn custom_field_keys(&self) -> Connector<'a, CustomFieldKeyAdapter<F::Client>> {
        self.connector(CustomFieldKeyAdapter::new)
    }

    pub(super) fn products(&self) -> Connector<'a, ProductAdapter<F::Client>> {
        self.connector(ProductAdapter::new)
    }

    pub(super) fn rate_cards(&self) -> Connector<'a, RateCardAdapter<F::Client>> {
        self.connector(RateCardAdapter::new)
    }

    pub(super) fn rates(&self) -> Connector<'a, RateAdapter<F::Client>> {
        self.connector(RateAdapter::new)
    }

    /// Run one full pass.
    ///
    /// Kinds are reconciled in dependency order so references resolve
    /// against ids created earlier in the same pass. Deletions run
    /// afterwards in reverse order, once confirmed.
    ///
    /// Outcomes land in `report` as each kind finishes, so a pass that
    /// fails partway still reports the resources it already changed.
    #[allow(clippy::too_many_arguments)]
    pub fn apply<P, C>(
        &self,
        inventory: &mut Inventory,
        target: &Target,
        opts: &ApplyOptions,
        cancel: &CancelToken,
        progress: &mut P,
        confirm: &mut C,
        report: &mut Report,
    ) -> Result<()>
    where
        P: ProgressCallback,
        C: ConfirmCallback,
    {
        let exec = ExecuteOptions {
            dry_run: opts.dry_run,
            jobs: opts.jobs.max(1),
        };

        for kind in Kind::ALL {
            if !target.includes(kind) {
                continue;
            }
            let Inventory {
                billable_metrics,
                custom_field_keys,
                products,
                rate_cards,
                rates,
            } = &mut *inventory;
            let live = Phase {
                target,
                kind,
                deleting: false,
            };

            let outcomes = match kind {
                Kind::BillableMetric => run_kind(
                    &self.metrics(),
                    billable_metrics,
                    live,
                    |_| Ok(()),
                    &exec,
                    cancel,
                    progress,
                )?,
                Kind::CustomFieldKey => run_kind(
                    &self.custom_field_keys(),
                    custom_field_keys,
                    live,
                    |_| Ok(()),
                    &exec,
                    cancel,
                    progress,
                )?,
                Kind::Product => run_kind(
                    &self.products(),
                    products,
                    live,
                    |p| references::resolve_product(p.parameters_mut(), billable_metrics.as_slice()),
                    &exec,
                    cancel,
                    progress,
                )?,
                Kind::RateCard => run_kind(
                    &self.rate_cards(),
                    rate_cards,
                    live,
                    |_| Ok(()),
                    &exec,
                    cancel,
                    progress,
                )?,
                Kind::Rate => run_kind(
                    &self.rates(),
                    rates,
                    live,
                    |r| {
                        references::resolve_rate(
                            r.parameters_mut(),
                            rate_cards.as_slice(),
                            products.as_slice(),
                        )
                    },
                    &exec,
                    cancel,
                    progress,
                )?,
            };
            report.outcomes.extend(outcomes);
        }

        let doomed = inventory.deleting(target);
        if doomed.is_empty() {
            return Ok(());
        }

        if !opts.dry_run && !opts.yes {
            println!();
            println!(
                "  {} {} removed from the manifest:",
                "⚠".yellow(),
                ui::count(doomed.len(), "resource")
            );
            for key in &doomed {
                println!("    {} {}", "-".red(), key);
            }
            let prompt = format!(
                "Delete {} from Metronome?",
                ui::count(doomed.len(), "resource")
            );
            let confirmed = confirm.confirm(&prompt).unwrap_or_else(|e| {
                ui::warn(&format!("Could not confirm deletion: {e:#}"));
                false
            });
            if !confirmed {
                log::info!("deletion of {} resources declined", doomed.len());
                report.outcomes.extend(doomed.into_iter().map(|key| {
                    (
                        key,
                        Outcome::Skipped {
                            reason: "deletion declined".to_string(),
                        },
                    )
                }));
                return Ok(());
            }
        }

        for kind in Kind::ALL.into_iter().rev() {
            if !target.includes(kind) {
                continue;
            }
            let removed = Phase {
                target,
                kind,
                deleting: true,
            };
            let outcomes = match kind {
                Kind::BillableMetric => run_kind(
                    &self.metrics(),
                    &mut inventory.billable_metrics,
                    removed,
                    |_| Ok(()),
                    &exec,
                    cancel,
                    progress,
                )?,
                Kind::CustomFieldKey => run_kind(
                    &self.custom_field_keys(),
                    &mut inventory.custom_field_keys,
                    removed,
                    |_| Ok(()),
                    &exec,
                    cancel,
                    progress,
                )?,
                Kind::Product => run_kind(
                    &self.products(),
                    &mut inventory.products,
                    removed,
                    |_| Ok(()),
                    &exec,
                    cancel,
                    progress,
                )?,
                Kind::RateCard => run_kind(
                    &self.rate_cards(),
                    &mut inventory.rate_cards,
                    removed,
                    |_| Ok(()),
                    &exec,
                    cancel,
                    progress,
                )?,
                Kind::Rate => run_kind(
                    &self.rates(),
                    &mut inventory.rates,
                    removed,
                    |_| Ok(()),
                    &exec,
                    cancel,
                    progress,
                )?,
            };
            report.outcomes.extend(outcomes);
        }

        Ok(())
    }
}

/// Which resources of one kind a step of the pass covers
#[derive(Debug, Clone, Copy)]
struct Phase<'t> {
    target: &'t Target,
    kind: Kind,
    deleting: bool,
}

impl Phase<'_> {
    fn selects(&self, name: &str, deleting: bool) -> bool {
        deleting == self.deleting && self.target.matches(self.kind, name)
    }
}

/// Reconcile the resources of one kind that `phase` selects.
///
/// `prepare` runs on a copy of each resource before it is connected; a
/// resource it rejects is marked failed and skipped for this pass.
fn run_kind<A, R, P>(
    connector: &Connector<'_, A>,
    resources: &mut [DeclaredOf<A>],
    phase: Phase<'_>,
    mut prepare: R,
    opts: &ExecuteOptions,
    cancel: &CancelToken,
    progress: &mut P,
) -> Result<Vec<(String, Outcome)>>
where
    A: Adapter + 'static,
    R: FnMut(&mut DeclaredOf<A>) -> Result<(), Error>,
    P: ProgressCallback,
{
    let mut outcomes = Vec::new();
    let mut indices = Vec::new();
    let mut batch = Vec::new();

    for (index, declared) in resources.iter_mut().enumerate() {
        if !phase.selects(declared.name(), declared.is_deleting()) {
            continue;
        }
        let mut ready = declared.clone();
        match prepare(&mut ready) {
            Ok(()) => {
                indices.push(index);
                batch.push(ready);
            }
            Err(e) => {
                log::warn!("{}: {}", declared.key(), e);
                declared.conditions_mut().reconcile_error(&e);
                let outcome = failed(&e);
                progress.on_resource_complete(&declared.key(), &outcome);
                outcomes.push((declared.key(), outcome));
            }
        }
    }

    let results = execute(connector, &mut batch, opts, cancel, progress)?;

    for ((index, declared), outcome) in indices.into_iter().zip(batch).zip(results) {
        outcomes.push((declared.key(), outcome));
        if !opts.dry_run
            && let Some(slot) = resources.get_mut(index)
        {
            *slot = declared;
        }
    }
    Ok(outcomes)
}

/// Prints one line per finished resource
#[derive(Debug, Default)]
pub struct Printer {
    pub quiet: bool,
}

impl ProgressCallback for Printer {
    fn on_batch_start(&mut self, kind: &str, count: usize) {
        if !self.quiet {
            println!();
            println!("  {} Reconciling {} {}...", "→".cyan(), count, kind);
        }
    }

    fn on_resource_complete(&mut self, key: &str, outcome: &Outcome) {
        let (symbol, detail) = match outcome {
            Outcome::NoChange => ("○".dimmed(), String::new()),
            Outcome::Created => ("✓".green(), "created".to_string()),
            Outcome::Updated => ("✓".green(), "updated".to_string()),
            Outcome::Deleted => ("✓".green(), "deleted".to_string()),
            Outcome::Failed { error, class } => ("✗".red(), format!("{error} ({class})")),
            Outcome::Skipped { reason } => ("⊘".yellow(), reason.clone()),
        };
        if self.quiet && !matches!(outcome, Outcome::Failed { .. }) {
            return;
        }
        println!("    {} {:<40} {}", symbol, key, detail.dimmed());
    }

    fn on_batch_complete(&mut self) {}
}

/// Asks before deleting
pub struct Prompt;

impl ConfirmCallback for Prompt {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        use dialoguer::Confirm;

        let confirmed = Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()?;

        Ok(confirmed)
    }
}

/// Print final summary
pub fn print_summary(summary: &ExecuteSummary, dry_run: bool) {
    println!();
    if dry_run {
        println!("  {} Dry run - no changes made", "ℹ".blue());
    } else if summary.is_success() {
        println!("  {} Pass completed successfully!", "✓".green().bold());
    } else {
        println!("  {} Pass completed with errors", "⚠".yellow().bold());
    }

    if summary.created > 0 {
        println!("    • {} resources created", summary.created);
    }
    if summary.updated > 0 {
        println!("    • {} resources updated", summary.updated);
    }
    if summary.deleted > 0 {
        println!("    • {} resources deleted", summary.deleted);
    }
    if summary.skipped > 0 {
        println!("    • {} resources skipped", summary.skipped);
    }
    if summary.no_change > 0 {
        println!("    • {} resources in sync", summary.no_change);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
        if summary.retryable > 0 {
            println!(
                "      {} of them will be retried on the next pass",
                summary.retryable
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Credentials};
    use crate::manifest::Manifest;
    use crate::state::{State, UsageLog};
    use metronome::MockClient;
    use reconcile::{AutoConfirm, AutoDecline, ErrorClass, NoProgress};

    const CONFIG: &str = r#"
[providers.default.credentials]
source = "inline"
token = "tok-test"
"#;

    const MANIFEST: &str = r#"
[[billable_metric]]
name = "api-calls"
labels = { team = "platform" }
parameters = { name = "API calls", aggregation_type = "count" }

[[custom_field_key]]
name = "region"
parameters = { entity = "customer", key = "region" }

[[product]]
name = "api"
labels = { line = "usage" }

[product.parameters]
type = "usage"
name = "API"
billable_metric_selector = { match_labels = { team = "platform" } }

[[rate_card]]
name = "list"
parameters = { name = "List prices" }

[[rate]]
name = "api-list"

[rate.parameters]
rate_card_ref = { name = "list" }
product_ref = { name = "api" }
starting_at = "2024-01-01T00:00:00Z"
rate_type = "flat"
price = 1.5
entitled = true
"#;

    struct Fixture {
        config: Config,
        usage: UsageLog,
        mock: MockClient,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                config: Config::parse(CONFIG).unwrap(),
                usage: UsageLog::new(),
                mock: MockClient::new(),
            }
        }

        fn engine(&self) -> Engine<'_, MockClient> {
            Engine::new(&self.config, &self.usage, &Credentials, self.mock.clone())
        }

        fn pass(&self, inventory: &mut Inventory, opts: &ApplyOptions) -> Report {
            self.run(inventory, &Target::default(), opts, &mut AutoDecline)
        }

        fn run<C: ConfirmCallback>(
            &self,
            inventory: &mut Inventory,
            target: &Target,
            opts: &ApplyOptions,
            confirm: &mut C,
        ) -> Report {
            let mut report = Report::default();
            self.engine()
                .apply(
                    inventory,
                    target,
                    opts,
                    &CancelToken::new(),
                    &mut NoProgress,
                    confirm,
                    &mut report,
                )
                .unwrap();
            report
        }
    }

    fn inventory(manifest: &str, state: &State) -> Inventory {
        Inventory::assemble(&Manifest::parse(manifest).unwrap(), state)
    }

    #[test]
    fn test_first_pass_creates_in_dependency_order() {
        let fx = Fixture::new();
        let mut inv = inventory(MANIFEST, &State::default());

        let report = fx.pass(&mut inv, &ApplyOptions::default());

        assert_eq!(report.summary().created, 5);
        assert!(report.summary().is_success());
        let keys: Vec<&str> = report.outcomes.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "billable metric/api-calls",
                "custom field key/region",
                "product/api",
                "rate card/list",
                "rate/api-list",
            ]
        );

        let metric_id = inv.billable_metrics[0].external_name().unwrap().to_string();
        let product_body = fx
            .mock
            .calls()
            .into_iter()
            .find(|c| c.operation == "create_product")
            .unwrap()
            .body;
        assert_eq!(product_body["billable_metric_id"], metric_id.as_str());

        let card_id = inv.rate_cards[0].external_name().unwrap();
        assert_eq!(
            inv.rates[0].parameters().rate_card_id.as_deref(),
            Some(card_id)
        );
    }

    #[test]
    fn test_second_pass_is_quiet() {
        let fx = Fixture::new();
        let mut state = State::default();
        let mut inv = inventory(MANIFEST, &state);
        let first = fx.pass(&mut inv, &ApplyOptions::default());
        inv.write_back(&first, &mut state).unwrap();

        let mut again = inventory(MANIFEST, &state);
        let report = fx.pass(&mut again, &ApplyOptions::default());

        assert_eq!(report.summary().no_change, 5, "{:?}", report.outcomes);
        assert!(
            !fx.mock
                .operations()
                .iter()
                .skip_while(|op| **op != "add_rate")
                .skip(1)
                .any(|op| op.starts_with("create") || op.starts_with("add"))
        );
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let fx = Fixture::new();
        let mut inv = inventory(MANIFEST, &State::default());

        let report = fx.pass(
            &mut inv,
            &ApplyOptions {
                dry_run: true,
                ..Default::default()
            },
        );

        assert_eq!(
            report.get("billable metric/api-calls"),
            Some(&Outcome::Skipped {
                reason: "would create".to_string()
            })
        );
        assert!(matches!(
            report.get("product/api"),
            Some(Outcome::Failed { class: ErrorClass::Recoverable, .. })
        ));
        assert!(inv.billable_metrics[0].external_name().is_none());
        assert!(
            !fx.mock
                .operations()
                .iter()
                .any(|op| op.starts_with("create") || op.starts_with("add"))
        );
    }

    #[test]
    fn test_unresolvable_reference_marks_resource() {
        let fx = Fixture::new();
        let manifest = r#"
[[product]]
name = "api"
parameters = { type = "usage", billable_metric_ref = { name = "missing" } }
"#;
        let mut inv = inventory(manifest, &State::default());
        let report = fx.pass(&mut inv, &ApplyOptions::default());

        let Some(Outcome::Failed { error, class }) = report.get("product/api") else {
            panic!("expected failure, got {:?}", report.outcomes);
        };
        assert_eq!(error, "billable_metric_id not yet resolvable");
        assert_eq!(*class, ErrorClass::Recoverable);

        let synced = inv.products[0].conditions().synced.as_ref().unwrap();
        assert!(!synced.status);
        assert!(fx.mock.calls().is_empty());
    }

    #[test]
    fn test_removed_resources_deleted_in_reverse_order() {
        let fx = Fixture::new();
        let mut state = State::default();
        let mut inv = inventory(MANIFEST, &state);
        let first = fx.pass(&mut inv, &ApplyOptions::default());
        inv.write_back(&first, &mut state).unwrap();

        let mut emptied = inventory("", &state);
        assert_eq!(emptied.len(), 5);
        let report = fx.run(
            &mut emptied,
            &Target::default(),
            &ApplyOptions::default(),
            &mut AutoConfirm,
        );

        assert_eq!(report.summary().deleted, 5, "{:?}", report.outcomes);
        let deletes: Vec<&str> = fx
            .mock
            .operations()
            .into_iter()
            .filter(|op| op.starts_with("archive") || op.starts_with("remove"))
            .collect();
        assert_eq!(
            deletes,
            vec![
                "archive_rate_card",
                "archive_product",
                "remove_custom_field_key",
                "archive_billable_metric",
            ]
        );

        emptied.write_back(&report, &mut state).unwrap();
        assert!(state.resources.is_empty());
    }

    #[test]
    fn test_deletion_skips_structural_search() {
        let fx = Fixture::new();
        let mut state = State::default();
        let mut inv = inventory(MANIFEST, &state);
        let first = fx.pass(&mut inv, &ApplyOptions::default());
        inv.write_back(&first, &mut state).unwrap();
        let before = fx.mock.operations().len();

        let mut emptied = inventory("", &state);
        fx.run(
            &mut emptied,
            &Target::default(),
            &ApplyOptions::default(),
            &mut AutoConfirm,
        );

        let during: Vec<&str> = fx.mock.operations().split_off(before);
        assert!(during.contains(&"remove_custom_field_key"));
        assert!(!during.iter().any(|op| op.starts_with("list")), "{during:?}");
    }

    #[test]
    fn test_declined_deletion_keeps_state() {
        let fx = Fixture::new();
        let mut state = State::default();
        let mut inv = inventory(MANIFEST, &state);
        let first = fx.pass(&mut inv, &ApplyOptions::default());
        inv.write_back(&first, &mut state).unwrap();

        let mut emptied = inventory("", &state);
        let report = fx.pass(&mut emptied, &ApplyOptions::default());

        assert_eq!(report.summary().skipped, 5);
        emptied.write_back(&report, &mut state).unwrap();
        assert_eq!(state.resources.len(), 5);
        assert!(
            !fx.mock
                .operations()
                .iter()
                .any(|op| op.starts_with("archive"))
        );
    }

    struct NoTerminal;

    impl ConfirmCallback for NoTerminal {
        fn confirm(&mut self, _prompt: &str) -> Result<bool> {
            anyhow::bail!("not a terminal")
        }
    }

    #[test]
    fn test_failed_prompt_counts_as_declined() {
        let fx = Fixture::new();
        let mut state = State::default();
        let mut inv = inventory(MANIFEST, &state);
        let first = fx.pass(&mut inv, &ApplyOptions::default());
        inv.write_back(&first, &mut state).unwrap();

        let mut emptied = inventory("", &state);
        let report = fx.run(
            &mut emptied,
            &Target::default(),
            &ApplyOptions::default(),
            &mut NoTerminal,
        );

        assert_eq!(report.summary().skipped, 5);
        assert!(
            !fx.mock
                .operations()
                .iter()
                .any(|op| op.starts_with("archive") || op.starts_with("remove"))
        );
    }

    #[test]
    fn test_target_limits_pass() {
        let fx = Fixture::new();
        let mut inv = inventory(MANIFEST, &State::default());

        let report = fx.run(
            &mut inv,
            &Target::parse(Some("custom_field_key.region")).unwrap(),
            &ApplyOptions::default(),
            &mut AutoDecline,
        );

        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(fx.mock.operations(), vec!["list_custom_field_keys", "add_custom_field_key"]);
    }

    #[test]
    fn test_missing_provider_config_fails_resource() {
        let fx = Fixture::new();
        let manifest = r#"
[[rate_card]]
name = "list"
provider_config = "sandbox"
parameters = { name = "List" }
"#;
        let mut inv = inventory(manifest, &State::default());
        let report = fx.pass(&mut inv, &ApplyOptions::default());

        let Some(Outcome::Failed { error, .. }) = report.get("rate card/list") else {
            panic!("expected failure");
        };
        assert!(error.contains("sandbox"));
        assert_eq!(fx.usage.snapshot()["rate card/list"], "sandbox");
    }

    #[test]
    fn test_summary_counts() {
        let report = Report {
            outcomes: vec![
                ("a".to_string(), Outcome::Created),
                ("b".to_string(), Outcome::NoChange),
                (
                    "c".to_string(),
                    Outcome::Failed {
                        error: "x".to_string(),
                        class: ErrorClass::Recoverable,
                    },
                ),
            ],
        };
        let summary = report.summary();
        assert_eq!(summary.created, 1);
        assert_eq!(summary.no_change, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.retryable, 1);
    }
}
