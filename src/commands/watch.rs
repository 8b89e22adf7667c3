//! Scheduler: one reconciliation pass per interval, forever
//!
//! Every pass reloads the manifest and state, so edits take effect on the
//! next tick. A failed pass is reported and retried on the next tick.
//! Deletions proceed without prompting.

use anyhow::Result;
use chrono::Local;
use colored::Colorize;
use reconcile::{AutoConfirm, ExecuteSummary};
use std::thread;
use std::time::{Duration, Instant};

use super::{Session, http, pass};
use crate::Context;
use crate::cli::WatchArgs;
use crate::engine::{ApplyOptions, ClientFactory, Target};
use crate::ui;

pub fn run(ctx: &Context, args: WatchArgs) -> Result<()> {
    let interval = Duration::from_secs(args.interval.max(1));
    let timeout = Duration::from_secs(args.pass.timeout);
    let manifest = args.pass.manifest.clone();

    if !ctx.quiet {
        ui::header("metronome-sync watch");
        ui::kv("Interval", &format!("{}s", interval.as_secs()));
        ui::kv("Pass timeout", &format!("{}s", timeout.as_secs()));
    }

    let mut count: u64 = 0;
    loop {
        count += 1;
        let started = Instant::now();
        if !ctx.quiet {
            ui::section(&format!("Pass {} at {}", count, Local::now().format("%H:%M:%S")));
        }

        match tick(
            || Session::load(manifest.as_deref()),
            http(timeout),
            args.pass.jobs,
            timeout,
            ctx.quiet,
        ) {
            Ok(summary) => report(ctx, &summary),
            Err(e) => ui::error(&format!("Pass {count} failed: {e:#}")),
        }

        let wait = interval.saturating_sub(started.elapsed());
        log::debug!("next pass in {}s", wait.as_secs());
        thread::sleep(wait);
    }
}

/// One scheduled pass
fn tick<L, F>(
    load: L,
    factory: F,
    jobs: usize,
    timeout: Duration,
    quiet: bool,
) -> Result<ExecuteSummary>
where
    L: FnOnce() -> Result<Session>,
    F: ClientFactory,
{
    let mut session = load()?;
    let opts = ApplyOptions {
        dry_run: false,
        jobs,
        yes: true,
    };
    let report = pass(
        &mut session,
        factory,
        &Target::default(),
        &opts,
        timeout,
        quiet,
        &mut AutoConfirm,
    )?;
    Ok(report.summary())
}

fn report(ctx: &Context, summary: &ExecuteSummary) {
    if summary.failed > 0 {
        ui::warn(&format!(
            "{} changed, {} failed ({} will be retried)",
            summary.total_changes(),
            summary.failed.to_string().red(),
            summary.retryable
        ));
    } else if !ctx.quiet {
        ui::success(&format!(
            "{} changed, {} in sync",
            summary.total_changes(),
            summary.no_change
        ));
    }
}
