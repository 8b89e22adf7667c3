use anyhow::{Result, bail};
use std::time::Duration;

use super::{Session, http, pass};
use crate::Context;
use crate::cli::ApplyArgs;
use crate::engine::executor::{Prompt, print_summary};
use crate::engine::{ApplyOptions, Target};
use crate::ui;

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let target = Target::parse(args.target.as_deref())?;
    let mut session = Session::load(args.pass.manifest.as_deref())?;

    if !ctx.quiet {
        ui::header("metronome-sync apply");
        ui::kv("Manifest", &session.manifest_path.display().to_string());
        ui::kv("State", &session.state_path.display().to_string());
    }

    let opts = ApplyOptions {
        dry_run: args.dry_run,
        jobs: args.pass.jobs,
        yes: args.yes,
    };
    let timeout = Duration::from_secs(args.pass.timeout);

    let report = pass(
        &mut session,
        http(timeout),
        &target,
        &opts,
        timeout,
        ctx.quiet,
        &mut Prompt,
    )?;

    let summary = report.summary();
    if !ctx.quiet {
        print_summary(&summary, opts.dry_run);
    }

    if !summary.is_success() {
        bail!("{} of {} resources failed", summary.failed, summary.total());
    }
    Ok(())
}
