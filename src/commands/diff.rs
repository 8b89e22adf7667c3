use anyhow::Result;
use reconcile::CancelToken;
use std::time::Duration;

use super::{Session, http};
use crate::Context;
use crate::cli::DiffArgs;
use crate::config::Credentials;
use crate::engine::differ::display_diff;
use crate::engine::{Engine, Target};
use crate::state::UsageLog;
use crate::ui;

pub fn run(ctx: &Context, args: DiffArgs) -> Result<()> {
    let target = Target::parse(args.target.as_deref())?;
    let session = Session::load(args.pass.manifest.as_deref())?;
    let timeout = Duration::from_secs(args.pass.timeout);

    let usage = UsageLog::new();
    let engine = Engine::new(&session.config, &usage, &Credentials, http(timeout));
    let inventory = session.inventory();

    if !ctx.quiet {
        ui::header("metronome-sync diff");
        ui::kv("Manifest", &session.manifest_path.display().to_string());
    }

    let planned = engine.plan(
        &inventory,
        &target,
        args.pass.jobs,
        &CancelToken::with_timeout(timeout),
    )?;
    display_diff(&planned, ctx.verbose > 0);
    Ok(())
}
