use anyhow::Result;
use colored::Colorize;
use reconcile::Condition;

use super::Session;
use crate::Context;
use crate::cli::StatusArgs;
use crate::engine::Target;
use crate::kinds::Kind;
use crate::state::ResourceState;
use crate::ui;

pub fn run(ctx: &Context, args: StatusArgs) -> Result<()> {
    let target = Target::parse(args.target.as_deref())?;
    let session = Session::load(args.manifest.as_deref())?;

    ui::header("metronome-sync status");
    ui::kv("Manifest", &session.manifest_path.display().to_string());
    ui::kv("State", &session.state_path.display().to_string());
    ui::kv(
        "Last pass",
        &session
            .state
            .last_updated
            .format("%Y-%m-%d %H:%M:%S UTC")
            .to_string(),
    );

    let inventory = session.inventory();
    let rows = rows(&session, &inventory, &target);

    for kind in Kind::ALL {
        let kind_rows: Vec<&Row> = rows.iter().filter(|r| r.kind == kind).collect();
        if kind_rows.is_empty() {
            continue;
        }

        ui::section(kind.name());
        for row in kind_rows {
            println!(
                "  {} {:<28} {:<40} {}",
                row.symbol(),
                row.name,
                row.external_name.as_deref().unwrap_or("-").dimmed(),
                row.state_label()
            );
            if let Some(message) = &row.message
                && (ctx.verbose > 0 || !row.synced)
            {
                println!("      {}", message.red());
            }
        }
    }

    let unhealthy = rows.iter().filter(|r| !r.ready || !r.synced).count();
    println!();
    if rows.is_empty() {
        ui::info("Nothing declared or tracked");
    } else if unhealthy == 0 {
        ui::success(&format!("All {} resources ready and synced", rows.len()));
    } else {
        ui::warn(&format!(
            "{} of {} need attention",
            unhealthy,
            ui::count(rows.len(), "resource")
        ));
    }
    Ok(())
}

/// One line of the status table
#[derive(Debug)]
struct Row {
    kind: Kind,
    name: String,
    external_name: Option<String>,
    tracked: bool,
    deleting: bool,
    ready: bool,
    synced: bool,
    message: Option<String>,
}

impl Row {
    fn symbol(&self) -> colored::ColoredString {
        if self.deleting {
            "-".red()
        } else if !self.tracked {
            "+".green()
        } else if self.ready && self.synced {
            "✓".green()
        } else {
            "✗".red()
        }
    }

    fn state_label(&self) -> String {
        if self.deleting {
            "pending deletion".red().to_string()
        } else if !self.tracked {
            "not yet applied".yellow().to_string()
        } else {
            format!("Ready={} Synced={}", ui::flag(self.ready), ui::flag(self.synced))
        }
    }
}

fn is_true(condition: Option<&Condition>) -> bool {
    condition.is_some_and(|c| c.status)
}

fn rows(session: &Session, inventory: &crate::engine::Inventory, target: &Target) -> Vec<Row> {
    let mut rows = Vec::new();
    let deleting = inventory.deleting(target);

    for kind in Kind::ALL {
        let declared: Vec<&str> = declared_names(session, kind);
        for name in declared {
            if !target.matches(kind, name) {
                continue;
            }
            let key = format!("{}/{}", kind.name(), name);
            rows.push(row(kind, name, session.state.get(&key), false));
        }
    }

    for key in deleting {
        if let Some(tracked) = session.state.get(&key)
            && let Some(kind) = Kind::parse(&tracked.kind)
        {
            rows.push(row(kind, &tracked.name, Some(tracked), true));
        }
    }

    rows.sort_by(|a, b| (a.kind, &a.name).cmp(&(b.kind, &b.name)));
    rows
}

fn declared_names(session: &Session, kind: Kind) -> Vec<&str> {
    let manifest = &session.manifest;
    let mut names: Vec<&str> = match kind {
        Kind::BillableMetric => manifest.billable_metric.iter().map(|e| e.name.as_str()).collect(),
        Kind::CustomFieldKey => manifest
            .custom_field_key
            .iter()
            .map(|e| e.name.as_str())
            .collect(),
        Kind::Product => manifest.product.iter().map(|e| e.name.as_str()).collect(),
        Kind::RateCard => manifest.rate_card.iter().map(|e| e.name.as_str()).collect(),
        Kind::Rate => manifest.rate.iter().map(|e| e.name.as_str()).collect(),
    };
    names.sort_unstable();
    names
}

fn row(kind: Kind, name: &str, tracked: Option<&ResourceState>, deleting: bool) -> Row {
    let conditions = tracked.map(|t| &t.conditions);
    Row {
        kind,
        name: name.to_string(),
        external_name: tracked.and_then(|t| t.external_name.clone()),
        tracked: tracked.is_some(),
        deleting,
        ready: is_true(conditions.and_then(|c| c.ready.as_ref())),
        synced: is_true(conditions.and_then(|c| c.synced.as_ref())),
        message: conditions
            .and_then(|c| c.synced.as_ref())
            .and_then(|c| c.message.clone()),
    }
}
