//! Diff display - metronome-sync specific UI

use colored::Colorize;
use reconcile::{Action, DiffSummary, ResourceDiff, group_by_kind};

use super::planner::Planned;
use crate::kinds::Kind;

/// Symbol shown in front of a planned resource
pub fn symbol(action: Action) -> colored::ColoredString {
    match action {
        Action::Create => "+".green(),
        Action::Update => "~".yellow(),
        Action::Delete => "-".red(),
        Action::None => "○".dimmed(),
    }
}

/// Color one line of a field diff
fn paint(line: &str) -> String {
    if line.starts_with('+') {
        line.green().to_string()
    } else if line.starts_with('-') {
        line.red().to_string()
    } else {
        line.dimmed().to_string()
    }
}

/// Display planned changes in a user-friendly format
pub fn display_diff(planned: &[Planned], verbose: bool) {
    let diffs: Vec<ResourceDiff> = planned
        .iter()
        .filter_map(|(_, r)| r.as_ref().ok())
        .filter(|d| verbose || d.action != Action::None)
        .cloned()
        .collect();
    let errors: Vec<(&str, String)> = planned
        .iter()
        .filter_map(|(key, r)| r.as_ref().err().map(|e| (key.as_str(), e.to_string())))
        .collect();

    if diffs.iter().all(|d| d.action == Action::None) && errors.is_empty() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    let by_kind = group_by_kind(&diffs);

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Metronome Diff".bold()
    );
    println!("│");

    for kind in Kind::ALL {
        let Some(kind_diffs) = by_kind.get(kind.name()) else {
            continue;
        };
        println!("│ {}", kind.name().bold());

        for diff in kind_diffs {
            let desc = match diff.action {
                Action::Create => "(not in Metronome)",
                Action::Update => "(drifted)",
                Action::Delete => "(removed from manifest)",
                Action::None => "(in sync)",
            };
            println!("│   {} {:<40} {}", symbol(diff.action), diff.key, desc.dimmed());

            if let Some(text) = &diff.diff {
                for line in text.lines().filter(|l| verbose || !l.starts_with(' ')) {
                    println!("│       {}", paint(line));
                }
            }
        }
        println!("│");
    }

    if !errors.is_empty() {
        println!("│ {}", "Cannot plan".red().bold());
        for (key, error) in &errors {
            println!("│   {} {:<40} {}", "!".red(), key, error.dimmed());
        }
        println!("│");
    }

    let summary = DiffSummary::from_diffs(&diffs);
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} changes ({} to create, {} to update, {} to delete)",
        summary.total().to_string().bold(),
        summary.additions.to_string().green(),
        summary.modifications.to_string().yellow(),
        summary.removals.to_string().red()
    );
    if !errors.is_empty() {
        println!("│          {} could not be planned", errors.len().to_string().red());
    }
    println!("└─────────────────────────────────────────────────────┘");
}
