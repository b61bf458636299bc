//! Terminal rendering of customizer diffs and apply summaries.

use colored::Colorize;
use declarative::{DiffReport, DiffSummary, ExecuteSummary, ResourceDiff, ResourceState};
use similar::{ChangeTag, TextDiff};
use std::fmt::Write as _;

const RULE: &str = "─────────────────────────────────────────────────────";

/// Render the diff box; an empty report renders as "No changes needed".
pub fn format_diff(report: &DiffReport) -> String {
    let mut out = String::new();
    if report.diffs.is_empty() && report.errors.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "  {} No changes needed", "✓".green());
        return out;
    }

    // Group by resource type, keeping plan order
    let mut by_type: Vec<(&str, Vec<&ResourceDiff>)> = Vec::new();
    for diff in &report.diffs {
        match by_type.iter_mut().find(|(t, _)| *t == diff.resource_type) {
            Some((_, group)) => group.push(diff),
            None => by_type.push((diff.resource_type.as_str(), vec![diff])),
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "┌─ {} ─────────────────────────────────────────┐", "Configuration Diff".bold());
    let _ = writeln!(out, "│");

    for (resource_type, diffs) in &by_type {
        let _ = writeln!(out, "│ {}", resource_type.bold());
        for diff in diffs {
            let symbol = if diff.is_addition() {
                "+".green()
            } else if diff.is_modification() {
                "~".yellow()
            } else {
                "?".dimmed()
            };
            let _ = writeln!(
                out,
                "│   {} {:<30} {}",
                symbol,
                diff.resource_id,
                diff.description.dimmed()
            );
            if let ResourceState::Modified { from, to } = &diff.current {
                write_text_diff(&mut out, from, to);
            }
        }
        let _ = writeln!(out, "│");
    }

    if !report.errors.is_empty() {
        let _ = writeln!(out, "│ {}", "Unreadable".red().bold());
        for error in &report.errors {
            let _ = writeln!(
                out,
                "│   {} {} {}",
                "✗".red(),
                error.resource_id,
                error.error.dimmed()
            );
        }
        let _ = writeln!(out, "│");
    }

    let summary = DiffSummary::from_diffs(&report.diffs);
    let _ = writeln!(out, "├{RULE}┤");
    let _ = writeln!(
        out,
        "│ Summary: {} changes ({} to create, {} to modify)",
        report.diffs.len().to_string().bold(),
        summary.additions.to_string().green(),
        summary.modifications.to_string().yellow()
    );
    let _ = writeln!(out, "└{RULE}┘");
    out
}

/// Line diff of two text blocks, indented inside the diff box.
fn write_text_diff(out: &mut String, from: &str, to: &str) {
    let diff = TextDiff::from_lines(from, to);
    for change in diff.iter_all_changes() {
        let line = change.value().trim_end_matches('\n');
        match change.tag() {
            ChangeTag::Delete => {
                let _ = writeln!(out, "│     {}", format!("- {line}").red());
            }
            ChangeTag::Insert => {
                let _ = writeln!(out, "│     {}", format!("+ {line}").green());
            }
            ChangeTag::Equal => {}
        }
    }
}

/// Final apply summary.
pub fn format_summary(summary: &ExecuteSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out);
    if summary.is_success() {
        let _ = writeln!(out, "  {} Configuration applied successfully!", "✓".green().bold());
    } else {
        let _ = writeln!(out, "  {} Configuration applied with errors", "⚠".yellow().bold());
    }
    if summary.created > 0 {
        let _ = writeln!(out, "    • {} resources created", summary.created);
    }
    if summary.modified > 0 {
        let _ = writeln!(out, "    • {} resources modified", summary.modified);
    }
    if summary.no_change > 0 {
        let _ = writeln!(out, "    • {} resources unchanged", summary.no_change);
    }
    if summary.skipped > 0 {
        let _ = writeln!(out, "    • {} resources skipped", summary.skipped);
    }
    if summary.failed > 0 {
        let _ = writeln!(out, "    • {} {} failed", summary.failed, "resources".red());
    }
    out
}
