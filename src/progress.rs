//! Progress indicators for the beehive CLI.

use colored::Colorize;
use declarative::{ApplyResult, DiffReport, ProgressCallback};
use indicatif::{ProgressBar, ProgressStyle};

/// A counted progress bar on stderr
pub fn bar(len: u64, msg: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb.set_prefix(msg.to_string());
    pb
}

/// Symbol for an apply result
pub fn result_symbol(result: &ApplyResult) -> &'static str {
    match result {
        ApplyResult::NoChange => "○",
        ApplyResult::Created | ApplyResult::Modified => "✓",
        ApplyResult::Failed { .. } => "✗",
        ApplyResult::Skipped { .. } => "⊘",
    }
}

/// Per-stage progress bars for customizer runs
///
/// Failures are printed above the bar as they happen so they survive
/// `finish_and_clear`.
#[derive(Default)]
pub struct StageProgress {
    current: Option<ProgressBar>,
}

impl StageProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressCallback for StageProgress {
    fn on_diff(&mut self, report: &DiffReport) {
        print!("{}", crate::customize::display::format_diff(report));
    }

    fn on_stage_start(&mut self, stage: &str, count: usize) {
        println!();
        println!("  {} Applying {} ({})", "→".cyan(), stage.bold(), count);
        self.current = Some(bar(count as u64, stage));
    }

    fn on_resource_start(&mut self, id: &str, _description: &str) {
        if let Some(pb) = &self.current {
            pb.set_message(id.to_string());
        }
    }

    fn on_resource_complete(&mut self, id: &str, result: &ApplyResult) {
        let Some(pb) = &self.current else {
            return;
        };
        match result {
            ApplyResult::Failed { error } => pb.suspend(|| {
                println!("    {} {} ({})", "✗".red(), id, error);
            }),
            ApplyResult::Skipped { reason } => pb.suspend(|| {
                println!("    {} {} ({})", "⊘".dimmed(), id, reason.dimmed());
            }),
            _ => {}
        }
        pb.set_message(format!("{} {}", result_symbol(result), id));
        pb.inc(1);
    }

    fn on_stage_complete(&mut self) {
        if let Some(pb) = self.current.take() {
            pb.finish_and_clear();
        }
    }
}
