//! Execution front end - event sinks and confirmation with UI integration

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use declarative::{
    CancelToken, ConfirmCallback, EventSink, OperationEvent, OperationStatus, RunReport,
};
use dialoguer::Confirm;
use indicatif::ProgressBar;

use crate::ui;

/// Prints one line per finished operation above a progress bar
pub struct HumanSink {
    bar: ProgressBar,
    quiet: bool,
}

impl HumanSink {
    pub fn new(bar: ProgressBar, quiet: bool) -> Self {
        Self { bar, quiet }
    }

    fn line(&self, line: String) {
        if self.quiet {
            return;
        }
        // A hidden bar (no terminal) swallows println
        if self.bar.is_hidden() {
            println!("{line}");
        } else {
            self.bar.println(line);
        }
    }
}

impl EventSink for HumanSink {
    fn emit(&self, event: &OperationEvent) {
        match event.status {
            OperationStatus::Pending => {}
            OperationStatus::Running => {
                self.bar
                    .set_message(format!("{} {}", event.operation, event.resource));
            }
            OperationStatus::Succeeded | OperationStatus::Failed | OperationStatus::Skipped => {
                let detail = event
                    .detail
                    .as_deref()
                    .map(|d| format!(" ({})", ui::truncate(d, 80)))
                    .unwrap_or_default();
                self.line(format!(
                    "  {} {:<8} {}{}",
                    ui::status_symbol(event.status),
                    event.operation.to_string(),
                    event.resource,
                    detail.dimmed()
                ));
                self.bar.inc(1);
            }
        }
    }
}

/// Writes every event as one JSON object per line
pub struct JsonSink;

impl EventSink for JsonSink {
    fn emit(&self, event: &OperationEvent) {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(e) => log::warn!("Could not serialize event for {}: {}", event.resource, e),
        }
    }
}

/// Cancels the run after the first failure
///
/// Operations already running at the current level still finish.
pub struct FailFast<S> {
    inner: S,
    cancel: CancelToken,
}

impl<S: EventSink> FailFast<S> {
    pub fn new(inner: S, cancel: CancelToken) -> Self {
        Self { inner, cancel }
    }
}

impl<S: EventSink> EventSink for FailFast<S> {
    fn emit(&self, event: &OperationEvent) {
        self.inner.emit(event);
        if event.status == OperationStatus::Failed && !self.cancel.is_cancelled() {
            log::warn!("{} failed; not starting further levels", event.resource);
            self.cancel.cancel();
        }
    }
}

/// Confirmation gate: `--yes` answers for the user
pub struct Confirmation {
    pub assume_yes: bool,
}

impl ConfirmCallback for Confirmation {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        if self.assume_yes {
            return Ok(true);
        }

        Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .context("Confirmation needs an interactive terminal; pass --yes to skip it")
    }
}

/// Print final summary of a run
pub fn print_summary(report: &RunReport) {
    let summary = report.summary();
    println!();
    if report.cancelled() {
        println!("  {} Run cancelled before completion", "⚠".yellow().bold());
    } else if summary.is_success() {
        println!("  {} Changes applied successfully!", "✓".green().bold());
    } else {
        println!("  {} Changes applied with errors", "⚠".yellow().bold());
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
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
        for (line, advice) in failure_lines(report) {
            println!("      {} {}", "✗".red(), line);
            if let Some(advice) = advice {
                println!("        {}", advice.dimmed());
            }
        }
    }
}

/// One line per failed operation, with advice for its error category
fn failure_lines(report: &RunReport) -> Vec<(String, Option<&'static str>)> {
    report
        .failures()
        .map(|failure| {
            (
                format!(
                    "{}: {}",
                    failure.key,
                    failure.detail.as_deref().unwrap_or("unknown error")
                ),
                failure.category.map(|c| c.advice()),
            )
        })
        .collect()
}
