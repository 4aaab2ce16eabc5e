//! Execution engine - converge-specific executor with UI integration

use anyhow::Result;
use colored::Colorize;
use declarative::{
    Applier, ApplyResult, AutoConfirm, ChangeOperation, ConfirmCallback, ConvergencePlan,
    ExecuteOutcome, ExecuteSummary, ProgressCallback, ResourceRef,
};
use indicatif::ProgressBar;

use crate::progress;

use super::differ::{display_blocked, display_plan};

/// Options for execution (CLI-specific, includes `yes` for confirmation skip)
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Don't make changes, just show what would happen
    pub dry_run: bool,
    /// Number of parallel jobs
    pub jobs: usize,
    /// Skip confirmation prompts
    pub yes: bool,
    /// Hide progress output
    pub quiet: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 4,
            yes: false,
            quiet: false,
        }
    }
}

/// Execute the plan with the CLI's UI integration
pub fn execute<A>(plan: &ConvergencePlan, applier: &A, opts: &ExecuteOptions) -> Result<ExecuteOutcome>
where
    A: Applier + ?Sized,
{
    // 1. Display what will change
    display_plan(plan);
    display_blocked(&plan.blocked);

    if plan.is_empty() {
        return Ok(ExecuteOutcome::default());
    }

    let lib_opts = declarative::ExecuteOptions {
        dry_run: opts.dry_run,
        jobs: opts.jobs,
    };
    let mut progress = BarProgress::new(opts.quiet);

    // 2. Confirm (unless --yes) and apply
    let outcome = if opts.yes {
        declarative::execute(plan, applier, &lib_opts, &mut progress, &mut AutoConfirm)?
    } else {
        declarative::execute(plan, applier, &lib_opts, &mut progress, &mut DialoguerConfirm)?
    };

    if opts.dry_run {
        println!();
        println!("  {} Dry run - no changes made", "ℹ".blue());
        return Ok(outcome);
    }

    if outcome.summary.total_changes() == 0 && outcome.summary.failed == 0 {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(outcome);
    }

    // 3. Summary
    print_failures(&outcome);
    print_summary(&outcome.summary);

    Ok(outcome)
}

/// Reports applied operations on an indicatif bar
struct BarProgress {
    quiet: bool,
    bar: Option<ProgressBar>,
}

impl BarProgress {
    fn new(quiet: bool) -> Self {
        Self { quiet, bar: None }
    }
}

impl ProgressCallback for BarProgress {
    fn on_batch_start(&mut self, count: usize) {
        let bar = if self.quiet {
            progress::hidden()
        } else {
            progress::bar(count as u64, "Applying")
        };
        self.bar = Some(bar);
    }

    fn on_operation_complete(
        &mut self,
        resource: &ResourceRef,
        operation: &ChangeOperation,
        result: &ApplyResult,
    ) {
        let symbol = match result {
            ApplyResult::Created | ApplyResult::Modified | ApplyResult::Removed => "✓",
            ApplyResult::Failed { .. } => "✗",
            ApplyResult::Skipped { .. } => "⊘",
        };
        log::info!("{resource} {operation}: {result:?}");

        if let Some(bar) = &self.bar {
            bar.set_message(format!("{symbol} {resource}"));
            bar.inc(1);
        }
    }

    fn on_batch_complete(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

/// Asks on the terminal before applying
struct DialoguerConfirm;

impl ConfirmCallback for DialoguerConfirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        use dialoguer::Confirm;

        let confirmed = Confirm::new()
            .with_prompt(prompt)
            .default(true)
            .interact()?;

        Ok(confirmed)
    }
}

/// Print failed and skipped operations
fn print_failures(outcome: &ExecuteOutcome) {
    for report in &outcome.reports {
        match &report.result {
            ApplyResult::Failed { error } => {
                println!(
                    "    {} {} {}: {}",
                    "✗".red(),
                    report.resource,
                    report.operation,
                    error
                );
            }
            ApplyResult::Skipped { reason } => {
                println!(
                    "    {} {} {} ({})",
                    "⊘".dimmed(),
                    report.resource,
                    report.operation,
                    reason.dimmed()
                );
            }
            _ => {}
        }
    }
}

/// Print final summary
fn print_summary(summary: &ExecuteSummary) {
    println!();
    if summary.is_success() {
        println!("  {} Resources converged successfully!", "✓".green().bold());
    } else {
        println!("  {} Convergence finished with errors", "⚠".yellow().bold());
    }

    if summary.created > 0 {
        println!("    • {} resources created", summary.created);
    }
    if summary.modified > 0 {
        println!("    • {} properties updated", summary.modified);
    }
    if summary.removed > 0 {
        println!("    • {} resources removed", summary.removed);
    }
    if summary.skipped > 0 {
        println!("    • {} operations skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "operations".red());
    }
}
