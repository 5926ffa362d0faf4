//! `agentsync import` / `agentsync export`: converge one side onto the other.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};
use tokio_util::sync::CancellationToken;

use agentsync_core::ArtifactStore;
use agentsync_sync::promote::PromotionStatus;
use agentsync_sync::{
    pipeline, ArtifactOutcome, Counts, Direction, Outcome, PromotionReport, Report, SyncRequest,
};

use super::RemoteArgs;

/// Arguments for `agentsync import`.
#[derive(Args, Debug)]
pub struct ImportArgs {
    #[command(flatten)]
    pub remote: RemoteArgs,

    /// Emit the report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl ImportArgs {
    pub fn run(self, root: &Path) -> Result<ExitCode> {
        run_sync(root, Direction::Import, &self.remote, false, self.json)
    }
}

/// Arguments for `agentsync export`.
#[derive(Args, Debug)]
pub struct ExportArgs {
    #[command(flatten)]
    pub remote: RemoteArgs,

    /// Promote every applied artifact from draft to live.
    #[arg(long)]
    pub deploy: bool,

    /// Emit the report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl ExportArgs {
    pub fn run(self, root: &Path) -> Result<ExitCode> {
        run_sync(root, Direction::Export, &self.remote, self.deploy, self.json)
    }
}

fn run_sync(
    root: &Path,
    direction: Direction,
    remote: &RemoteArgs,
    deploy: bool,
    json: bool,
) -> Result<ExitCode> {
    let config = remote.config(root)?;
    let store = ArtifactStore::from_config(root, &config);
    let request = SyncRequest {
        direction,
        scope: remote.kind,
        env: remote.env.clone(),
        deploy,
        concurrency: config.concurrency,
    };

    let runtime = super::runtime()?;
    let report = runtime.block_on(async {
        let client = remote.connect(root, &config).await?;
        let cancel = CancellationToken::new();
        let watcher = super::cancel_on_ctrl_c(cancel.clone());
        let result = pipeline::run(&store, client, &request, cancel).await;
        watcher.abort();
        result.with_context(|| format!("{direction} of {} failed", request.scope))
    })?;

    if json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ReportJson<'a> {
    direction: Direction,
    success: bool,
    counts: Counts,
    outcomes: &'a [ArtifactOutcome],
    #[serde(skip_serializing_if = "Option::is_none")]
    promotion: Option<&'a PromotionReport>,
}

fn print_json(report: &Report) -> Result<()> {
    let payload = ReportJson {
        direction: report.direction,
        success: report.is_success(),
        counts: report.counts(),
        outcomes: &report.outcomes,
        promotion: report.promotion.as_ref(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize report JSON")?
    );
    Ok(())
}

#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "ARTIFACT")]
    artifact: String,
    #[tabled(rename = "RESULT")]
    result: String,
    #[tabled(rename = "FINGERPRINT")]
    fingerprint: String,
    #[tabled(rename = "DETAIL")]
    detail: String,
}

fn print_report(report: &Report) {
    let counts = report.counts();
    let mark = if report.is_success() {
        "✓".green().bold()
    } else {
        "✗".red().bold()
    };
    println!(
        "{mark} {} {} ({} added, {} modified, {} unchanged, {} failed)",
        report.direction,
        if report.is_success() {
            "complete"
        } else {
            "finished with problems"
        },
        counts.added,
        counts.modified,
        counts.unchanged,
        counts.failed,
    );
    if counts.skipped_dependency > 0 {
        println!("  {} skipped: a dependency failed", counts.skipped_dependency);
    }
    if counts.removed_warned > 0 {
        println!(
            "  {} only at the {} side; left in place",
            counts.removed_warned,
            report.direction.destination_label()
        );
    }
    if counts.cancelled > 0 {
        println!("  {} cancelled before being submitted", counts.cancelled);
    }

    if report.outcomes.is_empty() {
        println!("Nothing to {}.", report.direction);
    } else {
        let rows: Vec<OutcomeRow> = report.outcomes.iter().map(outcome_row).collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }

    if let Some(promotion) = &report.promotion {
        print_promotion(promotion);
    }
}

fn outcome_row(entry: &ArtifactOutcome) -> OutcomeRow {
    let detail = match &entry.outcome {
        Outcome::Failed { error } => error.to_string(),
        Outcome::SkippedDependencyFailed { dependency } => format!("{dependency} failed"),
        Outcome::RemovedWarned => "not deleted".to_string(),
        Outcome::Cancelled => "interrupted".to_string(),
        Outcome::Applied { .. } | Outcome::Unchanged => entry
            .state
            .map(|state| state.to_string())
            .unwrap_or_default(),
    };
    OutcomeRow {
        artifact: entry.id.to_string(),
        result: entry.outcome.label().to_string(),
        fingerprint: entry
            .fingerprint
            .as_ref()
            .map(|fp| fp.short().to_string())
            .unwrap_or_default(),
        detail,
    }
}

fn print_promotion(promotion: &PromotionReport) {
    let promoted = promotion.count(|s| matches!(s, PromotionStatus::Promoted));
    let already = promotion.count(|s| matches!(s, PromotionStatus::AlreadyLive));
    let failed = promotion.count(|s| matches!(s, PromotionStatus::Failed { .. }));
    println!(
        "Deploy: {promoted} promoted, {already} already live, {failed} failed"
    );
    for outcome in &promotion.outcomes {
        match &outcome.status {
            PromotionStatus::Failed { error } => {
                println!("  {} {}: {error}", "✗".red(), outcome.id);
            }
            PromotionStatus::Cancelled => {
                println!("  {} {}: cancelled", "·".bright_black(), outcome.id);
            }
            PromotionStatus::Promoted | PromotionStatus::AlreadyLive => {}
        }
    }
}
