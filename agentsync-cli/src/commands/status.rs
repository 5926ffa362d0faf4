//! `agentsync status`: local tree against the last recorded sync, offline.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use agentsync_core::{config, ArtifactStore};
use agentsync_sync::ledger;
use agentsync_sync::status::{self, format_datetime_age, ArtifactStatus, Signal, StatusReport};

/// Arguments for `agentsync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Environment whose ledger to compare against.
    #[arg(long)]
    pub env: Option<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, root: &Path) -> Result<ExitCode> {
        let config = config::load(root)
            .with_context(|| format!("failed to load config for {}", root.display()))?;
        let store = ArtifactStore::from_config(root, &config);
        let env = ledger::env_key(self.env.as_deref());

        let report = status::check(&store, &env)
            .with_context(|| format!("failed to check status for '{env}'"))?;
        if self.json {
            print_json(&report)?;
        } else {
            print_table(&report);
        }
        Ok(ExitCode::SUCCESS)
    }
}

#[derive(Serialize)]
struct StatusJson<'a> {
    env: &'a str,
    overall: Signal,
    synced_at: Option<String>,
    artifacts: &'a [ArtifactStatus],
}

fn print_json(report: &StatusReport) -> Result<()> {
    let payload = StatusJson {
        env: &report.env,
        overall: report.overall(),
        synced_at: report.synced_at.map(|at| at.to_rfc3339()),
        artifacts: &report.artifacts,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
    );
    Ok(())
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "ARTIFACT")]
    artifact: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "STATE")]
    state: String,
    #[tabled(rename = "LOCAL")]
    local: String,
    #[tabled(rename = "SYNCED")]
    recorded: String,
}

fn print_table(report: &StatusReport) {
    let last_sync = report
        .synced_at
        .map(|at| format!("last sync {} ago", format_datetime_age(at)))
        .unwrap_or_else(|| "never synced".to_string());
    println!(
        "agentsync v{} | env {} | {} | {} {}",
        env!("CARGO_PKG_VERSION"),
        report.env,
        last_sync,
        signal_indicator(report.overall()),
        signal_label(report.overall()),
    );

    if report.artifacts.is_empty() {
        println!("No agents or tools found.");
        return;
    }

    let rows: Vec<StatusRow> = report
        .artifacts
        .iter()
        .map(|entry| StatusRow {
            artifact: entry.id.to_string(),
            status: match &entry.detail {
                Some(detail) => format!("{} ({detail})", signal_label(entry.signal)),
                None => signal_label(entry.signal),
            },
            state: entry.state.map(|s| s.to_string()).unwrap_or_default(),
            local: entry
                .local
                .as_ref()
                .map(|fp| fp.short().to_string())
                .unwrap_or_default(),
            recorded: entry
                .recorded
                .as_ref()
                .map(|fp| fp.short().to_string())
                .unwrap_or_default(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    match report.overall() {
        Signal::NeverSynced => println!("Run 'agentsync export' or 'agentsync import' to sync."),
        Signal::Modified | Signal::Untracked => {
            println!("Run 'agentsync diff' to see pending changes.")
        }
        Signal::Missing | Signal::Current => {}
    }
}

fn signal_label(signal: Signal) -> String {
    signal.as_str().to_ascii_uppercase()
}

fn signal_indicator(signal: Signal) -> String {
    match signal {
        Signal::NeverSynced => "■".bright_black().bold().to_string(),
        Signal::Current => "■".green().bold().to_string(),
        Signal::Modified => "■".red().bold().to_string(),
        Signal::Untracked => "■".magenta().bold().to_string(),
        Signal::Missing => "■".yellow().bold().to_string(),
    }
}
