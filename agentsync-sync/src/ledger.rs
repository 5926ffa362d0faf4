//! Sync ledger: what each environment looked like at the last run.
//!
//! Persists a [`Ledger`] JSON document at
//! `<root>/.agentsync/ledger/<env>.json`, written with the usual atomic
//! `.tmp` + rename. Entries are keyed by `<kind>/<name>` and only ever
//! updated for artifacts a run converged; everything else keeps its last
//! recorded fingerprint.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agentsync_core::{ArtifactId, DeploymentState, Fingerprint};

use crate::direction::Direction;
use crate::error::{io_err, SyncError};
use crate::report::Report;

/// Environment key used when no `--env` was given.
pub const DEFAULT_ENV: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub fingerprint: Fingerprint,
    #[serde(default)]
    pub state: DeploymentState,
    pub direction: Direction,
    pub synced_at: DateTime<Utc>,
}

/// On-disk ledger payload. `synced_at` is `None` until the first run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub entries: BTreeMap<String, LedgerEntry>,
}

impl Ledger {
    pub fn get(&self, id: &ArtifactId) -> Option<&LedgerEntry> {
        self.entries.get(&id.to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record every converged artifact of `report` as of `now`.
    pub fn record(&mut self, report: &Report, now: DateTime<Utc>) {
        let live: Vec<&ArtifactId> = report
            .promotion
            .as_ref()
            .map(|p| p.live().collect())
            .unwrap_or_default();

        for outcome in &report.outcomes {
            if !outcome.outcome.is_converged() {
                continue;
            }
            let Some(fingerprint) = outcome.fingerprint.clone() else {
                continue;
            };
            let state = if live.contains(&&outcome.id) {
                DeploymentState::Live
            } else {
                outcome.state.unwrap_or_default()
            };
            self.entries.insert(
                outcome.id.to_string(),
                LedgerEntry {
                    fingerprint,
                    state,
                    direction: report.direction,
                    synced_at: now,
                },
            );
        }
        self.synced_at = Some(now);
    }
}

/// Key for `env`, with path separators replaced.
pub fn env_key(env: Option<&str>) -> String {
    env.filter(|e| !e.is_empty())
        .unwrap_or(DEFAULT_ENV)
        .replace(['/', '\\'], "_")
}

/// `<root>/.agentsync/ledger/<env>.json`: pure, no I/O.
pub fn ledger_path_at(root: &Path, env: &str) -> PathBuf {
    root.join(".agentsync")
        .join("ledger")
        .join(format!("{env}.json"))
}

/// Load the ledger for `env`; an empty ledger if none was saved yet.
pub fn load_at(root: &Path, env: &str) -> Result<Ledger, SyncError> {
    let path = ledger_path_at(root, env);
    if !path.exists() {
        return Ok(Ledger::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    Ok(serde_json::from_str(&contents)?)
}

/// Save the ledger for `env` atomically.
pub fn save_at(root: &Path, env: &str, ledger: &Ledger) -> Result<(), SyncError> {
    let path = ledger_path_at(root, env);
    let Some(dir) = path.parent() else {
        return Err(io_err(path, std::io::Error::other("invalid ledger path")));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let json = serde_json::to_string_pretty(ledger)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, &path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(&path, e));
    }
    Ok(())
}

/// Load, fold `report` in, save.
pub fn update_at(root: &Path, env: &str, report: &Report) -> Result<Ledger, SyncError> {
    let mut ledger = load_at(root, env)?;
    ledger.record(report, Utc::now());
    save_at(root, env, &ledger)?;
    tracing::debug!(env, path = %ledger_path_at(root, env).display(), "ledger updated");
    Ok(ledger)
}
