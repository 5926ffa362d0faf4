//! Offline status: the local tree against the ledger of the last sync.
//!
//! Signal precedence for the overall summary:
//! 1. `NeverSynced` (ledger missing or empty)
//! 2. `Modified` (local fingerprint differs from the recorded one)
//! 3. `Missing` (recorded but no longer in the tree)
//! 4. `Untracked` (in the tree but never synced)
//! 5. `Current`

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use agentsync_core::{ArtifactId, ArtifactKind, ArtifactStore, DeploymentState, Fingerprint};

use crate::direction::Direction;
use crate::error::SyncError;
use crate::ledger::{self, Ledger};
use crate::report::serialize_display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    NeverSynced,
    Current,
    Modified,
    Untracked,
    Missing,
}

impl Signal {
    /// Lower is more significant.
    fn rank(self) -> u8 {
        match self {
            Signal::NeverSynced => 0,
            Signal::Modified => 1,
            Signal::Missing => 2,
            Signal::Untracked => 3,
            Signal::Current => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Signal::NeverSynced => "never synced",
            Signal::Current => "current",
            Signal::Modified => "modified",
            Signal::Untracked => "untracked",
            Signal::Missing => "missing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactStatus {
    #[serde(serialize_with = "serialize_display")]
    pub id: ArtifactId,
    pub signal: Signal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local: Option<Fingerprint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recorded: Option<Fingerprint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<DeploymentState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    /// Why a local artifact could not be fingerprinted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub env: String,
    pub synced_at: Option<DateTime<Utc>>,
    pub artifacts: Vec<ArtifactStatus>,
}

impl StatusReport {
    /// The most significant signal over every artifact.
    pub fn overall(&self) -> Signal {
        if self.synced_at.is_none() {
            return Signal::NeverSynced;
        }
        self.artifacts
            .iter()
            .map(|a| a.signal)
            .min_by_key(|s| s.rank())
            .unwrap_or(Signal::Current)
    }

    pub fn count(&self, signal: Signal) -> usize {
        self.artifacts.iter().filter(|a| a.signal == signal).count()
    }
}

/// Compare every local artifact with the ledger for `env`. Never touches
/// the network.
pub fn check(store: &ArtifactStore, env: &str) -> Result<StatusReport, SyncError> {
    let ledger = ledger::load_at(store.root(), env)?;
    let mut artifacts = Vec::new();
    for kind in ArtifactKind::all() {
        artifacts.extend(check_kind(store, *kind, &ledger)?);
    }
    artifacts.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(StatusReport {
        env: env.to_string(),
        synced_at: if ledger.is_empty() {
            None
        } else {
            ledger.synced_at
        },
        artifacts,
    })
}

fn check_kind(
    store: &ArtifactStore,
    kind: ArtifactKind,
    ledger: &Ledger,
) -> Result<Vec<ArtifactStatus>, SyncError> {
    let listing = store
        .list(kind)
        .map_err(|source| SyncError::LocalEnumerate { kind, source })?;
    let never_synced = ledger.is_empty();
    let mut seen = BTreeSet::new();
    let mut statuses = Vec::new();

    for artifact in listing.artifacts.iter() {
        seen.insert(artifact.id.to_string());
        let recorded = ledger.get(&artifact.id);
        let signal = match recorded {
            _ if never_synced => Signal::NeverSynced,
            None => Signal::Untracked,
            Some(entry) if entry.fingerprint == artifact.fingerprint => Signal::Current,
            Some(_) => Signal::Modified,
        };
        statuses.push(ArtifactStatus {
            id: artifact.id.clone(),
            signal,
            local: Some(artifact.fingerprint.clone()),
            recorded: recorded.map(|e| e.fingerprint.clone()),
            state: recorded.map(|e| e.state),
            direction: recorded.map(|e| e.direction),
            detail: None,
        });
    }

    for invalid in &listing.invalid {
        seen.insert(invalid.id.to_string());
        let recorded = ledger.get(&invalid.id);
        let signal = match recorded {
            _ if never_synced => Signal::NeverSynced,
            None => Signal::Untracked,
            Some(_) => Signal::Modified,
        };
        statuses.push(ArtifactStatus {
            id: invalid.id.clone(),
            signal,
            local: None,
            recorded: recorded.map(|e| e.fingerprint.clone()),
            state: recorded.map(|e| e.state),
            direction: recorded.map(|e| e.direction),
            detail: Some(invalid.error.to_string()),
        });
    }

    let prefix = format!("{kind}/");
    for (key, entry) in &ledger.entries {
        let Some(name) = key.strip_prefix(&prefix) else {
            continue;
        };
        if seen.contains(key) {
            continue;
        }
        statuses.push(ArtifactStatus {
            id: ArtifactId::new(kind, name),
            signal: Signal::Missing,
            local: None,
            recorded: Some(entry.fingerprint.clone()),
            state: Some(entry.state),
            direction: Some(entry.direction),
            detail: None,
        });
    }
    Ok(statuses)
}

/// `check` for the project at `root` with default layout.
pub fn check_at(root: &Path, env: &str) -> Result<StatusReport, SyncError> {
    check(&ArtifactStore::new(root), env)
}

/// Format age from a chrono timestamp (ledger `synced_at`).
pub fn format_datetime_age(timestamp: DateTime<Utc>) -> String {
    let now = Utc::now();
    let age = now.signed_duration_since(timestamp).num_seconds().max(0) as u64;
    format_seconds(age)
}

fn format_seconds(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}
