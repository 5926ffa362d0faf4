//! Applying a diff to its destination.
//!
//! Each Added/Modified entry is one independent write; a failure is recorded
//! against that artifact and the batch carries on. Agents are checked against
//! a [`DependencyContext`] built from the tool phase before they are written:
//!
//! 1. a tool dependency that failed in this run → `SkippedDependencyFailed`
//! 2. a tool dependency that was cancelled in this run → `Cancelled`
//! 3. a tool dependency nobody has → `Failed(DependencyUnresolved)`
//! 4. otherwise the agent is written like any other artifact
//!
//! Once the cancel token fires, nothing else is checked: every entry still
//! waiting to be written is `Cancelled`.
//!
//! Collaborator agents are recorded as dependencies but not enforced.

use std::collections::BTreeSet;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use agentsync_core::{
    Artifact, ArtifactError, ArtifactId, ArtifactKind, ArtifactName, DeploymentState, Fingerprint,
};

use crate::diff::{Change, Diff, DiffEntry};
use crate::direction::Direction;
use crate::report::{ArtifactOutcome, Outcome, Report};
use crate::side::ArtifactSide;

// ---------------------------------------------------------------------------
// Dependencies
// ---------------------------------------------------------------------------

/// Which tools an agent may reference in this run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyContext {
    available: BTreeSet<ArtifactName>,
    failed: BTreeSet<ArtifactName>,
    cancelled: BTreeSet<ArtifactName>,
}

impl DependencyContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tools that resolve regardless of this run: already at the destination,
    /// or managed by the platform.
    pub fn with_available(mut self, names: impl IntoIterator<Item = ArtifactName>) -> Self {
        self.available.extend(names);
        self
    }

    /// Fold in the tool phase: converged tools resolve, cancelled tools are
    /// kept apart, anything else counts as failed in this batch.
    pub fn record_tool_phase(&mut self, report: &Report) {
        for entry in &report.outcomes {
            if entry.id.kind != ArtifactKind::Tool {
                continue;
            }
            match &entry.outcome {
                Outcome::Applied { .. } | Outcome::Unchanged => {
                    self.available.insert(entry.id.name.clone());
                }
                Outcome::RemovedWarned => {}
                Outcome::Cancelled => {
                    self.cancelled.insert(entry.id.name.clone());
                }
                Outcome::Failed { .. } | Outcome::SkippedDependencyFailed { .. } => {
                    self.failed.insert(entry.id.name.clone());
                }
            }
        }
    }

    pub fn mark_failed(&mut self, name: ArtifactName) {
        self.failed.insert(name);
    }

    /// `Err` with the blocking outcome if `artifact` must not be written.
    pub fn check(&self, artifact: &Artifact) -> Result<(), Outcome> {
        for tool in artifact.tool_dependencies() {
            if self.failed.contains(tool) {
                return Err(Outcome::SkippedDependencyFailed {
                    dependency: ArtifactId::tool(tool.clone()),
                });
            }
        }
        if artifact
            .tool_dependencies()
            .any(|tool| self.cancelled.contains(tool))
        {
            return Err(Outcome::Cancelled);
        }
        for tool in artifact.tool_dependencies() {
            if !self.available.contains(tool) {
                return Err(Outcome::Failed {
                    error: ArtifactError::DependencyUnresolved(ArtifactId::tool(tool.clone())),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Applies one-directional convergence with bounded concurrency.
#[derive(Debug, Clone)]
pub struct Reconciler {
    direction: Direction,
    concurrency: usize,
    cancel: CancellationToken,
}

impl Reconciler {
    pub fn new(direction: Direction, concurrency: usize, cancel: CancellationToken) -> Self {
        Self {
            direction,
            concurrency: concurrency.max(1),
            cancel,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Converge `destination` towards the source side of `diff`.
    ///
    /// Never fails as a whole; every entry ends in exactly one outcome.
    /// Entries not yet submitted when the cancel token fires are `Cancelled`;
    /// writes already running are allowed to finish.
    pub async fn apply(
        &self,
        diff: Diff,
        destination: &dyn ArtifactSide,
        deps: &DependencyContext,
    ) -> Report {
        let mut report = Report::new(self.direction);
        let mut pending = Vec::new();

        for entry in diff.into_entries() {
            match entry.change {
                Change::Unchanged => {
                    let outcome = self.settled(&entry, Outcome::Unchanged);
                    report.push(outcome);
                }
                Change::Removed => {
                    tracing::warn!(
                        artifact = %entry.id,
                        side = destination.label(),
                        "only present at the destination; not deleting"
                    );
                    report.push(ArtifactOutcome::new(entry.id, Outcome::RemovedWarned));
                }
                Change::Added | Change::Modified => {
                    let Some(source) = entry.source.clone() else {
                        tracing::error!(artifact = %entry.id, "no source content to write");
                        let error = ArtifactError::Validation(format!(
                            "{} has no source content to write",
                            entry.id
                        ));
                        report.push(self.settled(&entry, Outcome::Failed { error }));
                        continue;
                    };
                    if self.cancel.is_cancelled() {
                        report.push(self.settled(&entry, Outcome::Cancelled));
                        continue;
                    }
                    match deps.check(&source) {
                        Ok(()) => pending.push((entry, source)),
                        Err(outcome) => {
                            log_blocked(&entry.id, &outcome);
                            let outcome = self.settled(&entry, outcome);
                            report.push(outcome);
                        }
                    }
                }
            }
        }

        let cancel = &self.cancel;
        let written: Vec<ArtifactOutcome> = stream::iter(pending)
            .map(|(entry, source)| async move {
                if cancel.is_cancelled() {
                    return ArtifactOutcome::new(entry.id.clone(), Outcome::Cancelled)
                        .with_fingerprint(Some(source.fingerprint));
                }
                let outcome = match destination.write(&source).await {
                    Ok(()) => {
                        tracing::info!(
                            artifact = %entry.id,
                            change = entry.change.as_str(),
                            side = destination.label(),
                            "applied"
                        );
                        Outcome::Applied {
                            change: entry.change,
                        }
                    }
                    Err(error) => {
                        tracing::error!(artifact = %entry.id, error = %error, "apply failed");
                        Outcome::Failed { error }
                    }
                };
                self.settled(&entry, outcome)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        report.outcomes.extend(written);
        report.outcomes.sort_by(|a, b| a.id.cmp(&b.id));
        report
    }

    /// Outcome with the fingerprint and resulting remote state filled in.
    fn settled(&self, entry: &DiffEntry, outcome: Outcome) -> ArtifactOutcome {
        let state = match self.direction {
            Direction::Import => entry.source.as_ref().map(|a| a.state),
            Direction::Export => match (&outcome, &entry.destination) {
                (Outcome::Applied { .. } | Outcome::Unchanged, Some(existing)) => {
                    Some(existing.state)
                }
                (Outcome::Applied { .. }, None) => Some(DeploymentState::Draft),
                (_, existing) => existing.as_ref().map(|a| a.state),
            },
        };
        ArtifactOutcome::new(entry.id.clone(), outcome)
            .with_fingerprint(source_fingerprint(entry))
            .with_state(state)
    }
}

fn source_fingerprint(entry: &DiffEntry) -> Option<Fingerprint> {
    entry.source.as_ref().map(|a| a.fingerprint.clone())
}

fn log_blocked(id: &ArtifactId, outcome: &Outcome) {
    match outcome {
        Outcome::SkippedDependencyFailed { dependency } => {
            tracing::warn!(artifact = %id, dependency = %dependency, "skipped: dependency failed");
        }
        Outcome::Failed { error } => {
            tracing::error!(artifact = %id, error = %error, "not applied");
        }
        Outcome::Cancelled => {
            tracing::debug!(artifact = %id, "cancelled with its dependency");
        }
        _ => {}
    }
}
