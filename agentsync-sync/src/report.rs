//! Per-artifact outcomes and run totals.

use std::fmt::Display;

use serde::{Serialize, Serializer};

use agentsync_core::{ArtifactError, ArtifactId, DeploymentState, Fingerprint};

use crate::diff::Change;
use crate::direction::Direction;
use crate::promote::PromotionReport;

/// Terminal state of one artifact in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Written to the destination.
    Applied { change: Change },
    /// Identical on both sides; nothing written.
    Unchanged,
    /// Present only at the destination; left alone.
    RemovedWarned,
    Failed { error: ArtifactError },
    /// Never attempted because a dependency failed in the same run.
    SkippedDependencyFailed {
        #[serde(serialize_with = "serialize_display")]
        dependency: ArtifactId,
    },
    /// Never submitted because the run was interrupted.
    Cancelled,
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Outcome::Failed { .. } | Outcome::SkippedDependencyFailed { .. }
        )
    }

    /// Whether the destination now holds the source content.
    pub fn is_converged(&self) -> bool {
        matches!(self, Outcome::Applied { .. } | Outcome::Unchanged)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Applied { change: Change::Added } => "added",
            Outcome::Applied { .. } => "modified",
            Outcome::Unchanged => "unchanged",
            Outcome::RemovedWarned => "removed (kept)",
            Outcome::Failed { .. } => "failed",
            Outcome::SkippedDependencyFailed { .. } => "skipped",
            Outcome::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactOutcome {
    #[serde(serialize_with = "serialize_display")]
    pub id: ArtifactId,
    #[serde(flatten)]
    pub outcome: Outcome,
    /// Source fingerprint, absent for Removed entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
    /// Deployment state at the remote side after the run, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<DeploymentState>,
}

impl ArtifactOutcome {
    pub fn new(id: ArtifactId, outcome: Outcome) -> Self {
        Self {
            id,
            outcome,
            fingerprint: None,
            state: None,
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: Option<Fingerprint>) -> Self {
        self.fingerprint = fingerprint;
        self
    }

    pub fn with_state(mut self, state: Option<DeploymentState>) -> Self {
        self.state = state;
        self
    }
}

/// Totals over a report's outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub added: usize,
    pub modified: usize,
    pub unchanged: usize,
    pub removed_warned: usize,
    pub failed: usize,
    pub skipped_dependency: usize,
    pub cancelled: usize,
}

/// Result of one run: every artifact seen, in identity order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub direction: Direction,
    pub outcomes: Vec<ArtifactOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion: Option<PromotionReport>,
}

impl Report {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            outcomes: Vec::new(),
            promotion: None,
        }
    }

    pub fn push(&mut self, outcome: ArtifactOutcome) {
        self.outcomes.push(outcome);
    }

    /// Append another report's outcomes, keeping identity order.
    pub fn merge(&mut self, other: Report) {
        self.outcomes.extend(other.outcomes);
        self.outcomes.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(promotion) = other.promotion {
            self.promotion = Some(promotion);
        }
    }

    pub fn outcome_of(&self, id: &ArtifactId) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|o| &o.id == id)
            .map(|o| &o.outcome)
    }

    pub fn counts(&self) -> Counts {
        let mut counts = Counts::default();
        for entry in &self.outcomes {
            match &entry.outcome {
                Outcome::Applied {
                    change: Change::Added,
                } => counts.added += 1,
                Outcome::Applied { .. } => counts.modified += 1,
                Outcome::Unchanged => counts.unchanged += 1,
                Outcome::RemovedWarned => counts.removed_warned += 1,
                Outcome::Failed { .. } => counts.failed += 1,
                Outcome::SkippedDependencyFailed { .. } => counts.skipped_dependency += 1,
                Outcome::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }

    /// Identities written to the destination, in order.
    pub fn applied(&self) -> Vec<ArtifactId> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, Outcome::Applied { .. }))
            .map(|o| o.id.clone())
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ArtifactOutcome> {
        self.outcomes.iter().filter(|o| o.outcome.is_failure())
    }

    pub fn was_cancelled(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| matches!(o.outcome, Outcome::Cancelled))
    }

    /// Any artifact or promotion failure.
    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
            || self
                .promotion
                .as_ref()
                .is_some_and(PromotionReport::has_failures)
    }

    /// Zero failures and nothing left unprocessed.
    pub fn is_success(&self) -> bool {
        !self.has_failures() && !self.was_cancelled()
    }
}

pub(crate) fn serialize_display<T: Display, S: Serializer>(
    value: &T,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}
