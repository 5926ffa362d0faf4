//! Fingerprint diff between a source and a destination set, and unified
//! previews of what a convergence would write.

use serde::Serialize;
use similar::TextDiff;

use agentsync_core::{Artifact, ArtifactId, ArtifactKind, ArtifactSet};

use crate::direction::Direction;
use crate::error::SyncError;

/// Classification of one identity in the union of both sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Change {
    /// Source only.
    Added,
    /// Both sides, fingerprints differ.
    Modified,
    /// Both sides, identical fingerprints.
    Unchanged,
    /// Destination only. Reported, never deleted.
    Removed,
}

impl Change {
    /// The classification the same identity gets with the sides swapped.
    pub fn inverse(self) -> Self {
        match self {
            Change::Added => Change::Removed,
            Change::Removed => Change::Added,
            other => other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Change::Added => "added",
            Change::Modified => "modified",
            Change::Unchanged => "unchanged",
            Change::Removed => "removed",
        }
    }

    /// Added and Modified entries are written during convergence.
    pub fn needs_write(self) -> bool {
        matches!(self, Change::Added | Change::Modified)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    pub id: ArtifactId,
    pub change: Change,
    pub source: Option<Artifact>,
    pub destination: Option<Artifact>,
}

/// Diff of two sets of the same kind, ordered by identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff {
    kind: ArtifactKind,
    entries: Vec<DiffEntry>,
}

impl Diff {
    /// Entries are sorted by identity.
    pub(crate) fn from_entries(kind: ArtifactKind, mut entries: Vec<DiffEntry>) -> Self {
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        Self { kind, entries }
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    pub fn entries(&self) -> &[DiffEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<DiffEntry> {
        self.entries
    }

    pub fn get(&self, id: &ArtifactId) -> Option<&DiffEntry> {
        self.entries.iter().find(|entry| &entry.id == id)
    }

    pub fn change_of(&self, id: &ArtifactId) -> Option<Change> {
        self.get(id).map(|entry| entry.change)
    }

    pub fn count(&self, change: Change) -> usize {
        self.entries.iter().filter(|e| e.change == change).count()
    }

    /// `true` when there is nothing to write.
    pub fn is_converged(&self) -> bool {
        self.entries.iter().all(|e| !e.change.needs_write())
    }

    /// Drop entries for `ids`, e.g. source artifacts that failed to load and
    /// would otherwise show up as Removed.
    pub fn without(mut self, ids: &[ArtifactId]) -> Self {
        self.entries.retain(|entry| !ids.contains(&entry.id));
        self
    }
}

/// Classify every identity in `source ∪ destination`.
///
/// Pure: compares fingerprints only and touches neither side.
pub fn compute_diff(source: &ArtifactSet, destination: &ArtifactSet) -> Result<Diff, SyncError> {
    if source.kind() != destination.kind() {
        return Err(SyncError::KindMismatch {
            source_kind: source.kind(),
            destination_kind: destination.kind(),
        });
    }

    let mut entries = Vec::with_capacity(source.len().max(destination.len()));
    for artifact in source.iter() {
        let existing = destination.get(artifact.name());
        let change = match existing {
            None => Change::Added,
            Some(dest) if dest.fingerprint == artifact.fingerprint => Change::Unchanged,
            Some(_) => Change::Modified,
        };
        entries.push(DiffEntry {
            id: artifact.id.clone(),
            change,
            source: Some(artifact.clone()),
            destination: existing.cloned(),
        });
    }
    for artifact in destination.iter().filter(|a| !source.contains(a.name())) {
        entries.push(DiffEntry {
            id: artifact.id.clone(),
            change: Change::Removed,
            source: None,
            destination: Some(artifact.clone()),
        });
    }
    Ok(Diff::from_entries(source.kind(), entries))
}

// ---------------------------------------------------------------------------
// Preview
// ---------------------------------------------------------------------------

/// Unified diff of one artifact that a convergence would write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPreview {
    pub id: ArtifactId,
    pub change: Change,
    pub unified_diff: String,
}

/// Render unified diffs for every Added/Modified entry. Nothing is written.
///
/// The old side is the destination, the new side the source; headers read
/// like `local/tools/hello_world` and `remote/tools/hello_world`.
pub fn preview(diff: &Diff, direction: Direction) -> Vec<ArtifactPreview> {
    diff.entries()
        .iter()
        .filter(|entry| entry.change.needs_write())
        .map(|entry| {
            let old = entry
                .destination
                .as_ref()
                .map(Artifact::render_text)
                .unwrap_or_default();
            let new = entry
                .source
                .as_ref()
                .map(Artifact::render_text)
                .unwrap_or_default();
            let path = format!("{}/{}", entry.id.kind.plural(), entry.id.name);
            let old_header = format!("{}/{path}", direction.destination_label());
            let new_header = format!("{}/{path}", direction.source_label());
            let unified_diff = TextDiff::from_lines(&old, &new)
                .unified_diff()
                .header(&old_header, &new_header)
                .context_radius(3)
                .to_string();
            ArtifactPreview {
                id: entry.id.clone(),
                change: entry.change,
                unified_diff,
            }
        })
        .collect()
}
