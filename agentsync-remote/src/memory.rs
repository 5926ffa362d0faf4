//! In-process registry with draft/live state and fault injection.
//!
//! Behaves like the real service as far as the reconciler can tell: upserts
//! land as drafts (an existing artifact keeps its deployment state), promote
//! moves a draft to live, and the platform can hold managed artifacts that
//! show up in the catalog but are never exportable.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use agentsync_core::{
    Artifact, ArtifactError, ArtifactId, ArtifactKind, ArtifactName, DeploymentState,
    Fingerprint, Origin,
};

use crate::client::{CatalogEntry, PromoteOutcome, RegistryClient};
use crate::error::RemoteError;

/// Per-artifact registry operations, for fault injection and call logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Fetch,
    Upsert,
    Promote,
}

/// One recorded per-artifact call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub operation: Operation,
    pub id: ArtifactId,
}

#[derive(Debug, Clone)]
struct Entry {
    artifact: Artifact,
    /// Fingerprint of the content that was live at the last promote.
    live: Option<Fingerprint>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<ArtifactId, Entry>,
    managed: BTreeSet<ArtifactId>,
    faults: HashMap<(Operation, ArtifactId), ArtifactError>,
    catalog_fault: Option<String>,
    calls: Vec<Call>,
}

#[derive(Debug, Default)]
pub struct MemoryRegistry {
    inner: Mutex<Inner>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed an artifact as it would exist remotely. `Live` seeds count as
    /// promoted with their current content.
    pub fn insert(&self, artifact: Artifact) {
        let live = match artifact.state {
            DeploymentState::Live => Some(artifact.fingerprint.clone()),
            DeploymentState::Draft => None,
        };
        let origin = Origin::Remote(artifact.id.name.to_string());
        let artifact = artifact.with_origin(origin);
        self.lock()
            .entries
            .insert(artifact.id.clone(), Entry { artifact, live });
    }

    /// Register a platform-managed artifact (e.g. an MCP-bound tool).
    pub fn insert_managed(&self, id: ArtifactId) {
        self.lock().managed.insert(id);
    }

    /// Make every future `operation` on `id` fail with `error`.
    pub fn fail_on(&self, operation: Operation, id: ArtifactId, error: ArtifactError) {
        self.lock().faults.insert((operation, id), error);
    }

    /// Make every future catalog call fail.
    pub fn fail_catalog(&self, reason: impl Into<String>) {
        self.lock().catalog_fault = Some(reason.into());
    }

    pub fn get(&self, id: &ArtifactId) -> Option<Artifact> {
        self.lock().entries.get(id).map(|entry| entry.artifact.clone())
    }

    pub fn state(&self, id: &ArtifactId) -> Option<DeploymentState> {
        self.lock().entries.get(id).map(|entry| entry.artifact.state)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Every per-artifact call made so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Number of `operation` calls made for `id`.
    pub fn call_count(&self, operation: Operation, id: &ArtifactId) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.operation == operation && &call.id == id)
            .count()
    }

    /// Record the call and return the injected fault, if any.
    fn enter(
        &self,
        operation: Operation,
        id: &ArtifactId,
    ) -> Result<MutexGuard<'_, Inner>, ArtifactError> {
        let mut inner = self.lock();
        inner.calls.push(Call {
            operation,
            id: id.clone(),
        });
        if let Some(error) = inner.faults.get(&(operation, id.clone())) {
            return Err(error.clone());
        }
        Ok(inner)
    }
}

#[async_trait]
impl RegistryClient for MemoryRegistry {
    async fn catalog(&self, kind: ArtifactKind) -> Result<Vec<CatalogEntry>, RemoteError> {
        let inner = self.lock();
        if let Some(reason) = &inner.catalog_fault {
            return Err(RemoteError::Unavailable(reason.clone()));
        }
        let mut entries: Vec<CatalogEntry> = inner
            .entries
            .values()
            .filter(|entry| entry.artifact.kind() == kind)
            .map(|entry| CatalogEntry {
                state: entry.artifact.state,
                ..CatalogEntry::new(entry.artifact.name().clone())
            })
            .collect();
        entries.extend(
            inner
                .managed
                .iter()
                .filter(|id| id.kind == kind)
                .map(|id| CatalogEntry {
                    state: DeploymentState::Live,
                    exportable: false,
                    ..CatalogEntry::new(id.name.clone())
                }),
        );
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn fetch(
        &self,
        kind: ArtifactKind,
        name: &ArtifactName,
    ) -> Result<Artifact, ArtifactError> {
        let id = ArtifactId::new(kind, name.clone());
        let inner = self.enter(Operation::Fetch, &id)?;
        inner
            .entries
            .get(&id)
            .map(|entry| entry.artifact.clone())
            .ok_or_else(|| ArtifactError::Transport(format!("{id} not found")))
    }

    async fn upsert(&self, artifact: &Artifact) -> Result<(), ArtifactError> {
        let mut inner = self.enter(Operation::Upsert, &artifact.id)?;
        let stored = artifact
            .clone()
            .with_origin(Origin::Remote(artifact.name().to_string()));
        inner
            .entries
            .entry(artifact.id.clone())
            .and_modify(|entry| {
                let state = entry.artifact.state;
                entry.artifact = stored.clone().with_state(state);
            })
            .or_insert_with(|| Entry {
                artifact: stored.clone().with_state(DeploymentState::Draft),
                live: None,
            });
        Ok(())
    }

    async fn promote(&self, id: &ArtifactId) -> Result<PromoteOutcome, ArtifactError> {
        let mut inner = self.enter(Operation::Promote, id)?;
        let Some(entry) = inner.entries.get_mut(id) else {
            return Err(ArtifactError::Promotion(format!("{id} does not exist")));
        };
        let current = entry.artifact.fingerprint.clone();
        if entry.artifact.state == DeploymentState::Live && entry.live.as_ref() == Some(&current) {
            return Ok(PromoteOutcome::AlreadyLive);
        }
        entry.artifact.state = DeploymentState::Live;
        entry.live = Some(current);
        Ok(PromoteOutcome::Promoted)
    }
}
