//! The registry client contract the reconciler depends on.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use agentsync_core::{
    Artifact, ArtifactError, ArtifactId, ArtifactKind, ArtifactName, DeploymentState, Listing,
};

use crate::error::RemoteError;

/// Default bound on concurrent fetches while listing.
pub const LIST_CONCURRENCY: usize = 4;

/// One entry of a remote collection, as enumerated without fetching content.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub name: ArtifactName,
    pub state: DeploymentState,
    /// `false` for artifacts the platform manages itself (MCP-bound tools,
    /// hidden agents). They exist remotely but are never synchronized.
    pub exportable: bool,
    /// Raw metadata as reported by the service.
    pub metadata: serde_json::Value,
}

impl CatalogEntry {
    pub fn new(name: impl Into<ArtifactName>) -> Self {
        Self {
            name: name.into(),
            state: DeploymentState::Draft,
            exportable: true,
            metadata: serde_json::Value::Null,
        }
    }
}

/// Result of a successful promote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromoteOutcome {
    /// The artifact moved from draft to live.
    Promoted,
    /// Nothing to do; the live version already matches.
    AlreadyLive,
}

/// An already-authenticated client for the remote agent/tool registry.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Enumerate a collection without fetching content.
    async fn catalog(&self, kind: ArtifactKind) -> Result<Vec<CatalogEntry>, RemoteError>;

    /// Fetch one artifact with its full content.
    async fn fetch(&self, kind: ArtifactKind, name: &ArtifactName)
        -> Result<Artifact, ArtifactError>;

    /// Create or overwrite the draft of an artifact.
    async fn upsert(&self, artifact: &Artifact) -> Result<(), ArtifactError>;

    /// Move an artifact from draft to live.
    async fn promote(&self, id: &ArtifactId) -> Result<PromoteOutcome, ArtifactError>;

    /// Upper bound on concurrent fetches in [`RegistryClient::list`].
    fn list_concurrency(&self) -> usize {
        LIST_CONCURRENCY
    }

    /// Enumerate and fetch every exportable artifact of `kind`.
    ///
    /// Only a failed catalog call is fatal; an artifact that can't be fetched
    /// is recorded as invalid in the listing.
    async fn list(&self, kind: ArtifactKind) -> Result<Listing, RemoteError> {
        let entries = self.catalog(kind).await?;
        let (exportable, managed): (Vec<_>, Vec<_>) =
            entries.into_iter().partition(|entry| entry.exportable);

        tracing::info!(
            kind = %kind,
            total = exportable.len() + managed.len(),
            exportable = exportable.len(),
            "enumerated remote {}",
            kind.plural()
        );
        if !managed.is_empty() {
            let names: Vec<String> = managed.iter().map(|e| e.name.to_string()).collect();
            tracing::info!(kind = %kind, skipped = %names.join(", "), "skipping platform-managed artifacts");
        }

        let mut fetched: Vec<(ArtifactName, Result<Artifact, ArtifactError>)> =
            stream::iter(exportable)
                .map(|entry| async move {
                    let result = self
                        .fetch(kind, &entry.name)
                        .await
                        .map(|artifact| artifact.with_state(entry.state));
                    (entry.name, result)
                })
                .buffer_unordered(self.list_concurrency().max(1))
                .collect()
                .await;
        fetched.sort_by(|a, b| a.0.cmp(&b.0));

        let mut listing = Listing::empty(kind);
        for (name, result) in fetched {
            let id = ArtifactId::new(kind, name);
            if let Err(err) = &result {
                tracing::warn!(artifact = %id, error = %err, "cannot fetch remote artifact");
            }
            listing.push(id, result);
        }
        Ok(listing)
    }
}
