//! The two ends of a convergence: the local tree and the remote registry.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use agentsync_core::{Artifact, ArtifactError, ArtifactKind, ArtifactName, ArtifactStore, Listing};
use agentsync_remote::RegistryClient;

use crate::error::SyncError;

/// Something artifacts can be listed from and written to.
#[async_trait]
pub trait ArtifactSide: Send + Sync {
    /// `"local"` or `"remote"`.
    fn label(&self) -> &'static str;

    /// Load every artifact of `kind`; only enumeration failures are errors.
    async fn list(&self, kind: ArtifactKind) -> Result<Listing, SyncError>;

    /// Names present on this side, without loading content.
    async fn names(&self, kind: ArtifactKind) -> Result<BTreeSet<ArtifactName>, SyncError>;

    /// Write one artifact, replacing any previous version.
    async fn write(&self, artifact: &Artifact) -> Result<(), ArtifactError>;
}

/// The on-disk tree. Filesystem work runs on the blocking pool.
#[derive(Debug, Clone)]
pub struct LocalSide {
    store: ArtifactStore,
}

impl LocalSide {
    pub fn new(store: ArtifactStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }
}

#[async_trait]
impl ArtifactSide for LocalSide {
    fn label(&self) -> &'static str {
        "local"
    }

    async fn list(&self, kind: ArtifactKind) -> Result<Listing, SyncError> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.list(kind))
            .await
            .map_err(|e| SyncError::Task(e.to_string()))?
            .map_err(|source| SyncError::LocalEnumerate { kind, source })
    }

    async fn names(&self, kind: ArtifactKind) -> Result<BTreeSet<ArtifactName>, SyncError> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.names(kind))
            .await
            .map_err(|e| SyncError::Task(e.to_string()))?
            .map_err(|source| SyncError::LocalEnumerate { kind, source })
    }

    async fn write(&self, artifact: &Artifact) -> Result<(), ArtifactError> {
        let store = self.store.clone();
        let artifact = artifact.clone();
        tokio::task::spawn_blocking(move || store.write(&artifact))
            .await
            .map_err(|e| ArtifactError::Storage(e.to_string()))?
            .map(|_| ())
            .map_err(ArtifactError::from)
    }
}

/// The remote registry.
#[derive(Clone)]
pub struct RemoteSide {
    client: Arc<dyn RegistryClient>,
}

impl RemoteSide {
    pub fn new(client: Arc<dyn RegistryClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<dyn RegistryClient> {
        &self.client
    }
}

#[async_trait]
impl ArtifactSide for RemoteSide {
    fn label(&self) -> &'static str {
        "remote"
    }

    async fn list(&self, kind: ArtifactKind) -> Result<Listing, SyncError> {
        self.client
            .list(kind)
            .await
            .map_err(|source| SyncError::RemoteEnumerate { kind, source })
    }

    /// Every catalog name, platform-managed entries included.
    async fn names(&self, kind: ArtifactKind) -> Result<BTreeSet<ArtifactName>, SyncError> {
        let entries = self
            .client
            .catalog(kind)
            .await
            .map_err(|source| SyncError::RemoteEnumerate { kind, source })?;
        Ok(entries.into_iter().map(|entry| entry.name).collect())
    }

    async fn write(&self, artifact: &Artifact) -> Result<(), ArtifactError> {
        self.client.upsert(artifact).await
    }
}
