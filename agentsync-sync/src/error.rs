//! Error types for agentsync-sync.

use std::path::PathBuf;

use thiserror::Error;

use agentsync_core::{ArtifactKind, CoreError};
use agentsync_remote::RemoteError;

/// Errors that abort a run before or after convergence.
///
/// Per-artifact problems never surface here; they end up in the
/// [`Report`](crate::report::Report).
#[derive(Debug, Error)]
pub enum SyncError {
    /// The local tree could not be enumerated.
    #[error("cannot enumerate local {kind}s: {source}")]
    LocalEnumerate {
        kind: ArtifactKind,
        #[source]
        source: CoreError,
    },

    /// The remote collection could not be enumerated.
    #[error("cannot enumerate remote {kind}s: {source}")]
    RemoteEnumerate {
        kind: ArtifactKind,
        #[source]
        source: RemoteError,
    },

    /// Source and destination sets of different kinds were diffed.
    #[error("cannot diff {source_kind}s against {destination_kind}s")]
    KindMismatch {
        source_kind: ArtifactKind,
        destination_kind: ArtifactKind,
    },

    /// The remote environment could not be selected.
    #[error("environment activation failed: {0}")]
    Activation(#[source] RemoteError),

    /// An error from the local tree or config outside enumeration.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Ledger JSON could not be read or written.
    #[error("ledger JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A blocking task panicked or was cancelled by the runtime.
    #[error("background task failed: {0}")]
    Task(String),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
