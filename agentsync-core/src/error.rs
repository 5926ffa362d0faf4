//! Error types for agentsync-core.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::types::{ArtifactId, ArtifactKind};

/// Errors from the local artifact tree and configuration loading.
///
/// These are fatal to whatever operation raised them. Problems with a single
/// artifact's content are reported as [`ArtifactError`] instead.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config YAML parse error on load, with the offending file.
    #[error("failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Config parsed but holds an unusable value.
    #[error("invalid config: {0}")]
    ConfigInvalid(String),

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// The directory holding one artifact kind does not exist.
    #[error("{kind} folder not found: {path}")]
    LayoutNotFound { kind: ArtifactKind, path: PathBuf },

    /// An artifact set only ever holds a single kind.
    #[error("cannot add {found} to a set of {expected}s")]
    KindMismatch {
        expected: ArtifactKind,
        found: ArtifactId,
    },

    /// Identities are unique within a set.
    #[error("duplicate artifact {0}")]
    DuplicateArtifact(ArtifactId),
}

/// Convenience constructor for [`CoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}

/// Per-artifact failure. Never aborts a run; collected into its report.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "category", content = "detail", rename_all = "snake_case")]
pub enum ArtifactError {
    /// Malformed content, locally or rejected by the remote service.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An agent references a tool that is neither in the batch nor at the
    /// destination.
    #[error("unresolved dependency {0}")]
    DependencyUnresolved(ArtifactId),

    /// The remote call could not be completed (spawn failure, timeout,
    /// service error).
    #[error("transport error: {0}")]
    Transport(String),

    /// The promote call failed for an already-applied artifact.
    #[error("promotion failed: {0}")]
    Promotion(String),

    /// Writing into the local tree failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl ArtifactError {
    /// Short machine-friendly category name.
    pub fn category(&self) -> &'static str {
        match self {
            ArtifactError::Validation(_) => "validation",
            ArtifactError::DependencyUnresolved(_) => "dependency_unresolved",
            ArtifactError::Transport(_) => "transport",
            ArtifactError::Promotion(_) => "promotion",
            ArtifactError::Storage(_) => "storage",
        }
    }
}

impl From<CoreError> for ArtifactError {
    fn from(err: CoreError) -> Self {
        ArtifactError::Storage(err.to_string())
    }
}
