//! Error types for agentsync-remote.

use std::path::PathBuf;

use thiserror::Error;

use agentsync_core::{ArtifactError, CoreError};

/// Failures talking to the remote registry.
///
/// Returned directly when a whole collection can't be enumerated (fatal to a
/// run); per-artifact calls fold these into an [`ArtifactError`].
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The CLI program could not be started.
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The CLI did not finish within its time budget.
    #[error("`{command}` timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    /// The CLI exited non-zero.
    #[error("`{command}` failed (exit code {code}): {detail}")]
    CommandFailed {
        command: String,
        code: i32,
        detail: String,
    },

    /// The CLI printed something other than the expected JSON.
    #[error("unexpected output from `{command}`: {reason}")]
    Output { command: String, reason: String },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Exported archive could not be unpacked.
    #[error("failed to extract {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("environment activation failed for '{env}': {detail}")]
    Activation { env: String, detail: String },

    /// The registry refused to answer at all.
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl RemoteError {
    /// Fold into a per-artifact error. Anything that isn't a clean rejection
    /// from the service is a transport problem.
    pub fn into_transport(self) -> ArtifactError {
        ArtifactError::Transport(self.to_string())
    }
}

/// Convenience constructor for [`RemoteError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RemoteError {
    RemoteError::Io {
        path: path.into(),
        source,
    }
}
