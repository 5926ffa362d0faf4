//! agentsync core library: artifact model, fingerprints, local tree, config.
//!
//! - [`types`]: identities, artifacts, sets and listings
//! - [`fingerprint`]: canonical content hashing
//! - [`store`]: the on-disk agents/tools tree
//! - [`config`]: layered YAML settings
//! - [`error`]: [`CoreError`] and the per-artifact [`ArtifactError`]

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod store;
pub mod types;

pub use config::SyncConfig;
pub use error::{ArtifactError, CoreError};
pub use fingerprint::Fingerprint;
pub use store::ArtifactStore;
pub use types::{
    AgentSpec, Artifact, ArtifactContent, ArtifactId, ArtifactKind, ArtifactName, ArtifactSet,
    DeploymentState, InvalidArtifact, Listing, Origin, ToolBundle, TOOL_MANIFEST,
};
