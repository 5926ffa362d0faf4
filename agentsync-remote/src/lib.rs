//! Remote agent/tool registry access.
//!
//! - [`client`]: the [`RegistryClient`] contract
//! - [`orchestrate`]: implementation driving the `orchestrate` CLI
//! - [`memory`]: in-process registry with draft/live state
//! - [`error`]: [`RemoteError`]

pub mod client;
pub mod error;
pub mod memory;
pub mod orchestrate;

pub use client::{CatalogEntry, PromoteOutcome, RegistryClient};
pub use error::RemoteError;
pub use memory::MemoryRegistry;
pub use orchestrate::{CliSettings, OrchestrateCli};
