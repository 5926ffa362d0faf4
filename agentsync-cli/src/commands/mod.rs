//! Subcommands and the plumbing they share.

pub mod diff;
pub mod status;
pub mod sync;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;

use agentsync_core::{config, SyncConfig};
use agentsync_remote::orchestrate::API_KEY_ENV;
use agentsync_remote::{CliSettings, OrchestrateCli, RegistryClient};
use agentsync_sync::KindScope;

/// Options shared by every command that talks to the remote service.
#[derive(Args, Debug, Clone)]
pub struct RemoteArgs {
    /// Artifacts to cover: agents, tools or all.
    #[arg(long, default_value = "all")]
    pub kind: KindScope,

    /// Environment to activate first (`orchestrate env activate`).
    #[arg(long)]
    pub env: Option<String>,

    /// API key passed through on activation; falls back to $WXO_API_KEY.
    #[arg(long)]
    pub api_key: Option<String>,

    /// Maximum concurrent remote calls.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Attempts per export call before giving up on timeouts.
    #[arg(long)]
    pub retries: Option<u32>,
}

impl RemoteArgs {
    /// Layered config with command-line overrides applied last.
    pub fn config(&self, root: &Path) -> Result<SyncConfig> {
        let mut config = config::load(root)
            .with_context(|| format!("failed to load config for {}", root.display()))?;
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency.max(1);
        }
        if let Some(retries) = self.retries {
            config.retries = retries;
        }
        Ok(config)
    }

    fn api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|key| !key.is_empty())
    }

    /// Build the `orchestrate`-backed client, activating `--env` if given.
    pub async fn connect(
        &self,
        root: &Path,
        config: &SyncConfig,
    ) -> Result<Arc<dyn RegistryClient>> {
        let mut settings = CliSettings::from(config);
        settings.program = resolve_program(root, &settings.program);
        let client = OrchestrateCli::new(settings);
        if let Some(env) = self.env.as_deref() {
            let api_key = self.api_key();
            client
                .activate(env, api_key.as_deref())
                .await
                .with_context(|| format!("failed to activate environment '{env}'"))?;
        }
        Ok(Arc::new(client))
    }
}

/// A program given as a relative path with a directory part is resolved
/// against the project root; bare names are left for `PATH` lookup.
fn resolve_program(root: &Path, program: &Path) -> PathBuf {
    if program.is_relative() && program.components().count() > 1 {
        root.join(program)
    } else {
        program.to_path_buf()
    }
}

pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

/// Fire `cancel` on the first Ctrl-C.
pub fn cancel_on_ctrl_c(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("received ctrl-c; letting in-flight writes finish");
            cancel.cancel();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_program_paths_resolve_against_root() {
        let root = Path::new("/work/project");
        assert_eq!(
            resolve_program(root, Path::new("bin/orchestrate")),
            PathBuf::from("/work/project/bin/orchestrate")
        );
        assert_eq!(
            resolve_program(root, Path::new("orchestrate")),
            PathBuf::from("orchestrate")
        );
        assert_eq!(
            resolve_program(root, Path::new("/usr/bin/orchestrate")),
            PathBuf::from("/usr/bin/orchestrate")
        );
    }
}
