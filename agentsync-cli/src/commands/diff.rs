//! `agentsync diff`: unified diffs of what an import or export would write.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use agentsync_core::ArtifactStore;
use agentsync_sync::{pipeline, Direction};

use super::RemoteArgs;

/// Arguments for `agentsync diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Direction to preview: import or export.
    #[arg(long, default_value = "export")]
    pub direction: Direction,

    #[command(flatten)]
    pub remote: RemoteArgs,
}

impl DiffArgs {
    pub fn run(self, root: &Path) -> Result<ExitCode> {
        let config = self.remote.config(root)?;
        let store = ArtifactStore::from_config(root, &config);

        let runtime = super::runtime()?;
        let plan = runtime.block_on(async {
            let client = self.remote.connect(root, &config).await?;
            pipeline::plan(&store, &client, self.direction, self.remote.kind)
                .await
                .with_context(|| format!("diff for {} failed", self.direction))
        })?;

        for phase in &plan.phases {
            for invalid in &phase.invalid {
                eprintln!("{} {}: {}", "!".yellow().bold(), invalid.id, invalid.error);
            }
        }

        let previews = plan.previews();
        if previews.is_empty() {
            println!("No differences.");
            return Ok(ExitCode::SUCCESS);
        }

        for preview in previews {
            print!("{}", preview.unified_diff);
            if !preview.unified_diff.ends_with('\n') {
                println!();
            }
        }
        Ok(ExitCode::SUCCESS)
    }
}
