//! Layered YAML configuration.
//!
//! Layers, later wins:
//!
//! 1. built-in defaults ([`SyncConfig::default`])
//! 2. user file `~/.agentsync/config.yaml`
//! 3. project file `<root>/agentsync.yaml`
//!
//! CLI flags are applied on top by the caller. Layers are merged key by key,
//! so a project file that only sets `concurrency` keeps the user's
//! `orchestrate_bin`.
//!
//! As in the rest of the crate, `load_at` takes an explicit home directory
//! and `load` derives it from `dirs::home_dir()`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::error::{io_err, CoreError};

pub const PROJECT_CONFIG_FILE: &str = "agentsync.yaml";

/// Concurrent remote calls when nothing else is configured.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Remote CLI timeouts, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub list_secs: u64,
    pub import_secs: u64,
    pub export_secs: u64,
    pub deploy_secs: u64,
    /// Backoff unit between export retries; attempt `n` waits `n * retry_backoff_secs`.
    pub retry_backoff_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            list_secs: 60,
            import_secs: 120,
            export_secs: 300,
            deploy_secs: 120,
            retry_backoff_secs: 3,
        }
    }
}

impl Timeouts {
    pub fn list(&self) -> Duration {
        Duration::from_secs(self.list_secs)
    }

    pub fn import(&self) -> Duration {
        Duration::from_secs(self.import_secs)
    }

    pub fn export(&self) -> Duration {
        Duration::from_secs(self.export_secs)
    }

    pub fn deploy(&self) -> Duration {
        Duration::from_secs(self.deploy_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }
}

/// Settings for a sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Program used to reach the remote service.
    pub orchestrate_bin: PathBuf,
    /// Upper bound on concurrent per-artifact remote calls.
    pub concurrency: usize,
    /// Attempts per export call; only timeouts are retried.
    pub retries: u32,
    pub timeouts: Timeouts,
    /// Agents folder, relative to the project root.
    pub agents_dir: PathBuf,
    /// Tools folder, relative to the project root.
    pub tools_dir: PathBuf,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            orchestrate_bin: PathBuf::from("orchestrate"),
            concurrency: DEFAULT_CONCURRENCY,
            retries: 3,
            timeouts: Timeouts::default(),
            agents_dir: PathBuf::from("agents"),
            tools_dir: PathBuf::from("tools"),
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.concurrency == 0 {
            return Err(CoreError::ConfigInvalid(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.orchestrate_bin.as_os_str().is_empty() {
            return Err(CoreError::ConfigInvalid(
                "orchestrate_bin must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// `<home>/.agentsync/config.yaml`: pure, no I/O.
pub fn user_config_path_at(home: &Path) -> PathBuf {
    home.join(".agentsync").join("config.yaml")
}

/// `<root>/agentsync.yaml`: pure, no I/O.
pub fn project_config_path(root: &Path) -> PathBuf {
    root.join(PROJECT_CONFIG_FILE)
}

/// Load the layered config with an explicit home directory.
///
/// Missing files are skipped; malformed ones fail with their path.
pub fn load_at(home: Option<&Path>, root: &Path) -> Result<SyncConfig, CoreError> {
    let mut merged = serde_yaml::to_value(SyncConfig::default()).map_err(|source| {
        CoreError::ConfigParse {
            path: PathBuf::from("<defaults>"),
            source,
        }
    })?;

    let mut layers = Vec::new();
    if let Some(home) = home {
        layers.push(user_config_path_at(home));
    }
    layers.push(project_config_path(root));

    for path in layers {
        if !path.exists() {
            continue;
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        let overlay: Value = serde_yaml::from_str(&contents).map_err(|source| {
            CoreError::ConfigParse {
                path: path.clone(),
                source,
            }
        })?;
        tracing::debug!(path = %path.display(), "applying config layer");
        merge(&mut merged, overlay);
    }

    let config: SyncConfig = serde_yaml::from_value(merged).map_err(|source| {
        CoreError::ConfigParse {
            path: project_config_path(root),
            source,
        }
    })?;
    config.validate()?;
    Ok(config)
}

/// `load_at` convenience wrapper; a missing home directory skips the user layer.
pub fn load(root: &Path) -> Result<SyncConfig, CoreError> {
    load_at(dirs::home_dir().as_deref(), root)
}

/// Recursively overlay `overlay` onto `base`. Mappings merge key by key;
/// anything else replaces. A null overlay (empty file) changes nothing.
fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
