//! Registry client backed by the platform's `orchestrate` CLI.
//!
//! Every call spawns the CLI with a per-verb timeout. Exports (the slow verb)
//! are retried on timeout with linear backoff; nothing else is retried.
//! Artifacts travel through a private temp directory per call:
//!
//! - agents: `agents export ... -o <tmp>/<name>.yaml --agent-only` and
//!   `agents import -f <tmp>/<name>.yaml`
//! - tools: `tools export -n <name> -o <tmp>/<name>.zip`, unpacked, and
//!   `tools import -k python -f <tmp>/<name>/<name>.py -p <tmp>/<name> -r ...`

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use agentsync_core::config::Timeouts;
use agentsync_core::store::{read_tool_dir, write_tool_files};
use agentsync_core::{
    Artifact, ArtifactContent, ArtifactError, ArtifactId, ArtifactKind, ArtifactName,
    DeploymentState, Origin, SyncConfig, ToolBundle, TOOL_MANIFEST,
};

use crate::client::{CatalogEntry, PromoteOutcome, RegistryClient};
use crate::error::{io_err, RemoteError};

/// Environment variable consulted when no API key is given explicitly.
pub const API_KEY_ENV: &str = "WXO_API_KEY";

/// How to invoke the CLI.
#[derive(Debug, Clone)]
pub struct CliSettings {
    pub program: PathBuf,
    /// Attempts per export call.
    pub retries: u32,
    pub timeouts: Timeouts,
    /// Bound on concurrent fetches while listing.
    pub concurrency: usize,
}

impl From<&SyncConfig> for CliSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            program: config.orchestrate_bin.clone(),
            retries: config.retries,
            timeouts: config.timeouts.clone(),
            concurrency: config.concurrency,
        }
    }
}

#[derive(Debug)]
pub struct OrchestrateCli {
    settings: CliSettings,
    /// Catalog `llm_config` per agent, used to enrich exported documents.
    llm_configs: Mutex<HashMap<ArtifactName, Value>>,
}

impl OrchestrateCli {
    pub fn new(settings: CliSettings) -> Self {
        Self {
            settings,
            llm_configs: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &CliSettings {
        &self.settings
    }

    /// `orchestrate env activate <env> [--api-key KEY]`.
    pub async fn activate(&self, env: &str, api_key: Option<&str>) -> Result<(), RemoteError> {
        let mut args = os_args(["env", "activate", env]);
        if let Some(key) = api_key {
            args.extend(os_args(["--api-key", key]));
        }
        match self.run(&args, self.settings.timeouts.list()).await {
            Ok(_) => {
                tracing::info!(env, "activated environment");
                Ok(())
            }
            Err(RemoteError::CommandFailed { detail, .. }) => Err(RemoteError::Activation {
                env: env.to_string(),
                detail,
            }),
            Err(err) => Err(err),
        }
    }

    // -----------------------------------------------------------------------
    // Process plumbing
    // -----------------------------------------------------------------------

    /// Run the CLI once and return its stdout.
    async fn run(&self, args: &[OsString], timeout: Duration) -> Result<String, RemoteError> {
        let command = describe(&self.settings.program, args);
        tracing::debug!(command = %command, "running orchestrate");

        let child = Command::new(&self.settings.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RemoteError::Spawn {
                command: command.clone(),
                source,
            })?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| RemoteError::Spawn {
                command: command.clone(),
                source,
            })?,
            Err(_) => {
                return Err(RemoteError::Timeout {
                    command,
                    secs: timeout.as_secs(),
                })
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let detail = if stderr.is_empty() {
                stdout.trim().to_string()
            } else {
                stderr
            };
            return Err(RemoteError::CommandFailed {
                command,
                code: output.status.code().unwrap_or(-1),
                detail,
            });
        }
        Ok(stdout)
    }

    /// `run`, retrying timeouts with a backoff of `attempt * retry_backoff`.
    async fn run_retrying(
        &self,
        args: &[OsString],
        timeout: Duration,
    ) -> Result<String, RemoteError> {
        let attempts = self.settings.retries.max(1);
        let mut attempt = 1;
        loop {
            match self.run(args, timeout).await {
                Err(RemoteError::Timeout { command, secs }) if attempt < attempts => {
                    tracing::warn!(command = %command, secs, attempt, attempts, "timed out; retrying");
                    attempt += 1;
                    tokio::time::sleep(self.settings.timeouts.retry_backoff() * attempt).await;
                }
                other => return other,
            }
        }
    }

    // -----------------------------------------------------------------------
    // Per-kind operations
    // -----------------------------------------------------------------------

    async fn fetch_agent(&self, name: &ArtifactName) -> Result<Artifact, RemoteError> {
        let dir = temp_dir()?;
        let out = dir.path().join(format!("{name}.yaml"));
        let mut args = os_args(["agents", "export", "-n", name.as_str(), "-k", "native", "-o"]);
        args.push(out.clone().into_os_string());
        args.push("--agent-only".into());
        self.run_retrying(&args, self.settings.timeouts.export()).await?;

        let document = tokio::fs::read_to_string(&out)
            .await
            .map_err(|e| io_err(&out, e))?;
        let llm_config = self
            .llm_configs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        let document = match llm_config.and_then(|config| enrich_llm_config(&document, &config)) {
            Some(enriched) => {
                tracing::debug!(agent = %name, "added llm_config from catalog");
                enriched
            }
            None => document,
        };
        Artifact::agent(name.clone(), document, Origin::Remote(name.to_string())).map_err(|e| {
            RemoteError::Output {
                command: format!("agents export -n {name}"),
                reason: e.to_string(),
            }
        })
    }

    async fn fetch_tool(&self, name: &ArtifactName) -> Result<ToolBundle, RemoteError> {
        let dir = temp_dir()?;
        let archive = dir.path().join(format!("{name}.zip"));
        let mut args = os_args(["tools", "export", "-n", name.as_str(), "-o"]);
        args.push(archive.clone().into_os_string());
        self.run_retrying(&args, self.settings.timeouts.export()).await?;

        let target = dir.path().join(name.as_str());
        let entry = ToolBundle::entry_point(name);
        let folder = name.to_string();
        blocking(move || {
            extract_archive(&archive, &target)?;
            // Some exports wrap the files in a folder named after the tool.
            let nested = target.join(&folder);
            let root = if !target.join(&entry).exists() && nested.join(&entry).exists() {
                nested
            } else {
                target
            };
            let bundle = read_tool_dir(&root)?;
            drop(dir);
            Ok(bundle)
        })
        .await
    }

    async fn import_agent(&self, name: &ArtifactName, document: &str) -> Result<(), RemoteError> {
        let dir = temp_dir()?;
        let file = dir.path().join(format!("{name}.yaml"));
        tokio::fs::write(&file, document)
            .await
            .map_err(|e| io_err(&file, e))?;
        let mut args = os_args(["agents", "import", "-f"]);
        args.push(file.into_os_string());
        self.run(&args, self.settings.timeouts.import()).await?;
        Ok(())
    }

    async fn import_tool(&self, name: &ArtifactName, bundle: &ToolBundle) -> Result<(), RemoteError> {
        let dir = temp_dir()?;
        let tool_dir = dir.path().join(name.as_str());
        let staged = bundle.clone();
        let staging = tool_dir.clone();
        blocking(move || Ok(write_tool_files(&staging, &staged)?)).await?;

        let mut args = os_args(["tools", "import", "-k", "python", "-f"]);
        args.push(tool_dir.join(ToolBundle::entry_point(name)).into_os_string());
        args.push("-p".into());
        args.push(tool_dir.clone().into_os_string());
        args.push("-r".into());
        args.push(tool_dir.join(TOOL_MANIFEST).into_os_string());
        self.run(&args, self.settings.timeouts.import()).await?;
        Ok(())
    }
}

#[async_trait]
impl RegistryClient for OrchestrateCli {
    async fn catalog(&self, kind: ArtifactKind) -> Result<Vec<CatalogEntry>, RemoteError> {
        let args = match kind {
            ArtifactKind::Agent => os_args(["agents", "list", "--kind", "native", "-v"]),
            ArtifactKind::Tool => os_args(["tools", "list", "-v"]),
        };
        let stdout = self.run(&args, self.settings.timeouts.list()).await?;
        let parsed = match kind {
            ArtifactKind::Agent => parse_agent_catalog(&stdout),
            ArtifactKind::Tool => parse_tool_catalog(&stdout),
        };
        let entries = parsed.map_err(|reason| RemoteError::Output {
            command: describe(&self.settings.program, &args),
            reason,
        })?;

        if kind == ArtifactKind::Agent {
            let mut cache = self
                .llm_configs
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            for entry in &entries {
                if let Some(config) = entry.metadata.get("llm_config") {
                    cache.insert(entry.name.clone(), config.clone());
                }
            }
        }
        Ok(entries)
    }

    async fn fetch(
        &self,
        kind: ArtifactKind,
        name: &ArtifactName,
    ) -> Result<Artifact, ArtifactError> {
        match kind {
            ArtifactKind::Agent => self.fetch_agent(name).await.map_err(|err| match err {
                RemoteError::Output { reason, .. } => ArtifactError::Validation(reason),
                other => other.into_transport(),
            }),
            ArtifactKind::Tool => {
                let bundle = self
                    .fetch_tool(name)
                    .await
                    .map_err(RemoteError::into_transport)?;
                Artifact::tool(name.clone(), bundle, Origin::Remote(name.to_string()))
                    .map(|artifact| artifact.with_state(DeploymentState::Live))
            }
        }
    }

    async fn upsert(&self, artifact: &Artifact) -> Result<(), ArtifactError> {
        let result = match &artifact.content {
            ArtifactContent::Agent(spec) => self.import_agent(artifact.name(), &spec.document).await,
            ArtifactContent::Tool(bundle) => self.import_tool(artifact.name(), bundle).await,
        };
        result.map_err(|err| match err {
            RemoteError::CommandFailed { detail, .. } => ArtifactError::Validation(detail),
            other => other.into_transport(),
        })
    }

    async fn promote(&self, id: &ArtifactId) -> Result<PromoteOutcome, ArtifactError> {
        match id.kind {
            // Tools are live as soon as they are imported.
            ArtifactKind::Tool => Ok(PromoteOutcome::AlreadyLive),
            ArtifactKind::Agent => {
                let args = os_args(["agents", "deploy", "--name", id.name.as_str()]);
                match self.run(&args, self.settings.timeouts.deploy()).await {
                    Ok(stdout) if reports_already_live(&stdout) => {
                        tracing::debug!(agent = %id.name, "already live");
                        Ok(PromoteOutcome::AlreadyLive)
                    }
                    Ok(_) => Ok(PromoteOutcome::Promoted),
                    Err(RemoteError::CommandFailed { detail, .. }) => {
                        if reports_already_live(&detail) {
                            tracing::debug!(agent = %id.name, "already live");
                            Ok(PromoteOutcome::AlreadyLive)
                        } else {
                            Err(ArtifactError::Promotion(detail))
                        }
                    }
                    Err(other) => Err(ArtifactError::Promotion(other.to_string())),
                }
            }
        }
    }

    fn list_concurrency(&self) -> usize {
        self.settings.concurrency
    }
}

// ---------------------------------------------------------------------------
// Output parsing
// ---------------------------------------------------------------------------

/// Parse `agents list --kind native -v`: `{"native": [ {...}, ... ]}`.
///
/// Hidden agents are listed but not exportable.
pub fn parse_agent_catalog(stdout: &str) -> Result<Vec<CatalogEntry>, String> {
    let value: Value =
        serde_json::from_str(stdout.trim()).map_err(|e| format!("invalid JSON: {e}"))?;
    let items = match value.get("native") {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Null) | None => Vec::new(),
        Some(_) => return Err("`native` is not a list".to_string()),
    };
    Ok(catalog_entries(items, |item| {
        !item.get("hidden").and_then(Value::as_bool).unwrap_or(false)
    }))
}

/// Parse `tools list -v`: either a bare list or `{"tools": [ ... ]}`.
///
/// Tools bound to an MCP server are platform-managed and not exportable.
pub fn parse_tool_catalog(stdout: &str) -> Result<Vec<CatalogEntry>, String> {
    let value: Value =
        serde_json::from_str(stdout.trim()).map_err(|e| format!("invalid JSON: {e}"))?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("tools") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(_) => return Err("`tools` is not a list".to_string()),
        },
        _ => return Err("expected a list or an object with `tools`".to_string()),
    };
    let entries = catalog_entries(items, |item| {
        !item
            .get("binding")
            .and_then(Value::as_object)
            .is_some_and(|binding| binding.contains_key("mcp"))
    })
    .into_iter()
    .map(|entry| CatalogEntry {
        state: DeploymentState::Live,
        ..entry
    })
    .collect();
    Ok(entries)
}

fn catalog_entries(items: Vec<Value>, exportable: impl Fn(&Value) -> bool) -> Vec<CatalogEntry> {
    let mut entries = Vec::with_capacity(items.len());
    for (idx, item) in items.into_iter().enumerate() {
        let Some(name) = item.get("name").and_then(Value::as_str).map(str::to_owned) else {
            tracing::warn!(index = idx, "skipping catalog entry without a name");
            continue;
        };
        entries.push(CatalogEntry {
            name: ArtifactName::from(name),
            state: catalog_state(&item),
            exportable: exportable(&item),
            metadata: item,
        });
    }
    entries
}

fn catalog_state(item: &Value) -> DeploymentState {
    let live = ["state", "environment"].iter().any(|key| {
        item.get(*key)
            .and_then(Value::as_str)
            .is_some_and(|value| value.eq_ignore_ascii_case("live"))
    });
    if live {
        DeploymentState::Live
    } else {
        DeploymentState::Draft
    }
}

/// Add the catalog's `llm_config` to an exported agent document that lacks
/// one. Null fields are dropped. Returns `None` when nothing changes.
pub fn enrich_llm_config(document: &str, llm_config: &Value) -> Option<String> {
    let filtered: serde_json::Map<String, Value> = llm_config
        .as_object()?
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    if filtered.is_empty() {
        return None;
    }

    let mut parsed: serde_yaml::Value = serde_yaml::from_str(document).ok()?;
    let mapping = parsed.as_mapping_mut()?;
    if mapping.contains_key("llm_config") {
        return None;
    }
    let value = serde_yaml::to_value(Value::Object(filtered)).ok()?;
    mapping.insert(serde_yaml::Value::from("llm_config"), value);
    serde_yaml::to_string(&parsed).ok()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `true` when deploy output says the agent's live version already matches
/// its draft.
pub fn reports_already_live(output: &str) -> bool {
    let output = output.to_ascii_lowercase();
    output.contains("already deployed") || output.contains("already live")
}

fn os_args<'a>(args: impl IntoIterator<Item = &'a str>) -> Vec<OsString> {
    args.into_iter().map(OsString::from).collect()
}

/// Printable command line with the API key masked.
pub fn describe(program: &Path, args: &[OsString]) -> String {
    let mut parts = vec![program.display().to_string()];
    let mut mask_next = false;
    for arg in args {
        let arg = arg.to_string_lossy();
        if mask_next {
            parts.push("***".to_string());
            mask_next = false;
        } else {
            mask_next = arg == "--api-key";
            parts.push(arg.into_owned());
        }
    }
    parts.join(" ")
}

fn temp_dir() -> Result<tempfile::TempDir, RemoteError> {
    tempfile::Builder::new()
        .prefix("agentsync-")
        .tempdir()
        .map_err(|e| io_err(std::env::temp_dir(), e))
}

fn extract_archive(archive: &Path, target: &Path) -> Result<(), RemoteError> {
    let file = std::fs::File::open(archive).map_err(|e| io_err(archive, e))?;
    let archive_err = |source| RemoteError::Archive {
        path: archive.to_path_buf(),
        source,
    };
    let mut zip = zip::ZipArchive::new(file).map_err(archive_err)?;
    std::fs::create_dir_all(target).map_err(|e| io_err(target, e))?;
    zip.extract(target).map_err(archive_err)?;
    Ok(())
}

async fn blocking<T, F>(f: F) -> Result<T, RemoteError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, RemoteError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RemoteError::Unavailable(format!("blocking task failed: {e}")))?
}
