//! Local artifact tree.
//!
//! # Layout
//!
//! ```text
//! <root>/
//!   agents/
//!     <name>/agents/native/<name>.yaml
//!   tools/
//!     <name>/
//!       <name>.py
//!       requirements.txt
//!       ...                 (any other files the tool ships)
//! ```
//!
//! Folders whose name starts with `.` or `__` are never artifacts; staging
//! directories use a leading dot so an interrupted write can't be mistaken
//! for a tool.
//!
//! # Writes
//!
//! Agent YAML goes to `<file>.agentsync.tmp` and is renamed into place. Tool
//! folders are staged in `.<name>.agentsync.tmp/`, the previous folder is
//! moved aside to `.<name>.agentsync.old/`, the staged folder renamed in, and
//! the old one removed. If the swap fails the old folder is put back.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::SyncConfig;
use crate::error::{io_err, ArtifactError, CoreError};
use crate::types::{
    Artifact, ArtifactContent, ArtifactId, ArtifactKind, ArtifactName, Listing, Origin,
    ToolBundle,
};

/// Reads and writes the on-disk artifact tree under a project root.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    agents_dir: PathBuf,
    tools_dir: PathBuf,
}

impl ArtifactStore {
    /// Store with the default `agents/` and `tools/` folders.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::from_config(root, &SyncConfig::default())
    }

    pub fn from_config(root: impl Into<PathBuf>, config: &SyncConfig) -> Self {
        let root = root.into();
        Self {
            agents_dir: root.join(&config.agents_dir),
            tools_dir: root.join(&config.tools_dir),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder holding every artifact of `kind`.
    pub fn kind_dir(&self, kind: ArtifactKind) -> &Path {
        match kind {
            ArtifactKind::Agent => &self.agents_dir,
            ArtifactKind::Tool => &self.tools_dir,
        }
    }

    /// `<agents>/<name>/agents/native/<name>.yaml`: pure, no I/O.
    pub fn agent_path(&self, name: &ArtifactName) -> PathBuf {
        self.agents_dir
            .join(name.as_str())
            .join("agents")
            .join("native")
            .join(format!("{name}.yaml"))
    }

    /// `<tools>/<name>/`: pure, no I/O.
    pub fn tool_dir(&self, name: &ArtifactName) -> PathBuf {
        self.tools_dir.join(name.as_str())
    }

    /// Fails with [`CoreError::LayoutNotFound`] if the folder for `kind` is absent.
    pub fn require_layout(&self, kind: ArtifactKind) -> Result<(), CoreError> {
        let dir = self.kind_dir(kind);
        if dir.is_dir() {
            Ok(())
        } else {
            Err(CoreError::LayoutNotFound {
                kind,
                path: dir.to_path_buf(),
            })
        }
    }

    /// Names of the artifact folders for `kind`, sorted. A missing kind folder
    /// yields an empty set.
    ///
    /// Agent folders without an `agents/` subfolder are skipped with a warning.
    pub fn names(&self, kind: ArtifactKind) -> Result<BTreeSet<ArtifactName>, CoreError> {
        let dir = self.kind_dir(kind);
        if !dir.exists() {
            return Ok(BTreeSet::new());
        }

        let mut names = BTreeSet::new();
        for entry in std::fs::read_dir(dir).map_err(|e| io_err(dir, e))? {
            let entry = entry.map_err(|e| io_err(dir, e))?;
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_dir || is_ignored(&name) {
                continue;
            }
            if kind == ArtifactKind::Agent && !entry.path().join("agents").is_dir() {
                tracing::warn!(folder = %name, "skipping agent folder: no 'agents' subfolder found");
                continue;
            }
            names.insert(ArtifactName::from(name));
        }
        Ok(names)
    }

    /// Load every artifact of `kind`. Artifacts that fail to load are listed
    /// as invalid rather than failing the whole listing.
    pub fn list(&self, kind: ArtifactKind) -> Result<Listing, CoreError> {
        let mut listing = Listing::empty(kind);
        for name in self.names(kind)? {
            let id = ArtifactId::new(kind, name.clone());
            let loaded = self.load(kind, &name);
            if let Err(err) = &loaded {
                tracing::warn!(artifact = %id, error = %err, "cannot load local artifact");
            }
            listing.push(id, loaded);
        }
        Ok(listing)
    }

    /// Load a single artifact.
    pub fn load(&self, kind: ArtifactKind, name: &ArtifactName) -> Result<Artifact, ArtifactError> {
        match kind {
            ArtifactKind::Agent => {
                let path = self.agent_path(name);
                let document = std::fs::read_to_string(&path).map_err(|e| {
                    ArtifactError::Validation(format!("cannot read {}: {e}", path.display()))
                })?;
                Artifact::agent(name.clone(), document, Origin::Local(path))
            }
            ArtifactKind::Tool => {
                let dir = self.tool_dir(name);
                let bundle = read_tool_dir(&dir)?;
                Artifact::tool(name.clone(), bundle, Origin::Local(dir))
            }
        }
    }

    /// Write an artifact into the tree, replacing any previous version.
    ///
    /// Returns the path written.
    pub fn write(&self, artifact: &Artifact) -> Result<PathBuf, CoreError> {
        match &artifact.content {
            ArtifactContent::Agent(spec) => {
                let path = self.agent_path(artifact.name());
                write_file_atomic(&path, spec.document.as_bytes())?;
                tracing::debug!(artifact = %artifact.id, path = %path.display(), "wrote agent");
                Ok(path)
            }
            ArtifactContent::Tool(bundle) => {
                let dir = self.tool_dir(artifact.name());
                replace_tool_dir(&self.tools_dir, artifact.name(), bundle)?;
                tracing::debug!(artifact = %artifact.id, path = %dir.display(), "wrote tool");
                Ok(dir)
            }
        }
    }
}

/// Read every file of a tool folder into a bundle.
///
/// Skips dot-entries, `__pycache__` folders and compiled `*.pyc` files.
pub fn read_tool_dir(dir: &Path) -> Result<ToolBundle, CoreError> {
    if !dir.is_dir() {
        return Err(io_err(
            dir,
            std::io::Error::new(std::io::ErrorKind::NotFound, "tool folder not found"),
        ));
    }

    let mut bundle = ToolBundle::default();
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_bundle_noise(&entry.file_name().to_string_lossy()));
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            io_err(path, std::io::Error::other(e.to_string()))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().is_some_and(|ext| ext == "pyc") {
            continue;
        }
        let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let bytes = std::fs::read(entry.path()).map_err(|e| io_err(entry.path(), e))?;
        bundle.files.insert(key, bytes);
    }
    Ok(bundle)
}

/// Write a bundle's files below `dir`, creating parent folders.
pub fn write_tool_files(dir: &Path, bundle: &ToolBundle) -> Result<(), CoreError> {
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    for (relative, bytes) in &bundle.files {
        let path = relative
            .split('/')
            .filter(|part| !part.is_empty() && *part != "." && *part != "..")
            .fold(dir.to_path_buf(), |acc, part| acc.join(part));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        std::fs::write(&path, bytes).map_err(|e| io_err(&path, e))?;
    }
    Ok(())
}

fn is_ignored(name: &str) -> bool {
    name.starts_with('.') || name.starts_with("__")
}

fn is_bundle_noise(name: &str) -> bool {
    name.starts_with('.') || name == "__pycache__"
}

fn write_file_atomic(path: &Path, content: &[u8]) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let tmp = PathBuf::from(format!("{}.agentsync.tmp", path.display()));
    std::fs::write(&tmp, content).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

fn replace_tool_dir(
    tools_dir: &Path,
    name: &ArtifactName,
    bundle: &ToolBundle,
) -> Result<(), CoreError> {
    let target = tools_dir.join(name.as_str());
    let staging = tools_dir.join(format!(".{name}.agentsync.tmp"));
    let backup = tools_dir.join(format!(".{name}.agentsync.old"));

    for leftover in [&staging, &backup] {
        if leftover.exists() {
            std::fs::remove_dir_all(leftover).map_err(|e| io_err(leftover, e))?;
        }
    }

    if let Err(err) = write_tool_files(&staging, bundle) {
        let _ = std::fs::remove_dir_all(&staging);
        return Err(err);
    }

    let had_previous = target.exists();
    if had_previous {
        if let Err(e) = std::fs::rename(&target, &backup) {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(io_err(&target, e));
        }
    }

    if let Err(e) = std::fs::rename(&staging, &target) {
        if had_previous {
            let _ = std::fs::rename(&backup, &target);
        }
        let _ = std::fs::remove_dir_all(&staging);
        return Err(io_err(&target, e));
    }

    if had_previous {
        std::fs::remove_dir_all(&backup).map_err(|e| io_err(&backup, e))?;
    }
    Ok(())
}
