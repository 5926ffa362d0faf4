//! Domain types for agent and tool artifacts.
//!
//! An artifact is identified by its kind and name. Its content is compared
//! through a [`Fingerprint`] rather than byte equality, so formatting-only
//! edits never register as changes.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ArtifactError, CoreError};
use crate::fingerprint::{self, Fingerprint};

/// File name of a tool's dependency manifest.
pub const TOOL_MANIFEST: &str = "requirements.txt";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed artifact name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactName(pub String);

impl ArtifactName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ArtifactName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ArtifactName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// The two artifact collections. Tools sort before agents, which is also the
/// order they are applied in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Tool,
    Agent,
}

impl ArtifactKind {
    /// All kinds in dependency order.
    pub fn all() -> &'static [ArtifactKind] {
        &[ArtifactKind::Tool, ArtifactKind::Agent]
    }

    /// Collection name used by the remote CLI and the local tree.
    pub fn plural(self) -> &'static str {
        match self {
            ArtifactKind::Tool => "tools",
            ArtifactKind::Agent => "agents",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Tool => write!(f, "tool"),
            ArtifactKind::Agent => write!(f, "agent"),
        }
    }
}

impl FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tool" | "tools" => Ok(ArtifactKind::Tool),
            "agent" | "agents" => Ok(ArtifactKind::Agent),
            other => Err(format!("unknown artifact kind '{other}'; expected: agent, tool")),
        }
    }
}

/// Two-stage deployment state. Only ever moves from `Draft` to `Live`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentState {
    #[default]
    Draft,
    Live,
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentState::Draft => write!(f, "draft"),
            DeploymentState::Live => write!(f, "live"),
        }
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// `(kind, name)` identity of an artifact. Displays as `tool/hello_world`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArtifactId {
    pub kind: ArtifactKind,
    pub name: ArtifactName,
}

impl ArtifactId {
    pub fn new(kind: ArtifactKind, name: impl Into<ArtifactName>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn tool(name: impl Into<ArtifactName>) -> Self {
        Self::new(ArtifactKind::Tool, name)
    }

    pub fn agent(name: impl Into<ArtifactName>) -> Self {
        Self::new(ArtifactKind::Agent, name)
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

impl FromStr for ArtifactId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((kind, name)) = s.split_once('/') else {
            return Err(format!("invalid artifact id '{s}'; expected <kind>/<name>"));
        };
        if name.is_empty() {
            return Err(format!("invalid artifact id '{s}'; name is empty"));
        }
        Ok(Self::new(kind.parse()?, name))
    }
}

/// Where an artifact was read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Local(PathBuf),
    Remote(String),
}

// ---------------------------------------------------------------------------
// Content
// ---------------------------------------------------------------------------

/// An agent specification document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSpec {
    /// Raw YAML text as authored or exported.
    pub document: String,
}

/// A tool's files keyed by `/`-separated path relative to the tool folder.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ToolBundle {
    pub files: BTreeMap<String, Vec<u8>>,
}

impl ToolBundle {
    /// Relative path of the entry point for tool `name`.
    pub fn entry_point(name: &ArtifactName) -> String {
        format!("{name}.py")
    }

    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), content.into());
    }

    pub fn manifest(&self) -> Option<&[u8]> {
        self.files.get(TOOL_MANIFEST).map(Vec::as_slice)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactContent {
    Agent(AgentSpec),
    Tool(ToolBundle),
}

/// A named, typed unit of configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub id: ArtifactId,
    pub content: ArtifactContent,
    pub fingerprint: Fingerprint,
    /// Artifacts this one references. Always empty for tools.
    pub dependencies: BTreeSet<ArtifactId>,
    pub origin: Origin,
    pub state: DeploymentState,
}

impl Artifact {
    /// Build an agent artifact from its YAML document.
    ///
    /// The document must be a mapping. A `name` key, when present, must match
    /// `name`. Entries of `tools` and `collaborators` become dependencies.
    pub fn agent(
        name: impl Into<ArtifactName>,
        document: impl Into<String>,
        origin: Origin,
    ) -> Result<Self, ArtifactError> {
        let name = name.into();
        let document = document.into();
        let value: serde_yaml::Value = serde_yaml::from_str(&document)
            .map_err(|e| ArtifactError::Validation(format!("malformed agent YAML: {e}")))?;
        let Some(mapping) = value.as_mapping() else {
            return Err(ArtifactError::Validation(
                "agent document must be a YAML mapping".to_string(),
            ));
        };

        if let Some(declared) = mapping.get("name") {
            match declared.as_str() {
                Some(declared) if declared == name.as_str() => {}
                Some(declared) => {
                    return Err(ArtifactError::Validation(format!(
                        "agent declares name '{declared}' but is stored as '{name}'"
                    )))
                }
                None => {
                    return Err(ArtifactError::Validation(
                        "agent `name` must be a string".to_string(),
                    ))
                }
            }
        }

        let mut dependencies = BTreeSet::new();
        for tool in string_list(mapping, "tools")? {
            dependencies.insert(ArtifactId::tool(tool));
        }
        for collaborator in string_list(mapping, "collaborators")? {
            dependencies.insert(ArtifactId::agent(collaborator));
        }

        let fingerprint = fingerprint::of_agent(&value)?;
        Ok(Self {
            id: ArtifactId::new(ArtifactKind::Agent, name),
            content: ArtifactContent::Agent(AgentSpec { document }),
            fingerprint,
            dependencies,
            origin,
            state: DeploymentState::Draft,
        })
    }

    /// Build a tool artifact from its files.
    ///
    /// The bundle must hold `<name>.py` and `requirements.txt`.
    pub fn tool(
        name: impl Into<ArtifactName>,
        bundle: ToolBundle,
        origin: Origin,
    ) -> Result<Self, ArtifactError> {
        let name = name.into();
        let entry = ToolBundle::entry_point(&name);
        if !bundle.files.contains_key(&entry) {
            return Err(ArtifactError::Validation(format!("{entry} does not exist")));
        }
        if bundle.manifest().is_none() {
            return Err(ArtifactError::Validation(format!(
                "{TOOL_MANIFEST} is missing and is required"
            )));
        }

        let fingerprint = fingerprint::of_tool(&bundle);
        Ok(Self {
            id: ArtifactId::new(ArtifactKind::Tool, name),
            content: ArtifactContent::Tool(bundle),
            fingerprint,
            dependencies: BTreeSet::new(),
            origin,
            state: DeploymentState::Draft,
        })
    }

    pub fn with_state(mut self, state: DeploymentState) -> Self {
        self.state = state;
        self
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn kind(&self) -> ArtifactKind {
        self.id.kind
    }

    pub fn name(&self) -> &ArtifactName {
        &self.id.name
    }

    /// Names of the tools an agent references.
    pub fn tool_dependencies(&self) -> impl Iterator<Item = &ArtifactName> {
        self.dependencies
            .iter()
            .filter(|dep| dep.kind == ArtifactKind::Tool)
            .map(|dep| &dep.name)
    }

    /// Human-readable text of the content, used for diff previews.
    pub fn render_text(&self) -> String {
        match &self.content {
            ArtifactContent::Agent(spec) => spec.document.replace("\r\n", "\n"),
            ArtifactContent::Tool(bundle) => {
                let mut out = String::new();
                for (path, bytes) in &bundle.files {
                    out.push_str(&format!("==> {path} <==\n"));
                    let text = String::from_utf8_lossy(bytes).replace("\r\n", "\n");
                    out.push_str(&text);
                    if !text.ends_with('\n') {
                        out.push('\n');
                    }
                }
                out
            }
        }
    }
}

fn string_list(mapping: &serde_yaml::Mapping, key: &str) -> Result<Vec<String>, ArtifactError> {
    let Some(value) = mapping.get(key) else {
        return Ok(Vec::new());
    };
    if value.is_null() {
        return Ok(Vec::new());
    }
    let Some(items) = value.as_sequence() else {
        return Err(ArtifactError::Validation(format!(
            "agent `{key}` must be a list of names"
        )));
    };
    items
        .iter()
        .map(|item| {
            item.as_str().map(str::to_owned).ok_or_else(|| {
                ArtifactError::Validation(format!("agent `{key}` entries must be strings"))
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Sets
// ---------------------------------------------------------------------------

/// Artifacts of a single kind keyed by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSet {
    kind: ArtifactKind,
    entries: BTreeMap<ArtifactName, Artifact>,
}

impl ArtifactSet {
    pub fn new(kind: ArtifactKind) -> Self {
        Self {
            kind,
            entries: BTreeMap::new(),
        }
    }

    /// Build a set, rejecting mixed kinds and duplicate names.
    pub fn from_artifacts(
        kind: ArtifactKind,
        artifacts: impl IntoIterator<Item = Artifact>,
    ) -> Result<Self, CoreError> {
        let mut set = Self::new(kind);
        for artifact in artifacts {
            set.insert(artifact)?;
        }
        Ok(set)
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    pub fn insert(&mut self, artifact: Artifact) -> Result<(), CoreError> {
        if artifact.kind() != self.kind {
            return Err(CoreError::KindMismatch {
                expected: self.kind,
                found: artifact.id,
            });
        }
        if self.entries.contains_key(artifact.name()) {
            return Err(CoreError::DuplicateArtifact(artifact.id));
        }
        self.entries.insert(artifact.name().clone(), artifact);
        Ok(())
    }

    pub fn get(&self, name: &ArtifactName) -> Option<&Artifact> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &ArtifactName) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Artifacts in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.entries.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &ArtifactName> {
        self.entries.keys()
    }
}

/// An artifact that exists on one side but could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidArtifact {
    pub id: ArtifactId,
    pub error: ArtifactError,
}

/// Result of enumerating one side for one kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub artifacts: ArtifactSet,
    pub invalid: Vec<InvalidArtifact>,
}

impl Listing {
    pub fn empty(kind: ArtifactKind) -> Self {
        Self {
            artifacts: ArtifactSet::new(kind),
            invalid: Vec::new(),
        }
    }

    pub fn kind(&self) -> ArtifactKind {
        self.artifacts.kind()
    }

    /// Add a loaded artifact or record why it could not be loaded.
    pub fn push(&mut self, id: ArtifactId, loaded: Result<Artifact, ArtifactError>) {
        let outcome = loaded.and_then(|artifact| {
            self.artifacts
                .insert(artifact)
                .map_err(|e| ArtifactError::Validation(e.to_string()))
        });
        if let Err(error) = outcome {
            self.invalid.push(InvalidArtifact { id, error });
        }
    }

    /// Names of every artifact seen, loadable or not.
    pub fn all_names(&self) -> BTreeSet<ArtifactName> {
        self.artifacts
            .names()
            .cloned()
            .chain(self.invalid.iter().map(|i| i.id.name.clone()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
