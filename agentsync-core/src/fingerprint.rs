//! Content fingerprints.
//!
//! A fingerprint is the hex SHA-256 of a canonical serialization, so two
//! artifacts that differ only in formatting share a fingerprint:
//!
//! - agents: YAML → JSON value → compact JSON with object keys sorted
//! - tools: every file in path order; text has LF line endings and no
//!   trailing blank lines, the `requirements.txt` manifest is reduced to its
//!   sorted, de-duplicated requirement lines

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ArtifactError;
use crate::types::{ToolBundle, TOOL_MANIFEST};

/// Hex SHA-256 digest of canonical artifact content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    /// First 12 hex characters, for display.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Fingerprint a parsed agent document.
pub fn of_agent(document: &serde_yaml::Value) -> Result<Fingerprint, ArtifactError> {
    let json = serde_json::to_value(document).map_err(|e| {
        ArtifactError::Validation(format!("agent document is not representable as JSON: {e}"))
    })?;
    let mut canonical = String::new();
    write_canonical_json(&json, &mut canonical);
    Ok(digest(canonical.as_bytes()))
}

/// Fingerprint a tool bundle, including its dependency manifest.
pub fn of_tool(bundle: &ToolBundle) -> Fingerprint {
    let mut hasher = Sha256::new();
    for (path, bytes) in &bundle.files {
        let canonical = if path == TOOL_MANIFEST {
            canonical_manifest(bytes)
        } else {
            normalize_text(bytes)
        };
        hasher.update(path.as_bytes());
        hasher.update([0u8]);
        hasher.update(&canonical);
        hasher.update([0u8]);
    }
    Fingerprint(hex::encode(hasher.finalize()))
}

fn digest(bytes: &[u8]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Fingerprint(hex::encode(hasher.finalize()))
}

/// Serialize with object keys in sorted order, independent of how the
/// `serde_json` map type is configured.
fn write_canonical_json(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(inner) = map.get(key) {
                    write_canonical_json(inner, out);
                }
            }
            out.push('}');
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical_json(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn normalize_text(bytes: &[u8]) -> Vec<u8> {
    match std::str::from_utf8(bytes) {
        Ok(text) => {
            let normalized = text.replace("\r\n", "\n");
            let trimmed = normalized.trim_end_matches(['\n', ' ', '\t']);
            let mut out = trimmed.as_bytes().to_vec();
            if !out.is_empty() {
                out.push(b'\n');
            }
            out
        }
        Err(_) => bytes.to_vec(),
    }
}

fn canonical_manifest(bytes: &[u8]) -> Vec<u8> {
    let text = String::from_utf8_lossy(bytes);
    let mut lines: Vec<&str> = text
        .lines()
        .map(|line| match line.find(" #") {
            Some(idx) => &line[..idx],
            None => line,
        })
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect();
    lines.sort_unstable();
    lines.dedup();
    lines.join("\n").into_bytes()
}
