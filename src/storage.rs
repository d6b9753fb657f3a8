//! File-based storage for entity documents.

use crate::types::{EntityDocument, EntityKind, InheritRef, SCHEMA_VERSION};
use serde::Deserialize;
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::warn;
use walkdir::WalkDir;

pub const CONFIG_FILE: &str = ".lineage.yaml";
pub const DEFAULT_ENTITIES_DIR: &str = "entities";
pub const DEFAULT_MANIFEST_FILE: &str = ".gitmodules";

/// Identities treated as placeholders and replaced by the requested entity id.
pub const DEFAULT_PLACEHOLDER_IDS: &[&str] = &["unknown", "agent-profile"];

/// Project configuration read from `.lineage.yaml` at the merge root.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct LineageConfig {
    #[serde(default = "default_entities_dir")]
    pub entities_dir: String,
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,
    #[serde(default = "default_placeholder_ids")]
    pub placeholder_ids: Vec<String>,
}

fn default_entities_dir() -> String {
    DEFAULT_ENTITIES_DIR.to_string()
}

fn default_manifest_file() -> String {
    DEFAULT_MANIFEST_FILE.to_string()
}

fn default_placeholder_ids() -> Vec<String> {
    DEFAULT_PLACEHOLDER_IDS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for LineageConfig {
    fn default() -> Self {
        Self {
            entities_dir: default_entities_dir(),
            manifest_file: default_manifest_file(),
            placeholder_ids: default_placeholder_ids(),
        }
    }
}

impl LineageConfig {
    /// Conventional directory holding an entity's documents under `context_root`.
    pub fn entity_dir(&self, context_root: &Path, entity_id: &str) -> PathBuf {
        context_root.join(&self.entities_dir).join(entity_id)
    }

    pub fn is_placeholder(&self, slug: &str) -> bool {
        let slug = slug.trim();
        slug.is_empty() || self.placeholder_ids.iter().any(|p| p == slug)
    }
}

/// Read `.lineage.yaml` from a merge root, falling back to defaults.
pub fn load_config(root: &Path) -> LineageConfig {
    let config_path = root.join(CONFIG_FILE);
    let Ok(content) = fs::read_to_string(&config_path) else {
        return LineageConfig::default();
    };
    match serde_yaml::from_str(&content) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %config_path.display(), error = %e, "ignoring malformed config");
            LineageConfig::default()
        }
    }
}

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Missing schemaVersion (expected {expected})")]
    MissingVersion { expected: String },
    #[error("Unsupported schemaVersion {found} (expected {expected})")]
    VersionMismatch { expected: String, found: String },
}

#[derive(Deserialize)]
struct VersionProbe {
    #[serde(rename = "schemaVersion")]
    schema_version: Option<serde_json::Value>,
}

/// Decode a document, checking the version tag before any other field.
pub fn decode_document<D: EntityDocument>(content: &str) -> Result<D, DocumentError> {
    let probe: VersionProbe = serde_json::from_str(content)?;
    match probe.schema_version {
        None => {
            return Err(DocumentError::MissingVersion {
                expected: SCHEMA_VERSION.to_string(),
            });
        }
        Some(serde_json::Value::String(ref v)) if v == SCHEMA_VERSION => {}
        Some(other) => {
            let found = match other {
                serde_json::Value::String(s) => s,
                value => value.to_string(),
            };
            return Err(DocumentError::VersionMismatch {
                expected: SCHEMA_VERSION.to_string(),
                found,
            });
        }
    }
    Ok(serde_json::from_str(content)?)
}

/// Load a single document from a JSON file.
pub fn load_document<D: EntityDocument>(path: &Path) -> Result<D, DocumentError> {
    let content = fs::read_to_string(path)?;
    decode_document(&content)
}

fn document_files(dir: &Path) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| !e.file_type().is_dir())
        .map(|e| e.into_path())
}

fn has_suffix(path: &Path, kind: EntityKind) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().ends_with(kind.suffix()))
        .unwrap_or(false)
}

/// Find the document of `kind` in `dir`; the first in file-name order wins.
pub fn find_document(dir: &Path, kind: EntityKind) -> Option<PathBuf> {
    if !dir.is_dir() {
        return None;
    }
    document_files(dir).find(|p| has_suffix(p, kind))
}

/// Whether `dir` holds at least one document of any kind.
pub fn has_any_document(dir: &Path) -> bool {
    dir.is_dir()
        && document_files(dir).any(|p| EntityKind::ALL.iter().any(|k| has_suffix(&p, *k)))
}

/// Lexically clean a path: drop `.` and fold `..` into the preceding component.
fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Normalized absolute form of `path`, used as document identity.
///
/// Existing paths are canonicalized, so symlinked copies of one physical file
/// share an identity.
pub fn normalize_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    clean_path(&absolute)
}

/// Resolve an inheritance reference to a local document of `kind`.
///
/// Remote references and references that do not resolve to an existing
/// document yield `None`.
pub fn resolve_reference(raw: &str, root: &Path, kind: EntityKind) -> Option<PathBuf> {
    let InheritRef::Local(path) = InheritRef::parse(raw)? else {
        return None;
    };
    let target = if path.is_absolute() {
        path
    } else {
        root.join(path)
    };
    if target.is_dir() {
        find_document(&target, kind)
    } else if target.is_file() {
        Some(target)
    } else {
        None
    }
}

/// Display `path` relative to `root` when it lies beneath it.
pub fn relative_display(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| path.display().to_string())
}
