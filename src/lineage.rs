//! Lineage resolution: which directories may define an entity, global to local.

use crate::storage::{LineageConfig, has_any_document, normalize_path};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A directory that may hold a definition of the entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextItem {
    /// Context root the entity directory was found under.
    pub dir: PathBuf,
    /// Resolved document path: `<dir>/<entities_dir>/<entity_id>` after
    /// symlink indirection. It holds one document per kind, located with
    /// `find_document`, so a single item serves profile, plan and log merges.
    pub entity_dir: PathBuf,
    /// Submodule name for manifest-declared sub-trees, else the directory name.
    pub prefix: String,
    /// Strictly increasing from global to local.
    pub weight: u32,
}

/// A sub-tree declared in a manifest file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtreeEntry {
    pub name: String,
    pub path: String,
}

/// Parse a `.gitmodules`-style manifest. Only `path = <rel>` entries are read.
pub fn parse_manifest(content: &str) -> Vec<SubtreeEntry> {
    let mut entries = Vec::new();
    let mut section: Option<String> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            // [submodule "name"]
            section = header
                .split_once(char::is_whitespace)
                .map(|(_, name)| name.trim().trim_matches('"').to_string())
                .filter(|name| !name.is_empty());
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        if key.trim() != "path" {
            continue;
        }
        let path = value.trim().trim_matches('"').to_string();
        if path.is_empty() {
            continue;
        }
        entries.push(SubtreeEntry {
            name: section.clone().unwrap_or_else(|| path.clone()),
            path,
        });
    }

    entries
}

/// Resolve `<dir>/<entities_dir>/<entity_id>`, following at most one symlink.
fn resolve_entity_dir(dir: &Path, config: &LineageConfig, entity_id: &str) -> Option<PathBuf> {
    let candidate = config.entity_dir(dir, entity_id);
    let meta = fs::symlink_metadata(&candidate).ok()?;

    if meta.file_type().is_symlink() {
        let link = fs::read_link(&candidate).ok()?;
        let target = if link.is_absolute() {
            link
        } else {
            candidate.parent()?.join(link)
        };
        let target_meta = fs::symlink_metadata(&target).ok()?;
        return target_meta.is_dir().then_some(target);
    }

    meta.is_dir().then_some(candidate)
}

fn dir_label(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "/".to_string())
}

/// Sub-tree roots declared by any ancestor's manifest that contain `start`,
/// outermost first.
fn containing_subtrees(
    ancestors: &[PathBuf],
    start: &Path,
    config: &LineageConfig,
) -> Vec<(String, PathBuf)> {
    let mut found = Vec::new();
    for ancestor in ancestors {
        let manifest = ancestor.join(&config.manifest_file);
        let Ok(content) = fs::read_to_string(&manifest) else {
            continue;
        };
        for entry in parse_manifest(&content) {
            let subtree = ancestor.join(&entry.path);
            if !subtree.is_dir() {
                debug!(path = %subtree.display(), "manifest sub-tree missing, skipping");
                continue;
            }
            let subtree = normalize_path(&subtree);
            if start.starts_with(&subtree) {
                found.push((entry.name, subtree));
            }
        }
    }
    found.sort_by_key(|(_, path)| path.as_os_str().len());
    found
}

/// Candidate directories for `entity_id` seen from `start_dir`, ordered
/// global to local.
pub fn find_candidate_directories(
    entity_id: &str,
    start_dir: &Path,
    config: &LineageConfig,
) -> Vec<ContextItem> {
    let start = normalize_path(start_dir);
    let mut ancestors: Vec<PathBuf> = start.ancestors().map(Path::to_path_buf).collect();
    ancestors.reverse();

    let subtrees = containing_subtrees(&ancestors, &start, config);

    let contexts = ancestors
        .iter()
        .map(|dir| (dir_label(dir), dir.clone()))
        .chain(subtrees);

    let mut seen = HashSet::new();
    let mut items = Vec::new();
    let mut weight = 0u32;
    for (prefix, dir) in contexts {
        if !seen.insert(normalize_path(&dir)) {
            continue;
        }
        let Some(entity_dir) = resolve_entity_dir(&dir, config, entity_id) else {
            continue;
        };
        if !has_any_document(&entity_dir) {
            continue;
        }
        weight += 1;
        debug!(dir = %dir.display(), weight, "lineage candidate");
        items.push(ContextItem {
            dir,
            entity_dir,
            prefix,
            weight,
        });
    }

    items
}
