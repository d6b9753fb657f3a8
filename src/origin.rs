//! Provenance derivation: when and where an entity's facts first appeared.

use crate::graph::{InheritanceWalker, LoadedDocument};
use crate::lineage::find_candidate_directories;
use crate::reduce::timestamp_order;
use crate::storage::{
    LineageConfig, find_document, load_config, load_document, normalize_path, relative_display,
};
use crate::types::{EntityKind, LogDocument, Note, PlanDocument, ProfileDocument};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Kind of evidence a provenance record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSource {
    /// A profile's `updated` timestamp.
    Profile,
    /// A plan's `updated` timestamp.
    Plan,
    /// A log's `updated` timestamp.
    Log,
    LogEntry,
    Note,
}

impl fmt::Display for EvidenceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvidenceSource::Profile => write!(f, "profile"),
            EvidenceSource::Plan => write!(f, "plan"),
            EvidenceSource::Log => write!(f, "log"),
            EvidenceSource::LogEntry => write!(f, "log_entry"),
            EvidenceSource::Note => write!(f, "note"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenanceRecord {
    pub source: EvidenceSource,
    /// Path relative to the merge root.
    pub path: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherited_from: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Origin {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_observed_at: Option<String>,
    #[serde(default)]
    pub provenance: Vec<ProvenanceRecord>,
}

struct EvidenceCollector<'a> {
    base: &'a Path,
    inspected: HashSet<PathBuf>,
    records: Vec<ProvenanceRecord>,
}

impl<'a> EvidenceCollector<'a> {
    fn new(base: &'a Path) -> Self {
        Self {
            base,
            inspected: HashSet::new(),
            records: Vec::new(),
        }
    }

    /// Returns false when `path` has already been inspected.
    fn claim(&mut self, path: &Path) -> bool {
        self.inspected.insert(normalize_path(path))
    }

    fn push(
        &mut self,
        source: EvidenceSource,
        path: &Path,
        timestamp: Option<&str>,
        inherited_from: &Option<String>,
    ) {
        let Some(timestamp) = timestamp.map(str::trim).filter(|t| !t.is_empty()) else {
            return;
        };
        self.records.push(ProvenanceRecord {
            source,
            path: relative_display(&normalize_path(path), self.base),
            timestamp: timestamp.to_string(),
            inherited_from: inherited_from.clone(),
        });
    }

    fn push_notes(&mut self, path: &Path, notes: &[Note], inherited_from: &Option<String>) {
        for note in notes {
            self.push(
                EvidenceSource::Note,
                path,
                note.timestamp.as_deref(),
                inherited_from,
            );
        }
    }

    fn profile(&mut self, loaded: &LoadedDocument<ProfileDocument>) {
        if !self.claim(&loaded.path) {
            return;
        }
        let profile = &loaded.document;
        self.push(
            EvidenceSource::Profile,
            &loaded.path,
            profile.updated.as_deref(),
            &loaded.inherited_from,
        );
        self.push_notes(&loaded.path, &profile.notes, &loaded.inherited_from);

        if let Some(dir) = loaded.path.parent() {
            self.siblings(dir, &loaded.inherited_from);
        }
    }

    /// Inspect the plan and log colocated in `dir`. They are never recursed
    /// into for further inheritance.
    fn siblings(&mut self, dir: &Path, inherited_from: &Option<String>) {
        if let Some(path) = find_document(dir, EntityKind::Plan) {
            if self.claim(&path) {
                match load_document::<PlanDocument>(&path) {
                    Ok(plan) => {
                        self.push(
                            EvidenceSource::Plan,
                            &path,
                            plan.updated.as_deref(),
                            inherited_from,
                        );
                        self.push_notes(&path, &plan.notes, inherited_from);
                    }
                    Err(e) => warn!(path = %path.display(), error = %e, "skipping plan evidence"),
                }
            }
        }

        if let Some(path) = find_document(dir, EntityKind::Log) {
            if self.claim(&path) {
                match load_document::<LogDocument>(&path) {
                    Ok(log) => {
                        self.push(
                            EvidenceSource::Log,
                            &path,
                            log.updated.as_deref(),
                            inherited_from,
                        );
                        for entry in &log.entries {
                            self.push(
                                EvidenceSource::LogEntry,
                                &path,
                                Some(&entry.timestamp),
                                inherited_from,
                            );
                        }
                    }
                    Err(e) => warn!(path = %path.display(), error = %e, "skipping log evidence"),
                }
            }
        }
    }

    fn finish(mut self) -> Origin {
        // Stable: equal timestamps keep discovery order.
        self.records.sort_by_key(|r| timestamp_order(&r.timestamp));
        Origin {
            first_observed_at: self.records.first().map(|r| r.timestamp.clone()),
            provenance: self.records,
        }
    }
}

/// Derive the provenance chain for `entity_id` using the config at `root`.
pub fn derive_origin(entity_id: &str, root: &Path) -> Origin {
    derive_origin_with(entity_id, root, &load_config(root))
}

/// Walk the lineage and profile inheritance graph collecting timestamped
/// evidence, oldest first.
pub fn derive_origin_with(entity_id: &str, root: &Path, config: &LineageConfig) -> Origin {
    let base = normalize_path(root);
    let mut collector = EvidenceCollector::new(&base);
    let mut walker = InheritanceWalker::<ProfileDocument>::new(root);

    for item in find_candidate_directories(entity_id, root, config) {
        match find_document(&item.entity_dir, EntityKind::Profile) {
            Some(path) => walker.visit(&path, None),
            None => collector.siblings(&item.entity_dir, &None),
        }
    }

    let expansion = walker.finish();
    for loaded in &expansion.loaded {
        collector.profile(loaded);
    }
    // A profile that failed to decode drops only itself.
    for skipped in &expansion.skipped {
        if let Some(dir) = skipped.path.parent() {
            collector.siblings(dir, &None);
        }
    }

    collector.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn write_json(path: &Path, value: serde_json::Value) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
    }

    #[test]
    fn test_origin_orders_evidence_oldest_first() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let entity = root.join("entities/scout");
        write_json(
            &entity.join("scout.profile.json"),
            json!({"schemaVersion": "1.0", "slug": "scout", "updated": "2025-09-02T10:00:00Z"}),
        );
        write_json(
            &entity.join("scout.log.json"),
            json!({
                "schemaVersion": "1.0",
                "entries": [
                    {"timestamp": "2025-09-01T10:00:00Z", "title": "kickoff", "contributions": []}
                ]
            }),
        );

        let origin = derive_origin("scout", root);
        assert_eq!(
            origin.first_observed_at.as_deref(),
            Some("2025-09-01T10:00:00Z")
        );
        let stamps: Vec<&str> = origin
            .provenance
            .iter()
            .map(|r| r.timestamp.as_str())
            .collect();
        assert_eq!(stamps, vec!["2025-09-01T10:00:00Z", "2025-09-02T10:00:00Z"]);
        assert_eq!(origin.provenance[0].source, EvidenceSource::LogEntry);
        assert_eq!(origin.provenance[0].path, "entities/scout/scout.log.json");
        assert_eq!(origin.provenance[1].source, EvidenceSource::Profile);
    }

    #[test]
    fn test_origin_empty_without_evidence() {
        let dir = TempDir::new().unwrap();
        let origin = derive_origin("ghost", dir.path());
        assert_eq!(origin, Origin::default());
    }

    #[test]
    fn test_origin_annotates_inherited_evidence() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_json(
            &root.join("shared/base/base.profile.json"),
            json!({
                "schemaVersion": "1.0",
                "slug": "base",
                "notes": [{"timestamp": "2024-01-05", "text": "drafted"}, {"text": "undated"}]
            }),
        );
        write_json(
            &root.join("shared/base/base.plan.json"),
            json!({"schemaVersion": "1.0", "updated": "2024-02-01T00:00:00Z"}),
        );
        write_json(
            &root.join("entities/scout/scout.profile.json"),
            json!({
                "schemaVersion": "1.0",
                "slug": "scout",
                "updated": "2025-01-01T00:00:00Z",
                "inherits": ["shared/base", "https://example.com/remote.profile.json"]
            }),
        );

        let origin = derive_origin("scout", root);
        assert_eq!(origin.first_observed_at.as_deref(), Some("2024-01-05"));
        assert_eq!(origin.provenance.len(), 3);
        assert_eq!(origin.provenance[0].source, EvidenceSource::Note);
        assert_eq!(origin.provenance[0].inherited_from.as_deref(), Some("scout"));
        assert_eq!(origin.provenance[1].source, EvidenceSource::Plan);
        assert_eq!(origin.provenance[1].path, "shared/base/base.plan.json");
        assert_eq!(origin.provenance[2].inherited_from, None);
    }

    #[test]
    fn test_origin_sorts_malformed_timestamps_last() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_json(
            &root.join("entities/scout/scout.log.json"),
            json!({
                "schemaVersion": "1.0",
                "entries": [
                    {"timestamp": "sometime last spring", "contributions": []},
                    {"timestamp": "2025-03-01T00:00:00Z", "contributions": []}
                ]
            }),
        );

        let origin = derive_origin("scout", root);
        assert_eq!(
            origin.first_observed_at.as_deref(),
            Some("2025-03-01T00:00:00Z")
        );
        assert_eq!(origin.provenance[1].timestamp, "sometime last spring");
    }

    #[test]
    fn test_origin_keeps_sibling_evidence_when_profile_is_stale() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let entity = root.join("entities/scout");
        write_json(
            &entity.join("scout.profile.json"),
            json!({"schemaVersion": "0.9", "slug": "scout", "updated": "2025-08-01T00:00:00Z"}),
        );
        write_json(
            &entity.join("scout.log.json"),
            json!({
                "schemaVersion": "1.0",
                "entries": [
                    {"timestamp": "2025-09-01T10:00:00Z", "title": "kickoff", "contributions": []}
                ]
            }),
        );

        let origin = derive_origin("scout", root);
        assert_eq!(
            origin.first_observed_at.as_deref(),
            Some("2025-09-01T10:00:00Z")
        );
        assert_eq!(origin.provenance.len(), 1);
        assert_eq!(origin.provenance[0].source, EvidenceSource::LogEntry);
        assert_eq!(origin.provenance[0].path, "entities/scout/scout.log.json");
    }

    #[test]
    fn test_origin_survives_profile_cycle() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_json(
            &root.join("entities/scout/scout.profile.json"),
            json!({
                "schemaVersion": "1.0",
                "slug": "scout",
                "updated": "2025-05-01",
                "inherits": ["peer"]
            }),
        );
        write_json(
            &root.join("peer/peer.profile.json"),
            json!({
                "schemaVersion": "1.0",
                "slug": "peer",
                "updated": "2025-04-01",
                "inherits": ["entities/scout"]
            }),
        );

        let origin = derive_origin("scout", root);
        assert_eq!(origin.provenance.len(), 2);
        assert_eq!(origin.first_observed_at.as_deref(), Some("2025-04-01"));
    }
}
