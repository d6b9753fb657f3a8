//! Lineage - merged views and provenance for hierarchical entity documents.
//!
//! Entities (profiles, plans, logs) may be defined at several levels of a
//! directory hierarchy and may inherit from other documents. This library
//! discovers every defining directory, resolves inheritance without looping
//! on cycles, reduces the documents into one deterministic view per kind,
//! and derives when each entity was first observed.

pub mod graph;
pub mod lineage;
pub mod merge;
pub mod origin;
pub mod reduce;
pub mod storage;
pub mod types;

pub use graph::{Expansion, InheritanceWalker, LoadedDocument, SkippedDocument};
pub use lineage::{ContextItem, SubtreeEntry, find_candidate_directories, parse_manifest};
pub use merge::{
    ContributionShares, MergeError, MergedLog, MergedPlan, MergedProfile, MergedRecord,
    MergedView, Reducible, gather, merge_document, merge_entity, merge_log, merge_plan,
    merge_profile,
};
pub use origin::{EvidenceSource, Origin, ProvenanceRecord, derive_origin, derive_origin_with};
pub use reduce::normalize_shares;
pub use storage::{
    CONFIG_FILE, DocumentError, LineageConfig, decode_document, load_config, load_document,
};
pub use types::{
    ContributionGroup, ContributionItem, ContributionRecord, EntityDocument, EntityKind, ExtValue,
    InheritRef, LogDocument, LogEntry, PlanDocument, ProfileDocument, SCHEMA_VERSION,
};
