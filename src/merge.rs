//! Inheritance-aware merge of entity documents into one view per kind.
//!
//! Documents are gathered global to local: lineage candidates in weight
//! order, and within each candidate every inherited document ahead of the
//! document that declared it. Reduction is a pure function of that
//! precedence-ranked list.

use crate::graph::{Expansion, InheritanceWalker, LoadedDocument};
use crate::lineage::find_candidate_directories;
use crate::origin::{Origin, derive_origin_with};
use crate::reduce::{
    accumulate_weights, flatten_groups, last_non_empty, normalize_shares, timestamp_order,
    union_by, union_strings,
};
use crate::storage::{LineageConfig, find_document, load_config, normalize_path};
use crate::types::{
    BacklogItem, EntityDocument, EntityKind, ExtValue, ItemGroup, Link, LogDocument, LogEntry,
    Milestone, Note, PlanDocument, ProfileDocument,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No {kind} documents found for entity '{entity}'")]
    NoDocuments { kind: EntityKind, entity: String },
}

/// Normalized contribution shares after accumulate-then-last-wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContributionShares {
    pub primary: BTreeMap<String, f64>,
    pub secondary: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedProfile {
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    pub tags: Vec<String>,
    pub responsibilities: Vec<String>,
    pub guardrails: Vec<String>,
    pub capabilities: Vec<String>,
    pub links: Vec<Link>,
    pub checklist: Vec<String>,
    pub contribution_mix: ContributionShares,
    pub notes: Vec<Note>,
    pub extra: BTreeMap<String, ExtValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_chain: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedPlan {
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objective: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    pub tags: Vec<String>,
    pub links: Vec<Link>,
    pub sections: Vec<String>,
    pub milestones: Vec<String>,
    pub backlog: Vec<String>,
    pub horizon: Vec<String>,
    pub notes: Vec<Note>,
    pub extra: BTreeMap<String, ExtValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_chain: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedLog {
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    pub tags: Vec<String>,
    pub links: Vec<Link>,
    pub entries: Vec<LogEntry>,
    /// Derived from contribution group actors; never read from documents.
    pub participants: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_chain: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
}

/// A merged view of any kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MergedView {
    Profile(MergedProfile),
    Plan(MergedPlan),
    Log(MergedLog),
}

impl MergedView {
    pub fn kind(&self) -> EntityKind {
        match self {
            MergedView::Profile(_) => EntityKind::Profile,
            MergedView::Plan(_) => EntityKind::Plan,
            MergedView::Log(_) => EntityKind::Log,
        }
    }

    pub fn slug(&self) -> &str {
        match self {
            MergedView::Profile(v) => &v.slug,
            MergedView::Plan(v) => &v.slug,
            MergedView::Log(v) => &v.slug,
        }
    }

    pub fn origin(&self) -> Option<&Origin> {
        match self {
            MergedView::Profile(v) => v.origin.as_ref(),
            MergedView::Plan(v) => v.origin.as_ref(),
            MergedView::Log(v) => v.origin.as_ref(),
        }
    }
}

/// Fields every merged view carries beyond its reduced content.
pub trait MergedRecord {
    fn slug_mut(&mut self) -> &mut String;
    fn set_origin(&mut self, origin: Origin);
}

macro_rules! merged_record {
    ($ty:ty) => {
        impl MergedRecord for $ty {
            fn slug_mut(&mut self) -> &mut String {
                &mut self.slug
            }

            fn set_origin(&mut self, origin: Origin) {
                self.origin = Some(origin);
            }
        }
    };
}

merged_record!(MergedProfile);
merged_record!(MergedPlan);
merged_record!(MergedLog);

/// A document kind that can be reduced into a merged view.
pub trait Reducible: EntityDocument + Sized {
    type View: MergedRecord;

    /// Reduce documents by precedence. Input order is irrelevant.
    fn reduce(documents: &[LoadedDocument<Self>]) -> Self::View;
}

fn by_precedence<D>(documents: &[LoadedDocument<D>]) -> Vec<&D> {
    let mut ranked: Vec<&LoadedDocument<D>> = documents.iter().collect();
    ranked.sort_by_key(|d| d.precedence);
    ranked.into_iter().map(|d| &d.document).collect()
}

fn union_links<'a, I>(lists: I) -> Vec<Link>
where
    I: IntoIterator<Item = &'a [Link]>,
{
    union_by(lists, |l: &Link| {
        (l.title.trim().to_string(), l.url.trim().to_string())
    })
}

fn union_flattened<'a, D: 'a, F>(docs: &[&'a D], groups: F) -> Vec<String>
where
    F: Fn(&'a D) -> &'a [ItemGroup],
{
    let flattened: Vec<Vec<String>> = docs.iter().map(|&d| flatten_groups(groups(d))).collect();
    union_strings(flattened.iter().map(Vec::as_slice))
}

fn union_titles<'a, D: 'a, T: 'a, F, G>(docs: &[&'a D], list: F, title: G) -> Vec<String>
where
    F: Fn(&'a D) -> &'a [T],
    G: Fn(&T) -> &str,
{
    let titles: Vec<Vec<String>> = docs
        .iter()
        .map(|&d| list(d).iter().map(|t| title(t).to_string()).collect())
        .collect();
    union_strings(titles.iter().map(Vec::as_slice))
}

/// Whole-list last non-empty wins.
fn last_non_empty_notes(docs: &[&[Note]]) -> Vec<Note> {
    docs.iter()
        .rev()
        .find(|notes| !notes.is_empty())
        .map(|notes| notes.to_vec())
        .unwrap_or_default()
}

fn accumulate_extra<'a, I>(maps: I) -> BTreeMap<String, ExtValue>
where
    I: IntoIterator<Item = &'a BTreeMap<String, ExtValue>>,
{
    let mut extra = BTreeMap::new();
    for map in maps {
        for (key, value) in map {
            extra.insert(key.clone(), value.clone());
        }
    }
    extra
}

fn shares(weights: BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    normalize_shares(weights.iter().map(|(k, v)| (k.as_str(), *v)))
}

impl Reducible for ProfileDocument {
    type View = MergedProfile;

    fn reduce(documents: &[LoadedDocument<Self>]) -> MergedProfile {
        let docs = by_precedence(documents);
        let notes: Vec<&[Note]> = docs.iter().map(|d| d.notes.as_slice()).collect();

        MergedProfile {
            slug: last_non_empty(docs.iter().map(|d| d.slug.as_deref())).unwrap_or_default(),
            title: last_non_empty(docs.iter().map(|d| d.title.as_deref())),
            status: last_non_empty(docs.iter().map(|d| d.status.as_deref())),
            role: last_non_empty(docs.iter().map(|d| d.role.as_deref())),
            summary: last_non_empty(docs.iter().map(|d| d.summary.as_deref())),
            updated: last_non_empty(docs.iter().map(|d| d.updated.as_deref())),
            tags: union_strings(docs.iter().map(|d| d.tags.as_slice())),
            responsibilities: union_strings(docs.iter().map(|d| d.responsibilities.as_slice())),
            guardrails: union_strings(docs.iter().map(|d| d.guardrails.as_slice())),
            capabilities: union_strings(docs.iter().map(|d| d.capabilities.as_slice())),
            links: union_links(docs.iter().map(|d| d.links.as_slice())),
            checklist: union_flattened(&docs, |d| d.checklists.as_slice()),
            contribution_mix: ContributionShares {
                primary: shares(accumulate_weights(
                    docs.iter().flat_map(|d| d.contribution_mix.primary.iter()),
                )),
                secondary: shares(accumulate_weights(
                    docs.iter().flat_map(|d| d.contribution_mix.secondary.iter()),
                )),
            },
            notes: last_non_empty_notes(&notes),
            extra: accumulate_extra(docs.iter().map(|d| &d.extra)),
            context_chain: None,
            origin: None,
        }
    }
}

impl Reducible for PlanDocument {
    type View = MergedPlan;

    fn reduce(documents: &[LoadedDocument<Self>]) -> MergedPlan {
        let docs = by_precedence(documents);
        let notes: Vec<&[Note]> = docs.iter().map(|d| d.notes.as_slice()).collect();

        MergedPlan {
            slug: last_non_empty(docs.iter().map(|d| d.slug.as_deref())).unwrap_or_default(),
            title: last_non_empty(docs.iter().map(|d| d.title.as_deref())),
            status: last_non_empty(docs.iter().map(|d| d.status.as_deref())),
            objective: last_non_empty(docs.iter().map(|d| d.objective.as_deref())),
            updated: last_non_empty(docs.iter().map(|d| d.updated.as_deref())),
            tags: union_strings(docs.iter().map(|d| d.tags.as_slice())),
            links: union_links(docs.iter().map(|d| d.links.as_slice())),
            sections: union_flattened(&docs, |d| d.sections.as_slice()),
            milestones: union_titles(
                &docs,
                |d| d.milestones.as_slice(),
                |m: &Milestone| m.title.as_str(),
            ),
            backlog: union_titles(
                &docs,
                |d| d.backlog.as_slice(),
                |b: &BacklogItem| b.title.as_str(),
            ),
            horizon: union_flattened(&docs, |d| d.horizon.as_slice()),
            notes: last_non_empty_notes(&notes),
            extra: accumulate_extra(docs.iter().map(|d| &d.extra)),
            context_chain: None,
            origin: None,
        }
    }
}

fn entry_key(entry: &LogEntry) -> (String, String) {
    (
        entry.timestamp.trim().to_string(),
        entry.title.as_deref().map(str::trim).unwrap_or_default().to_string(),
    )
}

/// Actors across every contribution group, first-seen order.
pub fn participants(entries: &[LogEntry]) -> Vec<String> {
    let actors: Vec<String> = entries
        .iter()
        .flat_map(|e| e.contributions.iter().map(|g| g.actor.clone()))
        .collect();
    union_strings([actors.as_slice()])
}

impl Reducible for LogDocument {
    type View = MergedLog;

    fn reduce(documents: &[LoadedDocument<Self>]) -> MergedLog {
        let docs = by_precedence(documents);
        let mut entries = union_by(docs.iter().map(|d| d.entries.as_slice()), entry_key);
        entries.sort_by_key(|e| timestamp_order(&e.timestamp));

        MergedLog {
            slug: last_non_empty(docs.iter().map(|d| d.slug.as_deref())).unwrap_or_default(),
            title: last_non_empty(docs.iter().map(|d| d.title.as_deref())),
            updated: last_non_empty(docs.iter().map(|d| d.updated.as_deref())),
            tags: union_strings(docs.iter().map(|d| d.tags.as_slice())),
            links: union_links(docs.iter().map(|d| d.links.as_slice())),
            participants: participants(&entries),
            entries,
            context_chain: None,
            origin: None,
        }
    }
}

/// Load every document of kind `D` reachable from the lineage of `entity_id`.
///
/// Documents that fail to decode are reported in `skipped`, not returned as
/// errors. An unreadable local entity directory is an error.
pub fn gather<D: EntityDocument>(
    entity_id: &str,
    root: &Path,
    config: &LineageConfig,
) -> Result<Expansion<D>, MergeError> {
    let mut dirs: Vec<_> = find_candidate_directories(entity_id, root, config)
        .into_iter()
        .map(|item| item.entity_dir)
        .collect();

    let local = config.entity_dir(root, entity_id);
    if local.is_dir() {
        fs::read_dir(&local)?;
    }
    dirs.push(local);

    let kind = D::KIND;
    let mut walker = InheritanceWalker::<D>::new(root);
    let mut seen = HashSet::new();
    for dir in dirs {
        if !seen.insert(normalize_path(&dir)) {
            continue;
        }
        match find_document(&dir, kind) {
            Some(path) => walker.visit(&path, None),
            None => debug!(dir = %dir.display(), %kind, "no document in candidate"),
        }
    }

    Ok(walker.finish())
}

/// Merge documents of kind `D` for `entity_id`, attaching its origin.
pub fn merge_document<D: Reducible>(
    entity_id: &str,
    root: &Path,
    config: &LineageConfig,
) -> Result<D::View, MergeError> {
    let kind = D::KIND;
    let expansion = gather::<D>(entity_id, root, config)?;
    if expansion.is_empty() {
        return Err(MergeError::NoDocuments {
            kind,
            entity: entity_id.to_string(),
        });
    }
    debug!(
        entity = entity_id,
        %kind,
        loaded = expansion.loaded.len(),
        skipped = expansion.skipped.len(),
        "merging"
    );

    let mut view = D::reduce(&expansion.loaded);
    let slug = view.slug_mut();
    if config.is_placeholder(slug) {
        *slug = entity_id.to_string();
    }
    view.set_origin(derive_origin_with(entity_id, root, config));
    Ok(view)
}

pub fn merge_profile(entity_id: &str, root: &Path) -> Result<MergedProfile, MergeError> {
    merge_document::<ProfileDocument>(entity_id, root, &load_config(root))
}

pub fn merge_plan(entity_id: &str, root: &Path) -> Result<MergedPlan, MergeError> {
    merge_document::<PlanDocument>(entity_id, root, &load_config(root))
}

pub fn merge_log(entity_id: &str, root: &Path) -> Result<MergedLog, MergeError> {
    merge_document::<LogDocument>(entity_id, root, &load_config(root))
}

/// Merge the `kind` view of `entity_id` as seen from `root`.
pub fn merge_entity(
    kind: EntityKind,
    entity_id: &str,
    root: &Path,
) -> Result<MergedView, MergeError> {
    let config = load_config(root);
    Ok(match kind {
        EntityKind::Profile => {
            MergedView::Profile(merge_document::<ProfileDocument>(entity_id, root, &config)?)
        }
        EntityKind::Plan => {
            MergedView::Plan(merge_document::<PlanDocument>(entity_id, root, &config)?)
        }
        EntityKind::Log => {
            MergedView::Log(merge_document::<LogDocument>(entity_id, root, &config)?)
        }
    })
}
