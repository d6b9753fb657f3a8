//! Core types for entity documents: profiles, plans, and logs.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// The only schema version tag accepted when decoding a document.
pub const SCHEMA_VERSION: &str = "1.0";

/// Document kind enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Profile,
    Plan,
    Log,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Profile, EntityKind::Plan, EntityKind::Log];

    /// File-name suffix identifying documents of this kind.
    pub fn suffix(&self) -> &'static str {
        match self {
            EntityKind::Profile => ".profile.json",
            EntityKind::Plan => ".plan.json",
            EntityKind::Log => ".log.json",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Profile => "profile",
            EntityKind::Plan => "plan",
            EntityKind::Log => "log",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "profile" => Ok(EntityKind::Profile),
            "plan" => Ok(EntityKind::Plan),
            "log" => Ok(EntityKind::Log),
            _ => Err(format!("Invalid entity kind: {}", s)),
        }
    }
}

/// A declared inheritance reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InheritRef {
    /// Local path, absolute or relative to the merge root.
    Local(PathBuf),
    /// Remote URL. Recognised but never followed.
    Remote(String),
}

impl InheritRef {
    pub fn parse(raw: &str) -> Option<InheritRef> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if raw.contains("://") {
            Some(InheritRef::Remote(raw.to_string()))
        } else {
            Some(InheritRef::Local(PathBuf::from(raw)))
        }
    }
}

/// Extension data carried by unrecognised document keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Vec<ExtValue>),
    Object(BTreeMap<String, ExtValue>),
}

/// A titled hyperlink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    #[serde(default)]
    pub title: String,
    pub url: String,
}

/// A free-text note, optionally timestamped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub text: String,
}

/// A titled group of items: checklists, plan sections, horizon buckets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacklogItem {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

/// A (type, weight) attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub weight: f64,
}

/// Primary and secondary contribution weights declared by a profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContributionMix {
    #[serde(default)]
    pub primary: Vec<ContributionRecord>,
    #[serde(default)]
    pub secondary: Vec<ContributionRecord>,
}

/// An evidenced contribution inside a log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub weight: f64,
    #[serde(default)]
    pub evidence: String,
}

/// Contributions attributed to one actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionGroup {
    pub actor: String,
    #[serde(default)]
    pub items: Vec<ContributionItem>,
}

impl ContributionGroup {
    /// Weight-normalized share per contribution type.
    pub fn shares(&self) -> BTreeMap<String, f64> {
        crate::reduce::normalize_shares(
            self.items
                .iter()
                .map(|item| (item.kind.as_str(), item.weight)),
        )
    }
}

/// A timestamped log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub contributions: Vec<ContributionGroup>,
}

/// Profile document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDocument {
    pub schema_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub responsibilities: Vec<String>,
    #[serde(default)]
    pub guardrails: Vec<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub checklists: Vec<ItemGroup>,
    #[serde(default)]
    pub contribution_mix: ContributionMix,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default)]
    pub inherits: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, ExtValue>,
}

/// Plan document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanDocument {
    pub schema_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub sections: Vec<ItemGroup>,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
    #[serde(default)]
    pub backlog: Vec<BacklogItem>,
    #[serde(default)]
    pub horizon: Vec<ItemGroup>,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default)]
    pub inherits: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, ExtValue>,
}

/// Log document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogDocument {
    pub schema_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub entries: Vec<LogEntry>,
    #[serde(default)]
    pub inherits: Vec<String>,
}

/// Behaviour shared by the three document kinds.
pub trait EntityDocument: DeserializeOwned {
    const KIND: EntityKind;

    fn slug(&self) -> Option<&str>;
    fn updated(&self) -> Option<&str>;
    fn inherits(&self) -> &[String];
}

macro_rules! entity_document {
    ($ty:ty, $kind:expr) => {
        impl EntityDocument for $ty {
            const KIND: EntityKind = $kind;

            fn slug(&self) -> Option<&str> {
                self.slug.as_deref()
            }

            fn updated(&self) -> Option<&str> {
                self.updated.as_deref()
            }

            fn inherits(&self) -> &[String] {
                &self.inherits
            }
        }
    };
}

entity_document!(ProfileDocument, EntityKind::Profile);
entity_document!(PlanDocument, EntityKind::Plan);
entity_document!(LogDocument, EntityKind::Log);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_from_str() {
        assert_eq!("Profile".parse::<EntityKind>(), Ok(EntityKind::Profile));
        assert_eq!("log".parse::<EntityKind>(), Ok(EntityKind::Log));
        assert!("roster".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_inherit_ref_classifies_remote_and_local() {
        assert_eq!(
            InheritRef::parse("https://example.com/base.profile.json"),
            Some(InheritRef::Remote(
                "https://example.com/base.profile.json".to_string()
            ))
        );
        assert_eq!(
            InheritRef::parse("shared/base"),
            Some(InheritRef::Local(PathBuf::from("shared/base")))
        );
        assert_eq!(InheritRef::parse("   "), None);
    }

    #[test]
    fn test_profile_captures_unknown_keys_as_extension_data() {
        let profile: ProfileDocument = serde_json::from_str(
            r#"{
                "schemaVersion": "1.0",
                "slug": "scout",
                "cadence": {"weekly": true, "hours": [9, 17]},
                "motto": null
            }"#,
        )
        .unwrap();

        assert_eq!(profile.slug.as_deref(), Some("scout"));
        assert_eq!(profile.extra.get("motto"), Some(&ExtValue::Null));
        let Some(ExtValue::Object(cadence)) = profile.extra.get("cadence") else {
            panic!("cadence should decode as an object");
        };
        assert_eq!(cadence.get("weekly"), Some(&ExtValue::Bool(true)));
        assert!(matches!(cadence.get("hours"), Some(ExtValue::Array(h)) if h.len() == 2));
    }

    #[test]
    fn test_log_entry_requires_contributions() {
        let result: Result<LogEntry, _> =
            serde_json::from_str(r#"{"timestamp":"2025-09-01T10:00:00Z","title":"kickoff"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_contribution_group_shares() {
        let group = ContributionGroup {
            actor: "ada".to_string(),
            items: vec![
                ContributionItem {
                    kind: "code".to_string(),
                    weight: 3.0,
                    evidence: "PR 12".to_string(),
                },
                ContributionItem {
                    kind: "review".to_string(),
                    weight: 1.0,
                    evidence: String::new(),
                },
            ],
        };
        let shares = group.shares();
        assert_eq!(shares.get("code"), Some(&0.75));
        assert_eq!(shares.get("review"), Some(&0.25));
    }
}
