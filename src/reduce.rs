//! Pure field reduction helpers used by the merge engine.

use crate::types::{ContributionRecord, ItemGroup};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;

/// Last non-empty value wins. `values` is in precedence order (most global first).
pub fn last_non_empty<'a, I>(values: I) -> Option<String>
where
    I: IntoIterator<Item = Option<&'a str>>,
    I::IntoIter: DoubleEndedIterator,
{
    values
        .into_iter()
        .rev()
        .flatten()
        .find(|v| !v.trim().is_empty())
        .map(|v| v.to_string())
}

/// Order-preserving union of string lists. Blank entries are dropped and
/// values are compared after trimming.
pub fn union_strings<'a, I>(lists: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a [String]>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for value in lists.into_iter().flatten() {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        if seen.insert(value.to_string()) {
            out.push(value.to_string());
        }
    }
    out
}

/// Order-preserving union keyed by `key`. The first occurrence of each key is kept.
pub fn union_by<'a, T, K, I, F>(lists: I, key: F) -> Vec<T>
where
    T: Clone + 'a,
    K: Eq + Hash,
    I: IntoIterator<Item = &'a [T]>,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in lists.into_iter().flatten() {
        if seen.insert(key(item)) {
            out.push(item.clone());
        }
    }
    out
}

/// Flatten titled groups to display strings: `"<title>: <item>"`, or the bare
/// item when the group has no title.
pub fn flatten_groups(groups: &[ItemGroup]) -> Vec<String> {
    let mut out = Vec::new();
    for group in groups {
        let title = group.title.as_deref().map(str::trim).unwrap_or_default();
        for item in &group.items {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            if title.is_empty() {
                out.push(item.to_string());
            } else {
                out.push(format!("{}: {}", title, item));
            }
        }
    }
    out
}

/// Accumulate weights per type; a later record for the same type overwrites
/// an earlier one, types absent later survive.
pub fn accumulate_weights<'a, I>(records: I) -> BTreeMap<String, f64>
where
    I: IntoIterator<Item = &'a ContributionRecord>,
{
    let mut weights = BTreeMap::new();
    for record in records {
        let kind = record.kind.trim();
        if kind.is_empty() {
            continue;
        }
        weights.insert(kind.to_string(), record.weight);
    }
    weights
}

/// Collapse (type, weight) pairs into a share map summing to 1.
///
/// The last weight given for a type wins. Non-positive weights are dropped;
/// if nothing positive remains the map is empty.
pub fn normalize_shares<'a, I>(pairs: I) -> BTreeMap<String, f64>
where
    I: IntoIterator<Item = (&'a str, f64)>,
{
    let mut weights: BTreeMap<String, f64> = BTreeMap::new();
    for (kind, weight) in pairs {
        weights.insert(kind.to_string(), weight);
    }
    weights.retain(|_, w| w.is_finite() && *w > 0.0);

    // Scale by the largest weight so the sum cannot overflow to infinity.
    let max = weights.values().copied().fold(0.0_f64, f64::max);
    if max <= 0.0 {
        return BTreeMap::new();
    }
    let total: f64 = weights.values().map(|w| w / max).sum();
    weights
        .into_iter()
        .map(|(kind, weight)| (kind, weight / max / total))
        .collect()
}

/// Parse an evidence timestamp. Accepts RFC 3339 and bare `YYYY-MM-DD` dates.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Sort key placing unparsable timestamps after every valid one.
pub fn timestamp_order(raw: &str) -> (bool, Option<DateTime<Utc>>) {
    let parsed = parse_timestamp(raw);
    (parsed.is_none(), parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_union_strings_preserves_first_seen_order() {
        let a = strings(&["A", "B", "A", " ", "B"]);
        let b = strings(&["B", "C"]);
        let c = strings(&["", "D", "A", "E"]);

        let merged = union_strings([a.as_slice(), b.as_slice(), c.as_slice()]);
        assert_eq!(merged, strings(&["A", "B", "C", "D", "E"]));
    }

    #[test]
    fn test_union_strings_compares_trimmed() {
        let a = strings(&[" ship ", "ship"]);
        assert_eq!(union_strings([a.as_slice()]), strings(&["ship"]));
    }

    #[test]
    fn test_last_non_empty_prefers_most_local() {
        let values = [Some("global"), None, Some("local"), Some("  ")];
        assert_eq!(last_non_empty(values), Some("local".to_string()));
        assert_eq!(last_non_empty([None, Some("")]), None);
    }

    #[test]
    fn test_union_by_composite_key() {
        let a = vec![("Docs", "https://a"), ("Docs", "https://b")];
        let b = vec![("Docs", "https://a"), ("Wiki", "https://a")];
        let merged = union_by([a.as_slice(), b.as_slice()], |(t, u)| (*t, *u));
        assert_eq!(
            merged,
            vec![("Docs", "https://a"), ("Docs", "https://b"), ("Wiki", "https://a")]
        );
    }

    #[test]
    fn test_flatten_groups_prefixes_titles() {
        let groups = vec![
            ItemGroup {
                title: Some("Launch".to_string()),
                items: strings(&["announce", ""]),
            },
            ItemGroup {
                title: None,
                items: strings(&["retro"]),
            },
        ];
        assert_eq!(flatten_groups(&groups), strings(&["Launch: announce", "retro"]));
    }

    #[test]
    fn test_accumulate_weights_last_wins_per_type() {
        let global = vec![
            ContributionRecord {
                kind: "research".to_string(),
                weight: 2.0,
            },
            ContributionRecord {
                kind: "writing".to_string(),
                weight: 1.0,
            },
        ];
        let local = vec![ContributionRecord {
            kind: "research".to_string(),
            weight: 5.0,
        }];
        let weights = accumulate_weights(global.iter().chain(local.iter()));
        assert_eq!(weights.get("research"), Some(&5.0));
        assert_eq!(weights.get("writing"), Some(&1.0));
    }

    #[test]
    fn test_normalize_shares_last_write_wins() {
        let shares = normalize_shares([("code", 1.0), ("docs", 1.0), ("code", 3.0)]);
        assert!((shares["code"] - 0.75).abs() < 1e-12);
        assert!((shares["docs"] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_shares_survives_huge_weights() {
        let shares = normalize_shares([("code", f64::MAX), ("docs", f64::MAX)]);
        assert_eq!(shares.get("code"), Some(&0.5));
        assert_eq!(shares.get("docs"), Some(&0.5));
        assert!((shares.values().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_shares_is_idempotent() {
        let once = normalize_shares([("code", 0.25), ("docs", 0.5), ("review", 0.25)]);
        let twice = normalize_shares(once.iter().map(|(k, v)| (k.as_str(), *v)));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_normalize_shares_empty_when_nothing_positive() {
        assert!(normalize_shares([("code", 0.0), ("docs", -2.0)]).is_empty());
        assert!(normalize_shares(std::iter::empty::<(&str, f64)>()).is_empty());
    }

    #[test]
    fn test_timestamp_order_sorts_malformed_last() {
        let mut raw = vec!["not a date", "2025-09-02T10:00:00Z", "2025-09-01"];
        raw.sort_by_key(|r| timestamp_order(r));
        assert_eq!(raw, vec!["2025-09-01", "2025-09-02T10:00:00Z", "not a date"]);
    }
}
