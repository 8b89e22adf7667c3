//! Diff computation and normalization helpers
//!
//! Equality between declared and observed parameters always runs through a
//! per-kind normalization pass first. The helpers here cover the shared
//! rules: empty equals absent, order-insensitive collections, case-stable
//! enumerations, and float tolerance.

use crate::types::Action;
use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};
use std::collections::HashMap;

/// Tolerance for prices and tier values that round-trip through JSON floats
pub const FLOAT_EPSILON: f64 = 1e-9;

/// Float equality within [`FLOAT_EPSILON`]
pub fn float_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < FLOAT_EPSILON
}

/// Optional float equality; a missing value equals zero
pub fn opt_float_eq(a: Option<f64>, b: Option<f64>) -> bool {
    float_eq(a.unwrap_or_default(), b.unwrap_or_default())
}

/// Empty string becomes `None`
pub fn blank_to_none(value: &mut Option<String>) {
    if value.as_deref().is_some_and(str::is_empty) {
        *value = None;
    }
}

/// Empty collection becomes `None`
pub fn empty_to_none<T>(value: &mut Option<Vec<T>>) {
    if value.as_ref().is_some_and(Vec::is_empty) {
        *value = None;
    }
}

/// Empty map becomes `None`
pub fn empty_map_to_none<K, V>(value: &mut Option<std::collections::BTreeMap<K, V>>) {
    if value.as_ref().is_some_and(std::collections::BTreeMap::is_empty) {
        *value = None;
    }
}

/// `Some(false)` becomes `None`
pub fn false_to_none(value: &mut Option<bool>) {
    if *value == Some(false) {
        *value = None;
    }
}

/// Sort an optional list of strings and drop it if empty
pub fn sort_strings(value: &mut Option<Vec<String>>) {
    if let Some(items) = value.as_mut() {
        items.sort();
    }
    empty_to_none(value);
}

/// Sort an optional list by key and drop it if empty
pub fn sort_by_key<T, K: Ord>(value: &mut Option<Vec<T>>, key: impl FnMut(&T) -> K) {
    if let Some(items) = value.as_mut() {
        items.sort_by_key(key);
    }
    empty_to_none(value);
}

/// Lowercase an enumerated value the remote may echo in another case
pub fn lowercase(value: &mut Option<String>) {
    if let Some(v) = value.as_mut() {
        *v = v.to_lowercase();
    }
    blank_to_none(value);
}

/// Render a line diff between two normalized snapshots
///
/// Lines are prefixed with `-` (declared) and `+` (observed).
pub fn describe<T: Serialize>(desired: &T, observed: &T) -> String {
    let left = serde_json::to_string_pretty(desired).unwrap_or_default();
    let right = serde_json::to_string_pretty(observed).unwrap_or_default();

    let diff = TextDiff::from_lines(&left, &right);
    let mut out = String::new();
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "-",
            ChangeTag::Insert => "+",
            ChangeTag::Equal => " ",
        };
        out.push_str(sign);
        out.push_str(change.value());
        if !change.value().ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

/// A pending change for one declared resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDiff {
    /// `kind/name` of the declared resource
    pub key: String,
    /// Resource kind
    pub kind: String,
    /// What a pass would do
    pub action: Action,
    /// Field-level diff for drifted resources
    pub diff: Option<String>,
}

impl ResourceDiff {
    /// Check if this diff represents an addition
    pub fn is_addition(&self) -> bool {
        self.action == Action::Create
    }

    /// Check if this diff represents a removal
    pub fn is_removal(&self) -> bool {
        self.action == Action::Delete
    }

    /// Check if this diff represents a modification
    pub fn is_modification(&self) -> bool {
        self.action == Action::Update
    }
}

/// Diff summary statistics
#[derive(Debug, Clone, Default)]
pub struct DiffSummary {
    /// Number of resources to create
    pub additions: usize,
    /// Number of resources to delete
    pub removals: usize,
    /// Number of drifted resources
    pub modifications: usize,
}

impl DiffSummary {
    /// Create a summary from a list of diffs
    pub fn from_diffs(diffs: &[ResourceDiff]) -> Self {
        let mut summary = Self::default();
        for diff in diffs {
            if diff.is_addition() {
                summary.additions += 1;
            } else if diff.is_removal() {
                summary.removals += 1;
            } else if diff.is_modification() {
                summary.modifications += 1;
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.additions + self.removals + self.modifications
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Group diffs by resource kind
pub fn group_by_kind(diffs: &[ResourceDiff]) -> HashMap<String, Vec<&ResourceDiff>> {
    let mut groups: HashMap<String, Vec<&ResourceDiff>> = HashMap::new();
    for diff in diffs {
        groups.entry(diff.kind.clone()).or_default().push(diff);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_eq_epsilon() {
        assert!(float_eq(1.07, 1.07 + 1e-12));
        assert!(!float_eq(1.07, 1.071));
        assert!(opt_float_eq(None, Some(0.0)));
        assert!(!opt_float_eq(None, Some(1.0)));
    }

    #[test]
    fn test_empty_equals_absent() {
        let mut v: Option<Vec<String>> = Some(vec![]);
        empty_to_none(&mut v);
        assert!(v.is_none());

        let mut s = Some(String::new());
        blank_to_none(&mut s);
        assert!(s.is_none());

        let mut b = Some(false);
        false_to_none(&mut b);
        assert!(b.is_none());
    }

    #[test]
    fn test_sort_strings_commutative() {
        let mut a = Some(vec!["b".to_string(), "a".to_string()]);
        let mut b = Some(vec!["a".to_string(), "b".to_string()]);
        sort_strings(&mut a);
        sort_strings(&mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn test_lowercase() {
        let mut v = Some("USAGE".to_string());
        lowercase(&mut v);
        assert_eq!(v.as_deref(), Some("usage"));
    }

    #[test]
    fn test_describe_marks_changes() {
        #[derive(Serialize)]
        struct Snapshot {
            name: &'static str,
            price: u32,
        }
        let out = describe(
            &Snapshot {
                name: "compute",
                price: 1,
            },
            &Snapshot {
                name: "compute",
                price: 2,
            },
        );
        assert!(out.contains("-  \"price\": 1"));
        assert!(out.contains("+  \"price\": 2"));
        assert!(out.contains("   \"name\": \"compute\""));
    }

    #[test]
    fn test_diff_summary() {
        let diffs = vec![
            ResourceDiff {
                key: "product/a".into(),
                kind: "product".into(),
                action: Action::Create,
                diff: None,
            },
            ResourceDiff {
                key: "product/b".into(),
                kind: "product".into(),
                action: Action::Update,
                diff: Some("-x\n+y\n".into()),
            },
            ResourceDiff {
                key: "rate/c".into(),
                kind: "rate".into(),
                action: Action::Delete,
                diff: None,
            },
        ];
        let summary = DiffSummary::from_diffs(&diffs);
        assert_eq!(summary.additions, 1);
        assert_eq!(summary.modifications, 1);
        assert_eq!(summary.removals, 1);
        assert!(summary.has_changes());

        let groups = group_by_kind(&diffs);
        assert_eq!(groups["product"].len(), 2);
        assert_eq!(groups["rate"].len(), 1);
    }
}
