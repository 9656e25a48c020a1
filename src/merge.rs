//! Reconcile submitted entries against an existing properties document.
//!
//! Classification per submitted key:
//! - absent from the document → added
//! - present with a different (trimmed) value → updated
//! - present with the same value → skipped
//!
//! When nothing is added or updated the document is not rebuilt, so callers
//! never issue a write for a no-op submission.

use crate::properties::{join_lines, Line, PropertiesDocument};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Outcome counts of a merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeResult {
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl MergeResult {
    /// Number of keys that actually change the document
    pub fn changed_count(&self) -> usize {
        self.added + self.updated
    }

    pub fn total_count(&self) -> usize {
        self.added + self.updated + self.skipped
    }

    /// Human-readable summary, e.g. `2 added, 1 skipped`
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if self.added > 0 {
            parts.push(format!("{} added", self.added));
        }
        if self.updated > 0 {
            parts.push(format!("{} updated", self.updated));
        }
        if self.skipped > 0 {
            parts.push(format!("{} skipped (unchanged)", self.skipped));
        }
        if parts.is_empty() {
            "nothing to change".to_string()
        } else {
            parts.join(", ")
        }
    }
}

impl std::ops::Add for MergeResult {
    type Output = MergeResult;

    fn add(self, other: MergeResult) -> MergeResult {
        MergeResult {
            added: self.added + other.added,
            updated: self.updated + other.updated,
            skipped: self.skipped + other.skipped,
        }
    }
}

/// Submitted key/value pairs in first-seen order; a repeated key keeps its
/// first position and takes the last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Submission {
    pairs: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl Submission {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a properties fragment such as `K1 = v1\nK2 = v2`
    pub fn from_fragment(fragment: &str) -> Self {
        let mut submission = Self::new();
        for kv in PropertiesDocument::parse(fragment).entries() {
            submission.insert(kv.key(), kv.value());
        }
        submission
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        let value = value.trim().to_string();
        match self.index.get(key) {
            Some(&i) => self.pairs[i].1 = value,
            None => {
                self.index.insert(key.to_string(), self.pairs.len());
                self.pairs.push((key.to_string(), value));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.index.get(key).map(|&i| self.pairs[i].1.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for Submission {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut submission = Submission::new();
        for (k, v) in iter {
            submission.insert(k.as_ref(), v.as_ref());
        }
        submission
    }
}

/// Result of merging a submission into existing text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub result: MergeResult,
    /// Keys classified as added or updated, in submission order
    pub changed_keys: Vec<String>,
    /// Rebuilt document text; `None` when nothing changed
    pub rebuilt: Option<String>,
}

/// Classify every submitted key and rebuild the document if anything changed
pub fn merge(existing_text: &str, submission: &Submission) -> MergeOutcome {
    let existing = PropertiesDocument::parse(existing_text).to_map();

    let mut result = MergeResult::default();
    let mut changed_keys = Vec::new();

    for (key, value) in submission.iter() {
        match existing.get(key) {
            None => {
                debug!("Adding {}", key);
                result.added += 1;
                changed_keys.push(key.to_string());
            }
            Some(old) if old != value => {
                debug!("Updating {} ({:?} -> {:?})", key, old, value);
                result.updated += 1;
                changed_keys.push(key.to_string());
            }
            Some(_) => {
                debug!("Skipping {} (unchanged)", key);
                result.skipped += 1;
            }
        }
    }

    let rebuilt = (result.changed_count() > 0).then(|| rebuild(existing_text, submission));

    MergeOutcome {
        result,
        changed_keys,
        rebuilt,
    }
}

/// Rewrite `existing_text` with the submission applied.
///
/// Untouched lines are copied verbatim, blank lines are dropped, submitted
/// keys are rewritten in place, and new keys are inserted before the first
/// existing key that sorts after them (case-insensitive), or appended.
pub fn rebuild(existing_text: &str, submission: &Submission) -> String {
    let document = PropertiesDocument::parse(existing_text);

    let mut output: Vec<String> = Vec::with_capacity(document.lines().len() + submission.len());
    let mut seen_keys: HashSet<&str> = HashSet::new();
    // (lowercased key, emitted position) for every key line in document order
    let mut key_positions: Vec<(String, usize)> = Vec::new();

    for line in document.lines() {
        match line {
            Line::KeyValue(kv) => {
                seen_keys.insert(kv.key());
                key_positions.push((kv.key().to_lowercase(), output.len()));
                match submission.get(kv.key()) {
                    Some(value) => output.push(kv.render_with_value(value)),
                    None => output.push(kv.raw().to_string()),
                }
            }
            other => output.push(other.raw().to_string()),
        }
    }

    let mut new_keys: Vec<(&str, &str)> = submission
        .iter()
        .filter(|(key, _)| !seen_keys.contains(key))
        .collect();
    new_keys.sort_by(|(a, _), (b, _)| {
        a.to_lowercase()
            .cmp(&b.to_lowercase())
            .then_with(|| a.cmp(b))
    });

    let mut insert_offset = 0;
    for (key, value) in new_keys {
        let folded = key.to_lowercase();
        let insert_at = key_positions
            .iter()
            .find(|(existing, _)| *existing > folded)
            .map(|(_, position)| position + insert_offset)
            .unwrap_or(output.len());

        output.insert(insert_at, format!("{} = {}", key, value));
        insert_offset += 1;
    }

    join_lines(output)
}
