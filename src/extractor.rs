//! Pattern-based extraction of localization entries from free-form text.
//!
//! Recognized forms, in priority order:
//!
//! 1. Extended call: `NAME("DPN.Key", "value", ErrorLevel.LOGIC)` (may span lines)
//! 2. Simple call: `NAME("DPN.Key", "value")`
//! 3. JSON pairs: `{"DPN.Key": "value"}`
//!
//! Each form is an independent [`PatternMatcher`]. Keys that fail
//! [`is_namespaced_key`] are never extracted. "No match" is a normal outcome,
//! so nothing here returns an error.

use crate::entry::{is_namespaced_key, Entry, Origin};
use regex::Regex;
use std::sync::OnceLock;

/// Lines after the primary line that a window extraction may look at
const WINDOW_LOOKAHEAD: usize = 2;

/// A key/value pair matched by a single pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMatch {
    pub key: String,
    pub value: String,
}

/// One isolated extraction pattern
#[derive(Debug)]
pub struct PatternMatcher {
    name: &'static str,
    pattern: Regex,
    key_group: usize,
    value_group: usize,
}

impl PatternMatcher {
    fn new(name: &'static str, pattern: &str, key_group: usize, value_group: usize) -> Self {
        Self {
            name,
            // Patterns are fixed literals covered by tests
            pattern: Regex::new(pattern)
                .unwrap_or_else(|e| panic!("invalid {} pattern: {}", name, e)),
            key_group,
            value_group,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// All namespaced matches, in order of appearance
    pub fn find_all<'t>(&'t self, text: &'t str) -> impl Iterator<Item = RawMatch> + 't {
        self.pattern.captures_iter(text).filter_map(move |caps| {
            let key = caps.get(self.key_group)?.as_str();
            let value = caps.get(self.value_group)?.as_str();
            is_namespaced_key(key).then(|| RawMatch {
                key: key.to_string(),
                value: value.to_string(),
            })
        })
    }

    /// First namespaced match, if any
    pub fn find_first(&self, text: &str) -> Option<RawMatch> {
        self.find_all(text).next()
    }
}

/// `NAME("DPN.Key", "value", <anything>)`, tolerating line breaks
pub fn extended_call_matcher() -> &'static PatternMatcher {
    static MATCHER: OnceLock<PatternMatcher> = OnceLock::new();
    MATCHER.get_or_init(|| {
        PatternMatcher::new(
            "extended-call",
            r#"(\w+)\s*\(\s*"([DPN]{3}\.[^"]+)"\s*,\s*"([^"]+)"\s*,[^)]+\)"#,
            2,
            3,
        )
    })
}

/// `NAME("DPN.Key", "value")`
pub fn simple_call_matcher() -> &'static PatternMatcher {
    static MATCHER: OnceLock<PatternMatcher> = OnceLock::new();
    MATCHER.get_or_init(|| {
        PatternMatcher::new(
            "simple-call",
            r#"(\w+)\s*\(\s*"([DPN]{3}\.[^"]+)"\s*,\s*"([^"]+)"\s*\)"#,
            2,
            3,
        )
    })
}

/// `"DPN.Key": "value"` inside a JSON object
pub fn json_pair_matcher() -> &'static PatternMatcher {
    static MATCHER: OnceLock<PatternMatcher> = OnceLock::new();
    MATCHER.get_or_init(|| {
        PatternMatcher::new(
            "json-pair",
            r#""([DPN]{3}\.[^"]+)"\s*:\s*"([^"]+)""#,
            1,
            2,
        )
    })
}

fn key_literal_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#""([DPN]{3}\.[^"\n]+)""#)
            .unwrap_or_else(|e| panic!("invalid key literal pattern: {}", e))
    })
}

/// Call forms tried by single-shot extraction, highest priority first
fn call_matchers() -> [&'static PatternMatcher; 2] {
    [extended_call_matcher(), simple_call_matcher()]
}

/// Batch extraction over a whole file or blob, extended call form only.
///
/// Duplicate keys are kept; deduplication belongs to the caller.
pub fn extract_from_text(text: &str) -> Vec<Entry> {
    extended_call_matcher()
        .find_all(text)
        .map(|m| Entry::new(m.key, m.value, Origin::File))
        .collect()
}

/// Extract every `"key": "value"` pair from a JSON-shaped blob
pub fn extract_from_json(text: &str) -> Vec<Entry> {
    json_pair_matcher()
        .find_all(text)
        .map(|m| Entry::new(m.key, m.value, Origin::Json))
        .collect()
}

/// Extract the first entry from a selection or single line.
///
/// Tries the extended call form first, then the simple form.
pub fn extract_one(text: &str) -> Option<Entry> {
    call_matchers()
        .into_iter()
        .find_map(|matcher| matcher.find_first(text))
        .map(|m| Entry::new(m.key, m.value, Origin::Selection))
}

/// Extract from a line, widening to the next lines when the call spans them.
///
/// Looks at the primary line alone first, then at the primary line joined
/// with up to two following lines.
pub fn extract_from_window(primary_line: &str, following_lines: &[&str]) -> Option<Entry> {
    if let Some(entry) = extract_one(primary_line) {
        return Some(entry);
    }

    if following_lines.is_empty() {
        return None;
    }

    let mut window = String::from(primary_line);
    for line in following_lines.iter().take(WINDOW_LOOKAHEAD) {
        window.push('\n');
        window.push_str(line);
    }

    extract_one(&window).map(|entry| Entry::new(entry.key(), entry.value(), Origin::Window))
}

/// Whether a blob should be treated as JSON input
pub fn looks_like_json(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.starts_with('{') && trimmed.ends_with('}')
}

/// Whether either call form matches anywhere in the text
pub fn contains_match(text: &str) -> bool {
    call_matchers()
        .into_iter()
        .any(|matcher| matcher.find_first(text).is_some())
}

/// Extract from a blob, choosing JSON or call-form scanning by shape
pub fn extract_auto(text: &str) -> Vec<Entry> {
    if looks_like_json(text) {
        extract_from_json(text)
    } else {
        extract_from_text(text)
    }
}

/// A namespaced key literal found in source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyReference {
    pub key: String,
    /// Zero-based line number
    pub line: usize,
    /// Byte column of the opening quote within the line
    pub column: usize,
    /// Byte length of the literal including quotes
    pub len: usize,
}

/// Find every quoted namespaced key in the text, line by line
pub fn find_key_references(text: &str) -> Vec<KeyReference> {
    let mut references = Vec::new();

    for (line_number, line) in text.lines().enumerate() {
        for caps in key_literal_pattern().captures_iter(line) {
            let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if !is_namespaced_key(key.as_str()) {
                continue;
            }
            references.push(KeyReference {
                key: key.as_str().to_string(),
                line: line_number,
                column: whole.start(),
                len: whole.len(),
            });
        }
    }

    references
}

/// The namespaced key whose quoted literal covers `column` in a single line
pub fn key_at(line: &str, column: usize) -> Option<String> {
    find_key_references(line)
        .into_iter()
        .find(|r| column >= r.column && column < r.column + r.len)
        .map(|r| r.key)
}
