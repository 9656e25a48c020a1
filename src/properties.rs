//! Line-oriented model of a `.properties` document.
//!
//! Each non-blank line keeps its raw text so untouched lines are reproduced
//! verbatim. Key/value lines also remember where their separator sits, so a
//! value can be replaced without disturbing the key's formatting.

use std::collections::{HashMap, HashSet};

/// A key/value line together with the formatting needed to rewrite it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValueLine {
    key: String,
    value: String,
    separator: char,
    space_after_separator: bool,
    raw: String,
    separator_index: usize,
}

impl KeyValueLine {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn separator(&self) -> char {
        self.separator
    }

    pub fn space_after_separator(&self) -> bool {
        self.space_after_separator
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Render this line with a new value, keeping the original key text,
    /// separator and the single space after it if there was one.
    pub fn render_with_value(&self, value: &str) -> String {
        let prefix = &self.raw[..self.separator_index + self.separator.len_utf8()];
        let space = if self.space_after_separator { " " } else { "" };
        format!("{}{}{}", prefix, space, value)
    }
}

/// One significant line of a properties document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// Starts with `#` or `!` after trimming; stored untrimmed
    Comment(String),
    KeyValue(KeyValueLine),
    /// Non-blank text with no separator; kept as-is
    Passthrough(String),
}

impl Line {
    /// Classify a single line. Blank lines yield `None`.
    pub fn parse(raw: &str) -> Option<Line> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        if trimmed.starts_with('#') || trimmed.starts_with('!') {
            return Some(Line::Comment(raw.to_string()));
        }

        let Some((separator_index, separator)) =
            raw.char_indices().find(|(_, c)| *c == '=' || *c == ':')
        else {
            return Some(Line::Passthrough(raw.to_string()));
        };

        let key = raw[..separator_index].trim();
        if key.is_empty() {
            return Some(Line::Passthrough(raw.to_string()));
        }

        let after = &raw[separator_index + separator.len_utf8()..];
        Some(Line::KeyValue(KeyValueLine {
            key: key.to_string(),
            value: after.trim().to_string(),
            separator,
            space_after_separator: after.starts_with(' '),
            raw: raw.to_string(),
            separator_index,
        }))
    }

    /// The text this line serializes to when left untouched
    pub fn raw(&self) -> &str {
        match self {
            Line::Comment(text) | Line::Passthrough(text) => text,
            Line::KeyValue(kv) => kv.raw(),
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            Line::KeyValue(kv) => Some(kv.key()),
            _ => None,
        }
    }
}

/// An ordered sequence of significant lines
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertiesDocument {
    lines: Vec<Line>,
}

impl PropertiesDocument {
    /// Parse document text, dropping blank lines
    pub fn parse(text: &str) -> Self {
        Self {
            lines: text.lines().filter_map(Line::parse).collect(),
        }
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Key/value lines in document order
    pub fn entries(&self) -> impl Iterator<Item = &KeyValueLine> {
        self.lines.iter().filter_map(|line| match line {
            Line::KeyValue(kv) => Some(kv),
            _ => None,
        })
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries().any(|kv| kv.key() == key)
    }

    /// Value of the last line carrying `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries()
            .filter(|kv| kv.key() == key)
            .last()
            .map(|kv| kv.value())
    }

    /// Flatten into a key→value map. Later duplicates win.
    pub fn to_map(&self) -> HashMap<String, String> {
        self.entries()
            .map(|kv| (kv.key().to_string(), kv.value().to_string()))
            .collect()
    }

    /// Copy of this document without the key/value lines for `keys`.
    /// Comments and passthrough lines are untouched.
    pub fn without_keys(&self, keys: &HashSet<String>) -> Self {
        Self {
            lines: self
                .lines
                .iter()
                .filter(|line| line.key().map_or(true, |key| !keys.contains(key)))
                .cloned()
                .collect(),
        }
    }

    /// Serialize: one line per significant line, `\n`-terminated
    pub fn to_text(&self) -> String {
        join_lines(self.lines.iter().map(Line::raw))
    }
}

/// Join lines with `\n` and terminate with exactly one `\n`
pub(crate) fn join_lines<I, S>(lines: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for line in lines {
        out.push_str(line.as_ref());
        out.push('\n');
    }
    if out.is_empty() {
        out.push('\n');
    }
    out
}
