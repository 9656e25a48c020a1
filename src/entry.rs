use serde::{Deserialize, Serialize};

/// Letters that make up a namespace prefix such as `DPN` or `NDP`
const NAMESPACE_LETTERS: [char; 3] = ['D', 'P', 'N'];

/// Where an entry came from. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// A user selection or a single line
    Selection,
    /// A multi-line window around a line
    Window,
    /// Whole-file batch extraction
    File,
    /// A JSON map
    Json,
    /// Supplied directly by a caller
    Manual,
}

/// A single localization record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    key: String,
    value: String,
    #[serde(default)]
    secondary_value: String,
    origin: Origin,
}

impl Entry {
    pub fn new(key: impl Into<String>, value: impl Into<String>, origin: Origin) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            secondary_value: String::new(),
            origin,
        }
    }

    /// Attach a secondary-locale value (e.g. the English text)
    pub fn with_secondary_value(mut self, secondary_value: impl Into<String>) -> Self {
        self.secondary_value = secondary_value.into();
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn secondary_value(&self) -> &str {
        &self.secondary_value
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn has_secondary_value(&self) -> bool {
        !self.secondary_value.trim().is_empty()
    }

    /// The value as it is stored in a properties file, line breaks escaped
    pub fn properties_value(&self) -> String {
        escape_line_breaks(&self.value)
    }

    /// Render as a primary-locale properties line (`key = value`)
    pub fn to_properties_line(&self) -> String {
        format!("{} = {}", self.key, self.properties_value())
    }

    /// Render as a secondary-locale properties line (`key = secondary`)
    pub fn to_secondary_properties_line(&self) -> String {
        format!("{} = {}", self.key, escape_line_breaks(&self.secondary_value))
    }
}

/// Replace raw line breaks with `\n` / `\r` escapes so a value stays on one line
fn escape_line_breaks(value: &str) -> String {
    value
        .replace("\r\n", "\\n")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

/// Check whether a key lives in a recognized localization namespace.
///
/// The first three characters must be a permutation of `D`, `P`, `N`,
/// followed by a literal `.`. Everything after the dot is opaque.
pub fn is_namespaced_key(key: &str) -> bool {
    let bytes = key.as_bytes();
    if bytes.len() < 4 || bytes[3] != b'.' {
        return false;
    }

    let prefix = &key[..3];
    NAMESPACE_LETTERS
        .iter()
        .all(|letter| prefix.chars().filter(|c| c == letter).count() == 1)
}
