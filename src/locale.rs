//! Naming convention that ties per-locale documents to the primary one.
//!
//! `i18n_data_zh.properties` is the primary (source) document; its siblings
//! are found by swapping the locale marker at the end of the filename.

/// A sibling locale whose document path is derived from the primary path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondaryLocale {
    /// Locale code used in logs and cache lookups, e.g. `en`
    pub code: String,
    /// Filename suffix replacing the primary marker, e.g. `_en.properties`
    pub marker: String,
}

impl SecondaryLocale {
    pub fn new(code: impl Into<String>, marker: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            marker: marker.into(),
        }
    }
}

/// Primary locale plus the secondary locales kept in sync with it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleLayout {
    pub primary_code: String,
    pub primary_marker: String,
    pub secondaries: Vec<SecondaryLocale>,
    /// Secondary locale that receives an entry's secondary value
    pub secondary_value_code: String,
}

impl Default for LocaleLayout {
    fn default() -> Self {
        Self {
            primary_code: "zh".to_string(),
            primary_marker: "_zh.properties".to_string(),
            secondaries: vec![
                SecondaryLocale::new("en", "_en.properties"),
                SecondaryLocale::new("zh_TW", "_zh_TW.properties"),
            ],
            secondary_value_code: "en".to_string(),
        }
    }
}

impl LocaleLayout {
    /// Derive a secondary document path from the primary one.
    ///
    /// Returns `None` when the primary path does not end with the primary
    /// marker, i.e. substitution would leave the path unchanged.
    pub fn derive_path(&self, primary_path: &str, locale: &SecondaryLocale) -> Option<String> {
        let stem = primary_path.strip_suffix(&self.primary_marker)?;
        let derived = format!("{}{}", stem, locale.marker);
        (derived != primary_path).then_some(derived)
    }

    /// Every secondary locale with its derived path (or `None`)
    pub fn secondary_paths<'a>(
        &'a self,
        primary_path: &'a str,
    ) -> impl Iterator<Item = (&'a SecondaryLocale, Option<String>)> + 'a {
        self.secondaries
            .iter()
            .map(move |locale| (locale, self.derive_path(primary_path, locale)))
    }

    /// Path of the document that receives secondary values
    pub fn secondary_value_path(&self, primary_path: &str) -> Option<String> {
        let locale = self
            .secondaries
            .iter()
            .find(|l| l.code == self.secondary_value_code)?;
        self.derive_path(primary_path, locale)
    }
}
