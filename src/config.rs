use crate::error::{SyncError, SyncResult};
use crate::locale::LocaleLayout;
use crate::remote::DocumentLocation;
use anyhow::{Context, Result};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://code.alibaba-inc.com/api/v3";
pub const DEFAULT_COMMIT_TEMPLATE: &str = "feat: add i18n entry {key}";

#[derive(Debug, Clone)]
pub struct Config {
    // Remote file API
    pub api_url: String,
    pub private_token: String,
    pub project_id: String,

    // Target document
    pub branch: String,
    pub properties_path: String,
    pub commit_template: String,

    // Timeouts
    pub http_timeout: Duration,
    pub cache_ttl: Duration,

    pub locales: LocaleLayout,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            private_token: String::new(),
            project_id: String::new(),
            branch: "master".to_string(),
            properties_path: "src/main/resources/i18n/i18n_data_zh.properties".to_string(),
            commit_template: DEFAULT_COMMIT_TEMPLATE.to_string(),
            http_timeout: Duration::from_secs(10),
            cache_ttl: Duration::from_secs(300),
            locales: LocaleLayout::default(),
        }
    }
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// Missing credentials are not an error here; [`Config::validate`] is
    /// checked before any network call instead.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            // Remote file API
            api_url: std::env::var("CODE_API_URL").unwrap_or(defaults.api_url),
            private_token: std::env::var("CODE_PRIVATE_TOKEN").unwrap_or_default(),
            project_id: std::env::var("CODE_PROJECT_ID").unwrap_or_default(),

            // Target document
            branch: std::env::var("I18N_BRANCH").unwrap_or(defaults.branch),
            properties_path: std::env::var("I18N_PROPERTIES_PATH")
                .unwrap_or(defaults.properties_path),
            commit_template: std::env::var("I18N_COMMIT_TEMPLATE")
                .unwrap_or(defaults.commit_template),

            // Timeouts
            http_timeout: optional_secs("HTTP_TIMEOUT_SECS")?.unwrap_or(defaults.http_timeout),
            cache_ttl: optional_secs("CACHE_TTL_SECS")?.unwrap_or(defaults.cache_ttl),

            locales: defaults.locales,
        })
    }

    /// Check everything a network operation needs
    pub fn validate(&self) -> SyncResult<()> {
        if self.private_token.trim().is_empty() {
            return Err(SyncError::Configuration(
                "CODE_PRIVATE_TOKEN is not set".to_string(),
            ));
        }
        if self.api_url.trim().is_empty() {
            return Err(SyncError::Configuration("CODE_API_URL is empty".to_string()));
        }
        self.primary_location().validate()
    }

    /// Location of the primary-locale document
    pub fn primary_location(&self) -> DocumentLocation {
        DocumentLocation::new(&self.project_id, &self.branch, &self.properties_path)
    }
}

fn optional_secs(name: &str) -> Result<Option<Duration>> {
    match std::env::var(name) {
        Ok(raw) => {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{} must be a whole number of seconds, got {:?}", name, raw))?;
            Ok(Some(Duration::from_secs(secs)))
        }
        Err(_) => Ok(None),
    }
}
