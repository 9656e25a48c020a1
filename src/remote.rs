//! Remote file API client.
//!
//! Documents are read and written whole through a GitLab-v3-style
//! repository files endpoint. Content travels base64-encoded.

use crate::config::Config;
use crate::error::{SyncError, SyncResult};
use crate::retry::{with_retry_if, RetryConfig};
use async_trait::async_trait;
use base64::{prelude::BASE64_STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info};

/// A document addressed by repository, branch and path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentLocation {
    pub project_id: String,
    pub branch: String,
    pub path: String,
}

impl DocumentLocation {
    pub fn new(project_id: &str, branch: &str, path: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            branch: branch.to_string(),
            path: path.to_string(),
        }
    }

    /// Same repository and branch, different path
    pub fn with_path(&self, path: &str) -> Self {
        Self {
            path: path.to_string(),
            ..self.clone()
        }
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.project_id.trim().is_empty() {
            return Err(SyncError::Configuration(
                "CODE_PROJECT_ID (project id) is not set".to_string(),
            ));
        }
        if self.branch.trim().is_empty() {
            return Err(SyncError::Configuration("target branch is empty".to_string()));
        }
        if self.path.trim().is_empty() {
            return Err(SyncError::Configuration("document path is empty".to_string()));
        }
        Ok(())
    }
}

impl std::fmt::Display for DocumentLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}", self.project_id, self.branch, self.path)
    }
}

/// Whether a write creates a new file or replaces an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    Update,
}

/// Whole-file access to a remote document store
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch a document. `Ok(None)` means the file does not exist.
    async fn get_file(&self, location: &DocumentLocation) -> SyncResult<Option<String>>;

    /// Replace (or create) a document in a single commit
    async fn write_file(
        &self,
        location: &DocumentLocation,
        content: &str,
        commit_message: &str,
        mode: WriteMode,
    ) -> SyncResult<()>;
}

#[derive(Debug, Deserialize)]
struct FileResponse {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Serialize)]
struct FileWriteRequest<'a> {
    file_path: &'a str,
    branch_name: &'a str,
    content: String,
    encoding: &'static str,
    commit_message: &'a str,
}

/// HTTP client for the code platform's repository files API
#[derive(Debug, Clone)]
pub struct CodePlatformClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    retry: RetryConfig,
}

impl CodePlatformClient {
    /// Build a client from configuration. Fails before any network call if
    /// credentials or identifiers are missing.
    pub fn new(config: &Config) -> SyncResult<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .connect_timeout(config.http_timeout)
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| SyncError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.private_token.clone(),
            retry: RetryConfig::file_fetch(),
        })
    }

    /// Override the retry policy used for reads
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn files_url(&self, project_id: &str) -> String {
        format!("{}/projects/{}/repository/files", self.base_url, project_id)
    }

    async fn fetch_once(&self, location: &DocumentLocation) -> SyncResult<Option<String>> {
        let response = self
            .client
            .get(self.files_url(&location.project_id))
            .header("Private-Token", &self.token)
            .query(&[
                ("file_path", location.path.as_str()),
                ("ref", location.branch.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            debug!("{} does not exist", location);
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::http(status.as_u16(), body));
        }

        let body = response.text().await?;
        let file: FileResponse = serde_json::from_str(&body)?;
        decode_content(&file.content).map(Some)
    }
}

/// Decode a base64 file body, tolerating embedded line breaks
pub fn decode_content(encoded: &str) -> SyncResult<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64_STANDARD.decode(compact)?;
    String::from_utf8(bytes).map_err(|e| SyncError::Format(format!("content is not UTF-8: {}", e)))
}

pub fn encode_content(content: &str) -> String {
    BASE64_STANDARD.encode(content.as_bytes())
}

#[async_trait]
impl RemoteStore for CodePlatformClient {
    async fn get_file(&self, location: &DocumentLocation) -> SyncResult<Option<String>> {
        location.validate()?;
        info!("Fetching {}", location);

        with_retry_if(
            &self.retry,
            &format!("fetch {}", location.path),
            || self.fetch_once(location),
            SyncError::is_retryable,
        )
        .await
    }

    async fn write_file(
        &self,
        location: &DocumentLocation,
        content: &str,
        commit_message: &str,
        mode: WriteMode,
    ) -> SyncResult<()> {
        location.validate()?;

        let url = self.files_url(&location.project_id);
        let request = match mode {
            WriteMode::Create => self.client.post(&url),
            WriteMode::Update => self.client.put(&url),
        };

        info!("Writing {} ({:?}, {} bytes)", location, mode, content.len());

        let response = request
            .header("Private-Token", &self.token)
            .json(&FileWriteRequest {
                file_path: &location.path,
                branch_name: &location.branch,
                content: encode_content(content),
                encoding: "base64",
                commit_message,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::http(status.as_u16(), body));
        }

        debug!("Write to {} accepted ({})", location, status);
        Ok(())
    }
}

/// A write recorded by [`InMemoryStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub location: DocumentLocation,
    pub content: String,
    pub commit_message: String,
    pub mode: WriteMode,
}

/// A [`RemoteStore`] held entirely in memory.
///
/// Used for dry runs (seeded from the real store, never written back) and in
/// tests. Writes can be made to fail per path.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    files: Mutex<HashMap<DocumentLocation, String>>,
    writes: Mutex<Vec<RecordedWrite>>,
    failing_paths: Mutex<Vec<String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, location: &DocumentLocation, content: &str) {
        lock(&self.files).insert(location.clone(), content.to_string());
    }

    pub fn content(&self, location: &DocumentLocation) -> Option<String> {
        lock(&self.files).get(location).cloned()
    }

    /// Every write issued so far, oldest first
    pub fn writes(&self) -> Vec<RecordedWrite> {
        lock(&self.writes).clone()
    }

    /// Make every read and write of `path` fail with a 500
    pub fn fail_path(&self, path: &str) {
        lock(&self.failing_paths).push(path.to_string());
    }

    fn check_failing(&self, location: &DocumentLocation) -> SyncResult<()> {
        if lock(&self.failing_paths).iter().any(|p| p == &location.path) {
            return Err(SyncError::http(500, format!("injected failure for {}", location.path)));
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    async fn get_file(&self, location: &DocumentLocation) -> SyncResult<Option<String>> {
        self.check_failing(location)?;
        Ok(self.content(location))
    }

    async fn write_file(
        &self,
        location: &DocumentLocation,
        content: &str,
        commit_message: &str,
        mode: WriteMode,
    ) -> SyncResult<()> {
        self.check_failing(location)?;
        self.insert(location, content);
        lock(&self.writes).push(RecordedWrite {
            location: location.clone(),
            content: content.to_string(),
            commit_message: commit_message.to_string(),
            mode,
        });
        Ok(())
    }
}
