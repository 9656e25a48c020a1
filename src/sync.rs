//! Fetch → merge → write for one document, plus invalidation of the
//! matching keys in sibling-locale documents.

use crate::error::SyncResult;
use crate::locale::LocaleLayout;
use crate::merge::{merge, MergeResult, Submission};
use crate::properties::PropertiesDocument;
use crate::remote::{DocumentLocation, RemoteStore, WriteMode};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// What happened to one sibling-locale document during invalidation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationOutcome {
    /// Key lines were removed and the document committed
    Removed { keys: Vec<String> },
    /// The path could not be derived from the primary path
    SkippedUnderivable,
    /// The document does not exist or is empty
    SkippedMissing,
    /// None of the changed keys are present
    SkippedNoKeys,
    /// Fetching or committing failed; the primary commit stands
    Failed(String),
}

/// Invalidation result for one secondary locale
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleInvalidation {
    pub locale: String,
    pub path: Option<String>,
    pub outcome: InvalidationOutcome,
}

/// Result of committing a primary-locale document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryCommit {
    pub result: MergeResult,
    pub invalidations: Vec<LocaleInvalidation>,
}

/// Commit message used when removing keys from sibling documents
pub fn invalidation_message(original_message: &str) -> String {
    format!(
        "chore: remove keys pending retranslation (related change: {})",
        original_message
    )
}

/// Merge engine bound to a remote store
#[derive(Clone)]
pub struct DocumentSync {
    store: Arc<dyn RemoteStore>,
    locales: LocaleLayout,
}

impl DocumentSync {
    pub fn new(store: Arc<dyn RemoteStore>, locales: LocaleLayout) -> Self {
        Self { store, locales }
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    pub fn locales(&self) -> &LocaleLayout {
        &self.locales
    }

    /// Merge a properties fragment into the remote document and write it back.
    ///
    /// Nothing is written when every submitted pair is already present.
    pub async fn commit(
        &self,
        location: &DocumentLocation,
        content: &str,
        commit_message: &str,
    ) -> SyncResult<MergeResult> {
        self.commit_submission(location, &Submission::from_fragment(content), commit_message)
            .await
            .map(|(result, _)| result)
    }

    /// Commit to the primary document, then invalidate changed keys in every
    /// secondary-locale document.
    pub async fn commit_primary(
        &self,
        location: &DocumentLocation,
        content: &str,
        commit_message: &str,
    ) -> SyncResult<PrimaryCommit> {
        let (result, changed_keys) = self
            .commit_submission(location, &Submission::from_fragment(content), commit_message)
            .await?;

        let invalidations = if changed_keys.is_empty() {
            Vec::new()
        } else {
            self.invalidate_secondary_locales(location, &changed_keys, commit_message)
                .await
        };

        Ok(PrimaryCommit {
            result,
            invalidations,
        })
    }

    async fn commit_submission(
        &self,
        location: &DocumentLocation,
        submission: &Submission,
        commit_message: &str,
    ) -> SyncResult<(MergeResult, Vec<String>)> {
        location.validate()?;

        let existing = self.store.get_file(location).await?.unwrap_or_default();
        let mode = if existing.is_empty() {
            WriteMode::Create
        } else {
            WriteMode::Update
        };

        let outcome = merge(&existing, submission);
        let Some(rebuilt) = outcome.rebuilt else {
            info!(
                "No changes for {} ({} entries already up to date)",
                location, outcome.result.skipped
            );
            return Ok((outcome.result, Vec::new()));
        };

        info!(
            "Committing {} ({:?}): added={}, updated={}, skipped={}",
            location, mode, outcome.result.added, outcome.result.updated, outcome.result.skipped
        );
        self.store
            .write_file(location, &rebuilt, commit_message, mode)
            .await?;

        Ok((outcome.result, outcome.changed_keys))
    }

    /// Remove `changed_keys` from each secondary-locale document so a later
    /// translation pass regenerates them.
    ///
    /// Each locale is handled on its own; failures are logged and reported
    /// but never propagated.
    pub async fn invalidate_secondary_locales(
        &self,
        primary: &DocumentLocation,
        changed_keys: &[String],
        original_message: &str,
    ) -> Vec<LocaleInvalidation> {
        let keys: HashSet<String> = changed_keys.iter().cloned().collect();
        let message = invalidation_message(original_message);
        let mut report = Vec::new();

        for (locale, path) in self.locales.secondary_paths(&primary.path) {
            let outcome = match &path {
                None => {
                    warn!(
                        "Cannot derive {} document path from {}, skipping",
                        locale.code, primary.path
                    );
                    InvalidationOutcome::SkippedUnderivable
                }
                Some(path) => {
                    let target = primary.with_path(path);
                    match self.remove_keys(&target, &keys, &message).await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            warn!("Failed to invalidate keys in {}: {}", target, e);
                            InvalidationOutcome::Failed(e.to_string())
                        }
                    }
                }
            };

            report.push(LocaleInvalidation {
                locale: locale.code.clone(),
                path,
                outcome,
            });
        }

        report
    }

    async fn remove_keys(
        &self,
        target: &DocumentLocation,
        keys: &HashSet<String>,
        message: &str,
    ) -> SyncResult<InvalidationOutcome> {
        let content = match self.store.get_file(target).await? {
            Some(content) if !content.is_empty() => content,
            _ => {
                info!("{} is missing or empty, nothing to invalidate", target);
                return Ok(InvalidationOutcome::SkippedMissing);
            }
        };

        let document = PropertiesDocument::parse(&content);
        let mut present: Vec<String> = keys
            .iter()
            .filter(|key| document.contains_key(key))
            .cloned()
            .collect();
        if present.is_empty() {
            info!("No changed keys present in {}, skipping", target);
            return Ok(InvalidationOutcome::SkippedNoKeys);
        }
        present.sort();

        let present_set: HashSet<String> = present.iter().cloned().collect();
        let reduced = document.without_keys(&present_set).to_text();

        info!("Removing {} keys from {}: {:?}", present.len(), target, present);
        self.store
            .write_file(target, &reduced, message, WriteMode::Update)
            .await?;

        Ok(InvalidationOutcome::Removed { keys: present })
    }
}
