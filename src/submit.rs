//! Turn extracted or confirmed entries into document commits.
//!
//! The primary-locale commit decides success. Secondary values go to the
//! secondary-value locale document afterwards; a failure there is logged
//! and never fails the submission.

use crate::cache::PropertiesCache;
use crate::config::DEFAULT_COMMIT_TEMPLATE;
use crate::entry::Entry;
use crate::error::{SyncError, SyncResult};
use crate::merge::MergeResult;
use crate::remote::DocumentLocation;
use crate::sync::{DocumentSync, LocaleInvalidation};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Keys named in a batch commit message before the count suffix kicks in
const SAMPLE_KEYS: usize = 3;

/// Aggregated outcome of a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitReport {
    pub primary: MergeResult,
    /// `None` when there was nothing to submit or the secondary commit failed
    pub secondary: Option<MergeResult>,
    #[serde(skip)]
    pub invalidations: Vec<LocaleInvalidation>,
}

impl SubmitReport {
    /// Counts from both commits added together
    pub fn combined(&self) -> MergeResult {
        self.primary + self.secondary.unwrap_or_default()
    }

    pub fn message(&self) -> String {
        let mut message = format!("primary: {}", self.primary.summary());
        if let Some(secondary) = &self.secondary {
            message.push_str(&format!("; secondary: {}", secondary.summary()));
        }
        message
    }
}

/// Build a batch commit message: up to three sample keys, then a count
pub fn batch_commit_message(prefix: &str, entries: &[Entry]) -> String {
    let sample: Vec<&str> = entries.iter().take(SAMPLE_KEYS).map(Entry::key).collect();
    let mut message = format!("{} - {}", prefix, sample.join(", "));
    if entries.len() > SAMPLE_KEYS {
        message.push_str(&format!(" ({} total)", entries.len()));
    }
    message
}

/// Submits entries to the primary document and its secondary-value sibling
pub struct Submitter {
    sync: DocumentSync,
    primary: DocumentLocation,
    commit_template: String,
    cache: Option<Arc<PropertiesCache>>,
}

impl Submitter {
    pub fn new(sync: DocumentSync, primary: DocumentLocation) -> Self {
        Self {
            sync,
            primary,
            commit_template: DEFAULT_COMMIT_TEMPLATE.to_string(),
            cache: None,
        }
    }

    /// Commit message template; `{key}` is replaced with the entry key
    pub fn with_commit_template(mut self, template: impl Into<String>) -> Self {
        self.commit_template = template.into();
        self
    }

    /// Keep this cache consistent with successful commits
    pub fn with_cache(mut self, cache: Arc<PropertiesCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Submit a single entry
    pub async fn submit_one(&self, entry: &Entry) -> SyncResult<SubmitReport> {
        let message = self.commit_template.replace("{key}", entry.key());
        info!("Submitting {}", entry.key());

        let commit = self
            .sync
            .commit_primary(&self.primary, &entry.to_properties_line(), &message)
            .await?;

        if commit.result.changed_count() > 0 {
            if let Some(cache) = &self.cache {
                cache
                    .write_through(entry.key(), &entry.properties_value())
                    .await;
            }
        }

        let secondary = if entry.has_secondary_value() {
            self.submit_secondary(std::slice::from_ref(entry)).await
        } else {
            None
        };

        Ok(SubmitReport {
            primary: commit.result,
            secondary,
            invalidations: commit.invalidations,
        })
    }

    /// Submit several entries as one commit per document
    pub async fn submit_batch(&self, entries: &[Entry]) -> SyncResult<SubmitReport> {
        if entries.is_empty() {
            return Err(SyncError::Usage("no entries to submit".to_string()));
        }

        let content = entries
            .iter()
            .map(Entry::to_properties_line)
            .collect::<Vec<_>>()
            .join("\n");
        let message = batch_commit_message("feat: add i18n entries in batch", entries);
        info!("Submitting batch of {} entries", entries.len());

        let commit = self
            .sync
            .commit_primary(&self.primary, &content, &message)
            .await?;

        if commit.result.changed_count() > 0 {
            if let Some(cache) = &self.cache {
                let values: Vec<(&str, String)> = entries
                    .iter()
                    .map(|e| (e.key(), e.properties_value()))
                    .collect();
                cache
                    .write_through_batch(values.iter().map(|(k, v)| (*k, v.as_str())))
                    .await;
            }
        }

        let with_secondary: Vec<Entry> = entries
            .iter()
            .filter(|e| e.has_secondary_value())
            .cloned()
            .collect();
        let secondary = if with_secondary.is_empty() {
            None
        } else {
            self.submit_secondary(&with_secondary).await
        };

        let report = SubmitReport {
            primary: commit.result,
            secondary,
            invalidations: commit.invalidations,
        };
        info!("Batch submitted: {}", report.message());
        Ok(report)
    }

    /// Commit secondary values; failures are logged, not returned
    async fn submit_secondary(&self, entries: &[Entry]) -> Option<MergeResult> {
        let locales = self.sync.locales();
        let Some(path) = locales.secondary_value_path(&self.primary.path) else {
            warn!(
                "Cannot derive {} document path from {}, skipping secondary values",
                locales.secondary_value_code, self.primary.path
            );
            return None;
        };
        let location = self.primary.with_path(&path);

        let content = entries
            .iter()
            .map(Entry::to_secondary_properties_line)
            .collect::<Vec<_>>()
            .join("\n");
        let message = batch_commit_message(
            &format!("feat: add i18n {} entries in batch", locales.secondary_value_code),
            entries,
        );

        match self.sync.commit(&location, &content, &message).await {
            Ok(result) => {
                info!(
                    "Secondary values committed to {}: {}",
                    location,
                    result.summary()
                );
                Some(result)
            }
            Err(e) => {
                warn!("Secondary value commit to {} failed: {}", location, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{SystemClock, DEFAULT_TTL};
    use crate::entry::Origin;
    use crate::locale::LocaleLayout;
    use crate::remote::InMemoryStore;

    // ==================== Helper Functions ====================

    fn zh() -> DocumentLocation {
        DocumentLocation::new("7", "master", "i18n/data_zh.properties")
    }

    fn en() -> DocumentLocation {
        zh().with_path("i18n/data_en.properties")
    }

    fn submitter(store: &Arc<InMemoryStore>) -> Submitter {
        let store: Arc<InMemoryStore> = Arc::clone(store);
        Submitter::new(DocumentSync::new(store, LocaleLayout::default()), zh())
    }

    fn entry(key: &str, value: &str) -> Entry {
        Entry::new(key, value, Origin::Manual)
    }

    // ==================== Commit Message Tests ====================

    #[test]
    fn test_batch_message_lists_up_to_three_keys() {
        let entries = vec![entry("A", "1"), entry("B", "2")];
        assert_eq!(batch_commit_message("feat: batch", &entries), "feat: batch - A, B");

        let entries = vec![entry("A", "1"), entry("B", "2"), entry("C", "3"), entry("D", "4")];
        assert_eq!(
            batch_commit_message("feat: batch", &entries),
            "feat: batch - A, B, C (4 total)"
        );
    }

    // ==================== submit_one Tests ====================

    #[tokio::test]
    async fn test_submit_one_uses_template_and_writes_through() {
        let store = Arc::new(InMemoryStore::new());
        store.insert(&zh(), "DPN.A = 1\n");
        let cache = Arc::new(PropertiesCache::new(
            Arc::clone(&store) as Arc<dyn crate::remote::RemoteStore>,
            LocaleLayout::default(),
            zh(),
            DEFAULT_TTL,
            Arc::new(SystemClock),
        ));
        let submitter = submitter(&store)
            .with_commit_template("i18n: {key} added")
            .with_cache(Arc::clone(&cache));

        let report = submitter
            .submit_one(&entry("DPN.B", "二"))
            .await
            .expect("Should submit");

        assert_eq!(report.primary.added, 1);
        assert_eq!(report.secondary, None);
        assert_eq!(store.writes()[0].commit_message, "i18n: DPN.B added");
        assert_eq!(store.content(&zh()).as_deref(), Some("DPN.A = 1\nDPN.B = 二\n"));
        assert_eq!(cache.lookup("DPN.B").await.0.as_deref(), Some("二"));
    }

    #[tokio::test]
    async fn test_submit_one_commits_secondary_value_after_invalidation() {
        let store = Arc::new(InMemoryStore::new());
        store.insert(&zh(), "DPN.A = 旧\n");
        store.insert(&en(), "DPN.A = old\n");
        let submitter = submitter(&store);

        let report = submitter
            .submit_one(&entry("DPN.A", "新").with_secondary_value("new"))
            .await
            .expect("Should submit");

        assert_eq!(report.primary.updated, 1);
        // The stale en line was removed first, so the new value is an addition
        assert_eq!(report.secondary.map(|r| r.added), Some(1));
        assert_eq!(store.content(&en()).as_deref(), Some("DPN.A = new\n"));
        assert_eq!(report.combined().changed_count(), 2);
    }

    #[tokio::test]
    async fn test_secondary_failure_does_not_fail_submission() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_path(&en().path);
        let submitter = submitter(&store);

        let report = submitter
            .submit_one(&entry("DPN.A", "甲").with_secondary_value("A"))
            .await
            .expect("Primary commit should still succeed");

        assert_eq!(report.primary.added, 1);
        assert_eq!(report.secondary, None);
    }

    #[tokio::test]
    async fn test_primary_failure_is_returned_and_cache_untouched() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_path(&zh().path);
        let cache = Arc::new(PropertiesCache::with_system_clock(
            Arc::clone(&store) as Arc<dyn crate::remote::RemoteStore>,
            LocaleLayout::default(),
            zh(),
            DEFAULT_TTL,
        ));
        let submitter = submitter(&store).with_cache(Arc::clone(&cache));

        let result = submitter.submit_one(&entry("DPN.A", "甲")).await;

        assert!(result.is_err());
        assert_eq!(cache.len("zh").await, 0);
    }

    #[tokio::test]
    async fn test_multi_line_value_stays_one_document_line() {
        let store = Arc::new(InMemoryStore::new());
        let cache = Arc::new(PropertiesCache::with_system_clock(
            Arc::clone(&store) as Arc<dyn crate::remote::RemoteStore>,
            LocaleLayout::default(),
            zh(),
            DEFAULT_TTL,
        ));
        let submitter = submitter(&store).with_cache(Arc::clone(&cache));

        let report = submitter
            .submit_one(&entry("DPN.Multi", "第一行\n第二行"))
            .await
            .expect("Should submit");

        assert_eq!(report.primary.added, 1);
        assert_eq!(
            store.content(&zh()).as_deref(),
            Some("DPN.Multi = 第一行\\n第二行\n")
        );
        // The cache holds what the document holds
        assert_eq!(
            cache.lookup_locale("DPN.Multi", "zh").await.as_deref(),
            Some("第一行\\n第二行")
        );
    }

    // ==================== submit_batch Tests ====================

    #[tokio::test]
    async fn test_empty_batch_fails_before_network() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_path(&zh().path);

        let err = submitter(&store)
            .submit_batch(&[])
            .await
            .expect_err("Should reject empty batch");
        assert!(matches!(err, SyncError::Usage(_)));
    }

    #[tokio::test]
    async fn test_batch_splits_secondary_values_and_aggregates() {
        let store = Arc::new(InMemoryStore::new());
        store.insert(&zh(), "DPN.A = 甲\n");
        let submitter = submitter(&store);

        let entries = vec![
            entry("DPN.A", "甲"),
            entry("DPN.B", "乙").with_secondary_value("B"),
            entry("DPN.C", "丙"),
        ];
        let report = submitter.submit_batch(&entries).await.expect("Should submit");

        assert_eq!((report.primary.added, report.primary.skipped), (2, 1));
        assert_eq!(report.secondary.map(|r| r.added), Some(1));
        assert_eq!(report.combined().added, 3);
        assert_eq!(store.content(&en()).as_deref(), Some("DPN.B = B\n"));

        let messages: Vec<String> = store.writes().into_iter().map(|w| w.commit_message).collect();
        assert_eq!(
            messages,
            vec![
                "feat: add i18n entries in batch - DPN.A, DPN.B, DPN.C".to_string(),
                "feat: add i18n en entries in batch - DPN.B".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_repeated_batch_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        let submitter = submitter(&store);
        let entries = vec![entry("DPN.A", "甲"), entry("DPN.B", "乙")];

        let first = submitter.submit_batch(&entries).await.expect("first");
        let writes_after_first = store.writes().len();
        let second = submitter.submit_batch(&entries).await.expect("second");

        assert_eq!(first.primary.added, 2);
        assert_eq!(second.primary.changed_count(), 0);
        assert_eq!(second.primary.skipped, 2);
        assert_eq!(store.writes().len(), writes_after_first);
    }

    #[test]
    fn test_report_message() {
        let report = SubmitReport {
            primary: MergeResult {
                added: 1,
                updated: 0,
                skipped: 0,
            },
            secondary: Some(MergeResult {
                added: 0,
                updated: 0,
                skipped: 1,
            }),
            invalidations: Vec::new(),
        };
        assert_eq!(
            report.message(),
            "primary: 1 added; secondary: 1 skipped (unchanged)"
        );
    }
}
