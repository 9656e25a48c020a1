//! Stale-while-revalidate cache of per-locale key→value maps.
//!
//! Lookups never wait on the network: a stale cache kicks off a background
//! refresh and answers from whatever it currently holds. One refresh runs at
//! a time per cache; the `in_flight` flag guards against duplicates.

use crate::locale::LocaleLayout;
use crate::properties::PropertiesDocument;
use crate::remote::{DocumentLocation, RemoteStore};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default time a refresh stays fresh
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Default)]
struct CacheState {
    /// locale code → key → value
    locales: HashMap<String, HashMap<String, String>>,
    last_refresh: Option<DateTime<Utc>>,
    /// Primary-locale writes made while a refresh was in flight, replayed
    /// over the maps that refresh loads
    pending: Vec<(String, String)>,
}

impl CacheState {
    fn record(&mut self, primary_code: &str, key: &str, value: &str, in_flight: bool) {
        self.locales
            .entry(primary_code.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        if in_flight {
            self.pending.push((key.to_string(), value.to_string()));
        }
    }
}

struct CacheInner {
    store: Arc<dyn RemoteStore>,
    locales: LocaleLayout,
    primary: DocumentLocation,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    state: RwLock<CacheState>,
    in_flight: AtomicBool,
}

/// Per-locale view of a properties document family, refreshed in the background
pub struct PropertiesCache {
    inner: Arc<CacheInner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PropertiesCache {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        locales: LocaleLayout,
        primary: DocumentLocation,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                store,
                locales,
                primary,
                ttl,
                clock,
                state: RwLock::new(CacheState::default()),
                in_flight: AtomicBool::new(false),
            }),
            task: Mutex::new(None),
        }
    }

    /// Cache using the wall clock
    pub fn with_system_clock(
        store: Arc<dyn RemoteStore>,
        locales: LocaleLayout,
        primary: DocumentLocation,
        ttl: Duration,
    ) -> Self {
        Self::new(store, locales, primary, ttl, Arc::new(SystemClock))
    }

    /// Primary and secondary-value locale values for `key`.
    ///
    /// Triggers a background refresh when stale, then answers from the
    /// current (possibly stale) data.
    pub async fn lookup(&self, key: &str) -> (Option<String>, Option<String>) {
        self.refresh_if_stale();

        let state = self.inner.state.read().await;
        let get = |code: &str| state.locales.get(code).and_then(|m| m.get(key)).cloned();
        (
            get(&self.inner.locales.primary_code),
            get(&self.inner.locales.secondary_value_code),
        )
    }

    /// Value of `key` in a specific locale
    pub async fn lookup_locale(&self, key: &str, locale: &str) -> Option<String> {
        self.refresh_if_stale();

        let state = self.inner.state.read().await;
        state.locales.get(locale).and_then(|m| m.get(key)).cloned()
    }

    /// Whether any locale knows `key`
    pub async fn contains_key(&self, key: &str) -> bool {
        self.refresh_if_stale();

        let state = self.inner.state.read().await;
        state.locales.values().any(|m| m.contains_key(key))
    }

    /// Number of keys held for a locale
    pub async fn len(&self, locale: &str) -> usize {
        let state = self.inner.state.read().await;
        state.locales.get(locale).map_or(0, HashMap::len)
    }

    /// Whether the TTL has elapsed since the last successful refresh
    pub async fn is_stale(&self) -> bool {
        let last = self.inner.state.read().await.last_refresh;
        self.inner.is_stale(last)
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Start a background refresh if the data is stale and none is running.
    ///
    /// Returns `true` when a refresh was started.
    pub fn refresh_if_stale(&self) -> bool {
        let last = match self.inner.state.try_read() {
            Ok(state) => state.last_refresh,
            // A writer holds the lock, so a refresh or write-through is in progress
            Err(_) => return false,
        };
        if !self.inner.is_stale(last) {
            return false;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime available, cannot refresh properties cache");
            return false;
        };

        if self
            .inner
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        debug!("Properties cache is stale, refreshing in background");
        let inner = Arc::clone(&self.inner);
        let handle = runtime.spawn(async move {
            inner.refresh().await;
        });

        let mut slot = self.task.lock().unwrap_or_else(|p| p.into_inner());
        *slot = Some(handle);
        true
    }

    /// Wait for the background refresh started by [`refresh_if_stale`], if any
    ///
    /// [`refresh_if_stale`]: PropertiesCache::refresh_if_stale
    pub async fn wait_for_refresh(&self) {
        let handle = self.task.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Properties cache refresh task failed: {}", e);
            }
        }
    }

    /// Refresh now if stale and wait for it to finish
    pub async fn refresh_and_wait(&self) {
        self.refresh_if_stale();
        self.wait_for_refresh().await;
    }

    /// Make the next [`refresh_if_stale`](PropertiesCache::refresh_if_stale) call refresh
    pub async fn force_refresh(&self) {
        self.inner.state.write().await.last_refresh = None;
    }

    /// Record a freshly committed primary-locale value
    pub async fn write_through(&self, key: &str, value: &str) {
        self.write_through_batch([(key, value)]).await;
    }

    /// Record several freshly committed primary-locale values.
    ///
    /// Values written while a refresh is in flight survive that refresh.
    pub async fn write_through_batch<'a, I>(&self, entries: I)
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut state = self.inner.state.write().await;
        // Checked under the write lock; the refresh clears the flag while holding it
        let in_flight = self.inner.in_flight.load(Ordering::SeqCst);
        let primary_code = &self.inner.locales.primary_code;

        let mut count = 0;
        for (key, value) in entries {
            state.record(primary_code, key, value, in_flight);
            count += 1;
        }
        debug!(
            "Cache write-through: {} entries{}",
            count,
            if in_flight { " (refresh in flight)" } else { "" }
        );
    }
}

impl Drop for PropertiesCache {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.task.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

impl CacheInner {
    fn is_stale(&self, last_refresh: Option<DateTime<Utc>>) -> bool {
        let Some(last) = last_refresh else {
            return true;
        };
        let elapsed = self.clock.now().signed_duration_since(last);
        match chrono::Duration::from_std(self.ttl) {
            Ok(ttl) => elapsed > ttl,
            Err(_) => false,
        }
    }

    /// Fetch every locale document and swap in each map that loaded.
    ///
    /// A missing document keeps its previous map and still counts as a
    /// successful fetch. Write-throughs recorded during the fetch are replayed
    /// and `in_flight` is cleared, both under the state lock.
    async fn refresh(&self) {
        let mut targets = vec![(self.locales.primary_code.clone(), Some(self.primary.clone()))];
        for (locale, path) in self.locales.secondary_paths(&self.primary.path) {
            let location = path.map(|p| self.primary.with_path(&p));
            if location.is_none() {
                warn!(
                    "Cannot derive {} document path from {}, not caching it",
                    locale.code, self.primary.path
                );
            }
            targets.push((locale.code.clone(), location));
        }

        let fetches = targets
            .iter()
            .filter_map(|(code, location)| location.as_ref().map(|loc| (code, loc)))
            .map(|(code, location)| async move {
                let result = self.store.get_file(location).await;
                (code.clone(), location, result)
            });
        let results = join_all(fetches).await;

        let mut loaded = HashMap::new();
        let mut reachable = 0;
        for (code, location, result) in results {
            match result {
                Ok(Some(content)) => {
                    let map = PropertiesDocument::parse(&content).to_map();
                    info!("Loaded {} {} entries from {}", map.len(), code, location.path);
                    loaded.insert(code, map);
                    reachable += 1;
                }
                Ok(None) => {
                    debug!("{} does not exist yet, keeping cached {} entries", location, code);
                    reachable += 1;
                }
                Err(e) => warn!("Failed to refresh {} entries from {}: {}", code, location, e),
            }
        }

        let mut state = self.state.write().await;
        let locale_count = loaded.len();
        state.locales.extend(loaded);

        let pending = std::mem::take(&mut state.pending);
        if !pending.is_empty() {
            debug!("Replaying {} write-throughs over refreshed data", pending.len());
            let primary = state
                .locales
                .entry(self.locales.primary_code.clone())
                .or_default();
            primary.extend(pending);
        }

        if reachable > 0 {
            state.last_refresh = Some(self.clock.now());
            info!("Properties cache refreshed ({} locales loaded)", locale_count);
        }

        self.in_flight.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncResult;
    use crate::remote::{InMemoryStore, WriteMode};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    // ==================== Helper Functions ====================

    /// Wraps an in-memory store, counting reads and delaying each one
    struct SlowStore {
        inner: Arc<InMemoryStore>,
        delay: Duration,
        gets: AtomicUsize,
    }

    impl SlowStore {
        fn new(inner: Arc<InMemoryStore>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                inner,
                delay,
                gets: AtomicUsize::new(0),
            })
        }

        fn gets(&self) -> usize {
            self.gets.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RemoteStore for SlowStore {
        async fn get_file(&self, location: &DocumentLocation) -> SyncResult<Option<String>> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.inner.get_file(location).await
        }

        async fn write_file(
            &self,
            location: &DocumentLocation,
            content: &str,
            commit_message: &str,
            mode: WriteMode,
        ) -> SyncResult<()> {
            self.inner
                .write_file(location, content, commit_message, mode)
                .await
        }
    }

    struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn new() -> Arc<Self> {
            Arc::new(Self(Mutex::new(Utc::now())))
        }

        fn advance(&self, by: Duration) {
            let mut now = self.0.lock().unwrap();
            *now += chrono::Duration::from_std(by).unwrap();
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn zh() -> DocumentLocation {
        DocumentLocation::new("7", "master", "i18n/data_zh.properties")
    }

    fn en() -> DocumentLocation {
        zh().with_path("i18n/data_en.properties")
    }

    fn tw() -> DocumentLocation {
        zh().with_path("i18n/data_zh_TW.properties")
    }

    fn seeded_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store.insert(&zh(), "# zh\nDPN.A = 甲\nDPN.B = 乙\n");
        store.insert(&en(), "DPN.A = A\n");
        store.insert(&tw(), "DPN.A = 甲tw\n");
        store
    }

    fn cache_with(store: Arc<InMemoryStore>, clock: Arc<ManualClock>) -> PropertiesCache {
        PropertiesCache::new(store, LocaleLayout::default(), zh(), DEFAULT_TTL, clock)
    }

    // ==================== Lookup / Refresh Tests ====================

    #[tokio::test]
    async fn test_first_lookup_is_empty_then_refresh_fills() {
        let cache = cache_with(seeded_store(), ManualClock::new());

        // Stale-while-revalidate: the triggering lookup sees pre-refresh data
        assert_eq!(cache.lookup("DPN.A").await, (None, None));
        cache.wait_for_refresh().await;

        assert_eq!(
            cache.lookup("DPN.A").await,
            (Some("甲".to_string()), Some("A".to_string()))
        );
        assert_eq!(cache.lookup_locale("DPN.A", "zh_TW").await.as_deref(), Some("甲tw"));
        assert_eq!(cache.lookup("DPN.B").await, (Some("乙".to_string()), None));
        assert!(!cache.is_refreshing());
    }

    #[tokio::test]
    async fn test_no_refresh_within_ttl() {
        let clock = ManualClock::new();
        let cache = cache_with(seeded_store(), Arc::clone(&clock));

        cache.refresh_and_wait().await;
        assert!(!cache.is_stale().await);
        assert!(!cache.refresh_if_stale());

        clock.advance(Duration::from_secs(299));
        assert!(!cache.refresh_if_stale());

        clock.advance(Duration::from_secs(2));
        assert!(cache.refresh_if_stale());
        cache.wait_for_refresh().await;
    }

    #[tokio::test]
    async fn test_refresh_replaces_maps_wholesale() {
        let store = seeded_store();
        let clock = ManualClock::new();
        let cache = cache_with(Arc::clone(&store), Arc::clone(&clock));
        cache.refresh_and_wait().await;

        store.insert(&zh(), "DPN.C = 丙\n");
        clock.advance(DEFAULT_TTL + Duration::from_secs(1));
        cache.refresh_and_wait().await;

        assert_eq!(cache.lookup("DPN.B").await.0, None);
        assert_eq!(cache.lookup("DPN.C").await.0.as_deref(), Some("丙"));
    }

    #[tokio::test]
    async fn test_failed_locale_keeps_previous_map() {
        let store = seeded_store();
        let clock = ManualClock::new();
        let cache = cache_with(Arc::clone(&store), Arc::clone(&clock));
        cache.refresh_and_wait().await;

        store.fail_path(&en().path);
        store.insert(&zh(), "DPN.A = 新\n");
        clock.advance(DEFAULT_TTL + Duration::from_secs(1));
        cache.refresh_and_wait().await;

        assert_eq!(
            cache.lookup("DPN.A").await,
            (Some("新".to_string()), Some("A".to_string()))
        );
        assert!(!cache.is_stale().await);
    }

    #[tokio::test]
    async fn test_total_failure_leaves_cache_stale() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_path(&zh().path);
        store.fail_path(&en().path);
        store.fail_path(&tw().path);
        let cache = cache_with(store, ManualClock::new());

        cache.refresh_and_wait().await;

        assert!(cache.is_stale().await);
        assert!(!cache.is_refreshing());
        assert_eq!(cache.len("zh").await, 0);
    }

    #[tokio::test]
    async fn test_force_refresh_resets_freshness() {
        let cache = cache_with(seeded_store(), ManualClock::new());
        cache.refresh_and_wait().await;
        assert!(!cache.is_stale().await);

        cache.force_refresh().await;
        assert!(cache.is_stale().await);
        assert!(cache.refresh_if_stale());
        cache.wait_for_refresh().await;
    }

    #[tokio::test]
    async fn test_concurrent_refresh_is_deduplicated() {
        let cache = cache_with(seeded_store(), ManualClock::new());

        cache.inner.in_flight.store(true, Ordering::SeqCst);
        assert!(!cache.refresh_if_stale());

        cache.inner.in_flight.store(false, Ordering::SeqCst);
        assert!(cache.refresh_if_stale());
        cache.wait_for_refresh().await;
    }

    #[tokio::test]
    async fn test_absent_documents_do_not_trigger_another_refresh_within_ttl() {
        let store = SlowStore::new(Arc::new(InMemoryStore::new()), Duration::ZERO);
        let cache = PropertiesCache::new(
            Arc::clone(&store) as Arc<dyn RemoteStore>,
            LocaleLayout::default(),
            zh(),
            DEFAULT_TTL,
            ManualClock::new(),
        );

        for _ in 0..5 {
            assert_eq!(cache.lookup("DPN.A").await, (None, None));
            cache.wait_for_refresh().await;
        }

        // One refresh: zh, en and zh_TW fetched once each
        assert_eq!(store.gets(), 3);
        assert!(!cache.is_stale().await);
    }

    #[tokio::test]
    async fn test_write_through_during_refresh_survives_it() {
        let store = SlowStore::new(seeded_store(), Duration::from_millis(50));
        let cache = PropertiesCache::new(
            Arc::clone(&store) as Arc<dyn RemoteStore>,
            LocaleLayout::default(),
            zh(),
            DEFAULT_TTL,
            ManualClock::new(),
        );

        assert!(cache.refresh_if_stale());
        // Let the refresh start its (slow) fetches
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(cache.is_refreshing());

        cache.write_through("DPN.New", "刚提交").await;
        assert_eq!(cache.lookup("DPN.New").await.0.as_deref(), Some("刚提交"));

        cache.wait_for_refresh().await;

        assert!(!cache.is_stale().await);
        assert_eq!(cache.lookup("DPN.New").await.0.as_deref(), Some("刚提交"));
        assert_eq!(cache.lookup("DPN.B").await.0.as_deref(), Some("乙"));
    }

    #[tokio::test]
    async fn test_write_through_outside_refresh_is_not_replayed_later() {
        let store = seeded_store();
        let clock = ManualClock::new();
        let cache = cache_with(Arc::clone(&store), Arc::clone(&clock));
        cache.refresh_and_wait().await;

        cache.write_through("DPN.Local", "本地").await;
        clock.advance(DEFAULT_TTL + Duration::from_secs(1));
        cache.refresh_and_wait().await;

        // The remote document never gained the key, so a later refresh drops it
        assert_eq!(cache.lookup("DPN.Local").await.0, None);
    }

    #[test]
    fn test_refresh_without_runtime_is_a_no_op() {
        let cache = cache_with(seeded_store(), ManualClock::new());
        assert!(!cache.refresh_if_stale());
        assert!(!cache.is_refreshing());
    }

    // ==================== Write-through Tests ====================

    #[tokio::test]
    async fn test_write_through_visible_immediately() {
        let cache = cache_with(seeded_store(), ManualClock::new());
        cache.refresh_and_wait().await;

        cache.write_through("DPN.New", "新的").await;
        assert_eq!(cache.lookup("DPN.New").await.0.as_deref(), Some("新的"));
        assert!(cache.contains_key("DPN.New").await);
    }

    #[tokio::test]
    async fn test_write_through_batch() {
        let cache = cache_with(seeded_store(), ManualClock::new());
        cache.refresh_and_wait().await;

        cache
            .write_through_batch([("DPN.X", "x"), ("DPN.A", "改")])
            .await;

        assert_eq!(cache.lookup("DPN.X").await.0.as_deref(), Some("x"));
        assert_eq!(cache.lookup("DPN.A").await.0.as_deref(), Some("改"));
        assert_eq!(cache.len("zh").await, 3);
    }
}
