//! Time-bounded cache of the current CO2 dataset.
//!
//! Readers take an `Arc` snapshot of the current dataset and never observe a
//! half-built one. Refreshes are single-flight: at most one upstream fetch is
//! in flight, and callers that arrive meanwhile wait for it and then read the
//! swapped-in snapshot instead of issuing their own fetch.

use crate::downloader::{DatasetSource, DownloadError};
use crate::payload::{decode_dataset, PayloadError};
use crate::observation::Dataset;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Expiry and failure policy for the dataset cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum age before a refresh is attempted (default: 24 hours)
    pub ttl: Duration,
    /// Oldest dataset still served when a refresh fails (default: 7 days)
    pub max_staleness: Duration,
    /// Quiet period after a failed refresh before upstream is tried again (default: 5 minutes)
    pub retry_backoff: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            ttl: Duration::hours(24),
            max_staleness: Duration::days(7),
            retry_backoff: Duration::minutes(5),
        }
    }
}

/// A cached value together with the moment it was obtained.
#[derive(Debug)]
pub struct TtlEntry<T> {
    value: Arc<T>,
    fetched_at: DateTime<Utc>,
}

impl<T> Clone for TtlEntry<T> {
    fn clone(&self) -> Self {
        TtlEntry {
            value: Arc::clone(&self.value),
            fetched_at: self.fetched_at,
        }
    }
}

impl<T> TtlEntry<T> {
    pub fn new(value: Arc<T>, fetched_at: DateTime<Utc>) -> Self {
        TtlEntry { value, fetched_at }
    }

    pub fn value(&self) -> &Arc<T> {
        &self.value
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// Age of the entry at `now`. Clock skew never yields a negative age.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.fetched_at).max(Duration::zero())
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age(now) < ttl
    }
}

/// Hook invoked after a new dataset has been swapped in.
pub trait RefreshListener: Send + Sync {
    /// Called with the replaced version (if any) and the new one.
    fn dataset_replaced(&self, previous: Option<Uuid>, current: Uuid);
}

/// Errors surfaced by the cache when no acceptable dataset can be served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Upstream unreachable, timed out, or answered with a non-2xx status
    Network(DownloadError),
    /// Payload was not the expected JSON document
    Parse(String),
    /// Payload fields were present but held invalid values
    Validation(String),
    /// The refresh task itself failed
    Internal(String),
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::Network(err) => write!(f, "{}", err),
            CacheError::Parse(msg) => write!(f, "Parse error: {}", msg),
            CacheError::Validation(msg) => write!(f, "Validation error: {}", msg),
            CacheError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for CacheError {}

impl From<PayloadError> for CacheError {
    fn from(err: PayloadError) -> Self {
        match err {
            PayloadError::Parse(msg) => CacheError::Parse(msg),
            PayloadError::Validation(msg) => CacheError::Validation(msg),
        }
    }
}

#[derive(Default)]
struct CacheState {
    entry: Option<TtlEntry<Dataset>>,
    last_failure: Option<(DateTime<Utc>, CacheError)>,
}

struct Inner {
    source: Arc<dyn DatasetSource>,
    config: CacheConfig,
    state: RwLock<CacheState>,
    refresh_guard: Arc<Mutex<()>>,
    listeners: RwLock<Vec<Arc<dyn RefreshListener>>>,
}

/// Shared cache service for the historical dataset.
///
/// Cloning is cheap; every clone talks to the same underlying state.
#[derive(Clone)]
pub struct DataCache {
    inner: Arc<Inner>,
}

impl DataCache {
    /// Creates an empty cache over `source`.
    pub fn new(source: Arc<dyn DatasetSource>, config: CacheConfig) -> Self {
        DataCache {
            inner: Arc::new(Inner {
                source,
                config,
                state: RwLock::new(CacheState::default()),
                refresh_guard: Arc::new(Mutex::new(())),
                listeners: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Registers a listener notified whenever a new dataset replaces the old one.
    pub fn add_listener(&self, listener: Arc<dyn RefreshListener>) {
        self.inner.listeners.write().push(listener);
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Current snapshot, regardless of age. Never waits on a refresh.
    pub fn current(&self) -> Option<Arc<Dataset>> {
        self.inner
            .state
            .read()
            .entry
            .as_ref()
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Returns the dataset, refreshing it first if it has expired.
    pub async fn get_dataset(&self) -> Result<Arc<Dataset>, CacheError> {
        self.get_dataset_at(Utc::now()).await
    }

    /// Same as [`DataCache::get_dataset`] with an explicit clock reading.
    ///
    /// # Errors
    /// Surfaces the refresh error when there is no previous dataset, or when
    /// the previous one is older than `max_staleness`.
    pub async fn get_dataset_at(&self, now: DateTime<Utc>) -> Result<Arc<Dataset>, CacheError> {
        if let Some(dataset) = self.inner.fresh_snapshot(now) {
            return Ok(dataset);
        }

        let guard = Arc::clone(&self.inner.refresh_guard).lock_owned().await;

        // Another caller may have finished a refresh while we waited.
        if let Some(dataset) = self.inner.fresh_snapshot(now) {
            return Ok(dataset);
        }
        if let Some(outcome) = self.inner.backoff_outcome(now) {
            return outcome;
        }

        // The refresh owns the guard and keeps running if this caller goes away.
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let _guard = guard;
            inner.refresh(now).await
        });

        match task.await {
            Ok(Ok(dataset)) => Ok(dataset),
            Ok(Err(err)) => self.inner.serve_stale(now, err),
            Err(join_error) => Err(CacheError::Internal(join_error.to_string())),
        }
    }
}

impl Inner {
    fn fresh_snapshot(&self, now: DateTime<Utc>) -> Option<Arc<Dataset>> {
        let state = self.state.read();
        state
            .entry
            .as_ref()
            .filter(|entry| entry.is_fresh(now, self.config.ttl))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Within the backoff window after a failure, answer without touching upstream.
    fn backoff_outcome(&self, now: DateTime<Utc>) -> Option<Result<Arc<Dataset>, CacheError>> {
        let last_error = {
            let state = self.state.read();
            let (failed_at, err) = state.last_failure.as_ref()?;
            if now - *failed_at >= self.config.retry_backoff {
                return None;
            }
            err.clone()
        };
        debug!("Upstream refresh in backoff, not refetching");
        Some(self.serve_stale(now, last_error))
    }

    fn serve_stale(&self, now: DateTime<Utc>, err: CacheError) -> Result<Arc<Dataset>, CacheError> {
        let state = self.state.read();
        match state.entry.as_ref() {
            Some(entry) if entry.age(now) <= self.config.max_staleness => {
                warn!(
                    error = %err,
                    age_hours = entry.age(now).num_hours(),
                    "Refresh failed, serving stale CO2 dataset"
                );
                Ok(Arc::clone(entry.value()))
            }
            _ => Err(err),
        }
    }

    async fn refresh(&self, now: DateTime<Utc>) -> Result<Arc<Dataset>, CacheError> {
        info!("Refreshing CO2 dataset from upstream");

        let outcome = match self.source.fetch().await {
            Ok(body) => decode_dataset(&body, now).map_err(CacheError::from),
            Err(err) => Err(CacheError::Network(err)),
        };

        match outcome {
            Ok(dataset) => {
                let dataset = Arc::new(dataset);
                let current = dataset.source_version();
                let previous = {
                    let mut state = self.state.write();
                    let previous = state
                        .entry
                        .replace(TtlEntry::new(Arc::clone(&dataset), now))
                        .map(|entry| entry.value().source_version());
                    state.last_failure = None;
                    previous
                };

                info!(
                    points = dataset.len(),
                    latest = %dataset.latest_date(),
                    version = %current,
                    "CO2 dataset refreshed"
                );

                let listeners = self.listeners.read().clone();
                for listener in listeners {
                    listener.dataset_replaced(previous, current);
                }
                Ok(dataset)
            }
            Err(err) => {
                warn!(error = %err, "CO2 dataset refresh failed");
                self.state.write().last_failure = Some((now, err.clone()));
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::InMemorySource;
    use crate::testing::{payload_json, synthetic_points};
    use chrono::{NaiveDate, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 2, 8, 0, 0).unwrap()
    }

    fn body(days: usize) -> String {
        payload_json(&synthetic_points(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), days))
    }

    fn cache_over(source: &Arc<InMemorySource>) -> DataCache {
        DataCache::new(Arc::clone(source) as Arc<dyn DatasetSource>, CacheConfig::default())
    }

    #[test]
    fn test_ttl_entry_age_and_freshness() {
        let entry = TtlEntry::new(Arc::new(1u8), start());
        assert!(entry.is_fresh(start() + Duration::hours(23), Duration::hours(24)));
        assert!(!entry.is_fresh(start() + Duration::hours(24), Duration::hours(24)));
        assert_eq!(entry.age(start() - Duration::hours(1)), Duration::zero());
    }

    #[tokio::test]
    async fn test_get_dataset_within_ttl_is_idempotent() {
        let source = Arc::new(InMemorySource::new(body(10)));
        let cache = cache_over(&source);

        let first = cache.get_dataset_at(start()).await.unwrap();
        let second = cache
            .get_dataset_at(start() + Duration::hours(23))
            .await
            .unwrap();

        assert_eq!(first.source_version(), second.source_version());
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_expired_dataset_is_refreshed() {
        let source = Arc::new(InMemorySource::new(body(10)));
        let cache = cache_over(&source);

        let first = cache.get_dataset_at(start()).await.unwrap();
        source.set_body(body(11));
        let second = cache
            .get_dataset_at(start() + Duration::hours(25))
            .await
            .unwrap();

        assert_ne!(first.source_version(), second.source_version());
        assert_eq!(second.len(), 11);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_first_fetch_failure_surfaces_network_error() {
        let source = Arc::new(InMemorySource::new(body(10)));
        source.set_failure(DownloadError::NetworkError("timeout".to_string()));
        let cache = cache_over(&source);

        let result = cache.get_dataset_at(start()).await;
        assert!(matches!(result, Err(CacheError::Network(_))));
        assert!(cache.current().is_none());
    }

    #[tokio::test]
    async fn test_invalid_payload_does_not_replace_dataset() {
        let source = Arc::new(InMemorySource::new(body(10)));
        let cache = cache_over(&source);
        let original = cache.get_dataset_at(start()).await.unwrap();

        source.set_body("{\"co2\": {\"year\": [2024]}}");
        let later = start() + Duration::hours(30);
        let served = cache.get_dataset_at(later).await.unwrap();

        assert_eq!(served.source_version(), original.source_version());
        assert_eq!(
            cache.current().unwrap().source_version(),
            original.source_version()
        );
    }

    #[tokio::test]
    async fn test_stale_data_served_within_max_staleness_only() {
        let source = Arc::new(InMemorySource::new(body(10)));
        let cache = cache_over(&source);
        let original = cache.get_dataset_at(start()).await.unwrap();

        source.set_failure(DownloadError::ApiError("HTTP 503".to_string()));
        let stale = cache
            .get_dataset_at(start() + Duration::days(2))
            .await
            .unwrap();
        assert_eq!(stale.source_version(), original.source_version());

        let too_old = cache.get_dataset_at(start() + Duration::days(8)).await;
        assert!(matches!(too_old, Err(CacheError::Network(DownloadError::ApiError(_)))));
    }

    #[tokio::test]
    async fn test_failed_refresh_backs_off() {
        let source = Arc::new(InMemorySource::new(body(10)));
        let cache = cache_over(&source);
        cache.get_dataset_at(start()).await.unwrap();

        source.set_failure(DownloadError::NetworkError("down".to_string()));
        let failed_at = start() + Duration::hours(25);
        cache.get_dataset_at(failed_at).await.unwrap();
        cache
            .get_dataset_at(failed_at + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(source.calls(), 2, "second call falls inside the backoff window");

        source.set_body(body(12));
        let recovered = cache
            .get_dataset_at(failed_at + Duration::minutes(6))
            .await
            .unwrap();
        assert_eq!(recovered.len(), 12);
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_fetch() {
        let source = Arc::new(
            InMemorySource::new(body(10)).with_delay(std::time::Duration::from_millis(100)),
        );
        let cache = cache_over(&source);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get_dataset_at(start()).await })
            })
            .collect();

        let mut versions = Vec::new();
        for handle in handles {
            versions.push(handle.await.unwrap().unwrap().source_version());
        }

        assert_eq!(source.calls(), 1);
        assert!(versions.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[tokio::test]
    async fn test_abandoned_request_still_populates_cache() {
        let source = Arc::new(
            InMemorySource::new(body(10)).with_delay(std::time::Duration::from_millis(50)),
        );
        let cache = cache_over(&source);

        let abandoned = tokio::time::timeout(
            std::time::Duration::from_millis(5),
            cache.get_dataset_at(start()),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        assert!(cache.current().is_some());
        assert_eq!(source.calls(), 1);
    }

    struct CountingListener {
        calls: AtomicUsize,
    }

    impl RefreshListener for CountingListener {
        fn dataset_replaced(&self, _previous: Option<Uuid>, _current: Uuid) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_listeners_notified_on_refresh() {
        let source = Arc::new(InMemorySource::new(body(10)));
        let cache = cache_over(&source);
        let listener = Arc::new(CountingListener {
            calls: AtomicUsize::new(0),
        });
        cache.add_listener(Arc::clone(&listener) as Arc<dyn RefreshListener>);

        cache.get_dataset_at(start()).await.unwrap();
        cache
            .get_dataset_at(start() + Duration::hours(25))
            .await
            .unwrap();

        assert_eq!(listener.calls.load(Ordering::SeqCst), 2);
    }
}
