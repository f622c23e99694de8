use crate::clock::{Clock, SystemClock};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Cache entry metadata
#[derive(Debug)]
pub struct CacheEntry<T> {
    pub value: Arc<T>,
    pub created_at: DateTime<Utc>,
    /// Set by [`TtlCache::invalidate`]; the value stays readable through
    /// [`TtlCache::peek`] but is no longer served as fresh.
    pub invalidated: bool,
}

impl<T> CacheEntry<T> {
    fn new(value: T, created_at: DateTime<Utc>) -> Self {
        Self {
            value: Arc::new(value),
            created_at,
            invalidated: false,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> ChronoDuration {
        now - self.created_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl: ChronoDuration) -> bool {
        self.invalidated || self.age(now) >= ttl
    }
}

/// A cache holding exactly one value and the time it was stored.
///
/// Reads and writes go through a single coarse lock that is never held across
/// an await point. Two callers that both miss may both fetch; the later
/// `insert` wins.
pub struct TtlCache<T, C = SystemClock> {
    entry: RwLock<Option<CacheEntry<T>>>,
    ttl: ChronoDuration,
    clock: C,
    usable: Option<fn(&T) -> bool>,
}

impl<T> TtlCache<T, SystemClock> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, SystemClock)
    }
}

impl<T, C: Clock> TtlCache<T, C> {
    pub fn with_clock(ttl: Duration, clock: C) -> Self {
        Self {
            entry: RwLock::new(None),
            ttl: ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::weeks(52 * 100)),
            clock,
            usable: None,
        }
    }

    /// Only serve stored values that satisfy `predicate` (for example,
    /// never serve an empty list from cache).
    pub fn with_validity(mut self, predicate: fn(&T) -> bool) -> Self {
        self.usable = Some(predicate);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl.to_std().unwrap_or(Duration::MAX)
    }

    /// The stored value if it is fresh and usable.
    pub fn get(&self) -> Option<Arc<T>> {
        let now = self.clock.now();
        let guard = self.entry.read();
        let entry = guard.as_ref()?;
        if entry.is_expired(now, self.ttl) {
            return None;
        }
        if let Some(usable) = self.usable {
            if !usable(&entry.value) {
                return None;
            }
        }
        Some(entry.value.clone())
    }

    /// The stored value regardless of age or invalidation.
    pub fn peek(&self) -> Option<Arc<T>> {
        self.entry.read().as_ref().map(|e| e.value.clone())
    }

    pub fn is_fresh(&self) -> bool {
        self.get().is_some()
    }

    /// Age of the stored value, if any.
    pub fn age(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.entry
            .read()
            .as_ref()
            .map(|e| e.age(now).to_std().unwrap_or(Duration::ZERO))
    }

    /// Store a value, stamped with the current clock time.
    pub fn insert(&self, value: T) -> Arc<T> {
        let entry = CacheEntry::new(value, self.clock.now());
        let value = entry.value.clone();
        *self.entry.write() = Some(entry);
        value
    }

    /// Force the next `get` to miss.
    pub fn invalidate(&self) {
        if let Some(entry) = self.entry.write().as_mut() {
            entry.invalidated = true;
        }
    }

    /// Return the fresh value, or run `fetch`, store its output and return it.
    /// A failed fetch leaves the cache untouched.
    pub async fn get_or_try_refresh<F, Fut, E>(&self, fetch: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get() {
            debug!("ttl cache hit");
            return Ok(hit);
        }

        debug!("ttl cache miss, refreshing");
        let fresh = fetch().await?;
        Ok(self.insert(fresh))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const TWELVE_HOURS: Duration = Duration::from_secs(12 * 60 * 60);

    fn cache(clock: Arc<ManualClock>) -> TtlCache<Vec<String>, Arc<ManualClock>> {
        TtlCache::with_clock(TWELVE_HOURS, clock).with_validity(|models| !models.is_empty())
    }

    #[test]
    fn test_fresh_until_ttl() {
        let clock = Arc::new(ManualClock::default());
        let cache = cache(clock.clone());
        assert!(cache.get().is_none());

        cache.insert(vec!["openai/gpt-4o".to_string()]);
        assert!(cache.is_fresh());

        clock.advance(ChronoDuration::hours(11) + ChronoDuration::minutes(59));
        assert!(cache.get().is_some());

        clock.advance(ChronoDuration::minutes(1));
        assert!(cache.get().is_none(), "entry at exactly the TTL is stale");
        assert!(cache.peek().is_some());
    }

    #[test]
    fn test_empty_list_never_served() {
        let clock = Arc::new(ManualClock::default());
        let cache = cache(clock);
        cache.insert(Vec::new());
        assert!(cache.get().is_none());
    }

    #[test]
    fn test_invalidate_forces_miss() {
        let clock = Arc::new(ManualClock::default());
        let cache = cache(clock);
        cache.insert(vec!["a".to_string()]);
        cache.invalidate();
        assert!(cache.get().is_none());
        assert_eq!(cache.peek().unwrap().len(), 1);

        cache.insert(vec!["b".to_string()]);
        assert_eq!(cache.get().unwrap()[0], "b");
    }

    #[test]
    fn test_age_tracks_clock() {
        let clock = Arc::new(ManualClock::default());
        let cache = cache(clock.clone());
        assert!(cache.age().is_none());
        cache.insert(vec!["a".to_string()]);
        clock.advance(ChronoDuration::minutes(5));
        assert_eq!(cache.age(), Some(Duration::from_secs(300)));
    }

    #[tokio::test]
    async fn test_refresh_only_on_miss() {
        let clock = Arc::new(ManualClock::default());
        let cache = cache(clock.clone());
        let calls = std::sync::atomic::AtomicUsize::new(0);

        let fetch = || async {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok::<_, String>(vec!["m".to_string()])
        };

        cache.get_or_try_refresh(fetch).await.unwrap();
        cache.get_or_try_refresh(fetch).await.unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);

        clock.advance(ChronoDuration::hours(13));
        cache.get_or_try_refresh(fetch).await.unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_old_value() {
        let clock = Arc::new(ManualClock::default());
        let cache = cache(clock);
        cache.insert(vec!["old".to_string()]);
        cache.invalidate();

        let result = cache
            .get_or_try_refresh(|| async { Err::<Vec<String>, _>("offline") })
            .await;
        assert_eq!(result.unwrap_err(), "offline");
        assert_eq!(cache.peek().unwrap()[0], "old");
    }
}
