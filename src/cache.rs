//! Time-expiring cache for slow upstream data
//!
//! Each key owns an async slot. A miss holds the slot's lock across the fetch,
//! so concurrent misses for one key wait for the same fetch instead of
//! stampeding the upstream. Failed fetches are not cached.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Cache entry with its expiry
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

type Slot<V> = Arc<tokio::sync::Mutex<Option<CacheEntry<V>>>>;

/// Bounded TTL cache keyed by `K`
pub struct TtlCache<K, V> {
    ttl: Duration,
    max_entries: usize,
    slots: Mutex<HashMap<K, Slot<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the fresh cached value for `key`, or run `fetch` and cache its result.
    pub async fn get_or_try_fetch<F, Fut, E>(&self, key: K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let slot = self.slot(&key);
        let mut entry = slot.lock().await;

        if let Some(cached) = entry.as_ref() {
            if cached.expires_at > Instant::now() {
                return Ok(cached.value.clone());
            }
        }

        let value = fetch().await?;
        *entry = Some(CacheEntry {
            value: value.clone(),
            expires_at: Instant::now() + self.ttl,
        });
        Ok(value)
    }

    /// Fresh value for `key` without fetching. Returns `None` while a fetch is in flight.
    pub fn peek(&self, key: &K) -> Option<V> {
        let slot = self.lock_slots().get(key).cloned()?;
        let entry = slot.try_lock().ok()?;
        entry
            .as_ref()
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.value.clone())
    }

    pub fn len(&self) -> usize {
        self.lock_slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, HashMap<K, Slot<V>>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn slot(&self, key: &K) -> Slot<V> {
        let mut slots = self.lock_slots();
        if let Some(slot) = slots.get(key) {
            return Arc::clone(slot);
        }
        if slots.len() >= self.max_entries {
            Self::evict(&mut slots, self.max_entries);
        }
        let slot: Slot<V> = Arc::new(tokio::sync::Mutex::new(None));
        slots.insert(key.clone(), Arc::clone(&slot));
        slot
    }

    /// Drop idle expired slots, then the idle slot closest to expiry until there is room.
    fn evict(slots: &mut HashMap<K, Slot<V>>, max_entries: usize) {
        let now = Instant::now();
        // Slots referenced elsewhere or locked have a fetch or reader in flight.
        let expiry_of = |slot: &Slot<V>| -> Option<Option<Instant>> {
            if Arc::strong_count(slot) > 1 {
                return None;
            }
            let entry = slot.try_lock().ok()?;
            Some(entry.as_ref().map(|e| e.expires_at))
        };

        slots.retain(|_, slot| match expiry_of(slot) {
            Some(Some(expires_at)) => expires_at > now,
            Some(None) => false,
            None => true,
        });

        while slots.len() >= max_entries {
            let oldest = slots
                .iter()
                .filter_map(|(k, slot)| expiry_of(slot).flatten().map(|at| (k.clone(), at)))
                .min_by_key(|(_, at)| *at)
                .map(|(k, _)| k);
            match oldest {
                Some(key) => {
                    slots.remove(&key);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_share_one_fetch() {
        let cache: Arc<TtlCache<&'static str, u64>> =
            Arc::new(TtlCache::new(Duration::from_secs(60), 8));
        let calls = Arc::new(AtomicUsize::new(0));

        let fetches = (0..5).map(|_| {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            async move {
                cache
                    .get_or_try_fetch("tokens", || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, String>(42)
                    })
                    .await
            }
        });
        let results = futures::future::join_all(fetches).await;

        assert!(results.iter().all(|r| r == &Ok(42)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_refetched() {
        let cache: TtlCache<&'static str, u64> = TtlCache::new(Duration::from_secs(600), 1);

        let first = cache
            .get_or_try_fetch("allbridge", || async { Ok::<_, String>(1) })
            .await;
        assert_eq!(first, Ok(1));

        tokio::time::advance(Duration::from_secs(599)).await;
        let cached = cache
            .get_or_try_fetch("allbridge", || async { Ok::<_, String>(2) })
            .await;
        assert_eq!(cached, Ok(1));

        tokio::time::advance(Duration::from_secs(2)).await;
        let refreshed = cache
            .get_or_try_fetch("allbridge", || async { Ok::<_, String>(3) })
            .await;
        assert_eq!(refreshed, Ok(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_not_cached() {
        let cache: TtlCache<u8, u64> = TtlCache::new(Duration::from_secs(60), 4);

        let failed = cache
            .get_or_try_fetch(1, || async { Err::<u64, _>("upstream down") })
            .await;
        assert_eq!(failed, Err("upstream down"));
        assert_eq!(cache.peek(&1), None);

        let ok = cache
            .get_or_try_fetch(1, || async { Ok::<_, &str>(7) })
            .await;
        assert_eq!(ok, Ok(7));
        assert_eq!(cache.peek(&1), Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_is_bounded() {
        let cache: TtlCache<u8, u8> = TtlCache::new(Duration::from_secs(60), 2);
        for key in 0..5u8 {
            let _ = cache
                .get_or_try_fetch(key, || async move { Ok::<_, ()>(key) })
                .await;
            tokio::time::advance(Duration::from_secs(1)).await;
        }
        assert!(cache.len() <= 2);
        assert_eq!(cache.peek(&4), Some(4));
    }
}
