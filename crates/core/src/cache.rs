use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

/// Time source for freshness decisions. Injectable so tests can drive
/// the clock instead of sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Default TTL for acquisition payloads, matching the one-hour refresh
/// window of the upstream resource pages.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Default entry cap before least-recently-used eviction kicks in.
pub const DEFAULT_MAX_ENTRIES: usize = 100;

struct CacheEntry<V> {
    value: V,
    stored_at: DateTime<Utc>,
    last_used: AtomicI64,
}

/// A cached value plus whether it was served past its TTL as a
/// degraded fallback.
#[derive(Debug, Clone)]
pub struct Fetched<V> {
    pub value: V,
    pub is_stale: bool,
}

/// In-process TTL cache keyed by origin identity.
///
/// Staleness is computed lazily at read time; nothing is swept
/// proactively. Writes for the same key are funneled through a per-key
/// gate so concurrent callers share one in-flight fetch instead of
/// stampeding the origin.
pub struct FreshnessCache<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    gates: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    clock: Arc<dyn Clock>,
    max_entries: usize,
}

impl<V: Clone + Send + Sync> FreshnessCache<V> {
    pub fn new(max_entries: usize) -> Self {
        Self::with_clock(max_entries, Arc::new(SystemClock))
    }

    pub fn with_clock(max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
            clock,
            max_entries,
        }
    }

    /// Returns the cached value if fresh, otherwise runs `fetch`.
    ///
    /// On fetch success the entry is replaced and returned with
    /// `is_stale = false`. On fetch failure a previous entry, fresh or
    /// not, is returned with `is_stale = true`; with no previous entry
    /// the failure propagates.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        key: &str,
        ttl: Duration,
        fetch: F,
    ) -> Result<Fetched<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.fresh_value(key, ttl).await {
            return Ok(Fetched {
                value,
                is_stale: false,
            });
        }

        let gate = self.gate(key).await;
        let _held = gate.lock().await;

        // Another caller may have completed the fetch while this one
        // waited on the gate.
        if let Some(value) = self.fresh_value(key, ttl).await {
            return Ok(Fetched {
                value,
                is_stale: false,
            });
        }

        match fetch().await {
            Ok(value) => {
                self.insert(key, value.clone()).await;
                Ok(Fetched {
                    value,
                    is_stale: false,
                })
            }
            Err(error) => {
                let entries = self.entries.read().await;
                match entries.get(key) {
                    Some(entry) => {
                        entry
                            .last_used
                            .store(self.clock.now().timestamp_millis(), Ordering::Relaxed);
                        Ok(Fetched {
                            value: entry.value.clone(),
                            is_stale: true,
                        })
                    }
                    None => Err(error),
                }
            }
        }
    }

    /// Removes an entry immediately. Used when a re-ingestion is forced.
    pub async fn invalidate(&self, key: &str) {
        self.entries.write().await.remove(key);
        self.gates.lock().await.remove(key);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn fresh_value(&self, key: &str, ttl: Duration) -> Option<V> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let now = self.clock.now();
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        if now.signed_duration_since(entry.stored_at) < ttl {
            entry
                .last_used
                .store(now.timestamp_millis(), Ordering::Relaxed);
            Some(entry.value.clone())
        } else {
            None
        }
    }

    async fn gate(&self, key: &str) -> Arc<Mutex<()>> {
        let mut gates = self.gates.lock().await;
        Arc::clone(gates.entry(key.to_string()).or_default())
    }

    async fn insert(&self, key: &str, value: V) {
        let now = self.clock.now();
        let evicted = {
            let mut entries = self.entries.write().await;
            let mut evicted = None;
            if self.max_entries > 0
                && !entries.contains_key(key)
                && entries.len() >= self.max_entries
            {
                let evict = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.last_used.load(Ordering::Relaxed))
                    .map(|(key, _)| key.clone());
                if let Some(evict) = evict {
                    entries.remove(&evict);
                    evicted = Some(evict);
                }
            }
            entries.insert(
                key.to_string(),
                CacheEntry {
                    value,
                    stored_at: now,
                    last_used: AtomicI64::new(now.timestamp_millis()),
                },
            );
            evicted
        };

        // An evicted entry's fetch gate would otherwise accumulate one
        // mutex per distinct key ever seen.
        if let Some(evicted) = evicted {
            self.gates.lock().await.remove(&evicted);
        }
    }
}
