use crate::store::{parse_count, Counter, Store};
use crate::Error;
use actix_web::rt::task::JoinHandle;
use actix_web::rt::time::Instant;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_GC_INTERVAL_SECONDS: u64 = 60 * 10;

/// Longest lifetime given to an entry, longer windows and TTLs are capped to it.
pub const MAX_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 100);

fn expiry(now: Instant, ttl: Duration) -> Instant {
    now + ttl.min(MAX_TTL)
}

/// A [Store] that uses [Dashmap](dashmap::DashMap) to hold keys in memory.
///
/// State is local to the process, so this is suited to single instance deployments and tests.
#[derive(Clone)]
pub struct InMemoryStore {
    map: Arc<DashMap<String, Value>>,
    gc_handle: Option<Arc<JoinHandle<()>>>,
}

struct Value {
    expires_at: Instant,
    data: Vec<u8>,
}

impl Value {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

impl InMemoryStore {
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder {
            gc_interval: Some(Duration::from_secs(DEFAULT_GC_INTERVAL_SECONDS)),
        }
    }

    fn garbage_collector(map: Arc<DashMap<String, Value>>, interval: Duration) -> JoinHandle<()> {
        assert!(
            interval.as_secs_f64() > 0f64,
            "GC interval must be non-zero"
        );
        actix_web::rt::spawn(async move {
            loop {
                let now = Instant::now();
                map.retain(|_k, v| v.is_live(now));
                actix_web::rt::time::sleep_until(now + interval).await;
            }
        })
    }
}

impl Store for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        let now = Instant::now();
        Ok(self
            .map
            .get(key)
            .filter(|v| v.is_live(now))
            .map(|v| v.data.clone()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), Error> {
        if ttl.is_zero() {
            self.map.remove(key);
            return Ok(());
        }
        self.map.insert(
            key.to_owned(),
            Value {
                expires_at: expiry(Instant::now(), ttl),
                data: value.to_vec(),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        self.map.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn increment(&self, key: &str, window: Duration) -> Result<Counter, Error> {
        let now = Instant::now();
        let window_end = expiry(now, window);
        // The shard lock is held for the whole read-modify-write
        let mut entry = self.map.entry(key.to_owned()).or_insert_with(|| Value {
            expires_at: window_end,
            data: b"0".to_vec(),
        });
        if !entry.is_live(now) {
            // The previous window has ended, start counting again
            entry.expires_at = window_end;
            entry.data = b"0".to_vec();
        }
        let count = parse_count(key, &entry.data)? + 1;
        entry.data = count.to_string().into_bytes();
        Ok(Counter {
            count,
            resets_at: entry.expires_at,
        })
    }

    async fn counter(&self, key: &str) -> Result<Option<Counter>, Error> {
        let now = Instant::now();
        match self.map.get(key).filter(|v| v.is_live(now)) {
            None => Ok(None),
            Some(value) => Ok(Some(Counter {
                count: parse_count(key, &value.data)?,
                resets_at: value.expires_at,
            })),
        }
    }
}

impl Drop for InMemoryStore {
    fn drop(&mut self) {
        if let Some(handle) = &self.gc_handle {
            // Only the last clone stops the collector
            if Arc::strong_count(handle) == 1 {
                handle.abort();
            }
        }
    }
}

pub struct InMemoryStoreBuilder {
    gc_interval: Option<Duration>,
}

impl InMemoryStoreBuilder {
    /// Override the default garbage collector interval.
    ///
    /// Set to None to disable garbage collection.
    ///
    /// The garbage collector periodically scans the internal map, removing expired keys.
    pub fn with_gc_interval(mut self, interval: Option<Duration>) -> Self {
        self.gc_interval = interval;
        self
    }

    pub fn build(self) -> InMemoryStore {
        let map = Arc::new(DashMap::<String, Value>::new());
        let gc_handle = self.gc_interval.map(|gc_interval| {
            Arc::new(InMemoryStore::garbage_collector(map.clone(), gc_interval))
        });
        InMemoryStore { map, gc_handle }
    }
}
