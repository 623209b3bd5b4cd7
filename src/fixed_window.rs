//! Fixed window counting with a separately expiring block.
//!
//! Each rate limit key owns two entries in the [Store]: `<key>:count`, which expires when its
//! window ends, and `<key>:blocked`, which expires when the block ends. Keeping them apart lets a
//! block outlive many counting windows. The two suffixes differ, so no identity can produce a
//! counter key that lands on another identity's block marker.

use crate::observer::Observer;
use crate::store::Store;
use crate::Error;
use actix_web::rt::time::Instant;
use std::sync::Arc;
use std::time::Duration;

const COUNT_SUFFIX: &str = ":count";
const BLOCKED_SUFFIX: &str = ":blocked";
const BLOCKED_MARKER: &[u8] = b"blocked";

/// The key holding the request counter for `key`.
pub fn count_key(key: &str) -> String {
    format!("{key}{COUNT_SUFFIX}")
}

/// The key holding the block marker for `key`.
pub fn blocked_key(key: &str) -> String {
    format!("{key}{BLOCKED_SUFFIX}")
}

// Counters are plain integers, so a number is never read as a marker
fn is_truthy(value: &[u8]) -> bool {
    matches!(value, b"blocked" | b"true")
}

/// Logical view of the limiting state for one key.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LimiterRecord {
    /// Requests counted in the current window, including those over the limit.
    pub count: u64,
    /// Time at which the current window ends.
    pub window_expires_at: Instant,
    pub blocked: bool,
}

/// The counting strategy: turns [Store] primitives into consume, block and reset operations.
#[derive(Clone)]
pub struct FixedWindow<S> {
    store: S,
    observer: Arc<dyn Observer>,
}

impl<S: Store> FixedWindow<S> {
    pub fn new(store: S, observer: Arc<dyn Observer>) -> Self {
        Self { store, observer }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Attempt to consume one request from the quota of `key`.
    ///
    /// A blocked key is denied without being counted. Otherwise the request is always counted,
    /// even when it exceeds `max_requests`, so the tally keeps growing until the window ends.
    pub async fn try_consume(
        &self,
        key: &str,
        max_requests: u64,
        window: Duration,
    ) -> Result<bool, Error> {
        if self.is_blocked(key).await? {
            return Ok(false);
        }
        self.consume_unchecked(key, max_requests, window).await
    }

    /// Count a request without looking at the block marker.
    ///
    /// Used by the engine, which has already checked the block itself.
    pub(crate) async fn consume_unchecked(
        &self,
        key: &str,
        max_requests: u64,
        window: Duration,
    ) -> Result<bool, Error> {
        let counter = self
            .store
            .increment(&count_key(key), window)
            .await
            .inspect_err(|e| self.observer.store_failed("increment", key, e))?;
        let allowed = counter.count <= max_requests;
        if !allowed {
            self.observer
                .threshold_reached(key, counter.count, max_requests);
        }
        Ok(allowed)
    }

    pub async fn is_blocked(&self, key: &str) -> Result<bool, Error> {
        let value = self
            .store
            .get(&blocked_key(key))
            .await
            .inspect_err(|e| self.observer.store_failed("blocked check", key, e))?;
        Ok(value.is_some_and(|v| is_truthy(&v)))
    }

    /// Block `key` for `duration`, restarting the block if it is already in place.
    pub async fn block(&self, key: &str, duration: Duration) -> Result<(), Error> {
        self.store
            .set(&blocked_key(key), BLOCKED_MARKER, duration)
            .await
            .inspect_err(|e| self.observer.store_failed("block", key, e))?;
        self.observer.key_blocked(key, duration);
        Ok(())
    }

    /// Clear both the counter and the block for `key`.
    ///
    /// Not part of the decision path, intended for manual unblocking and tests.
    pub async fn reset(&self, key: &str) -> Result<(), Error> {
        self.store
            .delete(&count_key(key))
            .await
            .inspect_err(|e| self.observer.store_failed("reset", key, e))?;
        self.store
            .delete(&blocked_key(key))
            .await
            .inspect_err(|e| self.observer.store_failed("reset", key, e))?;
        self.observer.key_reset(key);
        Ok(())
    }

    /// Read the current state of `key` without changing it.
    pub async fn get_data(&self, key: &str) -> Result<Option<LimiterRecord>, Error> {
        let counter = self
            .store
            .counter(&count_key(key))
            .await
            .inspect_err(|e| self.observer.store_failed("read", key, e))?;
        let blocked = self.is_blocked(key).await?;
        Ok(match counter {
            Some(counter) => Some(LimiterRecord {
                count: counter.count,
                window_expires_at: counter.resets_at,
                blocked,
            }),
            // The block outlived the counting window
            None if blocked => Some(LimiterRecord {
                count: 0,
                window_expires_at: Instant::now(),
                blocked,
            }),
            None => None,
        })
    }
}
