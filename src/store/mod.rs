//! Key-value stores that hold the shared rate limiting state.

#[cfg(feature = "dashmap")]
#[cfg_attr(docsrs, doc(cfg(feature = "dashmap")))]
pub mod memory;

#[cfg(feature = "redis")]
#[cfg_attr(docsrs, doc(cfg(feature = "redis")))]
pub mod redis;

use crate::Error;
use actix_web::rt::time::Instant;
use std::future::Future;
use std::time::Duration;

/// The state of a fixed window counter.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Counter {
    /// Requests counted in the current window.
    pub count: u64,
    /// Time at which the current window ends and the count resets.
    pub resets_at: Instant,
}

/// Describes a key-value store with per-key expiry.
///
/// A Store is required to implement [Clone], and clones must share the same underlying state,
/// usually this means wrapping the data within an [Arc](std::sync::Arc), although connection
/// managers already do so internally.
pub trait Store: Clone {
    /// Read the value at `key`, `None` if absent or expired.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>, Error>>;

    /// Write `value` at `key`, replacing any existing value and expiry.
    ///
    /// A zero `ttl` leaves the key absent.
    fn set(&self, key: &str, value: &[u8], ttl: Duration)
        -> impl Future<Output = Result<(), Error>>;

    /// Remove `key`, doing nothing if it is absent.
    fn delete(&self, key: &str) -> impl Future<Output = Result<(), Error>>;

    /// Check that the store is reachable.
    fn ping(&self) -> impl Future<Output = Result<(), Error>>;

    /// Atomically increment the counter at `key`.
    ///
    /// An absent counter starts from zero. The expiry is set to `window` only if the key does not
    /// already have one, so the window is fixed by the first request that lands in it.
    fn increment(&self, key: &str, window: Duration)
        -> impl Future<Output = Result<Counter, Error>>;

    /// Read the counter at `key` without modifying it.
    fn counter(&self, key: &str) -> impl Future<Output = Result<Option<Counter>, Error>>;
}

/// Counters are stored as decimal integers.
pub(crate) fn parse_count(key: &str, value: &[u8]) -> Result<u64, Error> {
    std::str::from_utf8(value)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .ok_or_else(|| Error::CorruptRecord(key.to_owned()))
}
