//! Side observers of the admission path.
//!
//! Components receive an [Observer] when they are built instead of writing to a global logger,
//! so they stay testable without any logging framework installed.

use crate::policy::Dimension;
use crate::Error;
use std::borrow::Cow;
use std::time::Duration;

/// Receives notable events from the counting strategy and the admission engine.
///
/// Every method has an empty default so implementations only handle what they care about.
pub trait Observer: Send + Sync {
    /// A counted request pushed `key` past its limit.
    fn threshold_reached(&self, _key: &str, _count: u64, _max_requests: u64) {}

    /// `key` has been blocked for `duration`.
    fn key_blocked(&self, _key: &str, _duration: Duration) {}

    /// Counting and block state for `key` have been cleared.
    fn key_reset(&self, _key: &str) {}

    /// A request was denied within `dimension`.
    fn request_denied(&self, _dimension: Dimension, _key: &str, _retry_after: u64) {}

    /// A store call failed while handling `key`.
    fn store_failed(&self, _operation: &'static str, _key: &str, _error: &Error) {}
}

/// Discards every event.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {}

/// Renders events through the [log] facade.
///
/// API tokens are credentials, keys in the token namespace are never written out.
#[derive(Copy, Clone, Debug, Default)]
pub struct LogObserver;

fn redact(key: &str) -> Cow<'_, str> {
    let prefix = Dimension::Token.prefix();
    match key.strip_prefix(prefix) {
        Some(_) => Cow::Owned(format!("{prefix}<redacted>")),
        None => Cow::Borrowed(key),
    }
}

impl Observer for LogObserver {
    fn threshold_reached(&self, key: &str, count: u64, max_requests: u64) {
        log::debug!(
            "Rate limit threshold reached for {}: {count} of {max_requests}",
            redact(key)
        );
    }

    fn key_blocked(&self, key: &str, duration: Duration) {
        log::debug!("Blocked {} for {}s", redact(key), duration.as_secs());
    }

    fn key_reset(&self, key: &str) {
        log::debug!("Reset {}", redact(key));
    }

    fn request_denied(&self, dimension: Dimension, key: &str, retry_after: u64) {
        log::warn!(
            "Request denied by {dimension} limit for {}, retry after {retry_after}s",
            redact(key)
        );
    }

    fn store_failed(&self, operation: &'static str, key: &str, error: &Error) {
        log::error!("Store {operation} failed for {}: {error}", redact(key));
    }
}
