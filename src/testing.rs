use crate::observer::Observer;
use crate::policy::Dimension;
use crate::store::{Counter, Store};
use crate::Error;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    ThresholdReached(String, u64),
    Blocked(String, u64),
    Reset(String),
    Denied(Dimension, String, u64),
    StoreFailed(&'static str),
}

#[derive(Default)]
pub(crate) struct RecordingObserver {
    events: Mutex<Vec<Event>>,
}

impl RecordingObserver {
    pub(crate) fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl Observer for RecordingObserver {
    fn threshold_reached(&self, key: &str, count: u64, _max_requests: u64) {
        self.push(Event::ThresholdReached(key.to_owned(), count));
    }

    fn key_blocked(&self, key: &str, duration: Duration) {
        self.push(Event::Blocked(key.to_owned(), duration.as_secs()));
    }

    fn key_reset(&self, key: &str) {
        self.push(Event::Reset(key.to_owned()));
    }

    fn request_denied(&self, dimension: Dimension, key: &str, retry_after: u64) {
        self.push(Event::Denied(dimension, key.to_owned(), retry_after));
    }

    fn store_failed(&self, operation: &'static str, _key: &str, _error: &Error) {
        self.push(Event::StoreFailed(operation));
    }
}

/// A store whose every call fails.
#[derive(Clone)]
pub(crate) struct FailingStore;

fn offline() -> Error {
    Error::Connectivity("store offline".to_owned())
}

impl Store for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, Error> {
        Err(offline())
    }

    async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<(), Error> {
        Err(offline())
    }

    async fn delete(&self, _key: &str) -> Result<(), Error> {
        Err(offline())
    }

    async fn ping(&self) -> Result<(), Error> {
        Err(offline())
    }

    async fn increment(&self, _key: &str, _window: Duration) -> Result<Counter, Error> {
        Err(offline())
    }

    async fn counter(&self, _key: &str) -> Result<Option<Counter>, Error> {
        Err(offline())
    }
}

/// A store that never answers within a reasonable time.
#[derive(Clone)]
pub(crate) struct StalledStore;

const STALL: Duration = Duration::from_secs(3600);

impl Store for StalledStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, Error> {
        actix_web::rt::time::sleep(STALL).await;
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<(), Error> {
        actix_web::rt::time::sleep(STALL).await;
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<(), Error> {
        actix_web::rt::time::sleep(STALL).await;
        Ok(())
    }

    async fn ping(&self) -> Result<(), Error> {
        actix_web::rt::time::sleep(STALL).await;
        Ok(())
    }

    async fn increment(&self, _key: &str, _window: Duration) -> Result<Counter, Error> {
        actix_web::rt::time::sleep(STALL).await;
        Err(offline())
    }

    async fn counter(&self, _key: &str) -> Result<Option<Counter>, Error> {
        actix_web::rt::time::sleep(STALL).await;
        Ok(None)
    }
}
