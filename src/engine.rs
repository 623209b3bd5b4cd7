use crate::fixed_window::FixedWindow;
use crate::observer::{LogObserver, Observer};
use crate::policy::{Dimension, Policy};
use crate::store::Store;
use crate::Error;
use actix_web::rt::time::timeout;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Rate limits are expressed in requests per second.
pub const WINDOW: Duration = Duration::from_secs(1);

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Decision {
    Allowed,
    Denied,
}

impl Decision {
    pub fn from_allowed(allowed: bool) -> Self {
        if allowed {
            Self::Allowed
        } else {
            Self::Denied
        }
    }

    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }

    pub fn is_denied(self) -> bool {
        matches!(self, Self::Denied)
    }
}

/// The outcome of [AdmissionEngine::decide].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Verdict {
    pub decision: Decision,
    /// Seconds the caller should wait before retrying, zero when allowed.
    ///
    /// This is the configured block duration rather than the time left on the block.
    pub retry_after: u64,
}

impl Verdict {
    pub fn allowed() -> Self {
        Self {
            decision: Decision::Allowed,
            retry_after: 0,
        }
    }

    pub fn denied(retry_after: u64) -> Self {
        Self {
            decision: Decision::Denied,
            retry_after,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.decision.is_allowed()
    }

    pub fn is_denied(&self) -> bool {
        self.decision.is_denied()
    }
}

/// Decides whether a request may proceed, based on its client address and API token.
///
/// The engine holds no mutable state of its own; all counters live in the [Store], so any number
/// of clones, threads or service instances can share it.
#[derive(Clone)]
pub struct AdmissionEngine<S> {
    window: FixedWindow<S>,
    policy: Arc<Policy>,
    observer: Arc<dyn Observer>,
    store_timeout: Duration,
}

impl<S: Store> AdmissionEngine<S> {
    pub fn builder(store: S, policy: Policy) -> AdmissionEngineBuilder<S> {
        AdmissionEngineBuilder {
            store,
            policy,
            observer: Arc::new(LogObserver),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// The counting strategy, for diagnostics and manual resets.
    pub fn window(&self) -> &FixedWindow<S> {
        &self.window
    }

    /// Decide whether to admit a request.
    ///
    /// When token limiting is enabled and a token is supplied, the token limit alone decides and
    /// the address is not looked at. Otherwise the address limit applies, if enabled. With
    /// neither applicable the request is allowed.
    ///
    /// # Arguments
    ///
    /// * `address`: the client address, already resolved from proxy headers or the peer
    /// * `token`: the API token, empty if none was sent
    ///
    /// Store failures are returned as errors, leaving the caller to choose between failing open
    /// and failing closed.
    pub async fn decide(&self, address: &str, token: &str) -> Result<Verdict, Error> {
        let token = token.trim();
        if self.policy.token.enabled && !token.is_empty() {
            return self.evaluate(Dimension::Token, token).await;
        }
        if self.policy.address.enabled && !address.is_empty() {
            return self.evaluate(Dimension::Address, address).await;
        }
        Ok(Verdict::allowed())
    }

    async fn evaluate(&self, dimension: Dimension, identity: &str) -> Result<Verdict, Error> {
        let limits = *self.policy.dimension(dimension);
        let key = dimension.key(identity);

        if self.bounded(&key, self.window.is_blocked(&key)).await? {
            self.observer
                .request_denied(dimension, &key, limits.block_seconds);
            return Ok(Verdict::denied(limits.block_seconds));
        }

        let allowed = self
            .bounded(
                &key,
                self.window
                    .consume_unchecked(&key, limits.max_requests, WINDOW),
            )
            .await?;
        if allowed {
            return Ok(Verdict::allowed());
        }

        // The request that crosses the threshold starts the block for those that follow
        self.bounded(&key, self.window.block(&key, limits.block_duration()))
            .await?;
        self.observer
            .request_denied(dimension, &key, limits.block_seconds);
        Ok(Verdict::denied(limits.block_seconds))
    }

    async fn bounded<T>(
        &self,
        key: &str,
        call: impl Future<Output = Result<T, Error>>,
    ) -> Result<T, Error> {
        match timeout(self.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                let error = Error::Timeout(self.store_timeout);
                self.observer.store_failed("call", key, &error);
                Err(error)
            }
        }
    }
}

pub struct AdmissionEngineBuilder<S> {
    store: S,
    policy: Policy,
    observer: Arc<dyn Observer>,
    store_timeout: Duration,
}

impl<S: Store> AdmissionEngineBuilder<S> {
    /// Replace the default [LogObserver].
    pub fn observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Upper bound on each store call made while deciding.
    ///
    /// Defaults to one second.
    pub fn store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    pub fn build(self) -> AdmissionEngine<S> {
        AdmissionEngine {
            window: FixedWindow::new(self.store, self.observer.clone()),
            policy: Arc::new(self.policy),
            observer: self.observer,
            store_timeout: self.store_timeout,
        }
    }
}
