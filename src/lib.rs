#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod engine;
mod error;
pub mod fixed_window;
mod middleware;
pub mod observer;
pub mod policy;
#[cfg(feature = "server")]
#[cfg_attr(docsrs, doc(cfg(feature = "server")))]
pub mod settings;
pub mod store;
#[cfg(test)]
mod testing;

pub use engine::{AdmissionEngine, Decision, Verdict};
pub use error::Error;
pub use fixed_window::{FixedWindow, LimiterRecord};
pub use middleware::builder::{RateLimiterBuilder, API_KEY};
pub use middleware::{RateLimiter, DENIED_MESSAGE, X_REAL_IP};
pub use observer::{LogObserver, NoopObserver, Observer};
pub use policy::{Dimension, DimensionPolicy, Policy};
pub use store::Store;
