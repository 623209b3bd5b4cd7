use actix_web::{HttpResponse, ResponseError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(
        #[source]
        #[from]
        redis::RedisError,
    ),
    #[error("Unable to reach the rate limit store: {0}")]
    Connectivity(String),
    #[error("Rate limit store did not respond within {0:?}")]
    Timeout(Duration),
    #[error("Unexpected value stored for the rate limit key {0}")]
    CorruptRecord(String),
}

impl ResponseError for Error {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::InternalServerError().finish()
    }
}
