use crate::engine::AdmissionEngine;
use crate::middleware::{RateLimiter, Settings};
use crate::store::Store;
use actix_web::http::header::HeaderName;
use once_cell::sync::Lazy;
use std::rc::Rc;

/// The header carrying the caller's API token, unless overridden.
pub static API_KEY: Lazy<HeaderName> = Lazy::new(|| HeaderName::from_static("api_key"));

pub struct RateLimiterBuilder<S> {
    engine: AdmissionEngine<S>,
    token_header: HeaderName,
    trust_proxy_headers: bool,
    group_ipv6_subnets: bool,
    fail_open: bool,
}

impl<S: Store + 'static> RateLimiterBuilder<S> {
    pub(super) fn new(engine: AdmissionEngine<S>) -> Self {
        Self {
            engine,
            token_header: API_KEY.clone(),
            trust_proxy_headers: true,
            group_ipv6_subnets: false,
            fail_open: false,
        }
    }

    /// The request header the API token is read from.
    ///
    /// Default is `API_KEY`.
    pub fn token_header(mut self, token_header: HeaderName) -> Self {
        self.token_header = token_header;
        self
    }

    /// Choose whether the client address is taken from the `X-Forwarded-For` and `X-Real-IP`
    /// headers before falling back to the connection peer.
    ///
    /// Default is true. Disable when clients connect directly, as the headers can be forged.
    pub fn trust_proxy_headers(mut self, trust: bool) -> Self {
        self.trust_proxy_headers = trust;
        self
    }

    /// Group IPv6 clients into a single address key per /64.
    ///
    /// Default is false.
    pub fn group_ipv6_subnets(mut self, group: bool) -> Self {
        self.group_ipv6_subnets = group;
        self
    }

    /// Choose whether to allow a request if the store fails.
    ///
    /// Default is false, the request receives a 500 response.
    pub fn fail_open(mut self, fail_open: bool) -> Self {
        self.fail_open = fail_open;
        self
    }

    pub fn build(self) -> RateLimiter<S> {
        RateLimiter {
            engine: self.engine,
            settings: Rc::new(Settings {
                token_header: self.token_header,
                trust_proxy_headers: self.trust_proxy_headers,
                group_ipv6_subnets: self.group_ipv6_subnets,
                fail_open: self.fail_open,
            }),
        }
    }
}
