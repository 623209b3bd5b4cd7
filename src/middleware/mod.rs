pub mod builder;
mod client;
#[cfg(all(test, feature = "dashmap"))]
mod tests;

use crate::engine::AdmissionEngine;
use crate::store::Store;
use actix_web::body::EitherBody;
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{HeaderName, HeaderValue, RETRY_AFTER};
use actix_web::{HttpResponse, ResponseError};
use builder::RateLimiterBuilder;
use futures::future::{ok, LocalBoxFuture, Ready};
use std::rc::Rc;

pub use client::X_REAL_IP;

/// Body of the response sent to rate limited callers.
pub const DENIED_MESSAGE: &str =
    "you have reached the maximum number of requests or actions allowed within a certain time frame";

/// Rate limit middleware.
///
/// Resolves the client address and API token of each request and asks the
/// [AdmissionEngine] whether to let it through.
pub struct RateLimiter<S> {
    engine: AdmissionEngine<S>,
    settings: Rc<Settings>,
}

pub(crate) struct Settings {
    pub(crate) token_header: HeaderName,
    pub(crate) trust_proxy_headers: bool,
    pub(crate) group_ipv6_subnets: bool,
    pub(crate) fail_open: bool,
}

impl<S: Store> Clone for RateLimiter<S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<S: Store + 'static> RateLimiter<S> {
    /// # Arguments
    ///
    /// * `engine`: The admission engine, cheaply cloned into every worker.
    pub fn builder(engine: AdmissionEngine<S>) -> RateLimiterBuilder<S> {
        RateLimiterBuilder::new(engine)
    }
}

impl<Svc, B, S> Transform<Svc, ServiceRequest> for RateLimiter<S>
where
    Svc: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>
        + 'static,
    Svc::Future: 'static,
    B: 'static,
    S: Store + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = actix_web::Error;
    type Transform = RateLimiterMiddleware<Svc, S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: Svc) -> Self::Future {
        ok(RateLimiterMiddleware {
            service: Rc::new(service),
            engine: self.engine.clone(),
            settings: self.settings.clone(),
        })
    }
}

pub struct RateLimiterMiddleware<Svc, S> {
    service: Rc<Svc>,
    engine: AdmissionEngine<S>,
    settings: Rc<Settings>,
}

fn denied_response(retry_after: u64) -> HttpResponse {
    let mut response = HttpResponse::TooManyRequests().body(DENIED_MESSAGE);
    response
        .headers_mut()
        .insert(RETRY_AFTER, HeaderValue::from(retry_after));
    response
}

impl<Svc, B, S> Service<ServiceRequest> for RateLimiterMiddleware<Svc, S>
where
    Svc: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>
        + 'static,
    Svc::Future: 'static,
    B: 'static,
    S: Store + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let engine = self.engine.clone();
        let settings = self.settings.clone();

        Box::pin(async move {
            let mut address = client::client_address(&req, settings.trust_proxy_headers);
            if settings.group_ipv6_subnets {
                address = client::ip_key(&address);
            }
            let token = client::client_token(&req, &settings.token_header).to_owned();
            let has_token = !token.trim().is_empty();

            match engine.decide(&address, &token).await {
                Ok(verdict) if verdict.is_denied() => {
                    log::warn!(
                        "Rate limit exceeded: path={} ip={address} has_token={has_token} retry_after={}",
                        req.path(),
                        verdict.retry_after
                    );
                    let response = denied_response(verdict.retry_after);
                    return Ok(req.into_response(response).map_into_right_body());
                }
                Ok(_) => {
                    log::debug!(
                        "Request allowed: method={} path={} ip={address} has_token={has_token}",
                        req.method(),
                        req.path()
                    );
                }
                Err(e) => {
                    if settings.fail_open {
                        log::warn!(
                            "Rate limiter failed: {e}, allowing the request anyway: path={} ip={address}",
                            req.path()
                        );
                    } else {
                        log::error!(
                            "Rate limiter failed: {e}: path={} ip={address} has_token={has_token}",
                            req.path()
                        );
                        return Ok(req.into_response(e.error_response()).map_into_right_body());
                    }
                }
            }

            let service_response = service.call(req).await?;
            Ok(service_response.map_into_left_body())
        })
    }
}
