use crate::engine::AdmissionEngine;
use crate::middleware::*;
use crate::policy::{DimensionPolicy, Policy};
use crate::store::memory::InMemoryStore;
use crate::testing::FailingStore;
use actix_web::http::StatusCode;
use actix_web::test::{read_body, TestRequest};
use actix_web::{get, test, App, HttpResponse, Responder};

#[get("/200")]
async fn route_200() -> impl Responder {
    HttpResponse::Ok().body("Hello world!")
}

fn make_engine(address: DimensionPolicy, token: DimensionPolicy) -> AdmissionEngine<InMemoryStore> {
    AdmissionEngine::builder(
        InMemoryStore::builder().with_gc_interval(None).build(),
        Policy { address, token },
    )
    .build()
}

fn from_ip(ip: &str) -> TestRequest {
    TestRequest::get()
        .uri("/200")
        .peer_addr(format!("{ip}:4000").parse().unwrap())
}

#[actix_web::test]
async fn test_allow_deny() {
    tokio::time::pause();
    let engine = make_engine(DimensionPolicy::new(2, 60), DimensionPolicy::disabled());
    let limiter = RateLimiter::builder(engine).build();
    let app = test::init_service(App::new().service(route_200).wrap(limiter)).await;

    for _ in 0..2 {
        let response = test::call_service(&app, from_ip("203.0.113.5").to_request()).await;
        assert!(response.status().is_success());
        assert!(response.headers().get(RETRY_AFTER).is_none());
        assert_eq!(read_body(response).await, "Hello world!");
    }
    for _ in 0..2 {
        let response = test::call_service(&app, from_ip("203.0.113.5").to_request()).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "60");
        assert_eq!(read_body(response).await, DENIED_MESSAGE);
    }
    let response = test::call_service(&app, from_ip("203.0.113.9").to_request()).await;
    assert!(response.status().is_success());
}

#[actix_web::test]
async fn test_token_header() {
    tokio::time::pause();
    let engine = make_engine(DimensionPolicy::new(1, 60), DimensionPolicy::new(3, 20));
    let limiter = RateLimiter::builder(engine).build();
    let app = test::init_service(App::new().service(route_200).wrap(limiter)).await;

    assert!(test::call_service(&app, from_ip("203.0.113.5").to_request())
        .await
        .status()
        .is_success());
    assert_eq!(
        test::call_service(&app, from_ip("203.0.113.5").to_request())
            .await
            .status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    // The blocked address is still served when a token is presented
    for _ in 0..3 {
        let request = from_ip("203.0.113.5")
            .insert_header(("API_KEY", "abc123"))
            .to_request();
        assert!(test::call_service(&app, request).await.status().is_success());
    }
    let request = from_ip("203.0.113.5")
        .insert_header(("API_KEY", "abc123"))
        .to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "20");
}

#[actix_web::test]
async fn test_custom_token_header() {
    tokio::time::pause();
    let engine = make_engine(DimensionPolicy::disabled(), DimensionPolicy::new(1, 5));
    let limiter = RateLimiter::builder(engine)
        .token_header(HeaderName::from_static("x-api-token"))
        .build();
    let app = test::init_service(App::new().service(route_200).wrap(limiter)).await;

    for expected in [StatusCode::OK, StatusCode::TOO_MANY_REQUESTS] {
        let request = from_ip("203.0.113.5")
            .insert_header(("X-Api-Token", "abc123"))
            .to_request();
        assert_eq!(test::call_service(&app, request).await.status(), expected);
    }
    // The default header is ignored
    let request = from_ip("203.0.113.5")
        .insert_header(("API_KEY", "abc123"))
        .to_request();
    assert!(test::call_service(&app, request).await.status().is_success());
}

#[actix_web::test]
async fn test_proxy_headers() {
    tokio::time::pause();
    let engine = make_engine(DimensionPolicy::new(1, 60), DimensionPolicy::disabled());
    let trusting = RateLimiter::builder(engine.clone()).build();
    let app = test::init_service(App::new().service(route_200).wrap(trusting)).await;

    // Distinct forwarded clients behind the same proxy are limited separately
    for client in ["198.51.100.1", "198.51.100.2"] {
        let request = from_ip("10.0.0.1")
            .insert_header(("X-Forwarded-For", format!("{client}, 10.0.0.1")))
            .to_request();
        assert!(test::call_service(&app, request).await.status().is_success());
    }
    let request = from_ip("10.0.0.1")
        .insert_header(("X-Forwarded-For", "198.51.100.1"))
        .to_request();
    assert_eq!(
        test::call_service(&app, request).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );

    // Without trust every request is keyed by the peer
    let direct = RateLimiter::builder(engine).trust_proxy_headers(false).build();
    let app = test::init_service(App::new().service(route_200).wrap(direct)).await;
    for (client, expected) in [
        ("198.51.100.3", StatusCode::OK),
        ("198.51.100.4", StatusCode::TOO_MANY_REQUESTS),
    ] {
        let request = from_ip("10.0.0.2")
            .insert_header(("X-Forwarded-For", client))
            .to_request();
        assert_eq!(test::call_service(&app, request).await.status(), expected);
    }
}

#[actix_web::test]
async fn test_group_ipv6_subnets() {
    tokio::time::pause();
    let engine = make_engine(DimensionPolicy::new(1, 60), DimensionPolicy::disabled());
    let limiter = RateLimiter::builder(engine).group_ipv6_subnets(true).build();
    let app = test::init_service(App::new().service(route_200).wrap(limiter)).await;

    let request = TestRequest::get()
        .uri("/200")
        .peer_addr("[2001:db8:1:2::1]:4000".parse().unwrap())
        .to_request();
    assert!(test::call_service(&app, request).await.status().is_success());
    // Same /64, so the same key
    let request = TestRequest::get()
        .uri("/200")
        .peer_addr("[2001:db8:1:2::ffff]:4000".parse().unwrap())
        .to_request();
    assert_eq!(
        test::call_service(&app, request).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
}

#[actix_web::test]
async fn test_store_error_fails_closed() {
    let engine = AdmissionEngine::builder(FailingStore, Policy::default()).build();
    let limiter = RateLimiter::builder(engine).build();
    let app = test::init_service(App::new().service(route_200).wrap(limiter)).await;
    let response = test::call_service(&app, from_ip("203.0.113.5").to_request()).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    // Store details are not leaked to the client
    assert!(read_body(response).await.is_empty());
}

#[actix_web::test]
async fn test_fail_open() {
    let engine = AdmissionEngine::builder(FailingStore, Policy::default()).build();
    let limiter = RateLimiter::builder(engine).fail_open(true).build();
    let app = test::init_service(App::new().service(route_200).wrap(limiter)).await;
    let response = test::call_service(&app, from_ip("203.0.113.5").to_request()).await;
    assert!(response.status().is_success());
}

#[actix_web::test]
async fn test_unrestricted_policy() {
    let engine = AdmissionEngine::builder(
        InMemoryStore::builder().with_gc_interval(None).build(),
        Policy::unrestricted(),
    )
    .build();
    let limiter = RateLimiter::builder(engine).build();
    let app = test::init_service(App::new().service(route_200).wrap(limiter)).await;
    for _ in 0..50 {
        let request = from_ip("203.0.113.5")
            .insert_header(("API_KEY", "abc123"))
            .to_request();
        assert!(test::call_service(&app, request).await.status().is_success());
    }
}
