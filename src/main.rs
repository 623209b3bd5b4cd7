use actix_admission_gate::settings::Settings;
use actix_admission_gate::store::redis::{RedisStore, DEFAULT_CONNECT_TIMEOUT};
use actix_admission_gate::{AdmissionEngine, LogObserver, RateLimiter};
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

/// HTTP service that admits requests per client address and API token.
///
/// Rate limits and the Redis connection are configured through environment variables
/// (RATE_LIMITER_*, REDIS_*), optionally from a `.env` file.
#[derive(Parser, Debug)]
#[command(name = "admission-gate")]
struct Args {
    #[arg(
        long,
        value_name = "ADDR",
        help = "Address to listen on",
        default_value = "0.0.0.0:8080",
        env = "LISTEN_ADDR"
    )]
    listen: String,
    #[arg(
        long,
        value_name = "LEVEL",
        help = "Log level: error, warn, info, debug, trace",
        default_value = "info",
        env = "LOG_LEVEL"
    )]
    log_level: String,
}

async fn index() -> impl Responder {
    HttpResponse::Ok()
        .content_type("application/json")
        .body(r#"{"message": "Hello from the admission gate!"}"#)
}

async fn health() -> impl Responder {
    HttpResponse::Ok()
        .content_type("application/json")
        .body(r#"{"status": "healthy"}"#)
}

#[actix_web::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(tracing_subscriber::EnvFilter::try_new(&args.log_level)?)
        .init();

    let settings = Settings::from_env().context("Unable to read configuration")?;
    log::info!(
        "IP limit: {} req/s, block {}s (enabled: {})",
        settings.policy.address.max_requests,
        settings.policy.address.block_seconds,
        settings.policy.address.enabled
    );
    log::info!(
        "Token limit: {} req/s, block {}s (enabled: {})",
        settings.policy.token.max_requests,
        settings.policy.token.block_seconds,
        settings.policy.token.enabled
    );

    // Refuse to serve without a working store
    let store = RedisStore::connect(&settings.redis, DEFAULT_CONNECT_TIMEOUT)
        .await
        .with_context(|| format!("Failed to connect to Redis at {}", settings.redis.address))?
        .build();
    let engine = AdmissionEngine::builder(store, settings.policy)
        .observer(Arc::new(LogObserver))
        .store_timeout(settings.store_timeout)
        .build();

    log::info!("Server listening on {}", args.listen);
    let factory_engine = engine.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(RateLimiter::builder(factory_engine.clone()).build())
            .route("/", web::get().to(index))
            .route("/health", web::get().to(health))
    })
    .bind(&args.listen)
    .with_context(|| format!("Unable to bind {}", args.listen))?
    .run()
    .await?;

    // The workers and their factories are gone, this is the last handle on the connection
    log::info!("Closing store connection");
    drop(engine);
    Ok(())
}
