use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use anyhow::Context;
use ledger_core::Ledger;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

use petition_service::audit::TracingAuditSink;
use petition_service::cache::{PetitionCache, RedisCacheClient};
use petition_service::config::Config;
use petition_service::database::{create_pool, PgPetitionStore};
use petition_service::metrics::ServiceMetrics;
use petition_service::search::HttpSearchIndexer;
use petition_service::{CoordinatorSettings, Dependencies, VoteCoordinator, SERVICE_NAME, VERSION};

struct AppState {
    coordinator: Arc<VoteCoordinator>,
    ledger: Ledger,
    metrics: ServiceMetrics,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    service: String,
    version: String,
    ledger_blocks: usize,
    cache_hit_rate: f64,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;
    info!("Petition service starting on {}:{}", config.server.host, config.server.http_port);

    let pool = create_pool(&config.database).await.context("connecting to database")?;
    let redis = RedisCacheClient::connect(&config.redis.url)
        .await
        .context("connecting to redis")?;
    let indexer = HttpSearchIndexer::new(
        &config.search.url,
        &config.search.index,
        config.search.timeout(),
    )
    .context("building search client")?;

    let ledger = Ledger::initialize(config.ledger.to_core())
        .await
        .context("initializing ledger")?;
    info!(
        difficulty = ledger.difficulty(),
        append_mode = ?config.ledger.append_mode,
        "Audit ledger ready"
    );

    let metrics = ServiceMetrics::new().context("registering metrics")?;
    let coordinator = Arc::new(VoteCoordinator::new(
        Dependencies {
            store: Arc::new(PgPetitionStore::new(pool)),
            cache: PetitionCache::new(Arc::new(redis), config.cache.clone()),
            ledger: Arc::new(ledger.clone()),
            indexer: Arc::new(indexer),
            audit: Arc::new(TracingAuditSink),
            metrics: metrics.clone(),
        },
        CoordinatorSettings::from_config(&config),
    ));

    let state = web::Data::new(AppState {
        coordinator: coordinator.clone(),
        ledger: ledger.clone(),
        metrics,
    });

    let bind_address = format!("{}:{}", config.server.host, config.server.http_port);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/health", web::get().to(health_check))
            .route("/metrics", web::get().to(prometheus_metrics))
            .route("/api/v1/ledger", web::get().to(ledger_snapshot))
    })
    .bind(&bind_address)?
    .run()
    .await?;

    info!("HTTP server stopped; draining background work");
    coordinator.flush().await;
    if let Err(e) = ledger.shutdown().await {
        error!("Ledger shutdown failed: {}", e);
    }

    Ok(())
}

async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let cache = state.coordinator.cache_metrics().await;

    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
        version: VERSION.to_string(),
        ledger_blocks: state.ledger.len(),
        cache_hit_rate: cache.hit_rate(),
    })
}

async fn ledger_snapshot(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.coordinator.ledger_snapshot())
}

async fn prometheus_metrics(state: web::Data<AppState>) -> impl Responder {
    let encoder = TextEncoder::new();
    let mut metric_families = state.metrics.registry().gather();
    metric_families.extend(state.ledger.metrics().registry().gather());
    let mut buffer = vec![];

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => match String::from_utf8(buffer) {
            Ok(body) => HttpResponse::Ok()
                .content_type("text/plain; version=0.0.4")
                .body(body),
            Err(e) => HttpResponse::InternalServerError()
                .body(format!("Failed to encode metrics: {}", e)),
        },
        Err(e) => HttpResponse::InternalServerError()
            .body(format!("Failed to gather metrics: {}", e)),
    }
}
