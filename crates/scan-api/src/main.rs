//! # Scan Platform API Server
//!
//! The HTTP front door for the privacy-compliance scanning platform, built
//! with Axum. Wires the Job Orchestrator (C4), Scanner Abstraction Layer
//! (C1-C3), Results Aggregator (C6-C7), and License & Quota Enforcer (C5)
//! behind a tenant-scoped REST surface.
//!
//! ## Middleware Stack
//!
//! Requests flow through, in order:
//! 1. **Security headers**: HSTS, CSP, X-Frame-Options
//! 2. **Request ID**: generated or propagated, stamped on the response
//! 3. **Principal extraction**: trusts the upstream auth collaborator's
//!    `X-Principal` header (§4.9)
//! 4. **Tracing**: structured, correlation-id aware
//! 5. **Compression**: gzip/brotli
//! 6. **CORS**

use axum::{http::StatusCode, response::IntoResponse, Json, Router};
use scan_core::license::QuotaConfig;
use scan_core::session::ActiveUserConfig;
use scan_core::{AuditLogger, Config, CorsConfig, PostgresGateway, ScanMetrics};
use scan_engine::{ComplianceScoreEngine, EngineExecutor, PatternRegistry};
use scan_orchestrator::{
    executor::WorkerPoolConfig, queue::RedisScanQueue, AdmissionService, GatewayLicenseProvider, JobOrchestrator,
    LoggingWebhookSink,
};
use std::{net::SocketAddr, str::FromStr, sync::Arc};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use axum::http::{HeaderName, HeaderValue, Method};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod api_middleware;
mod error;
mod handlers;
mod health;
mod state;

use crate::{
    handlers::{scans, tenants},
    state::AppState,
};

fn build_cors_layer(cors_config: &CorsConfig) -> Result<CorsLayer, Box<dyn std::error::Error>> {
    let mut cors = CorsLayer::new();

    if cors_config.allowed_origins.contains(&"*".to_string()) {
        cors = cors.allow_origin(Any);
    } else {
        let origins: Result<Vec<HeaderValue>, _> = cors_config.allowed_origins.iter().map(|origin| origin.parse()).collect();
        cors = cors.allow_origin(origins?);
    }

    if cors_config.allowed_methods.contains(&"*".to_string()) {
        cors = cors.allow_methods(Any);
    } else {
        let methods: Result<Vec<Method>, _> = cors_config.allowed_methods.iter().map(|method| method.parse()).collect();
        cors = cors.allow_methods(methods?);
    }

    if cors_config.allowed_headers.contains(&"*".to_string()) {
        cors = cors.allow_headers(Any);
    } else {
        let headers: Result<Vec<HeaderName>, _> = cors_config.allowed_headers.iter().map(|header| header.parse()).collect();
        cors = cors.allow_headers(headers?);
    }

    if !cors_config.expose_headers.is_empty() {
        let expose_headers: Result<Vec<HeaderName>, _> = cors_config.expose_headers.iter().map(|header| header.parse()).collect();
        cors = cors.expose_headers(expose_headers?);
    }

    cors = cors.allow_credentials(cors_config.allow_credentials);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("starting scan-api...");

    let config = Config::load()?;
    info!("configuration loaded and validated");

    let gateway = Arc::new(PostgresGateway::new(&config.database).await?);
    gateway.initialize_schema().await?;
    info!("persistence gateway initialized");

    let redis_client = redis::Client::open(config.redis.url.as_str())?;
    let redis = redis::aio::ConnectionManager::new(redis_client).await?;
    info!("redis connection established");

    let error_metrics = Arc::new(scan_core::ErrorMetrics::new());
    let audit = Arc::new(AuditLogger::new(gateway.audit_backend(), error_metrics));

    let registry = Arc::new(PatternRegistry::with_defaults());
    let score_engine = Arc::new(ComplianceScoreEngine::new(registry.clone(), gateway.clone()));
    let engine_executor = Arc::new(EngineExecutor::with_defaults(registry.clone(), score_engine.clone()));
    let webhook_sink = Arc::new(LoggingWebhookSink::new(audit.clone()));

    let license_provider = Arc::new(GatewayLicenseProvider::new(gateway.clone()));
    let quotas = scan_core::QuotaEnforcer::new(redis.clone(), QuotaConfig::default());
    let concurrency = scan_core::ConcurrentUserTracker::new(redis.clone(), ActiveUserConfig::from_ttl_ms(config.session.ttl_ms));
    let admission = Arc::new(AdmissionService::new(license_provider.clone(), quotas.clone(), concurrency));

    let scan_queue = Arc::new(RedisScanQueue::new(redis.clone(), config.queue.max_admitted));
    let scan_metrics = Arc::new(ScanMetrics::new(&config.metrics.namespace)?);

    let worker_config = build_worker_pool_config(&config);

    let orchestrator = Arc::new(JobOrchestrator::new(
        admission,
        scan_queue,
        gateway.clone(),
        engine_executor,
        score_engine.clone(),
        Some(webhook_sink),
        audit.clone(),
        scan_metrics,
        config.queue.clone(),
        worker_config,
    ));
    orchestrator.spawn_workers();
    info!("job orchestrator workers started");

    let app_state = AppState {
        config: config.clone(),
        orchestrator,
        gateway,
        registry,
        score_engine,
        audit,
        redis,
        quotas,
        license_provider,
    };

    let app = create_app(app_state)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("server shutdown complete");
    Ok(())
}

/// Translates the string-keyed per-scan-type config sections into the
/// `ScanType`-keyed maps the worker pool wants.
fn build_worker_pool_config(config: &Config) -> WorkerPoolConfig {
    let per_type_caps = config
        .workers
        .per_type_caps
        .iter()
        .filter_map(|(name, cap)| scan_core::ScanType::from_str(name).ok().map(|t| (t, *cap)))
        .collect();

    let per_type_deadline_ms = config
        .deadlines
        .per_type_ms
        .iter()
        .filter_map(|(name, ms)| scan_core::ScanType::from_str(name).ok().map(|t| (t, *ms)))
        .collect();

    WorkerPoolConfig {
        global_pool_size: config.workers.global_pool_size,
        per_type_caps,
        per_type_deadline_ms,
        max_attempts: config.retries.max_attempts,
        backoff_ms_base: config.retries.backoff_ms_base,
    }
}

fn create_app(state: AppState) -> Result<Router, Box<dyn std::error::Error>> {
    #[derive(OpenApi)]
    #[openapi(
        paths(health::health_check, health::readiness_check),
        components(schemas()),
        tags(
            (name = "health", description = "Health check endpoints"),
            (name = "scans", description = "Scan submission and lifecycle"),
            (name = "tenants", description = "Tenant compliance history and usage"),
        )
    )]
    struct ApiDoc;

    let cors = build_cors_layer(&state.config.cors)?;

    let router = Router::new()
        .nest("/api/v1", create_api_routes())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", axum::routing::get(health::health_check))
        .route("/ready", axum::routing::get(health::readiness_check))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(api_middleware::security_headers::security_headers_middleware))
                .layer(axum::middleware::from_fn(api_middleware::request_id::request_id_middleware))
                .layer(axum::middleware::from_fn(api_middleware::principal::principal_middleware))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_request(DefaultOnRequest::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(CompressionLayer::new())
                .layer(cors),
        )
        .with_state(state)
        .fallback(handler_404);

    Ok(router)
}

fn create_api_routes() -> Router<AppState> {
    Router::new()
        .nest("/scans", scans::scan_routes())
        .nest("/tenants", tenants::tenant_routes())
}

async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "resource not found" })))
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scan_api=debug,scan_orchestrator=debug,scan_engine=debug,scan_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received ctrl+c signal");
        },
        _ = terminate => {
            info!("received terminate signal");
        },
    }
}
