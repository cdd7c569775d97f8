use axum::{
    routing::{get, post},
    Router,
};
use rust_cnpj_enrichment::config::Config;
use rust_cnpj_enrichment::handlers::{self, AppState};
use rust_cnpj_enrichment::orchestrator::EnrichmentOrchestrator;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Resolves once Ctrl-C is received, cancelling every running batch.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutdown requested, cancelling running batches");
    shutdown.cancel();
}

/// Starts the enrichment HTTP service.
///
/// Sets up tracing, loads configuration, wires the orchestrator's external
/// clients, and serves the routes behind body-size and per-IP rate limits.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_cnpj_enrichment=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let orchestrator = EnrichmentOrchestrator::from_config(&config)?;
    let settings = orchestrator.settings();
    tracing::info!(
        "✓ Orchestrator ready (pacing {}s, rate-limit backoff {}s)",
        settings.pacing.as_secs(),
        settings.rate_limit_backoff.as_secs()
    );

    let shutdown = CancellationToken::new();
    let app_state = Arc::new(AppState {
        orchestrator: Arc::new(orchestrator),
        shutdown: shutdown.clone(),
    });

    // 2 requests/second per IP, burst of 5: a single batch already runs for minutes
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(2)
            .burst_size(5)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    let protected_routes = Router::new()
        .route("/api/v1/cnpj/validate", post(handlers::validate))
        .route("/api/v1/enrich/batch", post(handlers::enrich_batch))
        .layer(
            ServiceBuilder::new()
                .layer(RequestBodyLimitLayer::new(1024 * 1024))
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Health check bypasses rate limiting
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    Ok(())
}
