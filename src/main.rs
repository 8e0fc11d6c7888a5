use axum::{
    routing::{get, post},
    Router,
};
use std::process::ExitCode;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use steel_lead_pipeline::config::Config;
use steel_lead_pipeline::handlers::{self, AppState};
use steel_lead_pipeline::pipeline::{Pipeline, RunStatus};
use steel_lead_pipeline::scheduler;
use tokio_util::sync::CancellationToken;

/// Entry point.
///
/// Without arguments: one pipeline run, exit 0 when it completes, 1 when it
/// fails. With `serve`: the HTTP trigger and status surface plus scheduled
/// runs every `PIPELINE_INTERVAL_HOURS`.
#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "steel_lead_pipeline=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let serve = std::env::args().nth(1).as_deref() == Some("serve");
    let outcome = if serve { run_server().await } else { run_once().await };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn build_pipeline() -> anyhow::Result<(Config, Pipeline)> {
    let config = Config::from_env()?;
    let pipeline = Pipeline::from_config(&config)
        .await
        .map_err(|e| anyhow::anyhow!("pipeline setup failed: {}", e))?;
    Ok((config, pipeline))
}

async fn run_once() -> anyhow::Result<ExitCode> {
    let (_, pipeline) = build_pipeline().await?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("⚠ Interrupt received, stopping after the current stage");
            ctrl_c.cancel();
        }
    });

    let report = pipeline.run(&cancel).await;
    tracing::info!(
        "Run {} finished: {} ({} scraped, {} kept, {} prioritized)",
        report.run_id,
        report.summary,
        report.counts.scraped,
        report.counts.validated,
        report.counts.prioritized
    );

    Ok(if report.status == RunStatus::Completed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn run_server() -> anyhow::Result<ExitCode> {
    let (config, pipeline) = build_pipeline().await?;
    let app_state = Arc::new(AppState::new(pipeline));
    let shutdown = app_state.shutdown.clone();

    match config.run_interval {
        Some(period) => {
            tokio::spawn(scheduler::run_every(app_state.clone(), period, shutdown.clone()));
        }
        None => tracing::info!("Scheduled runs disabled; trigger over HTTP"),
    }

    // Configure rate limiter: 1 request/second per IP, burst of 5
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(1)
            .burst_size(5)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limiter configuration"))?,
    );

    let protected_routes = Router::new()
        .route("/api/v1/pipeline/run", post(handlers::trigger_run))
        .route("/api/v1/pipeline/cancel", post(handlers::cancel_run))
        .route("/api/v1/pipeline/status", get(handlers::run_status))
        .layer(
            ServiceBuilder::new()
                .layer(RequestBodyLimitLayer::new(64 * 1024))
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

    let signal = shutdown.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("⚠ Interrupt received, shutting down");
        }
        signal.cancel();
    })
    .await?;
    shutdown.cancel();

    Ok(ExitCode::SUCCESS)
}
