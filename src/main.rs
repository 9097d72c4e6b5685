//! # Speech Jobs Backend - Main Application Entry Point
//!
//! HTTP service that accepts audio uploads, transcribes them asynchronously
//! with pluggable recognition engines, and serves the normalized transcripts.
//!
//! ## Application Architecture:
//! - **config**: Application configuration (TOML file + `APP__` environment variables)
//! - **state**: Shared state wiring the services below together
//! - **jobs**: Job store and the worker-pool scheduler that runs transcriptions
//! - **transcription**: Engines, engine registry, model lifecycle and catalog, text normalizer
//! - **audio**: Upload storage and WAV probing
//! - **summary** / **export**: Post-processing of finished transcripts
//! - **health**: Health and metrics endpoints
//! - **middleware**: Per-route request metrics
//! - **handlers**: HTTP request handlers for the REST API
//! - **error**: Error types and their HTTP responses

mod audio;
mod config;
mod error;
mod export;
mod handlers;
mod health;
mod jobs;
mod middleware;
mod models;
mod state;
mod summary;
mod transcription;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use config::AppConfig;
use state::AppState;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// The main application entry point.
///
/// 1. Loads configuration from files and environment variables
/// 2. Sets up logging
/// 3. Opens the job store and starts the transcription workers
/// 4. Serves the REST API until a shutdown signal arrives
/// 5. Stops the workers, cancelling transcriptions still in flight
#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting speech-jobs-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Effective configuration:\n{}", config.to_toml()?);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let cors_origins = config.server.cors_origins.clone();
    let app_state = AppState::from_config(config)?;
    let scheduler = app_state.scheduler.clone();

    info!(
        "Engines available: {}",
        app_state.engines.names().join(", ")
    );
    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = (if cors_origins.is_empty() {
            Cors::default().allow_any_origin()
        } else {
            cors_origins
                .iter()
                .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
        })
        .allow_any_method()
        .allow_any_header()
        .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(middleware::MetricsMiddleware)
            .configure(handlers::configure)
    })
    .bind(&bind_addr)?
    .disable_signals()
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Stopping transcription workers...");
    scheduler.shutdown().await;

    info!("Server stopped gracefully");
    Ok(())
}

/// `RUST_LOG` controls the filter; defaults to
/// `speech_jobs_backend=debug,actix_web=info`.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "speech_jobs_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
