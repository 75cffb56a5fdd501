//! # Speech Relay Backend - Main Application Entry Point
//!
//! Actix-web server that relays client audio to a streaming speech recognizer and
//! streams transcripts back over WebSockets.
//!
//! ## Application Architecture:
//! - **config**: Application configuration (TOML file + `APP_` environment variables)
//! - **state**: Shared application state, stream slots and metrics
//! - **health**: Health and metrics endpoints
//! - **middleware**: Request metrics collection
//! - **handlers**: Configuration API and batch transcription
//! - **recognition**: Recognizer client trait and the WebSocket recognizer transport
//! - **audio**: Audio queue, chunk validation and restart bridging buffers
//! - **streaming**: Endless and single-session stream drivers
//! - **websocket**: Client-facing WebSocket endpoints
//! - **error**: Error types and HTTP error responses

mod audio;
mod config;
mod error;
mod handlers;
mod health;
mod middleware;
mod recognition;
mod state;
mod streaming;
mod websocket;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use config::AppConfig;
use recognition::{SpeechRecognizer, WebSocketRecognizer};
use state::AppState;
use std::sync::Arc;
use tracing::{error, info};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Loads configuration, builds the recognizer client and serves until a shutdown
/// signal arrives. Running streams are stopped when their connections close.
#[actix_web::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting speech-relay-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    let client = WebSocketRecognizer::new(&config.recognizer);
    info!(
        provider = client.name(),
        endpoint = client.endpoint(),
        "Recognizer client ready"
    );
    let recognizer: Arc<dyn SpeechRecognizer> = Arc::new(client);

    let app_state = web::Data::new(AppState::new(config.clone(), recognizer));
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let json_limit = config.performance.batch_body_limit();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .app_data(web::JsonConfig::default().limit(json_limit))
            .wrap(cors)
            .wrap(middleware::RequestMetrics)
            .wrap(TracingLogger::default())
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config))
                    .route("/config", web::put().to(handlers::update_config))
                    .route("/stt", web::post().to(handlers::transcribe)),
            )
            .route("/health", web::get().to(health::health_check))
            .route("/ws/stt/endless", web::get().to(websocket::endless_websocket))
            .route("/ws/stt/stream", web::get().to(websocket::streaming_websocket))
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

    info!("Server stopped gracefully");
    Ok(())
}

/// `RUST_LOG` controls filtering; defaults to debug output for this crate.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "speech_relay_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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
