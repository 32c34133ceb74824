//! # IELTS Tutor Backend - Main Application Entry Point
//!
//! Actix-web server for the four exam-practice modules. All content
//! generation, grading, transcription, and speech synthesis happen on the
//! remote generative-language service; this backend orchestrates the
//! practice flows, runs the live speaking session, and persists history.
//!
//! ## Application Architecture:
//! - **config**: TOML files + environment variables
//! - **state**: shared state, service client, history stores, metrics
//! - **audio**: PCM codec, capture pipeline, playback scheduler
//! - **live**: streaming transport and the speaking session state machine
//! - **gemini**: request/response client for the generation service
//! - **practice**: the four module flows (writing/speaking/listening/reading)
//! - **storage**: JSON session-history repositories
//! - **handlers**: HTTP endpoints per module
//! - **websocket**: the speaking screen's live connection

mod audio;
mod config;
mod error;
mod gemini;
mod handlers;
mod health;
mod live;
mod middleware;
mod practice;
mod state;
mod storage;
mod websocket;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use tracing_actix_web::TracingLogger;
use config::AppConfig;
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Global shutdown signal, set by the signal handlers and polled by main.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting ielts-tutor-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);
    if config.gemini.api_key.is_empty() {
        error!("GEMINI_API_KEY is not set - every generation call will fail");
    }

    let app_state = AppState::new(config.clone())?;
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::config::get_config))
                    .route("/config", web::put().to(handlers::config::update_config))
                    .service(
                        web::scope("/writing")
                            .route("/topic", web::get().to(handlers::writing::get_topic))
                            .route("/feedback", web::post().to(handlers::writing::realtime_feedback))
                            .route("/submit", web::post().to(handlers::writing::submit))
                            .route("/history", web::get().to(handlers::writing::history)),
                    )
                    .service(
                        web::scope("/speaking")
                            .route("/topic", web::get().to(handlers::speaking::get_topic))
                            .route("/evaluation", web::post().to(handlers::speaking::evaluate))
                            .route("/history", web::get().to(handlers::speaking::history)),
                    )
                    .service(
                        web::scope("/listening")
                            .route("/topic", web::get().to(handlers::listening::get_topic))
                            .route("/test", web::post().to(handlers::listening::create_test))
                            .route("/audio", web::post().to(handlers::listening::synthesize_audio))
                            .route("/submit", web::post().to(handlers::listening::submit))
                            .route("/history", web::get().to(handlers::listening::history)),
                    )
                    .service(
                        web::scope("/reading")
                            .route("/topic", web::get().to(handlers::reading::get_topic))
                            .route("/test", web::post().to(handlers::reading::create_test))
                            .route("/submit", web::post().to(handlers::reading::submit))
                            .route("/history", web::get().to(handlers::reading::history)),
                    ),
            )
            .route("/ws/speaking", web::get().to(websocket::speaking_websocket))
            .route("/health", web::get().to(health::health_check))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
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

/// Initialize the tracing (logging) system for the application.
///
/// `RUST_LOG` controls verbosity; without it, application debug logs plus
/// actix-web info logs are emitted.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ielts_tutor_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Listen for SIGTERM/SIGINT and flip the global shutdown flag.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Poll the shutdown flag; returns once shutdown has been requested.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
