//! # Live Relay Server
//!
//! Entry point for the `live-relay` binary: an actix-web server exposing the
//! `/live` WebSocket plus health and metrics endpoints.
//!
//! ## Startup:
//! 1. Load `.env`, initialise tracing
//! 2. Load and validate `AppConfig`
//! 3. Build shared state with the loopback speech backend
//! 4. Serve until SIGINT/SIGTERM, then stop gracefully

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use live_audio_session::config::AppConfig;
use live_audio_session::logging;
use live_audio_session::middleware::MetricsMiddleware;
use live_audio_session::relay;
use live_audio_session::state::AppState;
use tracing::{error, info};
use tracing_actix_web::TracingLogger;

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    logging::init_tracing(logging::DEFAULT_FILTER)?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting live-relay v{}", env!("CARGO_PKG_VERSION"));
    info!(
        max_sessions = config.performance.max_concurrent_sessions,
        heartbeat_secs = config.performance.heartbeat_interval_secs,
        "Configuration loaded: {}:{}",
        config.server.host,
        config.server.port
    );

    let app_state = AppState::new(config.clone());
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

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
            .wrap(MetricsMiddleware)
            .wrap(TracingLogger::default())
            .configure(relay::configure)
    })
    .disable_signals()
    .bind(&bind_addr)?
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

/// Resolves on SIGINT or SIGTERM. A handler that cannot be installed never
/// resolves, leaving the other one in charge.
async fn wait_for_shutdown() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
