//! StreamScribe server entry point

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use scribe_config::{load_settings, Settings};
use scribe_engine::{InferenceBackend, WhisperBackend};
use scribe_server::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_name = std::env::var("SCRIBE_ENV").ok();
    let config = load_settings(env_name.as_deref())?;

    init_tracing(&config);

    tracing::info!("starting streamscribe v{}", env!("CARGO_PKG_VERSION"));

    let backend: Arc<dyn InferenceBackend> =
        Arc::new(WhisperBackend::new(config.engine.models_dir.as_str()));
    let state = AppState::new(config.clone(), backend)?;
    tracing::info!("initialized application state");

    // Warm the default model so the first session does not pay the load.
    if config.engine.preload_default {
        match state.models.resolve(state.default_model).await {
            Ok(_) => tracing::info!(model = %state.default_model, "default model preloaded"),
            Err(e) => {
                tracing::warn!(model = %state.default_model, error = %e, "default model preload failed")
            }
        }
    }

    let _sweeper = state.registry.start_sweeper();

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, shutting down");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, shutting down");
        }
    }
}

fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.observability.log_level;
        format!("scribe={},tower_http=info", level).into()
    });

    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
