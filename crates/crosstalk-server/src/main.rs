//! Crosstalk server binary — the coordinator for presence, call signaling,
//! the friend graph, and the speech translation pipeline.
//!
//! Starts an axum HTTP server with structured logging, database
//! initialization, and graceful shutdown on SIGTERM/SIGINT.

use crosstalk_server::config;
use crosstalk_server::registry::SessionRegistry;
use crosstalk_server::{app, AppState};
use crosstalk_voice::{
    HttpTranslator, PipelineConfig, PiperSynthesizer, TranslationPipeline, WhisperRecognizer,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("CROSSTALK_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    // Load configuration
    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration — the server cannot start without valid config");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    // Initialize database
    let pool = crosstalk_db::create_pool(
        &config.database.path,
        crosstalk_db::DbRuntimeSettings {
            busy_timeout_ms: config.database.busy_timeout_ms,
            pool_max_size: config.database.pool_max_size,
        },
    )
    .expect("failed to create database pool — check database.path in config");

    {
        let conn = pool
            .get()
            .expect("failed to get database connection for migrations");
        let applied =
            crosstalk_db::run_migrations(&conn).expect("failed to run database migrations");
        if applied > 0 {
            tracing::info!(count = applied, "applied database migrations");
        }

        // Any online flag left over from a previous process is stale: no
        // session survives a restart.
        let reset = conn
            .execute("UPDATE users SET online_status = 0 WHERE online_status = 1", [])
            .expect("failed to reset stale online status");
        if reset > 0 {
            tracing::info!(count = reset, "reset stale online status from previous run");
        }
    }

    // Assemble the voice pipeline from configured capabilities
    let pipeline = TranslationPipeline::new(
        Arc::new(WhisperRecognizer::new(
            &config.voice.stt_binary,
            &config.voice.stt_model,
        )),
        Arc::new(HttpTranslator::new(config.voice.translate_url.clone())),
        Arc::new(PiperSynthesizer::new(
            &config.voice.tts_binary,
            &config.voice.voices_dir,
        )),
        PipelineConfig {
            stage_timeout: Duration::from_secs(config.voice.stage_timeout_secs),
            max_retries: config.voice.max_retries,
            retry_backoff: Duration::from_millis(config.voice.retry_backoff_ms),
        },
    );

    let state = AppState {
        pool,
        registry: SessionRegistry::new(),
        pipeline: Arc::new(pipeline),
    };

    let app = app(state);
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, "starting crosstalk server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address — is another process using this port?");

    // Serve with graceful shutdown; connect info feeds per-connection logs
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("server error");

    tracing::info!("crosstalk server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
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
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
