//! ember-server – entry point.
//!
//! Startup order:
//! 1. Parse configuration from environment variables.
//! 2. Initialise structured tracing (JSON in production, pretty in dev).
//! 3. Open the SQLite database and run pending migrations.
//! 4. Build the Gemini backend and the completion orchestrator.
//! 5. Fail placeholders left pending by a previous process.
//! 6. Build the Axum router and start the HTTP server with graceful shutdown.
//! 7. Drain in-flight fulfillments.

mod backend;
mod config;
mod entities;
mod error;
mod middleware;
mod orchestrator;
mod routes;
mod schemas;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::backend::GeminiBackend;
use crate::config::Config;
use crate::entities::SqliteStore;
use crate::orchestrator::{Orchestrator, OrchestratorSettings};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    let cfg = Config::from_env();

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    // Held until exit so buffered file records are flushed.
    let _log_guard = init_tracing(&cfg);

    info!(version = env!("CARGO_PKG_VERSION"), "ember-server starting");

    // ── 3. Database ────────────────────────────────────────────────────────────
    let store = Arc::new(SqliteStore::connect(&cfg.database_url).await?);
    info!(database_url = %cfg.database_url, "database ready");

    // ── 4. Backend + orchestrator ──────────────────────────────────────────────
    let backend = Arc::new(GeminiBackend::new(&cfg.gemini)?);
    info!(
        text_model = %cfg.gemini.text_model,
        image_model = %cfg.gemini.image_model,
        "gemini backend ready"
    );
    let orchestrator = Orchestrator::new(
        Arc::clone(&store),
        backend,
        OrchestratorSettings { context_window: cfg.context_window },
    );

    // ── 5. Recovery ────────────────────────────────────────────────────────────
    if cfg.recover_pending {
        orchestrator.recover_stale_placeholders().await?;
    }

    let state = Arc::new(AppState {
        config: Arc::new(cfg.clone()),
        store,
        orchestrator: orchestrator.clone(),
    });

    // ── 6. HTTP server with graceful shutdown ──────────────────────────────────
    let app = routes::build(Arc::clone(&state));
    let addr: SocketAddr = cfg.bind_address.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // ── 7. Drain ───────────────────────────────────────────────────────────────
    info!(
        in_flight = orchestrator.in_flight(),
        timeout_secs = cfg.drain_timeout.as_secs(),
        "waiting for in-flight fulfillments"
    );
    orchestrator.drain(cfg.drain_timeout).await;

    info!("ember-server stopped");
    Ok(())
}

/// Install the global subscriber: stdout (pretty or JSON) plus an optional
/// daily-rolling file under `EMBER_LOG_DIR`.
fn init_tracing(cfg: &Config) -> Option<WorkerGuard> {
    // Warn loudly if the configured value is not a valid filter expression.
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: EMBER_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    cfg.log_level, e
                );
                EnvFilter::new("info")
            }
        },
    };

    let (file_layer, guard) = match cfg.log_dir.as_deref() {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "ember-server.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(env_filter).with(file_layer);
    if cfg.log_json {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
    guard
}

/// Returns a future that resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}
