//! Estufa Dashboard - binary entry point
//!
//! Loads configuration, starts the poller against the greenhouse backend
//! and serves the shaped views and the chat channel to the browser.

use anyhow::{Context, Result};
use estufa_dashboard::config::load_config;
use estufa_dashboard::http::{self, AppState};
use estufa_dashboard::sink::LogSink;
use estufa_dashboard::state::{new_state, DashboardSession};
use estufa_dashboard::{ChatSession, HttpBackend, Poller, PollerSettings};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex as AsyncMutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("estufa_dashboard=info")),
        )
        .init();

    info!("🌿 Estufa dashboard starting...");

    let cfg = load_config().await;
    cfg.validate().context("Invalid dashboard configuration")?;
    let addr = cfg.listen_addr()?;

    let backend = HttpBackend::from_config(&cfg.backend).context("Failed to build backend client")?;
    info!("Backend: {}", backend.base_url());

    let session = new_state(DashboardSession::new());
    let shared_backend = Arc::new(backend.clone());
    let poller = Poller::new(
        shared_backend.clone(),
        session.clone(),
        Arc::new(LogSink),
        PollerSettings::from_config(&cfg),
    );
    let chat = ChatSession::new(shared_backend, backend.base_url().clone(), &cfg.chat.report_path);

    let app_state = AppState {
        session,
        poller: poller.clone(),
        chat: Arc::new(AsyncMutex::new(chat)),
        backend,
        seed: cfg.seed.clone(),
    };
    let handle = poller.start();

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("View server listening on http://{}", addr);

    axum::serve(listener, http::build_router(app_state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("🛑 Shutdown requested");
        })
        .await
        .context("View server failed")?;

    handle.stop().await;
    info!("✅ Estufa dashboard stopped");
    Ok(())
}
