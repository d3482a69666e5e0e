/**
 * VIEW SERVER - local JSON surface for the browser front-end
 *
 * ROLE :
 * The browser page renders; this server hands it the already-shaped views
 * and forwards its few actions (manual refresh, demo seeding, chat turns).
 *
 * ROUTES :
 * - GET  /health   liveness
 * - GET  /status   connection state + last error
 * - GET  /view     latest DashboardView (404 before the first good cycle)
 * - POST /refresh  out-of-band poll cycle, queued behind any cycle in flight
 * - POST /seed     fire-and-forget demo data generation
 * - GET  /chat     transcript and turn state
 * - POST /chat     one chat turn; 409 while another turn is in flight. The turn
 *                  runs on its own task and finishes even if the client leaves
 */

use crate::backend::HttpBackend;
use crate::chat::{ChatMessage, ChatSession, ChatState, SendOutcome};
use crate::config::SeedConf;
use crate::poller::{CycleOutcome, Poller};
use crate::state::{DashboardSession, Shared, StatusView};
use crate::view_sync::DashboardView;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

pub type SharedChat = Arc<AsyncMutex<ChatSession<HttpBackend>>>;

#[derive(Clone)]
pub struct AppState {
    pub session: Shared<DashboardSession>,
    pub poller: Poller<HttpBackend>,
    pub chat: SharedChat,
    pub backend: HttpBackend,
    pub seed: SeedConf,
}

#[derive(Debug, Deserialize)]
pub struct ChatIn {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatTurnOut {
    pub outcome: SendOutcome,
    pub state: ChatState,
    pub session_id: Option<String>,
    /// Messages appended by this turn.
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct ChatLogOut {
    pub state: ChatState,
    pub busy: bool,
    pub session_id: Option<String>,
    pub transcript: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct RefreshOut {
    pub outcome: &'static str,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status", get(get_status))
        .route("/view", get(get_view))
        .route("/refresh", post(refresh))
        .route("/seed", post(seed))
        .route("/chat", get(get_chat).post(post_chat))
        .with_state(app_state)
}

async fn get_status(State(app): State<AppState>) -> Json<StatusView> {
    Json(app.session.lock().status())
}

async fn get_view(State(app): State<AppState>) -> Result<Json<DashboardView>, StatusCode> {
    app.session.lock().view().cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn refresh(State(app): State<AppState>) -> (StatusCode, Json<RefreshOut>) {
    let (code, outcome) = match app.poller.run_cycle().await {
        CycleOutcome::Updated => (StatusCode::OK, "updated"),
        CycleOutcome::Discarded => (StatusCode::OK, "superseded"),
        CycleOutcome::Failed(_) => (StatusCode::BAD_GATEWAY, "failed"),
    };
    (code, Json(RefreshOut { outcome }))
}

async fn seed(State(app): State<AppState>) -> StatusCode {
    let backend = app.backend.clone();
    let SeedConf { n, interval_ms } = app.seed.clone();
    tokio::spawn(async move {
        match backend.seed(n, interval_ms).await {
            Ok(()) => info!("🌾 seeded {} demo points", n),
            Err(e) => warn!("seed request failed: {}", e),
        }
    });
    StatusCode::ACCEPTED
}

async fn get_chat(State(app): State<AppState>) -> Json<ChatLogOut> {
    match app.chat.try_lock() {
        Ok(chat) => Json(ChatLogOut {
            state: chat.state(),
            busy: false,
            session_id: chat.session_id().map(str::to_string),
            transcript: chat.transcript().to_vec(),
        }),
        Err(_) => Json(ChatLogOut {
            state: ChatState::Sending,
            busy: true,
            session_id: None,
            transcript: Vec::new(),
        }),
    }
}

async fn post_chat(
    State(app): State<AppState>,
    Json(input): Json<ChatIn>,
) -> Result<Json<ChatTurnOut>, StatusCode> {
    // a held lock means a turn is in flight: the input is disabled
    let mut chat = app.chat.clone().try_lock_owned().map_err(|_| StatusCode::CONFLICT)?;

    // the turn runs on its own task so a disconnected browser cannot cut it short
    let turn = tokio::spawn(async move {
        let before = chat.transcript().len();
        let outcome = chat.send(&input.message).await;
        ChatTurnOut {
            outcome,
            state: chat.state(),
            session_id: chat.session_id().map(str::to_string),
            messages: chat.transcript()[before..].to_vec(),
        }
    });

    match turn.await {
        Ok(out) => Ok(Json(out)),
        Err(e) => {
            warn!("chat turn task failed: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
