/*!
Stub greenhouse backend served over real HTTP

Binds an ephemeral port on 127.0.0.1 and answers the same routes as the
real backend, from in-memory telemetry:
- GET  /dados?limit      newest first
- GET  /series?limit     parallel arrays, ascending
- GET  /analise?limit    min/max/media or {"erro"}
- POST /chat             assigns a session id on the first turn
- GET  /export.csv
- POST /seed?n&interval_ms

Failures can be injected per route to drive error paths.
*/

use crate::fixtures::{base_time, dados_json, series_json};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Duration;
use estufa_dashboard::models::ChatRequest;
use estufa_dashboard::TelemetryPoint;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

#[derive(Default)]
struct StubData {
    points: Vec<TelemetryPoint>,
    failures: HashMap<&'static str, StatusCode>,
    raw_bodies: HashMap<&'static str, String>,
    replies: VecDeque<Value>,
    chat_requests: Vec<ChatRequest>,
    seeds: Vec<(u32, u64)>,
    sessions: u32,
    chat_delay: std::time::Duration,
}

/// Shared, mutable backing data of a [`StubServer`].
#[derive(Clone, Default)]
pub struct StubState {
    data: Arc<Mutex<StubData>>,
}

impl StubState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Telemetry in ascending time order.
    pub fn set_points(&self, points: Vec<TelemetryPoint>) {
        self.data.lock().unwrap().points = points;
    }

    pub fn push_point(&self, point: TelemetryPoint) {
        self.data.lock().unwrap().points.push(point);
    }

    /// Make `route` (e.g. "/dados") answer with `status` until cleared.
    pub fn fail(&self, route: &'static str, status: StatusCode) {
        self.data.lock().unwrap().failures.insert(route, status);
    }

    /// Make `route` answer 200 with `body` verbatim.
    pub fn raw_body(&self, route: &'static str, body: &str) {
        self.data.lock().unwrap().raw_bodies.insert(route, body.to_string());
    }

    /// Drop every injected failure and raw body.
    pub fn heal(&self) {
        let mut data = self.data.lock().unwrap();
        data.failures.clear();
        data.raw_bodies.clear();
    }

    /// Hold every `/chat` answer back by `delay`.
    pub fn set_chat_delay(&self, delay: std::time::Duration) {
        self.data.lock().unwrap().chat_delay = delay;
    }

    /// Queue a verbatim `/chat` response body.
    pub fn push_reply(&self, body: Value) {
        self.data.lock().unwrap().replies.push_back(body);
    }

    pub fn chat_requests(&self) -> Vec<ChatRequest> {
        self.data.lock().unwrap().chat_requests.clone()
    }

    pub fn seeds(&self) -> Vec<(u32, u64)> {
        self.data.lock().unwrap().seeds.clone()
    }

    fn injected(&self, route: &'static str) -> Option<Response> {
        let data = self.data.lock().unwrap();
        if let Some(status) = data.failures.get(route) {
            return Some((*status, "injected failure").into_response());
        }
        data.raw_bodies.get(route).map(|body| {
            ([("content-type", "application/json")], Bytes::from(body.clone())).into_response()
        })
    }

    fn latest(&self, limit: usize) -> Vec<TelemetryPoint> {
        let data = self.data.lock().unwrap();
        let skip = data.points.len().saturating_sub(limit);
        data.points[skip..].to_vec()
    }
}

/// Running stub. The server task is aborted on drop.
pub struct StubServer {
    addr: SocketAddr,
    state: StubState,
    task: JoinHandle<()>,
}

impl StubServer {
    pub async fn start(state: StubState) -> anyhow::Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app = router(state.clone());
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::error!("stub server stopped: {}", e);
            }
        });
        log::info!("🧪 [STUB] greenhouse backend on http://{}", addr);
        Ok(Self { addr, state, task })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn state(&self) -> &StubState {
        &self.state
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

impl LimitQuery {
    fn get(&self) -> usize {
        self.limit.unwrap_or(20)
    }
}

#[derive(Debug, Deserialize)]
struct SeedQuery {
    n: Option<u32>,
    interval_ms: Option<u64>,
}

fn router(state: StubState) -> Router {
    Router::new()
        .route("/dados", get(dados))
        .route("/series", get(series))
        .route("/analise", get(analise))
        .route("/chat", post(chat))
        .route("/export.csv", get(export_csv))
        .route("/seed", post(seed))
        .with_state(state)
}

async fn dados(State(state): State<StubState>, Query(q): Query<LimitQuery>) -> Response {
    if let Some(resp) = state.injected("/dados") {
        return resp;
    }
    Json(dados_json(&state.latest(q.get()))).into_response()
}

async fn series(State(state): State<StubState>, Query(q): Query<LimitQuery>) -> Response {
    if let Some(resp) = state.injected("/series") {
        return resp;
    }
    Json(series_json(&state.latest(q.get()))).into_response()
}

async fn analise(State(state): State<StubState>, Query(q): Query<LimitQuery>) -> Response {
    if let Some(resp) = state.injected("/analise") {
        return resp;
    }
    let points = state.latest(q.get());
    if points.is_empty() {
        return Json(json!({"erro": "sem dados"})).into_response();
    }
    let temps: Vec<f64> = points.iter().filter_map(|p| p.temperature).collect();
    let hums: Vec<f64> = points.iter().filter_map(|p| p.humidity).collect();
    Json(json!({
        "temperatura": stats(&temps),
        "umidade": stats(&hums),
        "spikes_temp_idx": [],
        "spikes_umi_idx": [],
    }))
    .into_response()
}

fn stats(values: &[f64]) -> Value {
    if values.is_empty() {
        return json!({"min": null, "max": null, "media": null});
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let media = values.iter().sum::<f64>() / values.len() as f64;
    json!({"min": min, "max": max, "media": media})
}

async fn chat(State(state): State<StubState>, Json(request): Json<ChatRequest>) -> Response {
    if let Some(resp) = state.injected("/chat") {
        return resp;
    }
    let delay = state.data.lock().unwrap().chat_delay;
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    let mut data = state.data.lock().unwrap();
    data.chat_requests.push(request.clone());
    if let Some(body) = data.replies.pop_front() {
        return Json(body).into_response();
    }
    let session_id = match request.session_id {
        Some(id) => id,
        None => {
            data.sessions += 1;
            format!("sess-{}", data.sessions)
        }
    };
    Json(json!({
        "resposta": format!("Recebido: {}", request.mensagem),
        "session_id": session_id,
        "tem_relatorio": false,
    }))
    .into_response()
}

async fn export_csv(State(state): State<StubState>) -> Response {
    if let Some(resp) = state.injected("/export.csv") {
        return resp;
    }
    let mut csv = String::from("timestamp,temperatura,umidade\n");
    for p in state.latest(usize::MAX) {
        let cell = |v: Option<f64>| v.map(|x| x.to_string()).unwrap_or_default();
        let line = format!(
            "{},{},{}\n",
            p.timestamp.to_rfc3339(),
            cell(p.temperature),
            cell(p.humidity)
        );
        csv.push_str(&line);
    }
    ([("content-type", "text/csv")], csv).into_response()
}

async fn seed(State(state): State<StubState>, Query(q): Query<SeedQuery>) -> Response {
    if let Some(resp) = state.injected("/seed") {
        return resp;
    }
    let n = q.n.unwrap_or(40);
    let interval_ms = q.interval_ms.unwrap_or(120);
    let mut data = state.data.lock().unwrap();
    data.seeds.push((n, interval_ms));
    let start = data.points.last().map(|p| p.timestamp).unwrap_or_else(base_time);
    for i in 1..=n {
        let timestamp = start + Duration::milliseconds(interval_ms as i64 * i as i64);
        let temperature = 22.0 + (i % 7) as f64 * 0.5;
        let humidity = 55.0 + (i % 5) as f64;
        data.points.push(TelemetryPoint::new(timestamp, temperature, humidity));
    }
    (StatusCode::OK, Json(json!({"ok": true, "gerados": n}))).into_response()
}
