/*!
Scriptable backend double for developing without the greenhouse API

Replays queued results for every endpoint, records each call, and tracks
how many fetches are in flight at once so tests can assert on ordering.
*/

use estufa_dashboard::models::{AnalysisReport, ChatReply, ChatRequest};
use estufa_dashboard::sink::ViewSink;
use estufa_dashboard::state::ConnectionState;
use estufa_dashboard::view_sync::DashboardView;
use estufa_dashboard::{AssistantBackend, BackendError, TelemetryBatch, TelemetrySource};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Probe,
    Dados { limit: usize },
    Series { limit: usize },
    Analise { limit: usize },
    Chat { mensagem: String, session_id: Option<String> },
}

#[derive(Default)]
struct Script {
    probes: Mutex<VecDeque<Result<(), BackendError>>>,
    batches: Mutex<VecDeque<Result<TelemetryBatch, BackendError>>>,
    analyses: Mutex<VecDeque<Result<AnalysisReport, BackendError>>>,
    replies: Mutex<VecDeque<Result<ChatReply, BackendError>>>,
    calls: Mutex<Vec<Call>>,
    latency: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Mock backend implementing both `TelemetrySource` and `AssistantBackend`.
/// Empty queues answer with an empty batch, a default analysis and an "ok" reply.
#[derive(Clone, Default)]
pub struct MockBackend {
    script: Arc<Script>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_probe(&self, result: Result<(), BackendError>) -> &Self {
        self.script.probes.lock().unwrap().push_back(result);
        self
    }

    pub fn push_batch(&self, result: Result<TelemetryBatch, BackendError>) -> &Self {
        self.script.batches.lock().unwrap().push_back(result);
        self
    }

    pub fn push_analysis(&self, result: Result<AnalysisReport, BackendError>) -> &Self {
        self.script.analyses.lock().unwrap().push_back(result);
        self
    }

    pub fn push_reply(&self, result: Result<ChatReply, BackendError>) -> &Self {
        self.script.replies.lock().unwrap().push_back(result);
        self
    }

    /// Every call sleeps this long before answering.
    pub fn set_latency(&self, latency: Duration) {
        *self.script.latency.lock().unwrap() = latency;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script.calls.lock().unwrap().clone()
    }

    /// Chat calls only, in order.
    pub fn chat_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Chat { .. }))
            .collect()
    }

    pub fn fetch_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Dados { .. } | Call::Series { .. }))
            .count()
    }

    /// Highest number of calls observed in flight simultaneously.
    pub fn max_in_flight(&self) -> usize {
        self.script.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.script.calls.lock().unwrap().clear();
        self.script.max_in_flight.store(0, Ordering::SeqCst);
    }

    fn record(&self, call: Call) {
        log::debug!("🧪 [MOCK] {:?}", call);
        self.script.calls.lock().unwrap().push(call);
    }

    async fn in_flight<T>(&self, answer: impl FnOnce() -> T) -> T {
        let now = self.script.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.script.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let latency = *self.script.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let result = answer();
        self.script.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn pop<T>(queue: &Mutex<VecDeque<T>>) -> Option<T> {
    queue.lock().unwrap().pop_front()
}

impl TelemetrySource for MockBackend {
    async fn probe(&self) -> Result<(), BackendError> {
        self.record(Call::Probe);
        self.in_flight(|| pop(&self.script.probes).unwrap_or(Ok(()))).await
    }

    async fn fetch_batch(&self, limit: usize) -> Result<TelemetryBatch, BackendError> {
        self.record(Call::Dados { limit });
        self.in_flight(|| pop(&self.script.batches).unwrap_or_else(|| Ok(Vec::new()))).await
    }

    async fn fetch_series(&self, limit: usize) -> Result<TelemetryBatch, BackendError> {
        self.record(Call::Series { limit });
        self.in_flight(|| pop(&self.script.batches).unwrap_or_else(|| Ok(Vec::new()))).await
    }

    async fn fetch_analysis(&self, limit: usize) -> Result<AnalysisReport, BackendError> {
        self.record(Call::Analise { limit });
        self.in_flight(|| pop(&self.script.analyses).unwrap_or_else(|| Ok(Default::default())))
            .await
    }
}

impl AssistantBackend for MockBackend {
    async fn chat(&self, request: ChatRequest) -> Result<ChatReply, BackendError> {
        self.record(Call::Chat {
            mensagem: request.mensagem.clone(),
            session_id: request.session_id.clone(),
        });
        self.in_flight(|| {
            pop(&self.script.replies).unwrap_or_else(|| {
                Ok(ChatReply {
                    resposta: Some("ok".into()),
                    ..Default::default()
                })
            })
        })
        .await
    }
}

/// View sink that keeps everything it receives.
#[derive(Default)]
pub struct RecordingSink {
    views: Mutex<Vec<DashboardView>>,
    statuses: Mutex<Vec<(ConnectionState, String)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn views(&self) -> Vec<DashboardView> {
        self.views.lock().unwrap().clone()
    }

    pub fn last_view(&self) -> Option<DashboardView> {
        self.views.lock().unwrap().last().cloned()
    }

    pub fn states(&self) -> Vec<ConnectionState> {
        self.statuses.lock().unwrap().iter().map(|(s, _)| *s).collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.statuses.lock().unwrap().iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn clear(&self) {
        self.views.lock().unwrap().clear();
        self.statuses.lock().unwrap().clear();
    }
}

impl ViewSink for RecordingSink {
    fn publish(&self, view: &DashboardView) {
        self.views.lock().unwrap().push(view.clone());
    }

    fn status(&self, state: ConnectionState, message: &str) {
        self.statuses.lock().unwrap().push((state, message.to_string()));
    }
}
