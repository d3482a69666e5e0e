/*!
Test harness for the greenhouse dashboard

Wires a [`MockBackend`] and a [`RecordingSink`] into a poller and a chat
session, then offers assertions on what they observed:
- Connection-state sequences
- Fetch serialization (never two fetches in flight)
- Chat calls and transcript shape
*/

use crate::mock_backend::{Call, MockBackend, RecordingSink};
use anyhow::Result;
use estufa_dashboard::chat::{ChatSession, Role};
use estufa_dashboard::state::{new_state, Shared};
use estufa_dashboard::{ConnectionState, DashboardSession, Poller, PollerSettings};
use reqwest::Url;
use std::sync::Arc;

/// Base URL used for report links produced by harness chat sessions.
pub const TEST_BASE_URL: &str = "http://estufa.test:5000/";

pub struct TestHarness {
    pub backend: MockBackend,
    pub sink: Arc<RecordingSink>,
    pub session: Shared<DashboardSession>,
    pub settings: PollerSettings,
}

impl TestHarness {
    pub fn new() -> Self {
        env_logger::try_init().ok();

        Self {
            backend: MockBackend::new(),
            sink: Arc::new(RecordingSink::new()),
            session: new_state(DashboardSession::new()),
            settings: PollerSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: PollerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn poller(&self) -> Poller<MockBackend> {
        Poller::new(
            Arc::new(self.backend.clone()),
            self.session.clone(),
            self.sink.clone(),
            self.settings.clone(),
        )
    }

    pub fn chat(&self) -> ChatSession<MockBackend> {
        let base = Url::parse(TEST_BASE_URL).expect("test base url");
        ChatSession::new(Arc::new(self.backend.clone()), base, "/export.csv")
    }

    pub fn connection(&self) -> ConnectionState {
        self.session.lock().connection()
    }

    /// Assert the exact sequence of connection states pushed to the sink.
    pub fn assert_states(&self, expected: &[ConnectionState]) -> Result<()> {
        let actual = self.sink.states();
        if actual != expected {
            anyhow::bail!("connection states mismatch: expected {:?}, got {:?}", expected, actual);
        }
        log::info!("✅ connection states {:?}", actual);
        Ok(())
    }

    pub fn assert_fetches_serialized(&self) -> Result<()> {
        let max = self.backend.max_in_flight();
        if max > 1 {
            anyhow::bail!("{} backend calls were in flight at once", max);
        }
        Ok(())
    }

    pub fn assert_no_chat_calls(&self) -> Result<()> {
        let calls = self.backend.chat_calls();
        if !calls.is_empty() {
            anyhow::bail!("expected no assistant calls, got {:?}", calls);
        }
        Ok(())
    }

    /// Session id carried by the n-th chat call (0-based).
    pub fn chat_session_at(&self, n: usize) -> Result<Option<String>> {
        match self.backend.chat_calls().get(n) {
            Some(Call::Chat { session_id, .. }) => Ok(session_id.clone()),
            _ => anyhow::bail!("no chat call #{}", n),
        }
    }

    /// Count bot messages in a transcript.
    pub fn bot_messages(chat: &ChatSession<MockBackend>) -> usize {
        chat.transcript().iter().filter(|m| m.role == Role::Bot).count()
    }

    pub fn get_stats(&self) -> TestStats {
        TestStats {
            views_published: self.sink.views().len(),
            status_changes: self.sink.states().len(),
            backend_calls: self.backend.calls().len(),
            fetches: self.backend.fetch_count(),
            max_in_flight: self.backend.max_in_flight(),
        }
    }

    pub fn reset(&mut self) {
        self.backend.clear();
        self.sink.clear();
        self.session = new_state(DashboardSession::new());
        log::info!("🧹 Test harness reset");
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct TestStats {
    pub views_published: usize,
    pub status_changes: usize,
    pub backend_calls: usize,
    pub fetches: usize,
    pub max_in_flight: usize,
}

impl TestStats {
    pub fn print(&self) {
        println!("📊 Test Statistics:");
        println!("  Views published: {}", self.views_published);
        println!("  Status changes: {}", self.status_changes);
        println!("  Backend calls: {} ({} fetches)", self.backend_calls, self.fetches);
        println!("  Max in flight: {}", self.max_in_flight);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::BatchBuilder;
    use estufa_dashboard::CycleOutcome;

    #[tokio::test]
    async fn test_harness_basic_functionality() {
        let harness = TestHarness::new();
        harness.backend.push_batch(Ok(BatchBuilder::new().temps(&[21.0, 22.0]).build()));

        assert_eq!(harness.poller().run_cycle().await, CycleOutcome::Updated);
        harness.assert_states(&[ConnectionState::Connected]).unwrap();
        harness.assert_fetches_serialized().unwrap();

        let stats = harness.get_stats();
        stats.print();
        assert_eq!(stats.views_published, 1);
        assert_eq!(stats.fetches, 1);
    }

    #[tokio::test]
    async fn test_report_link_uses_test_base() {
        let harness = TestHarness::new();
        let chat = harness.chat();
        assert_eq!(chat.report_url(), "http://estufa.test:5000/export.csv");
    }
}
