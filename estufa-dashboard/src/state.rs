//! Session state owned by the application controller and handed by
//! reference to the poller, the chat session and the view server.

use crate::aggregator::AggregateSnapshot;
use crate::error::BackendError;
use crate::view_sync::DashboardView;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Drives the user-facing status line only; retry timing is fixed elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Checking,
    Connected,
    Error,
}

impl ConnectionState {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Checking => "checking",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        }
    }
}

/// Result of offering a completed fetch to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Accepted,
    /// A newer request was issued after this one; its result was dropped.
    Stale,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub state: ConnectionState,
    pub message: String,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct DashboardSession {
    connection: ConnectionState,
    status_message: String,
    last_error: Option<String>,
    consecutive_failures: u32,
    last_success: Option<DateTime<Utc>>,
    current: Option<AggregateSnapshot>,
    view: Option<DashboardView>,
    issued_seq: u64,
}

impl Default for DashboardSession {
    fn default() -> Self {
        Self::new()
    }
}

impl DashboardSession {
    pub fn new() -> Self {
        Self {
            connection: ConnectionState::Checking,
            status_message: "checking backend".to_string(),
            last_error: None,
            consecutive_failures: 0,
            last_success: None,
            current: None,
            view: None,
            issued_seq: 0,
        }
    }

    /// Tag a new outgoing request. Later tags supersede earlier ones.
    pub fn issue_request(&mut self) -> u64 {
        self.issued_seq += 1;
        self.issued_seq
    }

    pub fn is_latest(&self, seq: u64) -> bool {
        seq == self.issued_seq
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    /// Snapshot the next cycle must compare against.
    pub fn current_snapshot(&self) -> Option<AggregateSnapshot> {
        self.current.clone()
    }

    pub fn view(&self) -> Option<&DashboardView> {
        self.view.as_ref()
    }

    /// Store a successful cycle's view if `seq` is still the newest request.
    pub fn apply_view(&mut self, seq: u64, view: DashboardView) -> Applied {
        if !self.is_latest(seq) {
            return Applied::Stale;
        }
        self.current = Some(view.snapshot.clone());
        self.view = Some(view);
        self.connection = ConnectionState::Connected;
        self.status_message = "connected".to_string();
        self.consecutive_failures = 0;
        self.last_error = None;
        self.last_success = Some(Utc::now());
        Applied::Accepted
    }

    /// Record a failed request. Stale failures leave the state untouched.
    pub fn record_failure(&mut self, seq: u64, err: &BackendError) -> Applied {
        if !self.is_latest(seq) {
            return Applied::Stale;
        }
        self.connection = ConnectionState::Error;
        self.consecutive_failures += 1;
        self.last_error = Some(err.to_string());
        self.status_message = format!(
            "backend unreachable ({} consecutive failures)",
            self.consecutive_failures
        );
        Applied::Accepted
    }

    /// Readiness probe failed: stay in Checking but surface the cause.
    pub fn record_probe_failure(&mut self, err: &BackendError) {
        self.connection = ConnectionState::Checking;
        self.consecutive_failures += 1;
        self.last_error = Some(err.to_string());
        self.status_message =
            format!("waiting for backend (attempt {})", self.consecutive_failures);
    }

    pub fn mark_checking(&mut self) {
        self.connection = ConnectionState::Checking;
        self.status_message = "checking backend".to_string();
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn status(&self) -> StatusView {
        StatusView {
            state: self.connection,
            message: self.status_message.clone(),
            last_error: self.last_error.clone(),
            consecutive_failures: self.consecutive_failures,
            last_success: self.last_success,
        }
    }
}
