//! Estufa Dashboard - live client for the IoT greenhouse backend
//!
//! - `poller` keeps the telemetry fresh and owns the connection state
//! - `aggregator` reduces each batch to means and trend indicators
//! - `view_sync` shapes batches into chart, table and summary views
//! - `chat` runs the session-based assistant conversation
//! - `http` serves the shaped views to the browser front-end

pub mod aggregator;
pub mod backend;
pub mod chat;
pub mod config;
pub mod error;
pub mod http;
pub mod models;
pub mod poller;
pub mod sink;
pub mod state;
pub mod view_sync;

pub use aggregator::{AggregateSnapshot, TrendDirection, Trends};
pub use backend::{AssistantBackend, HttpBackend, TelemetrySource};
pub use chat::{ChatSession, ChatState, SendOutcome};
pub use error::{BackendError, FailureKind};
pub use models::{TelemetryBatch, TelemetryPoint};
pub use poller::{CycleOutcome, Poller, PollerHandle, PollerSettings};
pub use state::{ConnectionState, DashboardSession};
pub use view_sync::DashboardView;
