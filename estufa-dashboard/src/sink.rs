//! Rendering sinks fed by the poller.

use crate::state::ConnectionState;
use crate::view_sync::DashboardView;
use std::sync::Arc;
use tracing::{info, warn};

/// Receives shaped views and status changes. Implementations render; they
/// never call back into the poller.
pub trait ViewSink: Send + Sync {
    fn publish(&self, view: &DashboardView);

    fn status(&self, state: ConnectionState, message: &str);
}

pub type SharedSink = Arc<dyn ViewSink>;

/// Writes a one-line summary of every view to the log.
#[derive(Debug, Default, Clone)]
pub struct LogSink;

impl ViewSink for LogSink {
    fn publish(&self, view: &DashboardView) {
        let v = &view.current_values;
        info!(
            "📊 {} samples | temp {}°C | humidity {}% | light {} | water {} | trends {:?}",
            v.sample_count, v.temperature, v.humidity, v.light, v.water_level, view.trends
        );
    }

    fn status(&self, state: ConnectionState, message: &str) {
        match state {
            ConnectionState::Error => warn!("🔌 {}: {}", state.label(), message),
            _ => info!("🔌 {}: {}", state.label(), message),
        }
    }
}
