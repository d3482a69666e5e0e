//! Recurring fetch cycle and connection-state machine.
//!
//! The first cycle waits for a readiness probe. After that every cycle
//! fetches one batch, shapes it and reschedules after the normal interval;
//! a failed cycle reschedules after the recovery interval instead. There is
//! no retry cap and no exponential backoff: a monitoring dashboard keeps
//! trying forever and shows stale data meanwhile.

use crate::backend::TelemetrySource;
use crate::config::{BatchSource, DashboardConfig};
use crate::error::{BackendError, FailureKind};
use crate::models::{AnalysisReport, TelemetryBatch};
use crate::sink::SharedSink;
use crate::state::{Applied, ConnectionState, DashboardSession, Shared};
use crate::view_sync::{self, LabelClock, ViewOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub interval: Duration,
    pub recovery_interval: Duration,
    pub batch_limit: usize,
    pub source: BatchSource,
    pub fetch_analysis: bool,
    pub view: ViewOptions,
}

impl PollerSettings {
    pub fn from_config(cfg: &DashboardConfig) -> Self {
        Self {
            interval: cfg.polling.interval(),
            recovery_interval: cfg.polling.recovery_interval(),
            batch_limit: cfg.polling.batch_limit,
            source: cfg.polling.source,
            fetch_analysis: cfg.polling.fetch_analysis,
            view: ViewOptions {
                chart_points: cfg.view.chart_points,
                clock: LabelClock::from_minutes(cfg.view.utc_offset_minutes),
            },
        }
    }
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self::from_config(&DashboardConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Updated,
    /// A newer request superseded this one.
    Discarded,
    Failed(FailureKind),
}

pub struct Poller<S> {
    source: Arc<S>,
    session: Shared<DashboardSession>,
    sink: SharedSink,
    settings: PollerSettings,
    /// Held for a whole probe or cycle; clones share it, so the loop and
    /// manual refreshes never have two requests in flight.
    cycle: Arc<AsyncMutex<()>>,
}

impl<S> Clone for Poller<S> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            session: self.session.clone(),
            sink: self.sink.clone(),
            settings: self.settings.clone(),
            cycle: self.cycle.clone(),
        }
    }
}

/// Running poller. Dropping the handle does not stop the task; call `stop`.
pub struct PollerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Ask the poller to stop and wait for it. An in-flight fetch is allowed
    /// to finish first.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!("poller task ended abnormally: {}", e);
        }
    }
}

impl<S: TelemetrySource + 'static> Poller<S> {
    pub fn new(
        source: Arc<S>,
        session: Shared<DashboardSession>,
        sink: SharedSink,
        settings: PollerSettings,
    ) -> Self {
        Self {
            source,
            session,
            sink,
            settings,
            cycle: Arc::new(AsyncMutex::new(())),
        }
    }

    pub fn start(self) -> PollerHandle {
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(self.run(rx));
        PollerHandle { shutdown, task }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "🌱 Poller started (interval {:?}, recovery {:?})",
            self.settings.interval, self.settings.recovery_interval
        );

        if !self.wait_until_ready(&mut shutdown).await {
            info!("🌱 Poller stopped before backend became ready");
            return;
        }

        loop {
            let delay = match self.run_cycle().await {
                CycleOutcome::Failed(_) => self.settings.recovery_interval,
                CycleOutcome::Updated | CycleOutcome::Discarded => self.settings.interval,
            };
            if sleep_or_shutdown(delay, &mut shutdown).await {
                break;
            }
        }
        info!("🌱 Poller stopped");
    }

    /// Repeat the readiness probe until it succeeds. Returns false if asked
    /// to shut down first.
    async fn wait_until_ready(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let message = {
            let mut session = self.session.lock();
            session.mark_checking();
            session.status_message().to_string()
        };
        self.sink.status(ConnectionState::Checking, &message);

        loop {
            let probe = {
                let _cycle = self.cycle.lock().await;
                self.source.probe().await
            };
            match probe {
                Ok(()) => {
                    info!("✅ Backend ready");
                    return true;
                }
                Err(e) => {
                    warn!("readiness probe failed ({:?}): {}", e.kind(), e);
                    let message = {
                        let mut session = self.session.lock();
                        session.record_probe_failure(&e);
                        session.status_message().to_string()
                    };
                    self.sink.status(ConnectionState::Checking, &message);
                }
            }
            if sleep_or_shutdown(self.settings.recovery_interval, shutdown).await {
                return false;
            }
        }
    }

    /// One fetch → aggregate → shape → publish pass. Also used for manual
    /// refreshes, which wait for any cycle already in flight. Results of
    /// superseded requests are still discarded.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let _cycle = self.cycle.lock().await;
        let seq = self.session.lock().issue_request();
        debug!("poll cycle #{}", seq);

        match self.fetch().await {
            Ok((batch, analysis)) => {
                let applied = {
                    let mut session = self.session.lock();
                    if !session.is_latest(seq) {
                        None
                    } else {
                        let was_connected = session.connection() == ConnectionState::Connected;
                        // the snapshot being replaced is the one trends compare against
                        let previous = session.current_snapshot();
                        let mut view =
                            view_sync::apply(&batch, previous.as_ref(), &self.settings.view);
                        view.backend_summary = analysis;
                        session.apply_view(seq, view.clone());
                        Some((view, was_connected))
                    }
                };

                match applied {
                    Some((view, was_connected)) => {
                        if !was_connected {
                            info!("🟢 Connected to backend");
                            self.sink.status(ConnectionState::Connected, "connected");
                        }
                        self.sink.publish(&view);
                        CycleOutcome::Updated
                    }
                    None => {
                        debug!("discarding stale response of cycle #{}", seq);
                        CycleOutcome::Discarded
                    }
                }
            }
            Err(e) => {
                if self.session.lock().record_failure(seq, &e) == Applied::Stale {
                    debug!("discarding stale failure of cycle #{}: {}", seq, e);
                    return CycleOutcome::Discarded;
                }
                warn!("poll cycle #{} failed ({:?}): {}", seq, e.kind(), e);
                self.sink.status(ConnectionState::Error, &e.to_string());
                CycleOutcome::Failed(e.kind())
            }
        }
    }

    async fn fetch(&self) -> Result<(TelemetryBatch, Option<AnalysisReport>), BackendError> {
        let limit = self.settings.batch_limit;
        let batch = match self.settings.source {
            BatchSource::Dados => self.source.fetch_batch(limit).await?,
            BatchSource::Series => self.source.fetch_series(limit).await?,
        };
        let analysis = if self.settings.fetch_analysis {
            Some(self.source.fetch_analysis(limit).await?)
        } else {
            None
        };
        Ok((batch, analysis))
    }
}

/// Sleep for `delay`; true when shutdown was requested meanwhile.
async fn sleep_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TelemetryPoint;
    use crate::sink::ViewSink;
    use crate::state::new_state;
    use crate::view_sync::DashboardView;
    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct Script {
        probes: Mutex<VecDeque<Result<(), BackendError>>>,
        batches: Mutex<VecDeque<Result<TelemetryBatch, BackendError>>>,
    }

    impl TelemetrySource for Script {
        async fn probe(&self) -> Result<(), BackendError> {
            self.probes.lock().pop_front().unwrap_or(Ok(()))
        }

        async fn fetch_batch(&self, _limit: usize) -> Result<TelemetryBatch, BackendError> {
            self.batches.lock().pop_front().unwrap_or(Ok(Vec::new()))
        }

        async fn fetch_series(&self, limit: usize) -> Result<TelemetryBatch, BackendError> {
            self.fetch_batch(limit).await
        }

        async fn fetch_analysis(&self, _limit: usize) -> Result<AnalysisReport, BackendError> {
            Ok(AnalysisReport::default())
        }
    }

    #[derive(Default)]
    struct Statuses(Mutex<Vec<ConnectionState>>);

    impl ViewSink for Statuses {
        fn publish(&self, _view: &DashboardView) {}

        fn status(&self, state: ConnectionState, _message: &str) {
            self.0.lock().push(state);
        }
    }

    fn batch(temps: &[f64]) -> TelemetryBatch {
        temps
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let ts = Utc.with_ymd_and_hms(2025, 3, 1, 10, i as u32 * 5, 0).unwrap();
                TelemetryPoint::new(ts, *t, 50.0)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_failed_cycle_keeps_previous_snapshot() {
        let script = Arc::new(Script::default());
        script.batches.lock().extend([
            Ok(batch(&[20.0, 22.0])),
            Err(BackendError::Status { status: 500 }),
            Ok(batch(&[20.0, 22.0, 24.0])),
        ]);
        let session = new_state(DashboardSession::new());
        let sink = Arc::new(Statuses::default());
        let poller = Poller::new(script, session.clone(), sink.clone(), PollerSettings::default());

        assert_eq!(poller.run_cycle().await, CycleOutcome::Updated);
        assert_eq!(poller.run_cycle().await, CycleOutcome::Failed(FailureKind::Protocol));
        assert_eq!(session.lock().connection(), ConnectionState::Error);
        assert_eq!(poller.run_cycle().await, CycleOutcome::Updated);

        let guard = session.lock();
        let view = guard.view().unwrap();
        assert_eq!(view.snapshot.sample_count, 3);
        assert_eq!(view.trends.unwrap().temperature, crate::aggregator::TrendDirection::Rising);
        assert_eq!(
            *sink.0.lock(),
            [ConnectionState::Connected, ConnectionState::Error, ConnectionState::Connected]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_gates_first_cycle() {
        let script = Arc::new(Script::default());
        script.probes.lock().extend([Err(BackendError::Network("refused".into())), Ok(())]);
        script.batches.lock().push_back(Ok(batch(&[21.0])));
        let session = new_state(DashboardSession::new());
        let sink = Arc::new(Statuses::default());

        let settings = PollerSettings::default();
        let handle = Poller::new(script.clone(), session.clone(), sink.clone(), settings).start();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(session.lock().connection(), ConnectionState::Checking);
        assert_eq!(script.batches.lock().len(), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(session.lock().connection(), ConnectionState::Connected);
        handle.stop().await;

        assert_eq!(
            *sink.0.lock(),
            [ConnectionState::Checking, ConnectionState::Checking, ConnectionState::Connected]
        );
    }
}
