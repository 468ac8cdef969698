//! The timed sampling loop.
//!
//! Each tick makes sure a session is open, samples the sensors, runs the
//! estimator, integrates energy, persists the sample and then publishes it.
//! A failed tick is logged and followed by a fixed backoff. Shutdown ends the
//! open session once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};
use wattwise_platform::SensorGateway;
use wattwise_protocol::{PowerSample, Session};

use crate::daemon::broadcast::BroadcastHub;
use crate::data::{
    lock_store, now_ms, EnergyAccumulator, HistoryStoreError, PowerEstimator, SessionError,
    SessionManager, SharedStore,
};

pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum TickError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Sensor refresh failed: {0}")]
    Sensor(String),

    #[error("Sampling took {elapsed:?}, longer than the {interval:?} tick")]
    Overrun { elapsed: Duration, interval: Duration },

    #[error("Failed to persist sample: {0}")]
    Store(#[from] HistoryStoreError),
}

pub struct PollingScheduler<G> {
    sensors: G,
    estimator: PowerEstimator,
    accumulator: EnergyAccumulator,
    sessions: Arc<SessionManager>,
    store: SharedStore,
    hub: Arc<BroadcastHub>,
    interval: Duration,
    backoff: Duration,
    current_session: Option<Session>,
}

impl<G: SensorGateway> PollingScheduler<G> {
    pub fn new(
        sensors: G,
        estimator: PowerEstimator,
        sessions: Arc<SessionManager>,
        store: SharedStore,
        hub: Arc<BroadcastHub>,
        interval: Duration,
    ) -> Self {
        Self {
            sensors,
            estimator,
            accumulator: EnergyAccumulator::new(),
            sessions,
            store,
            hub,
            interval,
            backoff: DEFAULT_BACKOFF,
            current_session: None,
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn accumulated_kwh(&self) -> f64 {
        self.accumulator.current()
    }

    /// Returns the open session, starting one if none is open.
    ///
    /// A session left open by an earlier run is reused. Losing a start race
    /// to an external request resolves to the session that won.
    pub fn ensure_session(&mut self) -> Result<Session, SessionError> {
        let session = match self.sessions.current()? {
            Some(open) => open,
            None => match self.sessions.start_new() {
                Ok(started) => started,
                Err(SessionError::Conflict(id)) => self
                    .sessions
                    .current()?
                    .ok_or(SessionError::Conflict(id))?,
                Err(e) => return Err(e),
            },
        };

        if self.current_session.as_ref().map(|s| s.id.as_str()) != Some(session.id.as_str()) {
            info!(session_id = %session.id, "Sampling into session");
        }
        self.current_session = Some(session.clone());
        Ok(session)
    }

    /// Runs one sampling step.
    pub fn tick(&mut self) -> Result<PowerSample, TickError> {
        let started = Instant::now();
        let session = self.ensure_session()?;

        self.sensors
            .refresh()
            .map_err(|e| TickError::Sensor(format!("{e:#}")))?;
        let estimate = self.estimator.estimate(&self.sensors);

        let elapsed = started.elapsed();
        if elapsed > self.interval {
            return Err(TickError::Overrun {
                elapsed,
                interval: self.interval,
            });
        }

        let accumulated_kwh = self
            .accumulator
            .integrate(estimate.total_watts, self.interval.as_secs_f64());

        let sample = PowerSample {
            timestamp: now_ms(),
            power_watts: estimate.total_watts,
            accumulated_kwh,
            session_id: session.id.clone(),
            cpu_util_pct: estimate.cpu_util_pct,
            gpu_util_pct: estimate.gpu_util_pct,
            mem_util_pct: estimate.mem_util_pct,
        };
        lock_store(&self.store)?.insert_sample(&sample)?;

        let delivered = self
            .hub
            .publish(sample.clone(), estimate.components, Some(session));
        trace!(
            power_watts = sample.power_watts,
            accumulated_kwh = sample.accumulated_kwh,
            delivered,
            "Sample recorded"
        );

        Ok(sample)
    }

    /// Loops until `shutdown` flips to true or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval = %humantime::format_duration(self.interval),
            "Polling scheduler started"
        );

        if let Err(e) = self.ensure_session() {
            error!(error = %e, "Failed to open a session at startup");
        }

        loop {
            if *shutdown.borrow() {
                break;
            }

            let tick_start = Instant::now();
            let wait = match self.tick() {
                Ok(_) => self.interval.saturating_sub(tick_start.elapsed()),
                Err(e) => {
                    error!(
                        error = %e,
                        backoff = %humantime::format_duration(self.backoff),
                        "Tick failed"
                    );
                    self.backoff
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.finish();
        info!(accumulated_kwh = self.accumulated_kwh(), "Polling scheduler stopped");
    }

    /// Ends the cached session. Failures are logged only.
    fn finish(&mut self) {
        let Some(session) = self.current_session.take() else {
            debug!("Scheduler stopped without an open session");
            return;
        };

        match self.sessions.end(&session.id) {
            Ok(ended) => info!(
                session_id = %ended.id,
                total_kwh = ended.total_kwh,
                "Session closed on shutdown"
            ),
            Err(e) => warn!(
                session_id = %session.id,
                error = %e,
                "Failed to close session on shutdown"
            ),
        }
    }
}
