use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use wattwise_platform::{FixtureSensors, SensorGateway};

use crate::config::{runtime_dir, LogLevel, UserConfig};
use crate::daemon::broadcast::BroadcastHub;
use crate::daemon::scheduler::PollingScheduler;
use crate::daemon::socket_path;
use crate::daemon::{
    DaemonRequest, DaemonResponse, DaemonStatus, EnergyTotals, ErrorKind, PowerSample,
    MAX_SUBSCRIBERS,
};
use crate::data::{
    lock_store, now_ms, shared, HistoryStore, HistoryStoreError, PowerEstimator, SessionError,
    SessionManager, SharedStore,
};

const MS_PER_DAY: i64 = 86_400_000;

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] HistoryStoreError),

    #[error("Already running")]
    AlreadyRunning,

    #[error("Failed to daemonize: {0}")]
    Daemonize(String),

    #[error("Sensor subsystem failed to initialize: {0}")]
    FatalInit(String),
}

pub type Result<T> = std::result::Result<T, DaemonError>;

type ClientId = u64;

enum ClientMessage {
    Request { request: DaemonRequest },
    Disconnect,
}

struct ClientHandle {
    response_tx: mpsc::Sender<DaemonResponse>,
}

/// Read side of the daemon. Never touches the scheduler's working state.
struct DaemonState {
    store: SharedStore,
    sessions: Arc<SessionManager>,
    hub: Arc<BroadcastHub>,
    config: UserConfig,
    start_time: Instant,
}

impl DaemonState {
    fn run_prune(&self) {
        let retention_days = self.config.history.retention_days;
        if retention_days == 0 {
            return;
        }

        let cutoff = now_ms() - i64::from(retention_days) * MS_PER_DAY;
        let result = lock_store(&self.store).and_then(|store| {
            let deleted = store.delete_samples_before(cutoff)?;
            if deleted > 0 {
                store.vacuum()?;
            }
            Ok(deleted)
        });

        match result {
            Ok(deleted) if deleted > 0 => info!(deleted, retention_days, "Pruned old samples"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "Error pruning samples"),
        }
    }

    /// Closes whatever session is open. Used when the daemon cannot sample at all.
    fn close_open_session(&self) {
        match self.sessions.current() {
            Ok(Some(open)) => {
                if let Err(e) = self.sessions.end(&open.id) {
                    warn!(session_id = %open.id, error = %e, "Failed to close open session");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to look up open session"),
        }
    }

    fn get_status(&self) -> DaemonStatus {
        let store = lock_store(&self.store).ok();
        let stats = store.as_ref().and_then(|s| s.get_stats().ok());
        let current = store.as_ref().and_then(|s| s.get_open_session().ok().flatten());

        DaemonStatus {
            running: true,
            uptime_secs: self.start_time.elapsed().as_secs(),
            sample_count: stats.as_ref().map(|s| s.sample_count).unwrap_or(0),
            session_count: stats.as_ref().map(|s| s.session_count).unwrap_or(0),
            last_sample_time: stats.as_ref().and_then(|s| s.newest_sample),
            current_session_id: current.map(|s| s.id),
            database_size_bytes: stats.map(|s| s.size_bytes).unwrap_or(0),
            version: env!("CARGO_PKG_VERSION").to_string(),
            subscriber_count: self.hub.subscriber_count(),
            sample_interval_secs: self.config.power.sample_interval_secs,
            ..DaemonStatus::default()
        }
    }

    fn get_totals(&self) -> std::result::Result<EnergyTotals, HistoryStoreError> {
        let rate = self.sessions.electricity_rate();
        let total_kwh = lock_store(&self.store)?
            .latest_sample()?
            .map(|s| s.accumulated_kwh)
            .unwrap_or(0.0);

        Ok(EnergyTotals {
            total_kwh,
            total_cost: total_kwh * rate,
            electricity_rate: rate,
        })
    }

    fn handle_request(&self, request: &DaemonRequest) -> DaemonResponse {
        match request {
            DaemonRequest::GetStatus => DaemonResponse::Status(self.get_status()),
            DaemonRequest::GetCurrentData => match self.hub.latest() {
                Some(snapshot) => DaemonResponse::CurrentData(snapshot),
                None => DaemonResponse::error(ErrorKind::Unavailable, "No sample taken yet"),
            },
            DaemonRequest::GetPowerHistory { hours } => self.samples_response(|store| {
                store.get_recent_samples(*hours, now_ms())
            }),
            DaemonRequest::GetSamplesInRange { from, to } => {
                self.samples_response(|store| store.get_samples(*from, *to))
            }
            DaemonRequest::GetSessionSamples { session_id } => {
                self.samples_response(|store| store.get_session_samples(session_id))
            }
            DaemonRequest::GetSessions => match self.sessions.all() {
                Ok(sessions) => DaemonResponse::Sessions(sessions),
                Err(e) => session_error_response(e),
            },
            DaemonRequest::GetSession { id } => match self.sessions.get(id) {
                Ok(session) => DaemonResponse::Session(session),
                Err(e) => session_error_response(e),
            },
            DaemonRequest::GetCurrentSession => match self.sessions.current() {
                Ok(Some(session)) => DaemonResponse::Session(session),
                Ok(None) => DaemonResponse::NoSession,
                Err(e) => session_error_response(e),
            },
            DaemonRequest::StartSession => match self.sessions.start_new() {
                Ok(session) => DaemonResponse::Session(session),
                Err(e) => session_error_response(e),
            },
            DaemonRequest::EndSession { id } => match self.sessions.end(id) {
                Ok(session) => DaemonResponse::Session(session),
                Err(e) => session_error_response(e),
            },
            DaemonRequest::GetTotals => match self.get_totals() {
                Ok(totals) => DaemonResponse::Totals(totals),
                Err(e) => DaemonResponse::error(ErrorKind::Internal, e.to_string()),
            },
            DaemonRequest::Shutdown => DaemonResponse::Ok,
            DaemonRequest::Subscribe | DaemonRequest::Unsubscribe => {
                DaemonResponse::error(ErrorKind::Internal, "Handled separately")
            }
        }
    }

    fn samples_response<F>(&self, query: F) -> DaemonResponse
    where
        F: FnOnce(&HistoryStore) -> crate::data::history_store::Result<Vec<PowerSample>>,
    {
        match lock_store(&self.store).and_then(|store| query(&store)) {
            Ok(samples) => DaemonResponse::Samples(samples),
            Err(e) => DaemonResponse::error(ErrorKind::Internal, e.to_string()),
        }
    }
}

fn session_error_response(error: SessionError) -> DaemonResponse {
    let kind = match &error {
        SessionError::Conflict(_) => ErrorKind::Conflict,
        SessionError::NotFound(_) => ErrorKind::NotFound,
        SessionError::Store(_) | SessionError::Poisoned => ErrorKind::Internal,
    };
    DaemonResponse::error(kind, error.to_string())
}

#[cfg(all(target_os = "linux", feature = "linux"))]
fn open_hardware_sensors() -> color_eyre::Result<wattwise_platform::linux::LinuxSensors> {
    wattwise_platform::linux::LinuxSensors::new()
}

#[cfg(not(all(target_os = "linux", feature = "linux")))]
fn open_hardware_sensors() -> color_eyre::Result<FixtureSensors> {
    Err(color_eyre::eyre::eyre!(
        "No hardware sensor backend for this platform, start with --simulate"
    ))
}

fn spawn_scheduler<G: SensorGateway + 'static>(
    sensors: G,
    state: &DaemonState,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let power = &state.config.power;
    let scheduler = PollingScheduler::new(
        sensors,
        PowerEstimator::new(power.power_model.clone()),
        state.sessions.clone(),
        state.store.clone(),
        state.hub.clone(),
        power.sample_interval(),
    );
    tokio::task::spawn_local(scheduler.run(shutdown))
}

async fn client_reader_task(
    mut reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    msg_tx: mpsc::Sender<(ClientId, ClientMessage)>,
    client_id: ClientId,
) {
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                let _ = msg_tx.send((client_id, ClientMessage::Disconnect)).await;
                break;
            }
            Ok(_) => match DaemonRequest::from_json(line.trim()) {
                Ok(request) => {
                    if msg_tx
                        .send((client_id, ClientMessage::Request { request }))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(e) => {
                    warn!(client_id, error = %e, "Invalid request from client");
                }
            },
            Err(e) => {
                debug!(client_id, error = %e, "Client read error");
                let _ = msg_tx.send((client_id, ClientMessage::Disconnect)).await;
                break;
            }
        }
    }
}

async fn client_writer_task(
    mut writer: tokio::net::unix::OwnedWriteHalf,
    mut response_rx: mpsc::Receiver<DaemonResponse>,
) {
    while let Some(response) = response_rx.recv().await {
        let json = match response.to_json() {
            Ok(j) => j,
            Err(_) => continue,
        };
        if writer
            .write_all(format!("{}\n", json).as_bytes())
            .await
            .is_err()
        {
            break;
        }
    }
}

pub fn run_daemon(
    foreground: bool,
    simulate: bool,
    log_level: LogLevel,
    log_level_override: Option<LogLevel>,
) -> Result<()> {
    let socket = socket_path();

    if socket.exists() {
        if crate::daemon::is_daemon_running() {
            return Err(DaemonError::AlreadyRunning);
        }
        fs::remove_file(&socket)?;
    }

    fs::create_dir_all(runtime_dir())?;

    if !foreground {
        match daemonize::Daemonize::new()
            .working_directory(runtime_dir())
            .start()
        {
            Ok(_) => {}
            Err(e) => return Err(DaemonError::Daemonize(e.to_string())),
        }
        let _guard =
            crate::logging::init(log_level, crate::logging::LogMode::File, log_level_override);
        std::mem::forget(_guard);
    }

    info!(version = env!("CARGO_PKG_VERSION"), simulate, "Daemon starting");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, run_daemon_async(socket, simulate))
}

async fn run_daemon_async(socket: std::path::PathBuf, simulate: bool) -> Result<()> {
    let config = UserConfig::load();
    let interval = config.power.sample_interval();

    let store = HistoryStore::open(interval)?;
    info!(path = ?store.path(), "History database opened");
    let store = shared(store);
    let state = DaemonState {
        sessions: Arc::new(SessionManager::new(
            store.clone(),
            config.power.electricity_rate,
        )),
        hub: Arc::new(BroadcastHub::new(MAX_SUBSCRIBERS)),
        store,
        config,
        start_time: Instant::now(),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = if simulate {
        spawn_scheduler(FixtureSensors::desktop(), &state, shutdown_rx)
    } else {
        match open_hardware_sensors() {
            Ok(sensors) => spawn_scheduler(sensors, &state, shutdown_rx),
            Err(e) => {
                error!(error = %e, "Failed to open hardware sensors");
                state.close_open_session();
                return Err(DaemonError::FatalInit(format!("{e:#}")));
            }
        }
    };

    let listener = UnixListener::bind(&socket)?;
    info!(socket = ?socket, "Listening for connections");

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let mut prune_tick = tokio::time::interval(Duration::from_secs(86400));
    prune_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let (msg_tx, mut msg_rx) = mpsc::channel::<(ClientId, ClientMessage)>(256);
    let mut clients: HashMap<ClientId, ClientHandle> = HashMap::new();
    let mut next_client_id: ClientId = 1;
    let mut shutdown_requested = false;

    loop {
        tokio::select! {
            _ = prune_tick.tick() => {
                state.run_prune();
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
                break;
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down");
                break;
            }
            result = listener.accept() => {
                match result {
                    Ok((stream, _)) => {
                        let client_id = next_client_id;
                        next_client_id += 1;
                        debug!(client_id, "Client connected");

                        let (reader, writer) = stream.into_split();
                        let (response_tx, response_rx) = mpsc::channel::<DaemonResponse>(64);

                        clients.insert(client_id, ClientHandle { response_tx });

                        let msg_tx_clone = msg_tx.clone();
                        tokio::task::spawn_local(client_reader_task(
                            BufReader::new(reader),
                            msg_tx_clone,
                            client_id,
                        ));
                        tokio::task::spawn_local(client_writer_task(writer, response_rx));
                    }
                    Err(e) => {
                        error!(error = %e, "Socket accept error");
                    }
                }
            }
            Some((client_id, msg)) = msg_rx.recv() => {
                match msg {
                    ClientMessage::Disconnect => {
                        state.hub.unsubscribe(client_id);
                        if clients.remove(&client_id).is_some() {
                            debug!(client_id, count = clients.len(), "Client disconnected");
                        }
                    }
                    ClientMessage::Request { request } => {
                        debug!(client_id, request = ?request, "Handling request");

                        let response = match &request {
                            DaemonRequest::Subscribe => match clients.get(&client_id) {
                                Some(client) => {
                                    let tx = client.response_tx.clone();
                                    match state.hub.subscribe(client_id, tx) {
                                        Ok(()) => DaemonResponse::Subscribed,
                                        Err(e) => DaemonResponse::SubscriptionRejected {
                                            reason: e.to_string(),
                                        },
                                    }
                                }
                                None => {
                                    DaemonResponse::error(ErrorKind::Internal, "Client not found")
                                }
                            },
                            DaemonRequest::Unsubscribe => {
                                state.hub.unsubscribe(client_id);
                                DaemonResponse::Unsubscribed
                            }
                            DaemonRequest::Shutdown => {
                                info!("Shutdown requested by client");
                                shutdown_requested = true;
                                DaemonResponse::Ok
                            }
                            _ => state.handle_request(&request),
                        };

                        if let Some(client) = clients.get(&client_id) {
                            let _ = client.response_tx.send(response).await;
                        }

                        if shutdown_requested {
                            break;
                        }
                    }
                }
            }
        }
    }

    info!("Daemon shutting down");
    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler.await {
        error!(error = %e, "Scheduler task failed");
    }
    fs::remove_file(&socket).ok();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> DaemonState {
        let store = shared(HistoryStore::open_in_memory().unwrap());
        let mut config = UserConfig::default();
        config.history.retention_days = 1;
        DaemonState {
            sessions: Arc::new(SessionManager::new(store.clone(), config.power.electricity_rate)),
            hub: Arc::new(BroadcastHub::new(MAX_SUBSCRIBERS)),
            store,
            config,
            start_time: Instant::now(),
        }
    }

    fn insert_sample(state: &DaemonState, session_id: &str, timestamp: i64, kwh: f64) {
        lock_store(&state.store)
            .unwrap()
            .insert_sample(&PowerSample {
                timestamp,
                power_watts: 120.0,
                accumulated_kwh: kwh,
                session_id: session_id.to_string(),
                cpu_util_pct: 5.0,
                gpu_util_pct: 0.0,
                mem_util_pct: 20.0,
            })
            .unwrap();
    }

    #[test]
    fn test_session_requests_map_errors() {
        let state = state();
        let started = match state.handle_request(&DaemonRequest::StartSession) {
            DaemonResponse::Session(s) => s,
            other => panic!("unexpected {other:?}"),
        };

        assert!(matches!(
            state.handle_request(&DaemonRequest::StartSession),
            DaemonResponse::Error { kind: ErrorKind::Conflict, .. }
        ));
        assert!(matches!(
            state.handle_request(&DaemonRequest::EndSession { id: "nope".into() }),
            DaemonResponse::Error { kind: ErrorKind::NotFound, .. }
        ));
        assert_eq!(
            state.handle_request(&DaemonRequest::GetCurrentSession),
            DaemonResponse::Session(started.clone())
        );

        state.handle_request(&DaemonRequest::EndSession { id: started.id });
        assert_eq!(
            state.handle_request(&DaemonRequest::GetCurrentSession),
            DaemonResponse::NoSession
        );
    }

    #[test]
    fn test_totals_come_from_latest_sample() {
        let state = state();
        let session = state.sessions.start_new().unwrap();
        insert_sample(&state, &session.id, now_ms(), 1.2);

        match state.handle_request(&DaemonRequest::GetTotals) {
            DaemonResponse::Totals(totals) => {
                assert_eq!(totals.total_kwh, 1.2);
                assert_eq!(totals.total_cost, 1734.0);
                assert_eq!(totals.electricity_rate, 1445.0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_current_data_unavailable_before_first_publish() {
        let state = state();
        assert!(matches!(
            state.handle_request(&DaemonRequest::GetCurrentData),
            DaemonResponse::Error { kind: ErrorKind::Unavailable, .. }
        ));
    }

    #[test]
    fn test_prune_respects_retention() {
        let state = state();
        let old = state.sessions.start_new().unwrap();
        insert_sample(&state, &old.id, now_ms() - 3 * MS_PER_DAY, 0.1);
        state.sessions.end(&old.id).unwrap();

        let live = state.sessions.start_new().unwrap();
        insert_sample(&state, &live.id, now_ms() - 2 * MS_PER_DAY, 0.2);
        insert_sample(&state, &live.id, now_ms(), 0.3);

        state.run_prune();

        let stats = lock_store(&state.store).unwrap().get_stats().unwrap();
        assert_eq!(stats.sample_count, 2);
    }

    #[test]
    fn test_status_reports_open_session() {
        let state = state();
        let session = state.sessions.start_new().unwrap();
        match state.handle_request(&DaemonRequest::GetStatus) {
            DaemonResponse::Status(status) => {
                assert!(status.running);
                assert_eq!(status.session_count, 1);
                assert_eq!(status.current_session_id, Some(session.id));
                assert_eq!(status.sample_interval_secs, 5);
                assert_eq!(status.protocol_version, wattwise_protocol::PROTOCOL_VERSION);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_close_open_session_on_fatal_init() {
        let state = state();
        state.sessions.start_new().unwrap();
        state.close_open_session();
        assert!(state.sessions.current().unwrap().is_none());
    }
}
