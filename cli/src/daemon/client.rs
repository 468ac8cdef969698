use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use crate::daemon::socket_path;
use crate::daemon::{
    DaemonRequest, DaemonResponse, DaemonStatus, DataSnapshot, EnergyTotals, ErrorKind,
    PowerSample, Session, MIN_SUPPORTED_VERSION, PROTOCOL_VERSION,
};

#[derive(Debug, Clone)]
pub struct VersionMismatchError {
    pub client_protocol_version: u32,
    pub client_min_supported: u32,
    pub daemon_protocol_version: u32,
    pub daemon_min_supported: u32,
    pub daemon_binary_version: String,
    pub kind: VersionMismatchKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionMismatchKind {
    ClientTooOld,
    DaemonTooOld,
}

impl std::fmt::Display for VersionMismatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            VersionMismatchKind::ClientTooOld => {
                write!(
                    f,
                    "Protocol version mismatch: client uses protocol v{}, \
                    but daemon (v{}) requires v{}+.\n\n\
                    Please update wattwise:\n  \
                    cargo install wattwise",
                    self.client_protocol_version,
                    self.daemon_binary_version,
                    self.daemon_min_supported
                )
            }
            VersionMismatchKind::DaemonTooOld => {
                write!(
                    f,
                    "Protocol version mismatch: daemon (v{}) uses protocol v{}, \
                    but this client requires v{}+.\n\n\
                    Please restart the daemon:\n  \
                    wattwise daemon restart",
                    self.daemon_binary_version,
                    self.daemon_protocol_version,
                    self.client_min_supported
                )
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Connection failed: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Daemon error: {message}")]
    Daemon { kind: ErrorKind, message: String },

    #[error("Subscription rejected: {0}")]
    SubscriptionRejected(String),

    #[error("{0}")]
    VersionMismatch(VersionMismatchError),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Checks if the client and daemon protocol versions are compatible.
pub fn check_version_compatibility(status: &DaemonStatus) -> Result<()> {
    let mismatch = |kind| {
        Err(ClientError::VersionMismatch(VersionMismatchError {
            client_protocol_version: PROTOCOL_VERSION,
            client_min_supported: MIN_SUPPORTED_VERSION,
            daemon_protocol_version: status.protocol_version,
            daemon_min_supported: status.min_supported_version,
            daemon_binary_version: status.version.clone(),
            kind,
        }))
    };

    // Can the daemon understand our requests?
    if PROTOCOL_VERSION < status.min_supported_version {
        return mismatch(VersionMismatchKind::ClientTooOld);
    }

    // Can we understand the daemon's responses?
    if status.protocol_version < MIN_SUPPORTED_VERSION {
        return mismatch(VersionMismatchKind::DaemonTooOld);
    }

    Ok(())
}

fn unexpected(response: DaemonResponse) -> ClientError {
    match response {
        DaemonResponse::Error { kind, message } => ClientError::Daemon { kind, message },
        other => ClientError::Protocol(format!("Unexpected response: {other:?}")),
    }
}

pub struct DaemonClient {
    stream: UnixStream,
    read_buffer: Vec<u8>,
}

impl DaemonClient {
    pub fn connect() -> Result<Self> {
        let path = socket_path();
        let stream = UnixStream::connect(&path)?;
        stream.set_read_timeout(Some(Duration::from_secs(5)))?;
        stream.set_write_timeout(Some(Duration::from_secs(5)))?;
        Ok(Self {
            stream,
            read_buffer: Vec::with_capacity(64 * 1024),
        })
    }

    /// Connects to the daemon and validates protocol version compatibility.
    pub fn connect_with_version_check() -> Result<Self> {
        let mut client = Self::connect()?;
        let status = client.get_status()?;
        check_version_compatibility(&status)?;
        Ok(client)
    }

    fn read_line_blocking(&mut self) -> Result<String> {
        let mut temp_buf = [0u8; 8192];
        loop {
            if let Some(pos) = self.read_buffer.iter().position(|&b| b == b'\n') {
                let line_bytes: Vec<u8> = self.read_buffer.drain(..=pos).collect();
                return Ok(String::from_utf8_lossy(&line_bytes).to_string());
            }
            let n = self.stream.read(&mut temp_buf)?;
            if n == 0 {
                return Err(ClientError::Protocol("Connection closed".into()));
            }
            self.read_buffer.extend_from_slice(&temp_buf[..n]);
        }
    }

    fn read_response(&mut self) -> Result<DaemonResponse> {
        let line = self.read_line_blocking()?;
        tracing::trace!(line_len = line.len(), "Read response");
        DaemonResponse::from_json(line.trim()).map_err(|e| ClientError::Protocol(e.to_string()))
    }

    fn send_request(&mut self, request: DaemonRequest) -> Result<DaemonResponse> {
        let json = request
            .to_json()
            .map_err(|e| ClientError::Protocol(e.to_string()))?;

        writeln!(self.stream, "{}", json)?;
        self.stream.flush()?;

        self.read_response()
    }

    pub fn get_status(&mut self) -> Result<DaemonStatus> {
        match self.send_request(DaemonRequest::GetStatus)? {
            DaemonResponse::Status(status) => Ok(status),
            other => Err(unexpected(other)),
        }
    }

    pub fn get_current_data(&mut self) -> Result<DataSnapshot> {
        match self.send_request(DaemonRequest::GetCurrentData)? {
            DaemonResponse::CurrentData(snapshot) => Ok(snapshot),
            other => Err(unexpected(other)),
        }
    }

    pub fn get_power_history(&mut self, hours: u32) -> Result<Vec<PowerSample>> {
        self.samples(DaemonRequest::GetPowerHistory { hours })
    }

    pub fn get_session_samples(&mut self, session_id: &str) -> Result<Vec<PowerSample>> {
        self.samples(DaemonRequest::GetSessionSamples {
            session_id: session_id.to_string(),
        })
    }

    fn samples(&mut self, request: DaemonRequest) -> Result<Vec<PowerSample>> {
        match self.send_request(request)? {
            DaemonResponse::Samples(samples) => Ok(samples),
            other => Err(unexpected(other)),
        }
    }

    pub fn get_sessions(&mut self) -> Result<Vec<Session>> {
        match self.send_request(DaemonRequest::GetSessions)? {
            DaemonResponse::Sessions(sessions) => Ok(sessions),
            other => Err(unexpected(other)),
        }
    }

    pub fn get_session(&mut self, id: &str) -> Result<Session> {
        self.session(DaemonRequest::GetSession { id: id.to_string() })
    }

    pub fn get_current_session(&mut self) -> Result<Option<Session>> {
        match self.send_request(DaemonRequest::GetCurrentSession)? {
            DaemonResponse::Session(session) => Ok(Some(session)),
            DaemonResponse::NoSession => Ok(None),
            other => Err(unexpected(other)),
        }
    }

    pub fn start_session(&mut self) -> Result<Session> {
        self.session(DaemonRequest::StartSession)
    }

    pub fn end_session(&mut self, id: &str) -> Result<Session> {
        self.session(DaemonRequest::EndSession { id: id.to_string() })
    }

    fn session(&mut self, request: DaemonRequest) -> Result<Session> {
        match self.send_request(request)? {
            DaemonResponse::Session(session) => Ok(session),
            other => Err(unexpected(other)),
        }
    }

    pub fn get_totals(&mut self) -> Result<EnergyTotals> {
        match self.send_request(DaemonRequest::GetTotals)? {
            DaemonResponse::Totals(totals) => Ok(totals),
            other => Err(unexpected(other)),
        }
    }

    pub fn shutdown(&mut self) -> Result<()> {
        match self.send_request(DaemonRequest::Shutdown)? {
            DaemonResponse::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Registers for live updates. Afterwards, read them with [`Self::next_update`].
    pub fn subscribe(&mut self) -> Result<()> {
        match self.send_request(DaemonRequest::Subscribe)? {
            DaemonResponse::Subscribed => {
                // Updates arrive at the sampling interval, which may exceed the request timeout.
                self.stream.set_read_timeout(None)?;
                Ok(())
            }
            DaemonResponse::SubscriptionRejected { reason } => {
                Err(ClientError::SubscriptionRejected(reason))
            }
            other => Err(unexpected(other)),
        }
    }

    /// Blocks until the next pushed snapshot. Non-update messages are skipped.
    pub fn next_update(&mut self) -> Result<DataSnapshot> {
        loop {
            match self.read_response()? {
                DaemonResponse::DataUpdate(snapshot) => return Ok(snapshot),
                DaemonResponse::Error { kind, message } => {
                    return Err(ClientError::Daemon { kind, message })
                }
                other => tracing::debug!(response = ?other, "Skipping non-update message"),
            }
        }
    }
}
