use serde::{Deserialize, Serialize};

use crate::version::{MIN_SUPPORTED_VERSION, PROTOCOL_VERSION};

pub const MAX_SUBSCRIBERS: usize = 10;

/// Physical unit a [`ComponentReading`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Processor,
    Graphics,
    Memory,
    Motherboard,
    Storage,
    Psu,
}

impl ComponentKind {
    pub fn label(&self) -> &'static str {
        match self {
            ComponentKind::Processor => "processor",
            ComponentKind::Graphics => "graphics",
            ComponentKind::Memory => "memory",
            ComponentKind::Motherboard => "motherboard",
            ComponentKind::Storage => "storage",
            ComponentKind::Psu => "psu",
        }
    }
}

/// Per-unit power and utilization figures produced by one poll tick.
///
/// A fresh set replaces the previous one wholesale every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentReading {
    pub id: String,
    pub name: String,
    pub kind: ComponentKind,
    pub model: String,
    pub tdp_watts: Option<f64>,
    pub utilization_pct: Option<f64>,
    pub temperature_c: Option<f64>,
    pub power_watts: f64,
    #[serde(default)]
    pub clock_mhz: Option<f64>,
    #[serde(default)]
    pub mem_used_mb: Option<f64>,
    #[serde(default)]
    pub mem_total_mb: Option<f64>,
    #[serde(default)]
    pub fan_rpm: Option<f64>,
    #[serde(default)]
    pub voltage: Option<f64>,
}

impl ComponentReading {
    /// Reading with only the identity and power filled in.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: ComponentKind,
        model: impl Into<String>,
        power_watts: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            model: model.into(),
            tdp_watts: None,
            utilization_pct: None,
            temperature_c: None,
            power_watts,
            clock_mhz: None,
            mem_used_mb: None,
            mem_total_mb: None,
            fan_rpm: None,
            voltage: None,
        }
    }
}

/// One persisted point of the power time series.
///
/// `timestamp` is Unix epoch milliseconds. `accumulated_kwh` is the running
/// process-lifetime total at the moment the sample was taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerSample {
    pub timestamp: i64,
    pub power_watts: f64,
    pub accumulated_kwh: f64,
    pub session_id: String,
    pub cpu_util_pct: f64,
    pub gpu_util_pct: f64,
    pub mem_util_pct: f64,
}

/// A bounded monitoring period. Open while `end_time` is unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub total_kwh: f64,
    pub total_cost: f64,
}

impl Session {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    /// Elapsed milliseconds, measured up to `now_ms` while the session is open.
    pub fn duration_ms(&self, now_ms: i64) -> i64 {
        let end = self.end_time.unwrap_or(now_ms);
        (end - self.start_time).max(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSnapshot {
    pub timestamp: i64,
    pub sample: PowerSample,
    pub components: Vec<ComponentReading>,
    pub session: Option<Session>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct EnergyTotals {
    pub total_kwh: f64,
    pub total_cost: f64,
    pub electricity_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Conflict,
    NotFound,
    Unavailable,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub running: bool,
    pub uptime_secs: u64,
    pub sample_count: i64,
    pub session_count: i64,
    pub last_sample_time: Option<i64>,
    pub current_session_id: Option<String>,
    pub database_size_bytes: u64,
    pub version: String,
    pub subscriber_count: usize,
    pub sample_interval_secs: u64,
    pub protocol_version: u32,
    pub min_supported_version: u32,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            running: false,
            uptime_secs: 0,
            sample_count: 0,
            session_count: 0,
            last_sample_time: None,
            current_session_id: None,
            database_size_bytes: 0,
            version: String::new(),
            subscriber_count: 0,
            sample_interval_secs: 0,
            protocol_version: PROTOCOL_VERSION,
            min_supported_version: MIN_SUPPORTED_VERSION,
        }
    }
}
