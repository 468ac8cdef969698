use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{warn, Level};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "off" => Some(LogLevel::Off),
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    pub fn as_tracing_level(&self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

/// Fixed coefficients of the power model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerModel {
    pub base_power_watts: f64,
    pub cpu_tdp_watts: f64,
    pub gpu_tdp_watts: f64,
}

impl Default for PowerModel {
    fn default() -> Self {
        Self {
            base_power_watts: 45.0,
            cpu_tdp_watts: 125.0,
            gpu_tdp_watts: 150.0,
        }
    }
}

/// Process-wide power settings. Read-only once the daemon has started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerConfig {
    /// Price of one kWh, in the user's currency.
    pub electricity_rate: f64,
    pub sample_interval_secs: u64,
    pub power_model: PowerModel,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            electricity_rate: 1445.0,
            sample_interval_secs: 5,
            power_model: PowerModel::default(),
        }
    }
}

impl PowerConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Days of samples to keep. 0 keeps everything.
    pub retention_days: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { retention_days: 90 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub log_level: LogLevel,
    pub power: PowerConfig,
    pub history: HistoryConfig,
}

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("wattwise")
}

pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("wattwise")
}

pub fn runtime_dir() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::cache_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("wattwise")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

pub fn ensure_dirs() -> std::io::Result<()> {
    fs::create_dir_all(config_dir())?;
    fs::create_dir_all(data_dir())?;
    Ok(())
}

impl UserConfig {
    pub fn load() -> Self {
        let path = config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => Self::from_toml(&content),
            Err(e) => {
                warn!(path = ?path, error = %e, "Failed to read config, using defaults");
                Self::default()
            }
        }
    }

    /// Parses and validates a config file body. Unparseable input yields defaults.
    pub fn from_toml(content: &str) -> Self {
        match toml::from_str::<UserConfig>(content) {
            Ok(config) => config.validated(),
            Err(e) => {
                warn!(error = %e, "Invalid config, using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self) -> std::io::Result<()> {
        let _ = ensure_dirs();
        let path = config_path();
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        fs::write(path, content)
    }

    pub fn validated(mut self) -> Self {
        let power = &mut self.power;
        power.sample_interval_secs = power.sample_interval_secs.max(1);
        if !power.electricity_rate.is_finite() || power.electricity_rate < 0.0 {
            power.electricity_rate = PowerConfig::default().electricity_rate;
        }

        let defaults = PowerModel::default();
        let model = &mut power.power_model;
        for (value, default) in [
            (&mut model.base_power_watts, defaults.base_power_watts),
            (&mut model.cpu_tdp_watts, defaults.cpu_tdp_watts),
            (&mut model.gpu_tdp_watts, defaults.gpu_tdp_watts),
        ] {
            if !value.is_finite() || *value < 0.0 {
                *value = default;
            }
        }
        self
    }
}
