//! Sensor gateway trait and shared types.

use std::collections::HashMap;
use std::fmt;

use color_eyre::eyre::Result;

/// Category of a piece of monitored hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HardwareKind {
    /// Processor package
    Cpu,
    /// Discrete or integrated graphics adapter
    Gpu,
    /// System memory
    Memory,
    /// Motherboard / embedded controller
    Mainboard,
    /// Disk or SSD
    Storage,
}

impl HardwareKind {
    pub const ALL: [HardwareKind; 5] = [
        HardwareKind::Cpu,
        HardwareKind::Gpu,
        HardwareKind::Memory,
        HardwareKind::Mainboard,
        HardwareKind::Storage,
    ];

    /// Returns a human-readable label for the hardware kind.
    pub fn label(&self) -> &'static str {
        match self {
            HardwareKind::Cpu => "CPU",
            HardwareKind::Gpu => "GPU",
            HardwareKind::Memory => "Memory",
            HardwareKind::Mainboard => "Mainboard",
            HardwareKind::Storage => "Storage",
        }
    }
}

impl fmt::Display for HardwareKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Physical quantity a sensor reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    /// Utilization in percent
    Load,
    /// Power draw in watts
    Power,
    /// Temperature in degrees Celsius
    Temperature,
    /// Clock frequency in MHz
    Clock,
    /// Data size in gigabytes
    Data,
    /// Data size in megabytes
    SmallData,
    /// Fan speed in RPM
    Fan,
    /// Voltage in volts
    Voltage,
}

/// Handle to one enumerated piece of hardware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareRef {
    /// Stable identifier, unique within a gateway.
    pub id: String,
    pub name: String,
    pub kind: HardwareKind,
}

/// A named sensor and its latest value, if it reported one.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub name: String,
    pub kind: SensorKind,
    pub value: Option<f64>,
}

/// Case-insensitive substring match. An empty pattern matches every name.
pub fn matches_pattern(name: &str, pattern: &str) -> bool {
    pattern.is_empty() || name.to_lowercase().contains(&pattern.to_lowercase())
}

fn average(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Trait for platform-specific sensor sources.
///
/// Every lookup returns an empty list or `None` when the hardware or sensor
/// is absent. Only [`refresh`](SensorGateway::refresh) can fail.
pub trait SensorGateway {
    /// Re-read every sensor from the system.
    fn refresh(&mut self) -> Result<()>;

    /// All hardware of the given kind, in enumeration order.
    fn list_hardware(&self, kind: HardwareKind) -> Vec<HardwareRef>;

    /// All sensors of `kind` on the hardware whose name matches `pattern`.
    /// `None` returns every sensor of the kind.
    fn sensor_readings(
        &self,
        hardware_id: &str,
        kind: SensorKind,
        pattern: Option<&str>,
    ) -> Vec<SensorReading>;

    fn mainboard(&self) -> Option<HardwareRef> {
        self.list_hardware(HardwareKind::Mainboard).into_iter().next()
    }

    /// Average value of every matching sensor that reported a value.
    fn sensor_value(&self, hardware_id: &str, kind: SensorKind, pattern: &str) -> Option<f64> {
        average(
            self.sensor_readings(hardware_id, kind, Some(pattern))
                .into_iter()
                .filter_map(|r| r.value),
        )
    }

    /// First value found for a sensor anywhere in the system, mainboard first.
    fn find_sensor_value(&self, kind: SensorKind, pattern: &str) -> Option<f64> {
        let mainboard = self.mainboard();
        let others = HardwareKind::ALL
            .iter()
            .filter(|k| **k != HardwareKind::Mainboard)
            .flat_map(|k| self.list_hardware(*k));

        mainboard
            .into_iter()
            .chain(others)
            .find_map(|hw| self.sensor_value(&hw.id, kind, pattern))
    }
}

/// In-memory hardware list and per-hardware sensor readings.
///
/// Gateways rebuild this on every refresh and answer lookups from it.
#[derive(Debug, Clone, Default)]
pub struct SensorTable {
    hardware: Vec<HardwareRef>,
    sensors: HashMap<String, Vec<SensorReading>>,
}

impl SensorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.hardware.clear();
        self.sensors.clear();
    }

    /// Registers hardware, replacing any entry with the same id.
    pub fn add_hardware(
        &mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        kind: HardwareKind,
    ) {
        let id = id.into();
        let hw = HardwareRef {
            id: id.clone(),
            name: name.into(),
            kind,
        };
        match self.hardware.iter_mut().find(|h| h.id == id) {
            Some(existing) => *existing = hw,
            None => self.hardware.push(hw),
        }
    }

    /// Sets a sensor value, creating the sensor if needed. Non-finite values
    /// are stored as absent.
    pub fn set_sensor(
        &mut self,
        hardware_id: &str,
        kind: SensorKind,
        name: impl Into<String>,
        value: Option<f64>,
    ) {
        let name = name.into();
        let value = value.filter(|v| v.is_finite());
        let readings = self.sensors.entry(hardware_id.to_string()).or_default();
        match readings
            .iter_mut()
            .find(|r| r.kind == kind && r.name == name)
        {
            Some(existing) => existing.value = value,
            None => readings.push(SensorReading { name, kind, value }),
        }
    }

    pub fn list(&self, kind: HardwareKind) -> Vec<HardwareRef> {
        self.hardware
            .iter()
            .filter(|h| h.kind == kind)
            .cloned()
            .collect()
    }

    pub fn readings(
        &self,
        hardware_id: &str,
        kind: SensorKind,
        pattern: Option<&str>,
    ) -> Vec<SensorReading> {
        let Some(readings) = self.sensors.get(hardware_id) else {
            return Vec::new();
        };
        readings
            .iter()
            .filter(|r| r.kind == kind)
            .filter(|r| pattern.is_none_or(|p| matches_pattern(&r.name, p)))
            .cloned()
            .collect()
    }

    pub fn hardware_count(&self) -> usize {
        self.hardware.len()
    }
}
