//! Fixed, in-memory sensor source.
//!
//! Used by the daemon's simulate mode and by tests that need deterministic
//! readings or an injected refresh failure.

use color_eyre::eyre::{eyre, Result};

use crate::gateway::{
    HardwareKind, HardwareRef, SensorGateway, SensorKind, SensorReading, SensorTable,
};

#[derive(Debug, Clone, Default)]
pub struct FixtureSensors {
    table: SensorTable,
    failing_refreshes: u32,
    refresh_count: u64,
}

impl FixtureSensors {
    pub fn new() -> Self {
        Self::default()
    }

    /// A typical desktop: one CPU without a package power sensor, one GPU
    /// that reports its own draw, 32 GB of memory, a mainboard and an NVMe SSD.
    pub fn desktop() -> Self {
        Self::new()
            .with_hardware(HardwareKind::Cpu, "/cpu/0", "Generic 8-Core Processor")
            .with_sensor("/cpu/0", SensorKind::Load, "CPU Total", 18.0)
            .with_sensor("/cpu/0", SensorKind::Temperature, "CPU Package", 47.0)
            .with_sensor("/cpu/0", SensorKind::Clock, "Core #1", 3600.0)
            .with_sensor("/cpu/0", SensorKind::Voltage, "Core", 1.1)
            .with_hardware(HardwareKind::Gpu, "/gpu/0", "Generic Graphics Adapter")
            .with_sensor("/gpu/0", SensorKind::Load, "GPU Core", 7.0)
            .with_sensor("/gpu/0", SensorKind::Power, "GPU Package", 21.0)
            .with_sensor("/gpu/0", SensorKind::Temperature, "GPU Core", 41.0)
            .with_sensor("/gpu/0", SensorKind::Clock, "GPU Core", 800.0)
            .with_sensor("/gpu/0", SensorKind::SmallData, "GPU Memory Used", 900.0)
            .with_sensor("/gpu/0", SensorKind::SmallData, "GPU Memory Total", 8192.0)
            .with_sensor("/gpu/0", SensorKind::Fan, "GPU Fan", 0.0)
            .with_hardware(HardwareKind::Memory, "/ram", "Generic Memory")
            .with_sensor("/ram", SensorKind::Load, "Memory", 41.0)
            .with_sensor("/ram", SensorKind::Data, "Used Memory", 13.1)
            .with_sensor("/ram", SensorKind::Data, "Available Memory", 18.9)
            .with_hardware(HardwareKind::Mainboard, "/mainboard", "Generic Mainboard")
            .with_sensor("/mainboard", SensorKind::Temperature, "Temperature #1", 34.0)
            .with_sensor("/mainboard", SensorKind::Fan, "Fan #1", 820.0)
            .with_hardware(HardwareKind::Storage, "/storage/0", "NVMe SSD 1TB")
            .with_sensor("/storage/0", SensorKind::Load, "Used Space", 63.0)
            .with_sensor("/storage/0", SensorKind::Temperature, "Temperature", 39.0)
    }

    pub fn with_hardware(mut self, kind: HardwareKind, id: &str, name: &str) -> Self {
        self.table.add_hardware(id, name, kind);
        self
    }

    pub fn with_sensor(
        mut self,
        hardware_id: &str,
        kind: SensorKind,
        name: &str,
        value: f64,
    ) -> Self {
        self.table.set_sensor(hardware_id, kind, name, Some(value));
        self
    }

    /// Registers a sensor that exists but currently reports no value.
    pub fn with_empty_sensor(mut self, hardware_id: &str, kind: SensorKind, name: &str) -> Self {
        self.table.set_sensor(hardware_id, kind, name, None);
        self
    }

    /// Makes the next `count` refreshes fail.
    pub fn fail_next_refreshes(&mut self, count: u32) {
        self.failing_refreshes = count;
    }

    /// Number of successful refreshes so far.
    pub fn refresh_count(&self) -> u64 {
        self.refresh_count
    }
}

impl SensorGateway for FixtureSensors {
    fn refresh(&mut self) -> Result<()> {
        if self.failing_refreshes > 0 {
            self.failing_refreshes -= 1;
            return Err(eyre!("fixture sensor refresh failure"));
        }
        self.refresh_count += 1;
        Ok(())
    }

    fn list_hardware(&self, kind: HardwareKind) -> Vec<HardwareRef> {
        self.table.list(kind)
    }

    fn sensor_readings(
        &self,
        hardware_id: &str,
        kind: SensorKind,
        pattern: Option<&str>,
    ) -> Vec<SensorReading> {
        self.table.readings(hardware_id, kind, pattern)
    }
}
