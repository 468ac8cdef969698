//! Linux sensor gateway.
//!
//! CPU load, clocks and memory come from sysinfo. Package power comes from
//! RAPL energy counters, temperatures, fans and voltages from hwmon, GPU
//! metrics from the DRM sysfs tree and the board name from DMI.

mod sysfs;

use std::collections::HashSet;

use color_eyre::eyre::{eyre, Result};
use sysinfo::{DiskKind, Disks, System};
use tracing::{debug, trace};

use crate::gateway::{
    HardwareKind, HardwareRef, SensorGateway, SensorKind, SensorReading, SensorTable,
};
use sysfs::{HwmonChip, RaplDomain};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

const CPU_ID: &str = "/cpu/0";
const RAM_ID: &str = "/ram";
const MAINBOARD_ID: &str = "/mainboard";

pub struct LinuxSensors {
    system: System,
    rapl_domains: Vec<RaplDomain>,
    mainboard_name: Option<String>,
    table: SensorTable,
}

impl LinuxSensors {
    /// Opens the sensor sources and primes the counters that need two reads.
    pub fn new() -> Result<Self> {
        let mut system = System::new();
        system.refresh_cpu_all();
        system.refresh_memory();

        if system.cpus().is_empty() {
            return Err(eyre!("No CPUs reported by the system"));
        }

        let rapl_domains = sysfs::discover_rapl_domains();
        let mainboard_name = sysfs::read_mainboard_name();
        debug!(
            rapl_domains = rapl_domains.len(),
            mainboard = ?mainboard_name,
            "Linux sensors opened"
        );

        // CPU usage is a delta between two refreshes.
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);

        let mut sensors = Self {
            system,
            rapl_domains,
            mainboard_name,
            table: SensorTable::new(),
        };
        sensors.refresh()?;
        Ok(sensors)
    }

    fn read_cpu(&mut self, chips: &[HwmonChip]) {
        let cpus = self.system.cpus();
        let brand = cpus
            .first()
            .map(|c| c.brand().trim().to_string())
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| "Unknown CPU".to_string());

        self.table.add_hardware(CPU_ID, brand, HardwareKind::Cpu);
        self.table.set_sensor(
            CPU_ID,
            SensorKind::Load,
            "CPU Total",
            Some(self.system.global_cpu_usage() as f64),
        );

        let mut core_readings = Vec::with_capacity(cpus.len());
        for (index, cpu) in cpus.iter().enumerate() {
            core_readings.push((index + 1, cpu.cpu_usage() as f64, cpu.frequency() as f64));
        }
        for (core, usage, frequency) in core_readings {
            self.table
                .set_sensor(CPU_ID, SensorKind::Load, format!("CPU Core #{core}"), Some(usage));
            self.table
                .set_sensor(CPU_ID, SensorKind::Clock, format!("Core #{core}"), Some(frequency));
        }

        let package_watts: Vec<f64> = self
            .rapl_domains
            .iter_mut()
            .filter_map(|d| d.sample_watts())
            .collect();
        let package_power = if package_watts.is_empty() {
            None
        } else {
            Some(package_watts.iter().sum())
        };
        self.table
            .set_sensor(CPU_ID, SensorKind::Power, "CPU Package", package_power);

        for chip in chips.iter().filter(|c| c.is_cpu()) {
            for channel in chip.temperatures() {
                let name = cpu_temperature_name(&channel.label);
                self.table
                    .set_sensor(CPU_ID, SensorKind::Temperature, name, Some(channel.value));
            }
            for channel in chip.voltages() {
                self.table.set_sensor(
                    CPU_ID,
                    SensorKind::Voltage,
                    format!("Core {}", channel.label),
                    Some(channel.value),
                );
            }
        }
    }

    fn read_memory(&mut self) {
        let total = self.system.total_memory() as f64;
        if total <= 0.0 {
            return;
        }
        let used = self.system.used_memory() as f64;
        let available = self.system.available_memory() as f64;

        self.table
            .add_hardware(RAM_ID, "Generic Memory", HardwareKind::Memory);
        self.table
            .set_sensor(RAM_ID, SensorKind::Load, "Memory", Some(used / total * 100.0));
        self.table.set_sensor(
            RAM_ID,
            SensorKind::Data,
            "Used Memory",
            Some(used / BYTES_PER_GB),
        );
        self.table.set_sensor(
            RAM_ID,
            SensorKind::Data,
            "Available Memory",
            Some(available / BYTES_PER_GB),
        );
    }

    fn read_gpus(&mut self, chips: &[HwmonChip]) {
        for gpu in sysfs::discover_gpus(chips) {
            let id = format!("/gpu/{}", gpu.card);
            self.table.add_hardware(&id, gpu.model(), HardwareKind::Gpu);
            self.table
                .set_sensor(&id, SensorKind::Load, "GPU Core", gpu.busy_percent());

            if let Some(used) = gpu.vram_used_mb() {
                self.table
                    .set_sensor(&id, SensorKind::SmallData, "GPU Memory Used", Some(used));
            }
            if let Some(total) = gpu.vram_total_mb() {
                self.table
                    .set_sensor(&id, SensorKind::SmallData, "GPU Memory Total", Some(total));
            }

            let Some(chip) = &gpu.hwmon else {
                trace!(card = %gpu.card, driver = %gpu.driver, "GPU has no hwmon chip");
                continue;
            };

            self.table
                .set_sensor(&id, SensorKind::Power, "GPU Package", chip.power_watts());
            for (index, channel) in chip.temperatures().into_iter().enumerate() {
                let name = gpu_sensor_name(index, &channel.label);
                self.table
                    .set_sensor(&id, SensorKind::Temperature, name, Some(channel.value));
            }
            for (index, channel) in chip.clocks().into_iter().enumerate() {
                let name = gpu_sensor_name(index, &channel.label);
                self.table
                    .set_sensor(&id, SensorKind::Clock, name, Some(channel.value));
            }
            for channel in chip.fans() {
                self.table.set_sensor(
                    &id,
                    SensorKind::Fan,
                    format!("GPU {}", channel.label),
                    Some(channel.value),
                );
            }
        }
    }

    fn read_mainboard(&mut self, chips: &[HwmonChip]) {
        let board_chips: Vec<&HwmonChip> = chips
            .iter()
            .filter(|c| !c.is_cpu() && !c.is_gpu() && !c.is_storage())
            .collect();

        let name = match (&self.mainboard_name, board_chips.is_empty()) {
            (Some(name), _) => name.clone(),
            (None, false) => "Unknown Motherboard".to_string(),
            (None, true) => return,
        };
        self.table
            .add_hardware(MAINBOARD_ID, name, HardwareKind::Mainboard);

        for chip in board_chips {
            for channel in chip.temperatures() {
                self.table.set_sensor(
                    MAINBOARD_ID,
                    SensorKind::Temperature,
                    board_sensor_name("Temperature", &channel.label, &chip.name),
                    Some(channel.value),
                );
            }
            for channel in chip.fans() {
                self.table.set_sensor(
                    MAINBOARD_ID,
                    SensorKind::Fan,
                    board_sensor_name("Fan", &channel.label, &chip.name),
                    Some(channel.value),
                );
            }
            for channel in chip.voltages() {
                self.table.set_sensor(
                    MAINBOARD_ID,
                    SensorKind::Voltage,
                    board_sensor_name("Voltage", &channel.label, &chip.name),
                    Some(channel.value),
                );
            }
        }
    }

    fn read_storage(&mut self, chips: &[HwmonChip]) {
        let disks = Disks::new_with_refreshed_list();
        let mut seen = HashSet::new();

        for disk in disks.list() {
            let device = disk.name().to_string_lossy().to_string();
            if !device.starts_with("/dev/") || disk.total_space() == 0 {
                continue;
            }
            if !seen.insert(device.clone()) {
                continue;
            }

            let id = format!("/storage/{}", seen.len() - 1);
            self.table.add_hardware(
                &id,
                format!("{} ({})", device, disk_kind_label(disk.kind())),
                HardwareKind::Storage,
            );

            let total = disk.total_space() as f64;
            let used = total - disk.available_space() as f64;
            self.table
                .set_sensor(&id, SensorKind::Load, "Used Space", Some(used / total * 100.0));

            let temperature = chips
                .iter()
                .filter(|c| c.is_storage())
                .find(|c| c.device.as_deref().is_some_and(|d| device.contains(d)))
                .and_then(|c| c.temperatures().into_iter().next());
            if let Some(channel) = temperature {
                self.table
                    .set_sensor(&id, SensorKind::Temperature, "Temperature", Some(channel.value));
            }
        }
    }
}

fn disk_kind_label(kind: DiskKind) -> &'static str {
    match kind {
        DiskKind::SSD => "SSD",
        DiskKind::HDD => "HDD",
        _ => "Disk",
    }
}

/// Maps k10temp/coretemp labels onto the package/core naming used by lookups.
fn cpu_temperature_name(label: &str) -> String {
    match label {
        "Tctl" | "Tdie" | "Package id 0" => "CPU Package".to_string(),
        other => format!("CPU {other}"),
    }
}

fn board_sensor_name(prefix: &str, label: &str, chip: &str) -> String {
    if label.starts_with(prefix) {
        format!("{label} ({chip})")
    } else {
        format!("{prefix} {label} ({chip})")
    }
}

/// The first channel of a GPU chip is its core reading.
fn gpu_sensor_name(index: usize, label: &str) -> String {
    if index == 0 || label == "edge" || label == "sclk" {
        "GPU Core".to_string()
    } else {
        format!("GPU {label}")
    }
}

impl SensorGateway for LinuxSensors {
    fn refresh(&mut self) -> Result<()> {
        self.system.refresh_cpu_all();
        self.system.refresh_memory();
        if self.system.cpus().is_empty() {
            return Err(eyre!("CPU statistics unavailable"));
        }

        let chips = sysfs::discover_hwmon_chips();
        self.table.clear();
        self.read_cpu(&chips);
        self.read_gpus(&chips);
        self.read_memory();
        self.read_mainboard(&chips);
        self.read_storage(&chips);

        trace!(
            hardware = self.table.hardware_count(),
            hwmon_chips = chips.len(),
            "Sensors refreshed"
        );
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
