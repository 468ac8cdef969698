use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

const RAPL_PATH: &str = "/sys/class/powercap/intel-rapl";
const HWMON_PATH: &str = "/sys/class/hwmon";
const DRM_PATH: &str = "/sys/class/drm";
const DMI_PATH: &str = "/sys/class/dmi/id";

const GPU_DRIVERS: [&str; 5] = ["amdgpu", "radeon", "i915", "xe", "nouveau"];
const CPU_CHIPS: [&str; 3] = ["k10temp", "coretemp", "zenpower"];
const STORAGE_CHIPS: [&str; 2] = ["nvme", "drivetemp"];

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn read_number<T: FromStr>(path: &Path) -> Option<T> {
    read_trimmed(path).and_then(|s| s.parse().ok())
}

/// Package energy counter exposed by the powercap framework.
#[derive(Debug)]
pub(crate) struct RaplDomain {
    path: PathBuf,
    /// Value at which `energy_uj` wraps back to zero.
    max_energy_range_uj: Option<u64>,
    last_energy_uj: u64,
    last_time: Instant,
}

impl RaplDomain {
    fn open(path: PathBuf) -> Option<Self> {
        let last_energy_uj = read_number(&path.join("energy_uj"))?;
        Some(Self {
            max_energy_range_uj: read_number(&path.join("max_energy_range_uj")),
            path,
            last_energy_uj,
            last_time: Instant::now(),
        })
    }

    /// Average watts since the previous call, `None` on the first read or
    /// when the counter is unreadable.
    pub fn sample_watts(&mut self) -> Option<f64> {
        let energy_uj: u64 = read_number(&self.path.join("energy_uj"))?;
        let now = Instant::now();
        let elapsed_us = now.duration_since(self.last_time).as_micros() as u64;
        let previous = self.last_energy_uj;

        self.last_energy_uj = energy_uj;
        self.last_time = now;

        if elapsed_us == 0 || previous == 0 {
            return None;
        }

        let energy_delta = if energy_uj >= previous {
            energy_uj - previous
        } else {
            match self.max_energy_range_uj {
                Some(range) if range >= previous => range - previous + energy_uj,
                // Range unknown: only the part after the wrap can be counted.
                _ => energy_uj,
            }
        };

        Some(energy_delta as f64 / elapsed_us as f64)
    }
}

pub(crate) fn discover_rapl_domains() -> Vec<RaplDomain> {
    let Ok(entries) = fs::read_dir(RAPL_PATH) else {
        return Vec::new();
    };

    entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .filter(|path| {
            read_trimmed(&path.join("name")).is_some_and(|name| name.contains("package"))
        })
        .filter_map(RaplDomain::open)
        .collect()
}

/// One channel of a hwmon chip (`temp1`, `fan2`, `in0`, ...).
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HwmonChannel {
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone)]
pub(crate) struct HwmonChip {
    path: PathBuf,
    pub name: String,
    /// Basename of the `device` link, e.g. `nvme0` or `0000:03:00.0`.
    pub device: Option<String>,
}

impl HwmonChip {
    fn open(path: PathBuf) -> Option<Self> {
        let name = read_trimmed(&path.join("name"))?;
        let device = fs::canonicalize(path.join("device"))
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()));
        Some(Self { path, name, device })
    }

    pub fn is_cpu(&self) -> bool {
        CPU_CHIPS.contains(&self.name.as_str())
    }

    pub fn is_gpu(&self) -> bool {
        GPU_DRIVERS.contains(&self.name.as_str())
    }

    pub fn is_storage(&self) -> bool {
        STORAGE_CHIPS.contains(&self.name.as_str())
    }

    /// Temperatures in °C (sysfs reports millidegrees).
    pub fn temperatures(&self) -> Vec<HwmonChannel> {
        self.channels("temp", "Temperature", 1000.0)
    }

    /// Fan speeds in RPM.
    pub fn fans(&self) -> Vec<HwmonChannel> {
        self.channels("fan", "Fan", 1.0)
    }

    /// Voltages in volts (sysfs reports millivolts).
    pub fn voltages(&self) -> Vec<HwmonChannel> {
        self.channels("in", "Voltage", 1000.0)
    }

    /// Clocks in MHz (sysfs reports Hz).
    pub fn clocks(&self) -> Vec<HwmonChannel> {
        self.channels("freq", "Clock", 1_000_000.0)
    }

    /// Board power in watts (sysfs reports microwatts).
    pub fn power_watts(&self) -> Option<f64> {
        ["power1_average", "power1_input"]
            .iter()
            .find_map(|f| read_number::<u64>(&self.path.join(f)))
            .map(|uw| uw as f64 / 1_000_000.0)
    }

    fn channels(&self, prefix: &str, fallback_label: &str, divisor: f64) -> Vec<HwmonChannel> {
        let mut channels = Vec::new();
        let Ok(entries) = fs::read_dir(&self.path) else {
            return channels;
        };

        for entry in entries.flatten() {
            let file_name = entry.file_name().to_string_lossy().to_string();
            let Some(index) = file_name
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_suffix("_input"))
            else {
                continue;
            };
            if index.is_empty() || !index.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }

            let Some(raw) = read_number::<i64>(&entry.path()) else {
                continue;
            };
            let label = read_trimmed(&self.path.join(format!("{prefix}{index}_label")))
                .unwrap_or_else(|| format!("{fallback_label} #{index}"));

            channels.push(HwmonChannel {
                label,
                value: raw as f64 / divisor,
            });
        }

        channels.sort_by(|a, b| a.label.cmp(&b.label));
        channels
    }
}

pub(crate) fn discover_hwmon_chips() -> Vec<HwmonChip> {
    let hwmon_path = Path::new(HWMON_PATH);
    let Ok(entries) = fs::read_dir(hwmon_path) else {
        return Vec::new();
    };

    let mut chips: Vec<HwmonChip> = entries
        .flatten()
        .filter_map(|entry| HwmonChip::open(entry.path()))
        .collect();
    chips.sort_by(|a, b| a.path.cmp(&b.path));
    chips
}

/// A DRM card with a recognised GPU driver.
#[derive(Debug, Clone)]
pub(crate) struct GpuDevice {
    pub card: String,
    device_path: PathBuf,
    pub driver: String,
    pub hwmon: Option<HwmonChip>,
}

impl GpuDevice {
    pub fn model(&self) -> String {
        match self.driver.as_str() {
            "amdgpu" | "radeon" => "AMD Radeon Graphics".to_string(),
            "i915" | "xe" => "Intel Graphics".to_string(),
            "nouveau" => "NVIDIA Graphics".to_string(),
            other => format!("{other} Graphics"),
        }
    }

    pub fn busy_percent(&self) -> Option<f64> {
        read_number::<f64>(&self.device_path.join("gpu_busy_percent"))
    }

    pub fn vram_used_mb(&self) -> Option<f64> {
        read_number::<u64>(&self.device_path.join("mem_info_vram_used"))
            .map(|b| b as f64 / (1024.0 * 1024.0))
    }

    pub fn vram_total_mb(&self) -> Option<f64> {
        read_number::<u64>(&self.device_path.join("mem_info_vram_total"))
            .map(|b| b as f64 / (1024.0 * 1024.0))
    }
}

pub(crate) fn discover_gpus(chips: &[HwmonChip]) -> Vec<GpuDevice> {
    let drm_path = Path::new(DRM_PATH);
    let Ok(entries) = fs::read_dir(drm_path) else {
        return Vec::new();
    };

    let mut gpus = Vec::new();
    for entry in entries.flatten() {
        let card = entry.file_name().to_string_lossy().to_string();
        // Skip connector nodes such as card0-DP-1.
        if !card.starts_with("card") || card.contains('-') {
            continue;
        }

        let device_path = entry.path().join("device");
        let driver = fs::canonicalize(device_path.join("driver"))
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()));
        let Some(driver) = driver.filter(|d| GPU_DRIVERS.contains(&d.as_str())) else {
            continue;
        };

        let pci_slot = fs::canonicalize(&device_path)
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()));
        let hwmon = chips
            .iter()
            .find(|chip| chip.is_gpu() && chip.device.is_some() && chip.device == pci_slot)
            .cloned();

        gpus.push(GpuDevice {
            card,
            device_path,
            driver,
            hwmon,
        });
    }

    gpus.sort_by(|a, b| a.card.cmp(&b.card));
    gpus
}

pub(crate) fn read_mainboard_name() -> Option<String> {
    let dmi = Path::new(DMI_PATH);
    let vendor = read_trimmed(&dmi.join("board_vendor"));
    let name = read_trimmed(&dmi.join("board_name"));

    match (vendor, name) {
        (Some(vendor), Some(name)) => Some(format!("{vendor} {name}")),
        (None, Some(name)) => Some(name),
        (Some(vendor), None) => Some(vendor),
        (None, None) => None,
    }
}
