//! Whole-system power estimation.
//!
//! CPU and GPU draw come from a direct power sensor when the gateway exposes
//! one, otherwise from a TDP model scaled by utilization. Everything else uses
//! small fixed models. Lookups never fail: absent sensors fall back to
//! defaults and absent hardware yields a placeholder reading.

use wattwise_platform::{HardwareKind, HardwareRef, SensorGateway, SensorKind};
use wattwise_protocol::{ComponentKind, ComponentReading};

use crate::config::PowerModel;

/// Share of TDP an idle CPU still draws.
pub const CPU_BASE_FRACTION: f64 = 0.3;
/// Share of TDP an idle GPU still draws.
pub const GPU_BASE_FRACTION: f64 = 0.2;

const RAM_TDP_WATTS: f64 = 10.0;
const MAINBOARD_TDP_WATTS: f64 = 25.0;
const MAINBOARD_WATTS: f64 = 15.0;
const SSD_TDP_WATTS: f64 = 5.0;
const SSD_WATTS: f64 = 2.0;
const HDD_TDP_WATTS: f64 = 8.0;
const HDD_WATTS: f64 = 4.0;
const PSU_OVERHEAD: f64 = 0.1;

const MB_PER_GB: f64 = 1024.0;

/// Result of one estimation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    /// CPU + GPU + configured base power.
    pub total_watts: f64,
    pub components: Vec<ComponentReading>,
    pub cpu_util_pct: f64,
    /// Mean over the real GPUs, 0 when there are none.
    pub gpu_util_pct: f64,
    pub mem_util_pct: f64,
}

/// `tdp * (base + (1 - base) * util / 100)`
pub fn model_power(tdp_watts: f64, base_fraction: f64, utilization_pct: f64) -> f64 {
    tdp_watts * (base_fraction + (1.0 - base_fraction) * utilization_pct / 100.0)
}

/// Drops non-finite and negative readings.
fn valid(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v >= 0.0)
}

fn utilization(value: Option<f64>) -> Option<f64> {
    valid(value).map(|v| v.min(100.0))
}

fn first_hardware<G: SensorGateway + ?Sized>(
    sensors: &G,
    kind: HardwareKind,
) -> Option<HardwareRef> {
    sensors.list_hardware(kind).into_iter().next()
}

fn is_ssd(model: &str) -> bool {
    let model = model.to_lowercase();
    model.contains("ssd") || model.contains("nvme")
}

#[derive(Debug, Clone)]
pub struct PowerEstimator {
    model: PowerModel,
}

impl PowerEstimator {
    pub fn new(model: PowerModel) -> Self {
        Self { model }
    }

    pub fn estimate<G: SensorGateway + ?Sized>(&self, sensors: &G) -> Estimate {
        let cpu = self.cpu_reading(sensors);
        let (gpus, gpu_util_pct) = self.gpu_readings(sensors);
        let ram = self.memory_reading(sensors);
        let mainboard = self.mainboard_reading(sensors);
        let storage = self.storage_readings(sensors);

        let total_watts = cpu.power_watts
            + gpus.iter().map(|g| g.power_watts).sum::<f64>()
            + self.model.base_power_watts;

        let cpu_util_pct = cpu.utilization_pct.unwrap_or(0.0);
        let mem_util_pct = ram.utilization_pct.unwrap_or(0.0);

        let mut components = Vec::with_capacity(gpus.len() + storage.len() + 4);
        components.push(cpu);
        components.extend(gpus);
        components.push(ram);
        components.push(mainboard);
        components.extend(storage);

        let others: f64 = components.iter().map(|c| c.power_watts).sum();
        let mut psu = ComponentReading::new(
            "psu",
            "Power Supply",
            ComponentKind::Psu,
            "Estimated",
            others * PSU_OVERHEAD,
        );
        psu.temperature_c = valid(sensors.find_sensor_value(SensorKind::Temperature, "PSU"));
        components.push(psu);

        Estimate {
            total_watts,
            components,
            cpu_util_pct,
            gpu_util_pct,
            mem_util_pct,
        }
    }

    fn cpu_reading<G: SensorGateway + ?Sized>(&self, sensors: &G) -> ComponentReading {
        let tdp = self.model.cpu_tdp_watts;
        let Some(cpu) = first_hardware(sensors, HardwareKind::Cpu) else {
            let mut reading = ComponentReading::new(
                "cpu",
                "CPU",
                ComponentKind::Processor,
                "Unknown CPU",
                model_power(tdp, CPU_BASE_FRACTION, 0.0),
            );
            reading.tdp_watts = Some(tdp);
            reading.utilization_pct = Some(0.0);
            return reading;
        };

        let util = utilization(sensors.sensor_value(&cpu.id, SensorKind::Load, "CPU Total"))
            .unwrap_or(0.0);
        let power = valid(sensors.sensor_value(&cpu.id, SensorKind::Power, "Package"))
            .unwrap_or_else(|| model_power(tdp, CPU_BASE_FRACTION, util));

        let mut reading =
            ComponentReading::new("cpu", "CPU", ComponentKind::Processor, cpu.name, power);
        reading.tdp_watts = Some(tdp);
        reading.utilization_pct = Some(util);
        reading.temperature_c =
            valid(sensors.sensor_value(&cpu.id, SensorKind::Temperature, "CPU Package"));
        reading.clock_mhz = valid(sensors.sensor_value(&cpu.id, SensorKind::Clock, "Core"));
        reading.voltage = valid(sensors.sensor_value(&cpu.id, SensorKind::Voltage, "Core"));
        reading
    }

    fn gpu_readings<G: SensorGateway + ?Sized>(&self, sensors: &G) -> (Vec<ComponentReading>, f64) {
        let tdp = self.model.gpu_tdp_watts;
        let gpus = sensors.list_hardware(HardwareKind::Gpu);

        if gpus.is_empty() {
            let mut placeholder = ComponentReading::new(
                "gpu",
                "GPU",
                ComponentKind::Graphics,
                "Integrated/Unknown",
                0.0,
            );
            placeholder.tdp_watts = Some(tdp);
            placeholder.utilization_pct = Some(0.0);
            return (vec![placeholder], 0.0);
        }

        let mut readings = Vec::with_capacity(gpus.len());
        for (index, gpu) in gpus.into_iter().enumerate() {
            let util = utilization(sensors.sensor_value(&gpu.id, SensorKind::Load, "GPU Core"))
                .unwrap_or(0.0);
            let power = valid(sensors.sensor_value(&gpu.id, SensorKind::Power, ""))
                .unwrap_or_else(|| model_power(tdp, GPU_BASE_FRACTION, util));
            let name = if index == 0 {
                "GPU".to_string()
            } else {
                format!("GPU {index}")
            };

            let mut reading = ComponentReading::new(
                format!("gpu{index}"),
                name,
                ComponentKind::Graphics,
                gpu.name,
                power,
            );
            reading.tdp_watts = Some(tdp);
            reading.utilization_pct = Some(util);
            reading.temperature_c =
                valid(sensors.sensor_value(&gpu.id, SensorKind::Temperature, "GPU Core"));
            reading.clock_mhz = valid(sensors.sensor_value(&gpu.id, SensorKind::Clock, "GPU Core"));
            reading.mem_used_mb =
                valid(sensors.sensor_value(&gpu.id, SensorKind::SmallData, "GPU Memory Used"));
            reading.mem_total_mb =
                valid(sensors.sensor_value(&gpu.id, SensorKind::SmallData, "GPU Memory Total"));
            reading.fan_rpm = valid(sensors.sensor_value(&gpu.id, SensorKind::Fan, ""));
            readings.push(reading);
        }

        let mean_util = readings
            .iter()
            .filter_map(|r| r.utilization_pct)
            .sum::<f64>()
            / readings.len() as f64;
        (readings, mean_util)
    }

    fn memory_reading<G: SensorGateway + ?Sized>(&self, sensors: &G) -> ComponentReading {
        let ram = first_hardware(sensors, HardwareKind::Memory);
        let lookup = |kind, pattern| {
            ram.as_ref()
                .and_then(|hw| valid(sensors.sensor_value(&hw.id, kind, pattern)))
        };

        let util = utilization(lookup(SensorKind::Load, "")).unwrap_or(0.0);
        let used_gb = lookup(SensorKind::Data, "Used Memory");
        let available_gb = lookup(SensorKind::Data, "Available Memory");
        let total_gb = used_gb.unwrap_or(0.0) + available_gb.unwrap_or(0.0);

        let mut reading = ComponentReading::new(
            "ram",
            "Memory",
            ComponentKind::Memory,
            format!("{total_gb:.1}GB"),
            5.0 + 5.0 * util / 100.0,
        );
        reading.tdp_watts = Some(RAM_TDP_WATTS);
        reading.utilization_pct = Some(util);
        reading.mem_used_mb = used_gb.map(|gb| gb * MB_PER_GB);
        if total_gb > 0.0 {
            reading.mem_total_mb = Some(total_gb * MB_PER_GB);
        }
        reading
    }

    fn mainboard_reading<G: SensorGateway + ?Sized>(&self, sensors: &G) -> ComponentReading {
        let board = sensors.mainboard();
        let model = board
            .as_ref()
            .map(|b| b.name.clone())
            .unwrap_or_else(|| "Unknown Motherboard".to_string());

        let mut reading = ComponentReading::new(
            "mobo",
            "Motherboard",
            ComponentKind::Motherboard,
            model,
            MAINBOARD_WATTS,
        );
        reading.tdp_watts = Some(MAINBOARD_TDP_WATTS);
        if let Some(board) = board {
            reading.temperature_c =
                valid(sensors.sensor_value(&board.id, SensorKind::Temperature, "Temperature"));
            reading.fan_rpm = valid(sensors.sensor_value(&board.id, SensorKind::Fan, ""));
        }
        reading
    }

    fn storage_readings<G: SensorGateway + ?Sized>(&self, sensors: &G) -> Vec<ComponentReading> {
        let disks = sensors.list_hardware(HardwareKind::Storage);

        if disks.is_empty() {
            let mut placeholder = ComponentReading::new(
                "storage",
                "Storage",
                ComponentKind::Storage,
                "Unknown Storage",
                0.0,
            );
            placeholder.tdp_watts = Some(SSD_TDP_WATTS);
            return vec![placeholder];
        }

        disks
            .into_iter()
            .enumerate()
            .map(|(index, disk)| {
                let ssd = is_ssd(&disk.name);
                let (name, tdp, power) = if ssd {
                    ("SSD", SSD_TDP_WATTS, SSD_WATTS)
                } else {
                    ("HDD", HDD_TDP_WATTS, HDD_WATTS)
                };

                let mut reading = ComponentReading::new(
                    format!("storage{index}"),
                    name,
                    ComponentKind::Storage,
                    disk.name.clone(),
                    power,
                );
                reading.tdp_watts = Some(tdp);
                reading.utilization_pct =
                    utilization(sensors.sensor_value(&disk.id, SensorKind::Load, "Used Space"));
                reading.temperature_c =
                    valid(sensors.sensor_value(&disk.id, SensorKind::Temperature, "Temperature"));
                reading
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wattwise_platform::FixtureSensors;

    fn estimator() -> PowerEstimator {
        PowerEstimator::new(PowerModel::default())
    }

    fn find<'a>(estimate: &'a Estimate, id: &str) -> &'a ComponentReading {
        estimate
            .components
            .iter()
            .find(|c| c.id == id)
            .unwrap_or_else(|| panic!("missing component {id}"))
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_model_power_formula() {
        assert_close(model_power(125.0, CPU_BASE_FRACTION, 50.0), 81.25);
        assert_close(model_power(150.0, GPU_BASE_FRACTION, 0.0), 30.0);
        assert_close(model_power(150.0, GPU_BASE_FRACTION, 100.0), 150.0);
    }

    #[test]
    fn test_cpu_without_power_sensor_uses_tdp_model() {
        let sensors = FixtureSensors::new()
            .with_hardware(HardwareKind::Cpu, "/cpu/0", "Test CPU")
            .with_sensor("/cpu/0", SensorKind::Load, "CPU Total", 50.0);

        let estimate = estimator().estimate(&sensors);
        let cpu = find(&estimate, "cpu");
        assert_close(cpu.power_watts, 81.25);
        assert_eq!(cpu.utilization_pct, Some(50.0));
        assert_eq!(cpu.model, "Test CPU");
        assert_close(estimate.cpu_util_pct, 50.0);
    }

    #[test]
    fn test_direct_power_sensor_wins() {
        let sensors = FixtureSensors::new()
            .with_hardware(HardwareKind::Cpu, "/cpu/0", "Test CPU")
            .with_sensor("/cpu/0", SensorKind::Load, "CPU Total", 50.0)
            .with_sensor("/cpu/0", SensorKind::Power, "CPU Package", 42.0)
            .with_hardware(HardwareKind::Gpu, "/gpu/0", "Test GPU")
            .with_sensor("/gpu/0", SensorKind::Load, "GPU Core", 90.0)
            .with_sensor("/gpu/0", SensorKind::Power, "GPU Package", 120.0);

        let estimate = estimator().estimate(&sensors);
        assert_close(find(&estimate, "cpu").power_watts, 42.0);
        assert_close(find(&estimate, "gpu0").power_watts, 120.0);
        assert_close(estimate.total_watts, 42.0 + 120.0 + 45.0);
    }

    #[test]
    fn test_missing_utilization_defaults_to_zero() {
        let sensors = FixtureSensors::new()
            .with_hardware(HardwareKind::Cpu, "/cpu/0", "Test CPU")
            .with_empty_sensor("/cpu/0", SensorKind::Load, "CPU Total")
            .with_hardware(HardwareKind::Gpu, "/gpu/0", "Test GPU");

        let estimate = estimator().estimate(&sensors);
        let cpu = find(&estimate, "cpu");
        assert_eq!(cpu.utilization_pct, Some(0.0));
        assert_close(cpu.power_watts, 125.0 * 0.3);
        assert_close(find(&estimate, "gpu0").power_watts, 150.0 * 0.2);
    }

    #[test]
    fn test_missing_gpu_yields_single_placeholder() {
        let sensors = FixtureSensors::new()
            .with_hardware(HardwareKind::Cpu, "/cpu/0", "Test CPU")
            .with_sensor("/cpu/0", SensorKind::Load, "CPU Total", 50.0);

        let estimate = estimator().estimate(&sensors);
        let gpus: Vec<_> = estimate
            .components
            .iter()
            .filter(|c| c.kind == ComponentKind::Graphics)
            .collect();
        assert_eq!(gpus.len(), 1);
        assert_eq!(gpus[0].id, "gpu");
        assert_eq!(gpus[0].model, "Integrated/Unknown");
        assert_eq!(gpus[0].power_watts, 0.0);
        assert_eq!(gpus[0].utilization_pct, Some(0.0));
        assert!(gpus[0].temperature_c.is_none());

        assert_close(estimate.total_watts, 81.25 + 45.0);
        assert_eq!(estimate.gpu_util_pct, 0.0);
    }

    #[test]
    fn test_every_component_kind_present_with_no_hardware() {
        let estimate = estimator().estimate(&FixtureSensors::new());
        let ids: Vec<&str> = estimate.components.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["cpu", "gpu", "ram", "mobo", "storage", "psu"]);

        assert_eq!(find(&estimate, "cpu").model, "Unknown CPU");
        assert_eq!(find(&estimate, "mobo").model, "Unknown Motherboard");

        let storage = find(&estimate, "storage");
        assert_eq!(storage.power_watts, 0.0);
        assert!(storage.utilization_pct.is_none());
        assert!(storage.temperature_c.is_none());
    }

    #[test]
    fn test_fixed_component_models() {
        let sensors = FixtureSensors::new()
            .with_hardware(HardwareKind::Memory, "/ram", "Memory")
            .with_sensor("/ram", SensorKind::Load, "Memory", 40.0)
            .with_sensor("/ram", SensorKind::Data, "Used Memory", 12.8)
            .with_sensor("/ram", SensorKind::Data, "Available Memory", 19.2)
            .with_hardware(HardwareKind::Storage, "/storage/0", "Samsung SSD 970")
            .with_hardware(HardwareKind::Storage, "/storage/1", "WDC WD40EFRX")
            .with_sensor("/storage/1", SensorKind::Load, "Used Space", 70.0);

        let estimate = estimator().estimate(&sensors);

        let ram = find(&estimate, "ram");
        assert_close(ram.power_watts, 7.0);
        assert_eq!(ram.model, "32.0GB");
        assert_close(ram.mem_total_mb.unwrap(), 32.0 * 1024.0);
        assert_close(estimate.mem_util_pct, 40.0);

        let ssd = find(&estimate, "storage0");
        assert_eq!(ssd.name, "SSD");
        assert_eq!(ssd.power_watts, 2.0);
        assert_eq!(ssd.tdp_watts, Some(5.0));

        let hdd = find(&estimate, "storage1");
        assert_eq!(hdd.name, "HDD");
        assert_eq!(hdd.power_watts, 4.0);
        assert_eq!(hdd.utilization_pct, Some(70.0));

        assert_eq!(find(&estimate, "mobo").power_watts, 15.0);
    }

    #[test]
    fn test_psu_is_ten_percent_of_other_components() {
        let estimate = estimator().estimate(&FixtureSensors::desktop());
        let psu = find(&estimate, "psu");
        let others: f64 = estimate
            .components
            .iter()
            .filter(|c| c.id != "psu")
            .map(|c| c.power_watts)
            .sum();
        assert_close(psu.power_watts, others * 0.1);
        assert_eq!(psu.model, "Estimated");
    }

    #[test]
    fn test_psu_temperature_found_anywhere() {
        let sensors = FixtureSensors::new()
            .with_hardware(HardwareKind::Mainboard, "/mainboard", "Board")
            .with_sensor("/mainboard", SensorKind::Temperature, "PSU Temperature", 36.0);
        let estimate = estimator().estimate(&sensors);
        assert_eq!(find(&estimate, "psu").temperature_c, Some(36.0));
    }

    #[test]
    fn test_multiple_gpus_named_and_averaged() {
        let sensors = FixtureSensors::new()
            .with_hardware(HardwareKind::Gpu, "/gpu/0", "GPU A")
            .with_sensor("/gpu/0", SensorKind::Load, "GPU Core", 20.0)
            .with_hardware(HardwareKind::Gpu, "/gpu/1", "GPU B")
            .with_sensor("/gpu/1", SensorKind::Load, "GPU Core", 60.0);

        let estimate = estimator().estimate(&sensors);
        assert_eq!(find(&estimate, "gpu0").name, "GPU");
        assert_eq!(find(&estimate, "gpu1").name, "GPU 1");
        assert_close(estimate.gpu_util_pct, 40.0);
        let gpu_total = model_power(150.0, 0.2, 20.0) + model_power(150.0, 0.2, 60.0);
        assert_close(estimate.total_watts, 125.0 * 0.3 + gpu_total + 45.0);
    }

    #[test]
    fn test_invalid_sensor_values_treated_as_absent() {
        let sensors = FixtureSensors::new()
            .with_hardware(HardwareKind::Cpu, "/cpu/0", "Test CPU")
            .with_sensor("/cpu/0", SensorKind::Load, "CPU Total", 50.0)
            .with_sensor("/cpu/0", SensorKind::Power, "CPU Package", -5.0)
            .with_sensor("/cpu/0", SensorKind::Temperature, "CPU Package", f64::INFINITY);

        let estimate = estimator().estimate(&sensors);
        let cpu = find(&estimate, "cpu");
        assert_close(cpu.power_watts, 81.25);
        assert!(cpu.temperature_c.is_none());
    }

    #[test]
    fn test_desktop_fixture_totals() {
        let estimate = estimator().estimate(&FixtureSensors::desktop());
        let cpu = model_power(125.0, 0.3, 18.0);
        assert_close(estimate.total_watts, cpu + 21.0 + 45.0);
        assert_eq!(estimate.components.len(), 6);
    }
}
