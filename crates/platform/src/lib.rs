//! Hardware sensor access for wattwise.
//!
//! This crate provides a typed [`SensorGateway`] trait covering a fixed
//! hardware-kind × sensor-kind matrix. Lookups never fail: absent hardware
//! or sensors come back as empty lists or `None`. Only construction and
//! [`SensorGateway::refresh`] can return errors.
//!
//! # Features
//!
//! - `linux` - Enable Linux support (sysinfo, RAPL, hwmon, DMI)
//!
//! # Example
//!
//! ```ignore
//! use wattwise_platform::{HardwareKind, SensorGateway, SensorKind};
//!
//! #[cfg(target_os = "linux")]
//! use wattwise_platform::linux::LinuxSensors;
//!
//! let mut sensors = LinuxSensors::new()?;
//! sensors.refresh()?;
//! for cpu in sensors.list_hardware(HardwareKind::Cpu) {
//!     let load = sensors.sensor_value(&cpu.id, SensorKind::Load, "CPU Total");
//!     println!("{}: {:?}%", cpu.name, load);
//! }
//! ```

mod fixture;
mod gateway;

pub use fixture::FixtureSensors;
pub use gateway::{
    matches_pattern, HardwareKind, HardwareRef, SensorGateway, SensorKind, SensorReading,
    SensorTable,
};

#[cfg(target_os = "linux")]
#[cfg(feature = "linux")]
pub mod linux;
