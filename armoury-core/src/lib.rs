//! ASUS Armoury Core Library
//!
//! Hardware control for ASUS laptops on Linux through the `asus-nb-wmi`
//! sysfs interface, kernel hwmon nodes and optional helper tools
//! (`asusctl`, `openrgb`, `sensors`, `nvidia-smi`).
//!
//! # Module Structure
//!
//! - `sysfs`, `command` - leaf I/O: single-line pseudo-files and external tools
//! - `resolver`, `detect` - capability map and hardware capability report
//! - `cpu`, `fan`, `rgb`, `battery`, `thermal` - one facet per hardware feature
//! - `profiles` - persisted performance profiles and the profile manager
//! - `settings` - the `config.json` settings file
//! - `client` - Unix socket client for the `armouryd` daemon
//!
//! # Example
//!
//! ```no_run
//! use armoury_core::{Hardware, CpuMode};
//!
//! let hw = Hardware::system();
//! if hw.cpu.is_available() {
//!     hw.cpu.set_mode(CpuMode::Turbo);
//! }
//! ```

// Grouped modules
pub mod profiles;

// Standalone modules
pub mod battery;
pub mod client;
pub mod command;
pub mod constants;
pub mod cpu;
pub mod detect;
pub mod fan;
pub mod hardware;
pub mod resolver;
pub mod rgb;
pub mod settings;
pub mod sysfs;
pub mod thermal;

pub mod error {
    pub use armoury_error::*;
}

pub use error::{ArmouryError, ErrorKind, Result};

pub use battery::{AttrValue, BatteryController, BatteryInfo, ChargePreset};
pub use client::DaemonClient;
pub use command::{SystemRunner, ToolCommand, ToolOutput, ToolRunner};
pub use cpu::{CpuController, CpuFrequencyInfo, CpuMode};
pub use detect::{Detector, DetectionSummary, DmiInfo, HardwareCapabilities};
pub use fan::{FanController, FanCurvePoint, FanInfo, FanMode};
pub use hardware::Hardware;
pub use profiles::{
    ApplyReport, FanCurve, PerformanceProfile, ProfileDirs, ProfileManager, ProfileStore,
    RgbConfig,
};
pub use resolver::{CapabilityMap, WmiAttribute};
pub use rgb::{RgbColor, RgbController, RgbMode, RgbState};
pub use settings::Settings;
pub use sysfs::Sysfs;
pub use thermal::{CoreTemp, ThermalMonitor, ThermalReading, ThermalStatus, ZoneCategory};

#[cfg(test)]
pub(crate) mod test_utils;
