//! Thermal facet
//!
//! Reads kernel thermal zones and the CPU/GPU hwmon drivers. Sensor
//! directories are discovered once at construction; every query re-reads
//! the temperature files.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::command::{run_checked, ToolCommand, ToolRunner};
use crate::constants::{paths, temperature, tools};
use crate::sysfs::Sysfs;

const CPU_DRIVERS: [&str; 2] = ["coretemp", "k10temp"];

/// Coarse thermal zone category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneCategory {
    Cpu,
    Gpu,
    Motherboard,
    Battery,
    Charger,
    Unknown,
}

impl ZoneCategory {
    /// Category of a thermal zone `type` string
    pub fn from_zone_type(zone_type: &str) -> Self {
        match zone_type.to_lowercase().as_str() {
            "acpitz" | "pch_cannonlake" | "pch_skylake" => ZoneCategory::Motherboard,
            "x86_pkg_temp" | "coretemp" | "k10temp" => ZoneCategory::Cpu,
            "amdgpu" | "nvidia" => ZoneCategory::Gpu,
            _ => ZoneCategory::Unknown,
        }
    }
}

/// One thermal zone reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThermalReading {
    pub zone_id: usize,
    pub zone_type: ZoneCategory,
    pub name: String,
    pub temperature_c: f64,
    pub critical_temp_c: Option<f64>,
}

/// One CPU core sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreTemp {
    pub core_id: i32,
    pub temperature_c: f64,
    pub high_temp_c: Option<f64>,
    pub critical_temp_c: Option<f64>,
}

/// Qualitative CPU temperature band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThermalStatus {
    Cool,
    Normal,
    Warm,
    Hot,
    Critical,
    Unknown,
}

impl ThermalStatus {
    pub fn from_temperature(max_temp: Option<f64>) -> Self {
        match max_temp {
            None => ThermalStatus::Unknown,
            Some(t) if t < temperature::COOL_BELOW => ThermalStatus::Cool,
            Some(t) if t < temperature::NORMAL_BELOW => ThermalStatus::Normal,
            Some(t) if t < temperature::WARM_BELOW => ThermalStatus::Warm,
            Some(t) if t < temperature::HOT_BELOW => ThermalStatus::Hot,
            Some(_) => ThermalStatus::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThermalStatus::Cool => "Cool",
            ThermalStatus::Normal => "Normal",
            ThermalStatus::Warm => "Warm",
            ThermalStatus::Hot => "Hot",
            ThermalStatus::Critical => "Critical",
            ThermalStatus::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ThermalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Temperature sensors
pub struct ThermalMonitor {
    sysfs: Sysfs,
    tools: Arc<dyn ToolRunner>,
    zones: Vec<PathBuf>,
    /// hwmon driver name -> directory, only nodes with `temp*_input`
    hwmon: Vec<(String, PathBuf)>,
}

impl ThermalMonitor {
    pub fn new(sysfs: Sysfs, tools: Arc<dyn ToolRunner>) -> Self {
        let zones: Vec<PathBuf> = sysfs
            .indexed_files(paths::THERMAL_BASE, "thermal_zone", "")
            .into_iter()
            .map(|(_, path)| path)
            .collect();

        let hwmon: Vec<(String, PathBuf)> = sysfs
            .list_dir(paths::HWMON_BASE)
            .into_iter()
            .filter_map(|dir| {
                let name = sysfs.read(dir.join("name")).filter(|n| !n.is_empty())?;
                let has_temps = !sysfs.indexed_files(&dir, "temp", "_input").is_empty();
                has_temps.then_some((name, dir))
            })
            .collect();

        debug!(
            target: "armoury::thermal",
            "Found {} thermal zones, hwmon sensors: {:?}",
            zones.len(),
            hwmon.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>()
        );

        Self { sysfs, tools, zones, hwmon }
    }

    fn read_celsius(&self, path: impl AsRef<Path>) -> Option<f64> {
        self.sysfs
            .read_parsed::<i64>(path)
            .map(|milli| milli as f64 / temperature::MILLIDEGREE)
    }

    fn hwmon_matching<'a>(&'a self, pred: impl Fn(&str) -> bool + 'a) -> impl Iterator<Item = &'a Path> + 'a {
        self.hwmon
            .iter()
            .filter(move |(name, _)| pred(name.as_str()))
            .map(|(_, dir)| dir.as_path())
    }

    fn read_zone(&self, zone_id: usize, dir: &Path) -> Option<ThermalReading> {
        let temperature_c = self.read_celsius(dir.join("temp"))?;
        let name = self
            .sysfs
            .read(dir.join("type"))
            .unwrap_or_else(|| "unknown".to_string());

        // First trip point typed "critical" wins, even if its temperature is unreadable
        let critical_temp_c = self
            .sysfs
            .indexed_files(dir, "trip_point_", "_temp")
            .into_iter()
            .find(|(idx, _)| {
                self.sysfs
                    .read(dir.join(format!("trip_point_{}_type", idx)))
                    .is_some_and(|t| t.to_lowercase().contains("critical"))
            })
            .and_then(|(_, path)| self.read_celsius(path));

        Some(ThermalReading {
            zone_id,
            zone_type: ZoneCategory::from_zone_type(&name),
            name,
            temperature_c,
            critical_temp_c,
        })
    }

    /// Every zone with a readable temperature
    pub fn get_thermal_zones(&self) -> Vec<ThermalReading> {
        self.zones
            .iter()
            .enumerate()
            .filter_map(|(idx, dir)| self.read_zone(idx, dir))
            .collect()
    }

    /// Per-core sensors of the first CPU driver found (temp1 is the package)
    pub fn get_cpu_temperatures(&self) -> Vec<CoreTemp> {
        let Some(dir) = self.hwmon_matching(|name| CPU_DRIVERS.contains(&name)).next() else {
            return Vec::new();
        };

        self.sysfs
            .indexed_files(dir, "temp", "_input")
            .into_iter()
            .filter(|(idx, _)| *idx != 1)
            .filter_map(|(idx, path)| {
                Some(CoreTemp {
                    core_id: idx as i32 - 2,
                    temperature_c: self.read_celsius(&path)?,
                    high_temp_c: self.read_celsius(dir.join(format!("temp{}_max", idx))),
                    critical_temp_c: self.read_celsius(dir.join(format!("temp{}_crit", idx))),
                })
            })
            .collect()
    }

    pub fn get_cpu_package_temp(&self) -> Option<f64> {
        self.hwmon_matching(|name| CPU_DRIVERS.contains(&name))
            .find_map(|dir| self.read_celsius(dir.join("temp1_input")))
            .or_else(|| {
                self.get_thermal_zones()
                    .into_iter()
                    .find(|z| z.zone_type == ZoneCategory::Cpu)
                    .map(|z| z.temperature_c)
            })
    }

    pub fn get_gpu_temperature(&self) -> Option<f64> {
        if let Some(temp) = self
            .hwmon_matching(|name| name.contains("amdgpu") || name.contains("nvidia"))
            .find_map(|dir| self.read_celsius(dir.join("temp1_input")))
        {
            return Some(temp);
        }

        let cmd = ToolCommand::new(tools::NVIDIA_SMI)
            .args(["--query-gpu=temperature.gpu", "--format=csv,noheader,nounits"]);
        if let Some(temp) = run_checked(self.tools.as_ref(), &cmd)
            .ok()
            .and_then(|out| out.trim().parse::<f64>().ok())
        {
            return Some(temp);
        }

        self.get_thermal_zones()
            .into_iter()
            .find(|z| z.zone_type == ZoneCategory::Gpu)
            .map(|z| z.temperature_c)
    }

    /// Package, cores, GPU and every non-CPU/GPU zone by type name
    pub fn get_all_temperatures(&self) -> BTreeMap<String, f64> {
        let mut temps = BTreeMap::new();

        if let Some(pkg) = self.get_cpu_package_temp() {
            temps.insert("CPU Package".to_string(), pkg);
        }
        for core in self.get_cpu_temperatures() {
            temps.insert(format!("CPU Core {}", core.core_id), core.temperature_c);
        }
        if let Some(gpu) = self.get_gpu_temperature() {
            temps.insert("GPU".to_string(), gpu);
        }
        for zone in self.get_thermal_zones() {
            if !matches!(zone.zone_type, ZoneCategory::Cpu | ZoneCategory::Gpu) {
                temps.insert(zone.name, zone.temperature_c);
            }
        }
        temps
    }

    pub fn get_max_cpu_temp(&self) -> Option<f64> {
        self.get_cpu_package_temp()
            .into_iter()
            .chain(self.get_cpu_temperatures().into_iter().map(|c| c.temperature_c))
            .reduce(f64::max)
    }

    /// Any zone at 95% of critical, or any core at its high mark or 95% of critical
    pub fn is_thermal_throttling(&self) -> bool {
        let near = |temp: f64, limit: Option<f64>| {
            limit.is_some_and(|crit| crit > 0.0 && temp >= crit * temperature::THROTTLE_FRACTION)
        };

        let zone_hot = self
            .get_thermal_zones()
            .iter()
            .any(|z| z.temperature_c != 0.0 && near(z.temperature_c, z.critical_temp_c));
        if zone_hot {
            return true;
        }

        self.get_cpu_temperatures().iter().any(|core| {
            near(core.temperature_c, core.critical_temp_c)
                || core
                    .high_temp_c
                    .is_some_and(|high| high > 0.0 && core.temperature_c >= high)
        })
    }

    pub fn get_thermal_status(&self) -> ThermalStatus {
        ThermalStatus::from_temperature(self.get_max_cpu_temp())
    }
}
