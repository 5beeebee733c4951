//! Hardware detection
//!
//! Identifies the machine from DMI, then probes every facet independently
//! and aggregates the results into one [`HardwareCapabilities`] snapshot.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::command::{run_checked, ToolCommand, ToolRunner};
use crate::constants::{paths, tools};
use crate::cpu::CpuMode;
use crate::resolver::{CapabilityMap, WmiAttribute};
use crate::sysfs::Sysfs;

/// Model families matched against product name and family, in order
pub const KNOWN_FAMILIES: [&str; 9] = [
    "ROG",
    "TUF",
    "Zephyrus",
    "Strix",
    "Flow",
    "VivoBook",
    "ZenBook",
    "ExpertBook",
    "ProArt",
];

/// `/sys/class/dmi/id` strings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmiInfo {
    pub vendor: Option<String>,
    pub product_name: Option<String>,
    pub product_family: Option<String>,
    pub board_name: Option<String>,
    pub board_vendor: Option<String>,
    pub bios_version: Option<String>,
}

impl DmiInfo {
    pub fn read(sysfs: &Sysfs) -> Self {
        let dir = Path::new(paths::DMI_DIR);
        let field = |name: &str| sysfs.read(dir.join(name));
        Self {
            vendor: field("sys_vendor"),
            product_name: field("product_name"),
            product_family: field("product_family"),
            board_name: field("board_name"),
            board_vendor: field("board_vendor"),
            bios_version: field("bios_version"),
        }
    }

    pub fn is_asus(&self) -> bool {
        self.vendor
            .as_deref()
            .is_some_and(|v| v.to_lowercase().contains("asus"))
    }

    /// First known family named in product name or family, else "Unknown"
    pub fn family(&self) -> String {
        let combined = format!(
            "{} {}",
            self.product_name.as_deref().unwrap_or_default(),
            self.product_family.as_deref().unwrap_or_default()
        )
        .to_lowercase();

        KNOWN_FAMILIES
            .iter()
            .find(|family| combined.contains(&family.to_lowercase()))
            .map(|family| family.to_string())
            .unwrap_or_else(|| "Unknown".to_string())
    }
}

/// Read-only capability snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HardwareCapabilities {
    pub is_asus: bool,
    pub model_name: String,
    pub model_family: String,
    pub dmi: DmiInfo,

    pub has_performance_modes: bool,
    pub has_fan_control: bool,
    pub has_rgb_keyboard: bool,
    pub has_battery_charge_limit: bool,
    pub has_gpu_switching: bool,
    pub has_panel_overdrive: bool,
    pub has_anime_matrix: bool,

    pub performance_modes: Vec<CpuMode>,

    pub cpu_model: String,
    pub cpu_cores: usize,

    pub has_dgpu: bool,
    pub igpu_name: String,
    pub dgpu_name: String,

    pub sysfs_paths: CapabilityMap,
}

/// Feature flags of the `--detect` report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSummary {
    pub performance_modes: bool,
    pub fan_control: bool,
    pub rgb_keyboard: bool,
    pub battery_limit: bool,
    pub gpu_switching: bool,
    pub panel_overdrive: bool,
    pub anime_matrix: bool,
}

/// Shape printed by `armouryd --detect`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionSummary {
    pub is_asus: bool,
    pub model_name: String,
    pub model_family: String,
    pub cpu_model: String,
    pub cpu_cores: usize,
    pub has_dgpu: bool,
    pub features: FeatureSummary,
}

impl HardwareCapabilities {
    pub fn summary(&self) -> DetectionSummary {
        DetectionSummary {
            is_asus: self.is_asus,
            model_name: self.model_name.clone(),
            model_family: self.model_family.clone(),
            cpu_model: self.cpu_model.clone(),
            cpu_cores: self.cpu_cores,
            has_dgpu: self.has_dgpu,
            features: FeatureSummary {
                performance_modes: self.has_performance_modes,
                fan_control: self.has_fan_control,
                rgb_keyboard: self.has_rgb_keyboard,
                battery_limit: self.has_battery_charge_limit,
                gpu_switching: self.has_gpu_switching,
                panel_overdrive: self.has_panel_overdrive,
                anime_matrix: self.has_anime_matrix,
            },
        }
    }

    /// Human-readable names of the available features
    pub fn feature_names(&self) -> Vec<&'static str> {
        [
            (self.has_performance_modes, "Performance Modes"),
            (self.has_fan_control, "Fan Control"),
            (self.has_rgb_keyboard, "RGB Keyboard"),
            (self.has_battery_charge_limit, "Battery Limit"),
            (self.has_gpu_switching, "GPU Switching"),
            (self.has_panel_overdrive, "Panel Overdrive"),
            (self.has_anime_matrix, "Anime Matrix"),
        ]
        .into_iter()
        .filter_map(|(present, name)| present.then_some(name))
        .collect()
    }
}

lazy_static! {
    // Trailing `[...]` group of an lspci line
    static ref GPU_NAME: Option<Regex> = Regex::new(r"\[([^\]]+)\]$").ok();
}

/// Name of a GPU from an `lspci -nn` line
pub fn extract_gpu_name(line: &str) -> String {
    if let Some(caps) = GPU_NAME.as_ref().and_then(|re| re.captures(line.trim_end())) {
        return caps[1].to_string();
    }

    let parts: Vec<&str> = line.splitn(3, ':').collect();
    if parts.len() == 3 {
        return parts[2].trim().chars().take(50).collect();
    }
    "Unknown GPU".to_string()
}

/// `(model name, physical cores)` from `/proc/cpuinfo`
pub fn parse_cpuinfo(cpuinfo: &str) -> (String, usize) {
    let value = |line: &str| line.split(':').nth(1).map(|v| v.trim().to_string());

    let model = cpuinfo
        .lines()
        .find(|line| line.starts_with("model name"))
        .and_then(value)
        .unwrap_or_default();

    let mut cores = BTreeSet::new();
    let mut physical: Option<String> = None;
    for line in cpuinfo.lines() {
        if line.starts_with("physical id") {
            physical = value(line);
        } else if line.starts_with("core id") {
            if let (Some(phys), Some(core)) = (&physical, value(line)) {
                cores.insert(format!("{}:{}", phys, core));
            }
        }
    }

    (model, cores.len().max(1))
}

/// Capability detector with a lazily-filled cache
pub struct Detector {
    sysfs: Sysfs,
    tools: Arc<dyn ToolRunner>,
    cached: RwLock<Option<Arc<HardwareCapabilities>>>,
}

impl Detector {
    pub fn new(sysfs: Sysfs, tools: Arc<dyn ToolRunner>) -> Self {
        Self {
            sysfs,
            tools,
            cached: RwLock::new(None),
        }
    }

    /// Run every probe and replace the cached snapshot
    pub fn detect(&self) -> Arc<HardwareCapabilities> {
        info!(target: "armoury::detect", "Starting hardware detection...");

        let dmi = DmiInfo::read(&self.sysfs);
        let caps = if dmi.is_asus() {
            let caps = self.probe(dmi);
            self.log_capabilities(&caps);
            caps
        } else {
            warn!(target: "armoury::detect", "Not an ASUS system detected");
            HardwareCapabilities::default()
        };

        let caps = Arc::new(caps);
        *self.cached.write() = Some(Arc::clone(&caps));
        caps
    }

    /// Cached snapshot, detecting on first use
    pub fn capabilities(&self) -> Arc<HardwareCapabilities> {
        if let Some(caps) = self.cached.read().as_ref() {
            return Arc::clone(caps);
        }
        self.detect()
    }

    pub fn refresh(&self) -> Arc<HardwareCapabilities> {
        self.detect()
    }

    fn probe(&self, dmi: DmiInfo) -> HardwareCapabilities {
        let sysfs_paths = CapabilityMap::resolve(&self.sysfs);
        let mut caps = HardwareCapabilities {
            is_asus: true,
            model_name: dmi.product_name.clone().unwrap_or_else(|| "Unknown".to_string()),
            model_family: dmi.family(),
            dmi,
            sysfs_paths,
            ..HardwareCapabilities::default()
        };
        info!(target: "armoury::detect", "Detected ASUS {}: {}", caps.model_family, caps.model_name);

        self.detect_performance_modes(&mut caps);
        self.detect_fan_control(&mut caps);
        self.detect_rgb_keyboard(&mut caps);
        caps.has_battery_charge_limit = caps.sysfs_paths.has(WmiAttribute::ChargeControlEndThreshold);
        self.detect_gpu(&mut caps);
        caps.has_panel_overdrive = caps.sysfs_paths.has(WmiAttribute::PanelOd);
        self.detect_anime_matrix(&mut caps);
        self.detect_cpu(&mut caps);
        caps
    }

    fn tool_ok(&self, cmd: &ToolCommand) -> Option<String> {
        run_checked(self.tools.as_ref(), cmd).ok()
    }

    fn detect_performance_modes(&self, caps: &mut HardwareCapabilities) {
        if caps.sysfs_paths.has(WmiAttribute::ThrottleThermalPolicy) || self.tools.is_installed(tools::ASUSCTL) {
            caps.has_performance_modes = true;
            caps.performance_modes = CpuMode::CYCLE.to_vec();
        }
    }

    fn detect_fan_control(&self, caps: &mut HardwareCapabilities) {
        caps.has_fan_control = self.sysfs.list_dir(paths::HWMON_BASE).iter().any(|dir| {
            self.sysfs
                .read(dir.join("name"))
                .is_some_and(|name| name.to_lowercase().contains("asus"))
                && self.sysfs.exists(dir.join("pwm1"))
        });

        if !caps.has_fan_control {
            let modules = self.sysfs.read(paths::PROC_MODULES).unwrap_or_default();
            caps.has_fan_control = modules.contains("faustus") || modules.contains("asus_fan");
        }
    }

    fn detect_rgb_keyboard(&self, caps: &mut HardwareCapabilities) {
        caps.has_rgb_keyboard = caps.sysfs_paths.has(WmiAttribute::KbdRgbMode)
            || (self.tools.is_installed(tools::ASUSCTL)
                && self
                    .tool_ok(&ToolCommand::new(tools::ASUSCTL).args(["led-mode", "-s"]))
                    .is_some_and(|out| !out.trim().is_empty()))
            || self.tools.is_installed(tools::OPENRGB);
    }

    fn detect_gpu(&self, caps: &mut HardwareCapabilities) {
        if let Some(out) = self.tool_ok(&ToolCommand::new(tools::LSPCI).arg("-nn")) {
            for line in out.lines() {
                let lower = line.to_lowercase();
                if !(lower.contains("vga") || lower.contains("3d")) {
                    continue;
                }
                if lower.contains("nvidia") {
                    caps.has_dgpu = true;
                    caps.dgpu_name = extract_gpu_name(line);
                } else if lower.contains("amd") && lower.contains("radeon") {
                    if lower.contains("integrated") {
                        caps.igpu_name = extract_gpu_name(line);
                    } else {
                        caps.has_dgpu = true;
                        caps.dgpu_name = extract_gpu_name(line);
                    }
                } else if lower.contains("intel") {
                    caps.igpu_name = extract_gpu_name(line);
                }
            }
        }

        caps.has_gpu_switching = caps.sysfs_paths.has(WmiAttribute::GpuMuxMode)
            || caps.sysfs_paths.has(WmiAttribute::DgpuDisable)
            || self.tools.is_installed(tools::SUPERGFXCTL);
    }

    fn detect_anime_matrix(&self, caps: &mut HardwareCapabilities) {
        if let Some(path) = paths::ANIME_MATRIX_PATHS.iter().find(|p| self.sysfs.exists(p)) {
            debug!(target: "armoury::detect", "Found Anime Matrix at {}", path);
            caps.has_anime_matrix = true;
            return;
        }
        caps.has_anime_matrix = self
            .tool_ok(&ToolCommand::new(tools::ASUSCTL).args(["anime", "-h"]))
            .is_some_and(|out| !out.to_lowercase().contains("error"));
    }

    fn detect_cpu(&self, caps: &mut HardwareCapabilities) {
        let (model, cores) = parse_cpuinfo(&self.sysfs.read(paths::PROC_CPUINFO).unwrap_or_default());
        caps.cpu_model = model;
        caps.cpu_cores = cores;
    }

    fn log_capabilities(&self, caps: &HardwareCapabilities) {
        info!(target: "armoury::detect", "=== Hardware Detection Results ===");
        info!(target: "armoury::detect", "Model: {}", caps.model_name);
        info!(target: "armoury::detect", "Family: {}", caps.model_family);
        info!(target: "armoury::detect", "CPU: {} ({} cores)", caps.cpu_model, caps.cpu_cores);
        if caps.has_dgpu {
            info!(target: "armoury::detect", "iGPU: {}", caps.igpu_name);
            info!(target: "armoury::detect", "dGPU: {}", caps.dgpu_name);
        } else {
            info!(target: "armoury::detect", "GPU: {}", caps.igpu_name);
        }

        let features = caps.feature_names();
        if features.is_empty() {
            info!(target: "armoury::detect", "Available Features: None detected");
        } else {
            info!(target: "armoury::detect", "Available Features: {}", features.join(", "));
        }
    }
}
