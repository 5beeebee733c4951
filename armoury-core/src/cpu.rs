//! CPU performance mode facet
//!
//! Maps the three ASUS thermal policies onto [`CpuMode`]. The sysfs
//! `throttle_thermal_policy` attribute is preferred; `asusctl profile` is the
//! fallback when the attribute is missing or a write to it fails.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::command::{run_checked, ToolCommand, ToolRunner};
use crate::constants::{paths, thermal_policy, tools};
use crate::error::{ArmouryError, Result};
use crate::resolver::{CapabilityMap, WmiAttribute};
use crate::sysfs::Sysfs;

/// CPU performance mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CpuMode {
    Silent,
    Balanced,
    Turbo,
    /// Recognized but not settable
    Manual,
}

impl CpuMode {
    /// Settable modes in cycle order
    pub const CYCLE: [CpuMode; 3] = [CpuMode::Silent, CpuMode::Balanced, CpuMode::Turbo];

    pub fn as_str(&self) -> &'static str {
        match self {
            CpuMode::Silent => "silent",
            CpuMode::Balanced => "balanced",
            CpuMode::Turbo => "turbo",
            CpuMode::Manual => "manual",
        }
    }

    /// `throttle_thermal_policy` code
    pub fn thermal_policy(&self) -> Option<i64> {
        match self {
            CpuMode::Balanced => Some(thermal_policy::BALANCED),
            CpuMode::Turbo => Some(thermal_policy::TURBO),
            CpuMode::Silent => Some(thermal_policy::SILENT),
            CpuMode::Manual => None,
        }
    }

    pub fn from_thermal_policy(code: i64) -> Option<Self> {
        Self::CYCLE.into_iter().find(|m| m.thermal_policy() == Some(code))
    }

    /// Profile name understood by `asusctl profile -P`
    pub fn tool_profile(&self) -> Option<&'static str> {
        match self {
            CpuMode::Silent => Some("Quiet"),
            CpuMode::Balanced => Some("Balanced"),
            CpuMode::Turbo => Some("Performance"),
            CpuMode::Manual => None,
        }
    }

    /// Interpret `asusctl profile -p` output
    pub fn from_tool_output(output: &str) -> Option<Self> {
        let lower = output.to_lowercase();
        if lower.contains("silent") || lower.contains("quiet") {
            Some(CpuMode::Silent)
        } else if lower.contains("performance") || lower.contains("turbo") {
            Some(CpuMode::Turbo)
        } else if lower.contains("balanced") {
            Some(CpuMode::Balanced)
        } else {
            None
        }
    }
}

impl fmt::Display for CpuMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CpuMode {
    type Err = ArmouryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "silent" => Ok(CpuMode::Silent),
            "balanced" => Ok(CpuMode::Balanced),
            "turbo" => Ok(CpuMode::Turbo),
            "manual" => Ok(CpuMode::Manual),
            _ => Err(ArmouryError::invalid_mode("CPU", s)),
        }
    }
}

/// Point-in-time `cpufreq` readings for cpu0
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CpuFrequencyInfo {
    pub current_freq_mhz: Option<f64>,
    pub min_freq_mhz: Option<f64>,
    pub max_freq_mhz: Option<f64>,
    pub governor: Option<String>,
    pub scaling_driver: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CpuBackend {
    ThermalPolicy { path: PathBuf, tool_fallback: bool },
    Tool,
    None,
}

/// CPU performance mode control
pub struct CpuController {
    sysfs: Sysfs,
    tools: Arc<dyn ToolRunner>,
    backend: CpuBackend,
}

impl CpuController {
    pub fn new(sysfs: Sysfs, tools: Arc<dyn ToolRunner>, caps: &CapabilityMap) -> Self {
        let has_tool = tools.is_installed(tools::ASUSCTL);
        let backend = match caps.get(WmiAttribute::ThrottleThermalPolicy) {
            Some(path) => CpuBackend::ThermalPolicy {
                path: path.to_path_buf(),
                tool_fallback: has_tool,
            },
            None if has_tool => CpuBackend::Tool,
            None => CpuBackend::None,
        };
        debug!(target: "armoury::cpu", "CPU controller backend: {:?}", backend);

        Self { sysfs, tools, backend }
    }

    pub fn is_available(&self) -> bool {
        self.backend != CpuBackend::None
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            CpuBackend::ThermalPolicy { .. } => "sysfs",
            CpuBackend::Tool => "asusctl",
            CpuBackend::None => "none",
        }
    }

    fn tool_enabled(&self) -> bool {
        matches!(
            self.backend,
            CpuBackend::Tool | CpuBackend::ThermalPolicy { tool_fallback: true, .. }
        )
    }

    /// Current mode, or `None` when no backend can tell
    pub fn get_current_mode(&self) -> Option<CpuMode> {
        if let CpuBackend::ThermalPolicy { path, .. } = &self.backend {
            if let Some(mode) = self
                .sysfs
                .read_parsed::<i64>(path)
                .and_then(CpuMode::from_thermal_policy)
            {
                return Some(mode);
            }
        }

        if self.tool_enabled() {
            let cmd = ToolCommand::new(tools::ASUSCTL).args(["profile", "-p"]);
            if let Ok(out) = run_checked(self.tools.as_ref(), &cmd) {
                return CpuMode::from_tool_output(&out);
            }
        }

        None
    }

    fn set_via_tool(&self, mode: CpuMode) -> Result<()> {
        let profile = mode
            .tool_profile()
            .ok_or_else(|| ArmouryError::invalid_mode("CPU", mode.as_str()))?;
        let cmd = ToolCommand::new(tools::ASUSCTL).args(["profile", "-P", profile]);
        run_checked(self.tools.as_ref(), &cmd).map(|_| ())
    }

    /// Apply a mode; `Manual` is always rejected
    pub fn set_mode(&self, mode: CpuMode) -> bool {
        let Some(policy) = mode.thermal_policy() else {
            warn!(target: "armoury::cpu", "Manual CPU mode is not supported");
            return false;
        };

        info!(target: "armoury::cpu", "Setting CPU mode to: {}", mode);

        if let CpuBackend::ThermalPolicy { path, .. } = &self.backend {
            match self.sysfs.try_write(path, policy) {
                Ok(()) => {
                    info!(target: "armoury::cpu", "CPU mode set to {} via sysfs", mode);
                    return true;
                }
                Err(e) => warn!(target: "armoury::cpu", "{}", e),
            }
        }

        if self.tool_enabled() {
            match self.set_via_tool(mode) {
                Ok(()) => {
                    info!(target: "armoury::cpu", "CPU mode set to {} via asusctl", mode);
                    return true;
                }
                Err(e) => error!(target: "armoury::cpu", "Failed to set CPU mode: {}", e),
            }
        }

        false
    }

    pub fn get_available_modes(&self) -> Vec<CpuMode> {
        if self.is_available() {
            CpuMode::CYCLE.to_vec()
        } else {
            Vec::new()
        }
    }

    /// Advance to the next mode; an unknown current mode resets to balanced
    pub fn cycle_mode(&self) -> Option<CpuMode> {
        let modes = self.get_available_modes();
        if modes.is_empty() {
            return None;
        }

        let next = self
            .get_current_mode()
            .and_then(|current| modes.iter().position(|m| *m == current))
            .map(|idx| modes[(idx + 1) % modes.len()])
            .unwrap_or(CpuMode::Balanced);

        self.set_mode(next).then_some(next)
    }

    pub fn get_cpu_frequency_info(&self) -> CpuFrequencyInfo {
        let dir = PathBuf::from(paths::CPUFREQ_DIR);
        let mhz = |name: &str| {
            self.sysfs
                .read_parsed::<f64>(dir.join(name))
                .map(|khz| khz / 1000.0)
        };
        let text = |name: &str| self.sysfs.read(dir.join(name)).filter(|s| !s.is_empty());

        CpuFrequencyInfo {
            current_freq_mhz: mhz("scaling_cur_freq"),
            min_freq_mhz: mhz("scaling_min_freq"),
            max_freq_mhz: mhz("scaling_max_freq"),
            governor: text("scaling_governor"),
            scaling_driver: text("scaling_driver"),
        }
    }

    /// CPU busy percentage from a single `/proc/stat` snapshot.
    ///
    /// This is the ratio since boot, not a rate over an interval.
    pub fn get_cpu_usage(&self) -> Option<f64> {
        parse_cpu_usage(&self.sysfs.read(paths::PROC_STAT)?)
    }
}

/// `1 - idle/total` over the first seven counters of the aggregate `cpu` line
pub fn parse_cpu_usage(stat: &str) -> Option<f64> {
    let line = stat.lines().next()?;
    let fields = line.strip_prefix("cpu ")?;
    let values: Vec<u64> = fields
        .split_whitespace()
        .take(7)
        .map(str::parse)
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    if values.len() < 5 {
        return None;
    }

    let idle = (values[3] + values[4]) as f64;
    let total: u64 = values.iter().sum();
    if total == 0 {
        return None;
    }
    Some((1000.0 * (1.0 - idle / total as f64)).round() / 10.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{MockToolRunner, ToolOutput};
    use crate::test_utils::{no_tools, FakeSysfs};

    const POLICY: &str = "/sys/devices/platform/asus-nb-wmi/throttle_thermal_policy";

    fn sysfs_controller(fake: &FakeSysfs, tools: MockToolRunner) -> CpuController {
        let sysfs = fake.sysfs();
        let caps = CapabilityMap::resolve(&sysfs);
        CpuController::new(sysfs, Arc::new(tools), &caps)
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Turbo".parse::<CpuMode>().unwrap(), CpuMode::Turbo);
        assert!("ludicrous".parse::<CpuMode>().is_err());
        assert_eq!(CpuMode::from_thermal_policy(2), Some(CpuMode::Silent));
        assert_eq!(CpuMode::from_thermal_policy(7), None);
        assert_eq!(
            CpuMode::from_tool_output("Active profile is Performance"),
            Some(CpuMode::Turbo)
        );
    }

    #[test]
    fn test_sysfs_read_and_idempotent_set() {
        let fake = FakeSysfs::new();
        fake.file(POLICY, "2\n");
        let cpu = sysfs_controller(&fake, no_tools());

        assert!(cpu.is_available());
        assert_eq!(cpu.get_current_mode(), Some(CpuMode::Silent));

        assert!(cpu.set_mode(CpuMode::Balanced));
        let first = fake.read(POLICY);
        assert!(cpu.set_mode(CpuMode::Balanced));
        assert_eq!(fake.read(POLICY), first);
        assert_eq!(first, "0");
    }

    #[test]
    fn test_manual_rejected() {
        let fake = FakeSysfs::new();
        fake.file(POLICY, "1");
        let cpu = sysfs_controller(&fake, no_tools());

        assert!(!cpu.set_mode(CpuMode::Manual));
        assert_eq!(fake.read(POLICY), "1");
    }

    #[test]
    fn test_cycle_from_silent_and_unknown() {
        let fake = FakeSysfs::new();
        fake.file(POLICY, "2");
        let cpu = sysfs_controller(&fake, no_tools());

        assert_eq!(cpu.cycle_mode(), Some(CpuMode::Balanced));
        assert_eq!(fake.read(POLICY), "0");

        fake.file(POLICY, "9");
        assert_eq!(cpu.get_current_mode(), None);
        assert_eq!(cpu.cycle_mode(), Some(CpuMode::Balanced));
        assert_eq!(fake.read(POLICY), "0");
    }

    #[test]
    fn test_unavailable() {
        let fake = FakeSysfs::new();
        let cpu = sysfs_controller(&fake, no_tools());

        assert!(!cpu.is_available());
        assert!(cpu.get_available_modes().is_empty());
        assert_eq!(cpu.cycle_mode(), None);
        assert!(!cpu.set_mode(CpuMode::Turbo));
    }

    #[test]
    fn test_tool_backend() {
        let fake = FakeSysfs::new();
        let mut tools = MockToolRunner::new();
        tools.expect_is_installed().return_const(true);
        tools
            .expect_run()
            .withf(|cmd| cmd.to_string() == "asusctl profile -p")
            .returning(|_| ToolOutput::ok("Active profile is Quiet\n"));
        tools
            .expect_run()
            .withf(|cmd| cmd.to_string() == "asusctl profile -P Performance")
            .times(1)
            .returning(|_| ToolOutput::ok(""));

        let cpu = sysfs_controller(&fake, tools);
        assert_eq!(cpu.backend_name(), "asusctl");
        assert_eq!(cpu.get_current_mode(), Some(CpuMode::Silent));
        assert!(cpu.set_mode(CpuMode::Turbo));
    }

    #[test]
    fn test_sysfs_write_failure_falls_back_to_tool() {
        let fake = FakeSysfs::new();
        fake.dir(POLICY); // a directory cannot be written as a file
        let mut tools = MockToolRunner::new();
        tools.expect_is_installed().return_const(true);
        tools
            .expect_run()
            .withf(|cmd| cmd.to_string() == "asusctl profile -P Balanced")
            .times(1)
            .returning(|_| ToolOutput::ok(""));

        let cpu = sysfs_controller(&fake, tools);
        assert_eq!(cpu.backend_name(), "sysfs");
        assert!(cpu.set_mode(CpuMode::Balanced));
    }

    #[test]
    fn test_frequency_info() {
        let fake = FakeSysfs::new();
        fake.file("/sys/devices/system/cpu/cpu0/cpufreq/scaling_cur_freq", "2400000");
        fake.file("/sys/devices/system/cpu/cpu0/cpufreq/scaling_governor", "powersave");
        let cpu = sysfs_controller(&fake, no_tools());

        let info = cpu.get_cpu_frequency_info();
        assert_eq!(info.current_freq_mhz, Some(2400.0));
        assert_eq!(info.max_freq_mhz, None);
        assert_eq!(info.governor.as_deref(), Some("powersave"));
    }

    #[test]
    fn test_cpu_usage_snapshot() {
        // idle + iowait = 700 of 1000
        let stat = "cpu  100 50 150 600 100 0 0 0 0 0\ncpu0 1 2 3 4 5 6 7\n";
        assert_eq!(parse_cpu_usage(stat), Some(30.0));
        assert_eq!(parse_cpu_usage("intr 1 2 3"), None);
        assert_eq!(parse_cpu_usage("cpu  0 0 0 0 0 0 0"), None);
    }
}
