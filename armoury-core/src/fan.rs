//! Fan facet
//!
//! Exactly one backend is active: a vendor hwmon node with `pwm{N}` files
//! (direct control), or `asusctl fan-curve` (curves only, two logical fans).

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::command::{run_checked, ToolCommand, ToolRunner};
use crate::constants::{fan, paths, tools};
use crate::error::{ArmouryError, Result};
use crate::sysfs::Sysfs;

/// `pwm{N}_enable` state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanMode {
    Full,
    Manual,
    Auto,
}

impl FanMode {
    pub fn enable_value(&self) -> i64 {
        match self {
            FanMode::Full => fan::enable::FULL,
            FanMode::Manual => fan::enable::MANUAL,
            FanMode::Auto => fan::enable::AUTO,
        }
    }

    pub fn from_enable_value(value: i64) -> Option<Self> {
        match value {
            fan::enable::FULL => Some(FanMode::Full),
            fan::enable::MANUAL => Some(FanMode::Manual),
            fan::enable::AUTO => Some(FanMode::Auto),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FanMode::Full => "full",
            FanMode::Manual => "manual",
            FanMode::Auto => "auto",
        }
    }
}

impl fmt::Display for FanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FanMode {
    type Err = ArmouryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "full" => Ok(FanMode::Full),
            "manual" => Ok(FanMode::Manual),
            "auto" => Ok(FanMode::Auto),
            _ => Err(ArmouryError::invalid_mode("fan", s)),
        }
    }
}

/// Snapshot of one fan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FanInfo {
    pub fan_id: u32,
    pub name: String,
    pub current_rpm: u32,
    pub pwm_value: u8,
    pub pwm_enabled: FanMode,
}

/// One point of a temperature/speed curve.
///
/// [`FanCurvePoint::new`] clamps both fields; deserialized points keep their
/// raw values so curve validation can reject them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FanCurvePoint {
    #[serde(rename = "temp")]
    pub temperature: i32,
    #[serde(rename = "speed")]
    pub speed_percent: i32,
}

impl FanCurvePoint {
    pub fn new(temperature: i32, speed_percent: i32) -> Self {
        Self {
            temperature: temperature.clamp(0, 100),
            speed_percent: speed_percent.clamp(0, 100),
        }
    }

    pub fn is_valid(&self) -> bool {
        (0..=100).contains(&self.temperature) && (0..=100).contains(&self.speed_percent)
    }
}

/// Sort ascending by temperature and validate every point
pub fn normalize_curve(points: &[FanCurvePoint]) -> Result<Vec<FanCurvePoint>> {
    if points.is_empty() {
        return Err(ArmouryError::InvalidCurve("empty fan curve".to_string()));
    }

    let mut sorted = points.to_vec();
    sorted.sort_by_key(|p| p.temperature);

    if let Some(bad) = sorted.iter().find(|p| !p.is_valid()) {
        return Err(ArmouryError::InvalidCurve(format!(
            "point {}c:{}% out of range",
            bad.temperature, bad.speed_percent
        )));
    }
    Ok(sorted)
}

/// `asusctl` curve syntax: `30c:20%,50c:40%`
pub fn format_curve(points: &[FanCurvePoint]) -> String {
    points
        .iter()
        .map(|p| format!("{}c:{}%", p.temperature, p.speed_percent))
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse `asusctl fan-curve -g` output; `None` when no point parses
pub fn parse_curve(output: &str) -> Option<Vec<FanCurvePoint>> {
    let points: Vec<FanCurvePoint> = output
        .split(',')
        .filter_map(|part| {
            let (temp, speed) = part.trim().split_once(':')?;
            let temp = temp.trim().trim_end_matches('c').parse().ok()?;
            let speed = speed.trim().trim_end_matches('%').parse().ok()?;
            Some(FanCurvePoint { temperature: temp, speed_percent: speed })
        })
        .collect();
    (!points.is_empty()).then_some(points)
}

/// `round(percent * 255 / 100)` after clamping to 0-100
pub fn percent_to_pwm(percent: i32) -> u8 {
    let percent = percent.clamp(0, 100) as f64;
    (percent * fan::PWM_MAX / 100.0).round() as u8
}

/// Pull `fan{id}_input: <float>` out of `sensors -u`
fn parse_sensors_rpm(output: &str, fan_id: u32) -> Option<u32> {
    let key = format!("fan{}_input", fan_id);
    output
        .lines()
        .filter(|line| line.contains(&key))
        .find_map(|line| line.split(':').nth(1)?.trim().parse::<f64>().ok())
        .map(|rpm| rpm as u32)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FanBackend {
    Hwmon { dir: PathBuf, count: u32 },
    Tool,
    None,
}

/// Fan speed and curve control
pub struct FanController {
    sysfs: Sysfs,
    tools: Arc<dyn ToolRunner>,
    backend: FanBackend,
}

impl FanController {
    pub fn new(sysfs: Sysfs, tools: Arc<dyn ToolRunner>) -> Self {
        let backend = Self::probe(&sysfs, tools.as_ref());
        debug!(target: "armoury::fan", "Fan controller backend: {:?}", backend);
        Self { sysfs, tools, backend }
    }

    fn probe(sysfs: &Sysfs, tools: &dyn ToolRunner) -> FanBackend {
        for dir in sysfs.list_dir(paths::HWMON_BASE) {
            let is_asus = sysfs
                .read(dir.join("name"))
                .map(|name| name.to_lowercase().contains("asus"))
                .unwrap_or(false);
            if !is_asus || !sysfs.exists(dir.join("pwm1")) {
                continue;
            }

            let count = (1..=fan::MAX_FANS)
                .filter(|i| sysfs.exists(dir.join(format!("fan{}_input", i))))
                .max()
                .unwrap_or(0);
            debug!(target: "armoury::fan", "Found ASUS hwmon at {} with {} fans", dir.display(), count);
            return FanBackend::Hwmon { dir, count };
        }

        if tools.is_installed(tools::ASUSCTL) {
            return FanBackend::Tool;
        }
        FanBackend::None
    }

    pub fn is_available(&self) -> bool {
        self.backend != FanBackend::None
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            FanBackend::Hwmon { .. } => "hwmon",
            FanBackend::Tool => "asusctl",
            FanBackend::None => "none",
        }
    }

    pub fn fan_count(&self) -> u32 {
        match self.backend {
            FanBackend::Hwmon { count, .. } => count,
            FanBackend::Tool => fan::TOOL_FAN_COUNT,
            FanBackend::None => 0,
        }
    }

    /// Fan ids addressed by `fan_id` (0 = every fan)
    fn targets(&self, fan_id: u32) -> Vec<u32> {
        if fan_id == 0 {
            (1..=self.fan_count()).collect()
        } else {
            vec![fan_id]
        }
    }

    pub fn get_fan_info(&self, fan_id: u32) -> Option<FanInfo> {
        if fan_id < 1 || fan_id > self.fan_count() {
            return None;
        }

        match &self.backend {
            FanBackend::Hwmon { dir, .. } => Some(FanInfo {
                fan_id,
                name: self
                    .sysfs
                    .read(dir.join(format!("fan{}_label", fan_id)))
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| format!("Fan {}", fan_id)),
                current_rpm: self
                    .sysfs
                    .read_parsed(dir.join(format!("fan{}_input", fan_id)))
                    .unwrap_or(0),
                pwm_value: self
                    .sysfs
                    .read_parsed(dir.join(format!("pwm{}", fan_id)))
                    .unwrap_or(0),
                pwm_enabled: self
                    .sysfs
                    .read_parsed(dir.join(format!("pwm{}_enable", fan_id)))
                    .and_then(FanMode::from_enable_value)
                    .unwrap_or(FanMode::Auto),
            }),
            FanBackend::Tool => {
                let cmd = ToolCommand::new(tools::ASUSCTL).args(["fan-curve", "-g"]);
                run_checked(self.tools.as_ref(), &cmd).ok()?;
                Some(FanInfo {
                    fan_id,
                    name: if fan_id == 1 { "Fan 1".to_string() } else { "GPU Fan".to_string() },
                    current_rpm: self.rpm_from_sensors(fan_id).unwrap_or(0),
                    pwm_value: fan::PLACEHOLDER_PWM,
                    pwm_enabled: FanMode::Auto,
                })
            }
            FanBackend::None => None,
        }
    }

    fn rpm_from_sensors(&self, fan_id: u32) -> Option<u32> {
        let cmd = ToolCommand::new(tools::SENSORS).arg("-u");
        let out = run_checked(self.tools.as_ref(), &cmd).ok()?;
        parse_sensors_rpm(&out, fan_id)
    }

    pub fn get_all_fans(&self) -> Vec<FanInfo> {
        (1..=self.fan_count()).filter_map(|id| self.get_fan_info(id)).collect()
    }

    /// Write the enable state to every targeted fan; false if any write failed
    pub fn set_fan_mode(&self, mode: FanMode, fan_id: u32) -> bool {
        match &self.backend {
            FanBackend::Hwmon { dir, .. } => {
                let mut success = true;
                for id in self.targets(fan_id) {
                    let path = dir.join(format!("pwm{}_enable", id));
                    if let Err(e) = self.sysfs.try_write(&path, mode.enable_value()) {
                        error!(target: "armoury::fan", "Failed to set fan {} mode: {}", id, e);
                        success = false;
                    }
                }
                success
            }
            FanBackend::Tool => {
                warn!(target: "armoury::fan", "Fan mode control via asusctl not directly supported");
                false
            }
            FanBackend::None => false,
        }
    }

    /// Switch to manual and write a fixed duty cycle (hwmon only)
    pub fn set_fan_speed(&self, speed_percent: i32, fan_id: u32) -> bool {
        let percent = speed_percent.clamp(0, 100);
        let pwm = percent_to_pwm(percent);

        let FanBackend::Hwmon { dir, .. } = &self.backend else {
            warn!(target: "armoury::fan", "Fixed fan speed requires the hwmon backend");
            return false;
        };

        info!(target: "armoury::fan", "Setting fan {} to {}% (PWM: {})", fan_id, percent, pwm);

        let mut success = true;
        for id in self.targets(fan_id) {
            let enable = dir.join(format!("pwm{}_enable", id));
            if !self.sysfs.write(&enable, FanMode::Manual.enable_value()) {
                warn!(target: "armoury::fan", "Could not enable manual mode for fan {}", id);
            }
            if let Err(e) = self.sysfs.try_write(dir.join(format!("pwm{}", id)), pwm) {
                error!(target: "armoury::fan", "Failed to set fan {} speed: {}", id, e);
                success = false;
            }
        }
        success
    }

    fn apply_curve(&self, points: &[FanCurvePoint], fan_id: u32) -> Result<()> {
        let curve = normalize_curve(points)?;

        if self.backend != FanBackend::Tool {
            return Err(ArmouryError::unsupported(
                "fan curves require asusctl or a background service",
            ));
        }

        info!(target: "armoury::fan", "Setting fan curve with {} points", curve.len());
        let formatted = format_curve(&curve);

        for (id, name) in [(1, "cpu"), (2, "gpu")] {
            if fan_id == 0 || fan_id == id {
                let cmd = ToolCommand::new(tools::ASUSCTL)
                    .args(["fan-curve", "-m", name, "-D"])
                    .arg(formatted.as_str());
                run_checked(self.tools.as_ref(), &cmd)?;
            }
        }
        Ok(())
    }

    /// Apply a curve through `asusctl`; fan_id 0 = both, 1 = cpu, 2 = gpu
    pub fn set_fan_curve(&self, points: &[FanCurvePoint], fan_id: u32) -> bool {
        match self.apply_curve(points, fan_id) {
            Ok(()) => true,
            Err(e) => {
                error!(target: "armoury::fan", "Failed to set fan curve: {}", e);
                false
            }
        }
    }

    pub fn reset_to_auto(&self) -> bool {
        self.set_fan_mode(FanMode::Auto, 0)
    }

    /// Current curve as reported by `asusctl` (1 = cpu, otherwise gpu)
    pub fn get_fan_curve(&self, fan_id: u32) -> Option<Vec<FanCurvePoint>> {
        if self.backend != FanBackend::Tool {
            return None;
        }
        let name = if fan_id == 1 { "cpu" } else { "gpu" };
        let cmd = ToolCommand::new(tools::ASUSCTL).args(["fan-curve", "-m", name, "-g"]);
        let out = run_checked(self.tools.as_ref(), &cmd).ok()?;
        parse_curve(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{MockToolRunner, ToolOutput};
    use crate::test_utils::{no_tools, FakeSysfs};

    const HWMON: &str = "/sys/class/hwmon/hwmon4";

    fn hwmon_fixture() -> FakeSysfs {
        let fake = FakeSysfs::new();
        fake.file("/sys/class/hwmon/hwmon0/name", "acpitz");
        fake.file(&format!("{}/name", HWMON), "asus\n");
        fake.file(&format!("{}/pwm1", HWMON), "80");
        fake.file(&format!("{}/pwm1_enable", HWMON), "2");
        fake.file(&format!("{}/fan1_input", HWMON), "2300");
        fake.file(&format!("{}/fan1_label", HWMON), "cpu_fan");
        fake.file(&format!("{}/pwm2", HWMON), "0");
        fake.file(&format!("{}/pwm2_enable", HWMON), "2");
        fake.file(&format!("{}/fan2_input", HWMON), "0");
        fake
    }

    fn tool_controller(tools: MockToolRunner) -> (FakeSysfs, FanController) {
        let fake = FakeSysfs::new();
        let fans = FanController::new(fake.sysfs(), Arc::new(tools));
        (fake, fans)
    }

    #[test]
    fn test_hwmon_probe_and_info() {
        let fake = hwmon_fixture();
        let fans = FanController::new(fake.sysfs(), Arc::new(no_tools()));

        assert_eq!(fans.backend_name(), "hwmon");
        assert_eq!(fans.fan_count(), 2);

        let info = fans.get_fan_info(1).unwrap();
        assert_eq!(info.name, "cpu_fan");
        assert_eq!(info.current_rpm, 2300);
        assert_eq!(info.pwm_value, 80);
        assert_eq!(info.pwm_enabled, FanMode::Auto);

        assert_eq!(fans.get_fan_info(2).unwrap().name, "Fan 2");
        assert!(fans.get_fan_info(3).is_none());
        assert_eq!(fans.get_all_fans().len(), 2);
    }

    #[test]
    fn test_set_mode_attempts_every_fan() {
        let fake = hwmon_fixture();
        // pwm2_enable becomes unwritable
        std::fs::remove_file(fake.sysfs().resolve(format!("{}/pwm2_enable", HWMON))).unwrap();
        fake.dir(&format!("{}/pwm2_enable", HWMON));
        let fans = FanController::new(fake.sysfs(), Arc::new(no_tools()));

        assert!(!fans.set_fan_mode(FanMode::Full, 0));
        assert_eq!(fake.read(&format!("{}/pwm1_enable", HWMON)), "0");
    }

    #[test]
    fn test_set_speed_clamps_and_converts() {
        let fake = hwmon_fixture();
        let fans = FanController::new(fake.sysfs(), Arc::new(no_tools()));

        assert!(fans.set_fan_speed(150, 1));
        assert_eq!(fake.read(&format!("{}/pwm1", HWMON)), "255");
        assert_eq!(fake.read(&format!("{}/pwm1_enable", HWMON)), "1");

        assert!(fans.set_fan_speed(50, 0));
        assert_eq!(fake.read(&format!("{}/pwm1", HWMON)), "128");
        assert_eq!(fake.read(&format!("{}/pwm2", HWMON)), "128");

        assert!(fans.set_fan_speed(-20, 2));
        assert_eq!(fake.read(&format!("{}/pwm2", HWMON)), "0");
    }

    #[test]
    fn test_hwmon_rejects_curves() {
        let fake = hwmon_fixture();
        let fans = FanController::new(fake.sysfs(), Arc::new(no_tools()));
        assert!(!fans.set_fan_curve(&[FanCurvePoint::new(30, 20)], 0));
        assert!(fans.get_fan_curve(1).is_none());
    }

    #[test]
    fn test_curve_sorted_for_tool() {
        let mut tools = MockToolRunner::new();
        tools.expect_is_installed().return_const(true);
        tools
            .expect_run()
            .withf(|cmd| cmd.to_string() == "asusctl fan-curve -m cpu -D 30c:20%,70c:60%,80c:80%")
            .times(1)
            .returning(|_| ToolOutput::ok(""));
        tools
            .expect_run()
            .withf(|cmd| cmd.to_string() == "asusctl fan-curve -m gpu -D 30c:20%,70c:60%,80c:80%")
            .times(1)
            .returning(|_| ToolOutput::ok(""));

        let (_fake, fans) = tool_controller(tools);
        assert_eq!(fans.fan_count(), 2);

        let curve = [
            FanCurvePoint::new(80, 80),
            FanCurvePoint::new(30, 20),
            FanCurvePoint::new(70, 60),
        ];
        assert!(fans.set_fan_curve(&curve, 0));
    }

    #[test]
    fn test_invalid_curve_rejected_without_writes() {
        let mut tools = MockToolRunner::new();
        tools.expect_is_installed().return_const(true);
        tools.expect_run().never();

        let (_fake, fans) = tool_controller(tools);
        let curve = [
            FanCurvePoint { temperature: 150, speed_percent: 50 },
            FanCurvePoint::new(30, 20),
        ];
        assert!(!fans.set_fan_curve(&curve, 0));
        assert!(!fans.set_fan_curve(&[], 0));
    }

    #[test]
    fn test_curve_stops_at_first_failure() {
        let mut tools = MockToolRunner::new();
        tools.expect_is_installed().return_const(true);
        tools
            .expect_run()
            .times(1)
            .returning(|_| ToolOutput::failed(1, "no such profile"));

        let (_fake, fans) = tool_controller(tools);
        assert!(!fans.set_fan_curve(&[FanCurvePoint::new(50, 50)], 0));
    }

    #[test]
    fn test_tool_fan_info_and_curve_read() {
        let mut tools = MockToolRunner::new();
        tools.expect_is_installed().return_const(true);
        tools
            .expect_run()
            .withf(|cmd| cmd.to_string() == "asusctl fan-curve -g")
            .returning(|_| ToolOutput::ok("profile: balanced"));
        tools
            .expect_run()
            .withf(|cmd| cmd.to_string() == "sensors -u")
            .returning(|_| ToolOutput::ok("asus-isa-0000\ncpu_fan:\n  fan1_input: 2900.000\n"));
        tools
            .expect_run()
            .withf(|cmd| cmd.to_string() == "asusctl fan-curve -m cpu -g")
            .returning(|_| ToolOutput::ok("30c:10%,50c:25%, 70c:50%"));

        let (_fake, fans) = tool_controller(tools);

        let cpu = fans.get_fan_info(1).unwrap();
        assert_eq!(cpu.current_rpm, 2900);
        assert_eq!(cpu.pwm_value, fan::PLACEHOLDER_PWM);
        let gpu = fans.get_fan_info(2).unwrap();
        assert_eq!(gpu.name, "GPU Fan");
        assert_eq!(gpu.current_rpm, 0);

        let curve = fans.get_fan_curve(1).unwrap();
        assert_eq!(curve.len(), 3);
        assert_eq!(curve[2], FanCurvePoint::new(70, 50));

        assert!(!fans.set_fan_mode(FanMode::Auto, 0));
        assert!(!fans.set_fan_speed(50, 1));
    }

    #[test]
    fn test_point_and_mode_helpers() {
        assert_eq!(FanCurvePoint::new(120, -5), FanCurvePoint::new(100, 0));
        assert_eq!(percent_to_pwm(100), 255);
        assert_eq!(percent_to_pwm(1), 3);
        assert_eq!("AUTO".parse::<FanMode>().unwrap(), FanMode::Auto);
        assert!("turbo".parse::<FanMode>().is_err());
        assert_eq!(parse_curve("garbage"), None);
    }
}
