//! End-to-end tests of the core API on a fake sysfs tree with scripted tools

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use armoury_core::{
    BatteryInfo, CpuMode, FanCurvePoint, Hardware, PerformanceProfile, ProfileDirs,
    ProfileManager, Settings, Sysfs, ToolCommand, ToolOutput, ToolRunner,
};
use mockall::mock;
use parking_lot::Mutex;
use tempfile::TempDir;

const WMI: &str = "/sys/devices/platform/asus-nb-wmi";
const HWMON: &str = "/sys/class/hwmon/hwmon3";

/// Temporary directory standing in for `/`
struct Tree {
    root: TempDir,
}

impl Tree {
    fn new() -> Self {
        Self { root: TempDir::new().unwrap() }
    }

    fn path(&self, logical: &str) -> PathBuf {
        self.root.path().join(logical.trim_start_matches('/'))
    }

    fn file(&self, logical: &str, content: &str) {
        let path = self.path(logical);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn read(&self, logical: &str) -> String {
        fs::read_to_string(self.path(logical)).unwrap().trim().to_string()
    }

    fn sysfs(&self) -> Sysfs {
        Sysfs::with_root(self.root.path())
    }

    /// WMI thermal policy plus charge threshold, one battery on AC
    fn laptop() -> Self {
        let tree = Self::new();
        tree.file(&format!("{}/throttle_thermal_policy", WMI), "0");
        tree.file(&format!("{}/charge_control_end_threshold", WMI), "100");
        tree.file("/sys/class/power_supply/BAT0/present", "1");
        tree.file("/sys/class/power_supply/AC0/online", "1");
        tree
    }
}

/// `asusctl` is installed; every call succeeds unless its arguments contain
/// a failing fragment. All calls are recorded.
struct ScriptedTools {
    fail_on: Vec<&'static str>,
    calls: Mutex<Vec<ToolCommand>>,
}

impl ScriptedTools {
    fn new(fail_on: &[&'static str]) -> Arc<Self> {
        Arc::new(Self {
            fail_on: fail_on.to_vec(),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls_with(&self, fragment: &str) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.args.iter().any(|a| a == fragment))
            .map(|c| c.args.clone())
            .collect()
    }
}

impl ToolRunner for ScriptedTools {
    fn run(&self, command: &ToolCommand) -> ToolOutput {
        self.calls.lock().push(command.clone());
        if command.program != "asusctl" {
            return ToolOutput::not_found(&command.program);
        }
        if command.args.iter().any(|a| self.fail_on.contains(&a.as_str())) {
            return ToolOutput::failed(1, "boom");
        }
        match command.args.first().map(String::as_str) {
            Some("led-mode") if command.args.get(1).map(String::as_str) == Some("-s") && command.args.len() == 2 => {
                ToolOutput::ok("Static\nBreathing\nRainbow\nPulse\nOff")
            }
            _ => ToolOutput::ok(""),
        }
    }

    fn is_installed(&self, program: &str) -> bool {
        program == "asusctl"
    }
}

fn manager(tree: &Tree, tools: Arc<dyn ToolRunner>, config: &TempDir) -> ProfileManager {
    let hardware = Arc::new(Hardware::probe(tree.sysfs(), tools));
    let settings = Settings::load(Some(config.path().join("config.json")));
    ProfileManager::new(hardware, settings, &ProfileDirs::none())
}

#[test]
fn test_partial_failure_still_becomes_current() {
    let tree = Tree::laptop();
    let config = TempDir::new().unwrap();
    let tools = ScriptedTools::new(&["-D"]);
    let mut profiles = manager(&tree, tools.clone(), &config);

    let report = profiles.apply_profile("Silent").unwrap();

    assert!(!report.success());
    assert_eq!(report.failed, vec!["Fan curve".to_string()]);
    assert_eq!(profiles.current_profile(), Some("Silent"));
    assert_eq!(tree.read(&format!("{}/throttle_thermal_policy", WMI)), "2");
    assert_eq!(tree.read(&format!("{}/charge_control_end_threshold", WMI)), "60");
    assert_eq!(tools.calls_with("-b"), vec![vec!["led-mode", "-b", "0"]]);

    // Persisted even though a facet failed
    let saved = Settings::load(Some(config.path().join("config.json")));
    assert_eq!(saved.active_profile(), Some("Silent"));
}

#[test]
fn test_fan_curve_sorted_for_tool() {
    let tree = Tree::new();
    let tools = ScriptedTools::new(&[]);
    let hw = Hardware::probe(tree.sysfs(), tools.clone());

    let curve = [
        FanCurvePoint::new(80, 80),
        FanCurvePoint::new(30, 20),
        FanCurvePoint::new(70, 60),
    ];
    assert!(hw.fan.set_fan_curve(&curve, 1));

    let applied = tools.calls_with("-D");
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0], vec!["fan-curve", "-m", "cpu", "-D", "30c:20%,70c:60%,80c:80%"]);
}

#[test]
fn test_fan_curve_rejected_in_full() {
    let tree = Tree::new();
    let tools = ScriptedTools::new(&[]);
    let hw = Hardware::probe(tree.sysfs(), tools.clone());

    let curve: Vec<FanCurvePoint> = serde_json::from_str(r#"[{"temp": 30, "speed": 20}, {"temp": 150, "speed": 90}]"#).unwrap();
    assert!(!hw.fan.set_fan_curve(&curve, 0));
    assert!(tools.calls_with("-D").is_empty());
}

#[test]
fn test_fan_speed_clamped() {
    let tree = Tree::new();
    tree.file(&format!("{}/name", HWMON), "asus");
    tree.file(&format!("{}/pwm1", HWMON), "0");
    tree.file(&format!("{}/pwm1_enable", HWMON), "2");
    tree.file(&format!("{}/fan1_input", HWMON), "2100");
    let hw = Hardware::probe(tree.sysfs(), ScriptedTools::new(&[]));

    assert!(hw.fan.set_fan_speed(150, 1));
    assert_eq!(tree.read(&format!("{}/pwm1", HWMON)), "255");
    assert!(hw.fan.set_fan_speed(-20, 1));
    assert_eq!(tree.read(&format!("{}/pwm1", HWMON)), "0");
}

#[test]
fn test_battery_limit_clamped() {
    let tree = Tree::laptop();
    let hw = Hardware::probe(tree.sysfs(), ScriptedTools::new(&[]));

    assert!(hw.battery.set_charge_limit(150));
    assert_eq!(hw.battery.get_charge_limit(), Some(100));
    assert!(hw.battery.set_charge_limit(5));
    assert_eq!(hw.battery.get_charge_limit(), Some(20));
}

#[test]
fn test_battery_absent_has_no_fields() {
    let tree = Tree::laptop();
    tree.file("/sys/class/power_supply/BAT0/present", "0");
    tree.file("/sys/class/power_supply/BAT0/capacity", "77");
    let hw = Hardware::probe(tree.sysfs(), ScriptedTools::new(&[]));

    let info = hw.battery.get_battery_info();
    assert!(!info.present);
    assert_eq!(info, BatteryInfo::default());
}

#[test]
fn test_battery_health() {
    let tree = Tree::laptop();
    tree.file("/sys/class/power_supply/BAT0/energy_full", "45000000");
    tree.file("/sys/class/power_supply/BAT0/energy_full_design", "50000000");
    let hw = Hardware::probe(tree.sysfs(), ScriptedTools::new(&[]));

    assert_eq!(hw.battery.get_battery_info().health, Some(90.0));
}

#[test]
fn test_cycle_and_idempotent_set() {
    let tree = Tree::laptop();
    tree.file(&format!("{}/throttle_thermal_policy", WMI), "2");
    let hw = Hardware::probe(tree.sysfs(), ScriptedTools::new(&[]));

    assert_eq!(hw.cpu.cycle_mode(), Some(CpuMode::Balanced));
    assert_eq!(tree.read(&format!("{}/throttle_thermal_policy", WMI)), "0");

    assert!(hw.cpu.set_mode(CpuMode::Balanced));
    assert!(hw.cpu.set_mode(CpuMode::Balanced));
    assert_eq!(tree.read(&format!("{}/throttle_thermal_policy", WMI)), "0");
}

#[test]
fn test_export_import_round_trip() {
    let tree = Tree::laptop();
    let config = TempDir::new().unwrap();
    let mut profiles = manager(&tree, ScriptedTools::new(&[]), &config);

    let mut custom = PerformanceProfile::new("Travel");
    custom.cpu_mode = "silent".to_string();
    custom.fan_curve.points = vec![FanCurvePoint::new(40, 10), FanCurvePoint::new(85, 70)];
    custom.rgb_config.mode = "breathing".to_string();
    custom.rgb_config.color = "#123456".to_string();
    custom.battery_charge_limit = 70;
    profiles.add_profile(custom.clone()).unwrap();

    let file = config.path().join("travel.json");
    profiles.export_profile("Travel", &file).unwrap();
    profiles.remove_profile("Travel").unwrap();
    assert!(profiles.get_profile("Travel").is_none());

    assert_eq!(profiles.import_profile(&file).unwrap(), "Travel");
    assert_eq!(profiles.get_profile("Travel"), Some(&custom));
}

mock! {
    Tools {}
    impl ToolRunner for Tools {
        fn run(&self, command: &ToolCommand) -> ToolOutput;
        fn is_installed(&self, program: &str) -> bool;
    }
}

#[test]
fn test_cpu_mode_through_tool_only() {
    let tree = Tree::new();
    let mut tools = MockTools::new();
    tools.expect_is_installed().returning(|p| p == "asusctl");
    tools.expect_run().returning(|cmd| match cmd.args.as_slice() {
        [a, b] if a == "profile" && b == "-p" => ToolOutput::ok("Active profile is Quiet\n"),
        [a, b, c] if a == "profile" && b == "-P" && c == "Performance" => ToolOutput::ok(""),
        _ => ToolOutput::failed(1, "unsupported"),
    });
    let hw = Hardware::probe(tree.sysfs(), Arc::new(tools));

    assert_eq!(hw.cpu.backend_name(), "asusctl");
    assert_eq!(hw.cpu.get_current_mode(), Some(CpuMode::Silent));
    assert!(hw.cpu.set_mode(CpuMode::Turbo));
    assert!(!hw.cpu.set_mode(CpuMode::Manual));
}

#[test]
fn test_builtins_protected() {
    let tree = Tree::laptop();
    let config = TempDir::new().unwrap();
    let mut profiles = manager(&tree, ScriptedTools::new(&[]), &config);

    assert!(profiles.remove_profile("Silent").is_err());
    assert!(profiles.remove_profile("Missing").is_err());
    assert_eq!(profiles.profile_names().len(), 4);
}
