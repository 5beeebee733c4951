//! Fake machine for daemon unit tests

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use armoury_core::{Hardware, ProfileDirs, Settings, Sysfs, ToolCommand, ToolOutput, ToolRunner};
use tempfile::TempDir;

use crate::service::ControlService;

/// Runner for a machine without any helper tools
pub struct NoTools;

impl ToolRunner for NoTools {
    fn run(&self, command: &ToolCommand) -> ToolOutput {
        ToolOutput::not_found(&command.program)
    }

    fn is_installed(&self, _program: &str) -> bool {
        false
    }
}

/// ASUS laptop with a WMI thermal policy, a charge threshold, one battery,
/// AC power and a coretemp sensor at 45 C
pub struct Machine {
    root: TempDir,
    config: TempDir,
}

impl Machine {
    pub fn new() -> Self {
        let machine = Self {
            root: TempDir::new().unwrap(),
            config: TempDir::new().unwrap(),
        };
        machine.file("/sys/devices/platform/asus-nb-wmi/throttle_thermal_policy", "0");
        machine.file("/sys/devices/platform/asus-nb-wmi/charge_control_end_threshold", "80");
        machine.file("/sys/class/power_supply/BAT0/present", "1");
        machine.file("/sys/class/power_supply/BAT0/status", "Charging");
        machine.file("/sys/class/power_supply/BAT0/capacity", "64");
        machine.file("/sys/class/power_supply/AC0/online", "1");
        machine.file("/sys/class/hwmon/hwmon1/name", "coretemp");
        machine.file("/sys/class/hwmon/hwmon1/temp1_input", "45000");
        machine.file("/sys/class/thermal/thermal_zone0/type", "acpitz");
        machine.file("/sys/class/thermal/thermal_zone0/temp", "40000");
        machine
    }

    fn path(&self, logical: &str) -> PathBuf {
        self.root.path().join(logical.trim_start_matches('/'))
    }

    pub fn file(&self, logical: &str, content: &str) {
        let path = self.path(logical);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    pub fn read(&self, logical: &str) -> String {
        fs::read_to_string(self.path(logical)).unwrap()
    }

    pub fn settings_path(&self) -> PathBuf {
        self.config.path().join("config.json")
    }

    pub fn write_settings(&self, json: &str) {
        fs::write(self.settings_path(), json).unwrap();
    }

    pub fn hardware(&self) -> Arc<Hardware> {
        Arc::new(Hardware::probe(Sysfs::with_root(self.root.path()), Arc::new(NoTools)))
    }

    pub fn service(&self) -> Arc<ControlService> {
        let settings = Settings::load(Some(self.settings_path()));
        ControlService::new(self.hardware(), settings, &ProfileDirs::none())
    }
}
