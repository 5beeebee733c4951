//! All hardware facets, probed once against one filesystem root

use std::sync::Arc;

use tracing::info;

use crate::battery::BatteryController;
use crate::command::{SystemRunner, ToolRunner};
use crate::cpu::CpuController;
use crate::detect::Detector;
use crate::fan::FanController;
use crate::resolver::CapabilityMap;
use crate::rgb::RgbController;
use crate::sysfs::Sysfs;
use crate::thermal::ThermalMonitor;

/// The five facets plus the capability map they were built from.
///
/// Backend selection happens here, once; facets never re-probe.
pub struct Hardware {
    pub sysfs: Sysfs,
    pub tools: Arc<dyn ToolRunner>,
    pub capabilities: CapabilityMap,
    pub detector: Detector,
    pub cpu: CpuController,
    pub fan: FanController,
    pub rgb: RgbController,
    pub battery: BatteryController,
    pub thermal: ThermalMonitor,
}

impl Hardware {
    pub fn probe(sysfs: Sysfs, tools: Arc<dyn ToolRunner>) -> Self {
        let capabilities = CapabilityMap::resolve(&sysfs);

        let cpu = CpuController::new(sysfs.clone(), Arc::clone(&tools), &capabilities);
        let fan = FanController::new(sysfs.clone(), Arc::clone(&tools));
        let rgb = RgbController::new(&sysfs, Arc::clone(&tools), &capabilities);
        let battery = BatteryController::new(sysfs.clone(), &capabilities);
        let thermal = ThermalMonitor::new(sysfs.clone(), Arc::clone(&tools));
        let detector = Detector::new(sysfs.clone(), Arc::clone(&tools));

        info!(
            target: "armoury::hardware",
            "Backends: cpu={} fan={} rgb={} battery={}",
            cpu.backend_name(),
            fan.backend_name(),
            rgb.backend_name(),
            if battery.is_available() { "sysfs" } else { "none" }
        );

        Self {
            sysfs,
            tools,
            capabilities,
            detector,
            cpu,
            fan,
            rgb,
            battery,
            thermal,
        }
    }

    /// Probe the real `/` with real external tools
    pub fn system() -> Self {
        Self::probe(Sysfs::system(), Arc::new(SystemRunner::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{no_tools, FakeSysfs};

    #[test]
    fn test_probe_empty_system() {
        let fake = FakeSysfs::new();
        let hw = Hardware::probe(fake.sysfs(), Arc::new(no_tools()));

        assert!(hw.capabilities.is_empty());
        assert!(!hw.cpu.is_available());
        assert!(!hw.fan.is_available());
        assert!(!hw.rgb.is_available());
        assert!(!hw.battery.is_available());
    }

    #[test]
    fn test_probe_wmi_platform() {
        let fake = FakeSysfs::new();
        fake.file("/sys/devices/platform/asus-nb-wmi/throttle_thermal_policy", "0");
        fake.file("/sys/devices/platform/asus-nb-wmi/charge_control_end_threshold", "80");
        let hw = Hardware::probe(fake.sysfs(), Arc::new(no_tools()));

        assert!(hw.cpu.is_available());
        assert!(hw.battery.is_available());
        assert_eq!(hw.battery.get_charge_limit(), Some(80));
    }
}
