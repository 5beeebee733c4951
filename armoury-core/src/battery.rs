//! Battery facet: charge threshold control plus battery and AC telemetry

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::constants::{battery, paths};
use crate::error::{ArmouryError, Result};
use crate::resolver::{CapabilityMap, WmiAttribute};
use crate::sysfs::Sysfs;

/// Named charge thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargePreset {
    MaxLifespan,
    Balanced,
    FullCharge,
}

impl ChargePreset {
    pub fn limit(&self) -> i32 {
        match self {
            ChargePreset::MaxLifespan => battery::PRESET_MAX_LIFESPAN,
            ChargePreset::Balanced => battery::PRESET_BALANCED,
            ChargePreset::FullCharge => battery::PRESET_FULL_CHARGE,
        }
    }
}

impl FromStr for ChargePreset {
    type Err = ArmouryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "max_lifespan" => Ok(ChargePreset::MaxLifespan),
            "balanced" => Ok(ChargePreset::Balanced),
            "full_charge" => Ok(ChargePreset::FullCharge),
            _ => Err(ArmouryError::invalid_value("preset", format!("unknown preset '{}'", s))),
        }
    }
}

/// A numeric power-supply attribute, or its raw text when it is not a number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Int(i64),
    Text(String),
}

impl AttrValue {
    fn parse(raw: String) -> Self {
        raw.parse().map(AttrValue::Int).unwrap_or(AttrValue::Text(raw))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            AttrValue::Text(_) => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Int(v) => write!(f, "{}", v),
            AttrValue::Text(s) => f.write_str(s),
        }
    }
}

/// Battery snapshot; when `present` is false no other field is set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatteryInfo {
    pub present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<AttrValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge_limit: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voltage_now: Option<AttrValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_now: Option<AttrValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy_now: Option<AttrValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy_full: Option<AttrValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy_full_design: Option<AttrValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle_count: Option<AttrValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technology: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voltage_v: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_w: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy_wh: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy_full_wh: Option<f64>,
}

impl BatteryInfo {
    fn absent() -> Self {
        Self::default()
    }

    pub fn is_charging(&self) -> bool {
        self.status.as_deref() == Some("Charging")
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Non-zero integer value of an optional attribute
fn nonzero(value: &Option<AttrValue>) -> Option<i64> {
    value.as_ref()?.as_int().filter(|v| *v != 0)
}

fn micro_to_unit(value: &Option<AttrValue>) -> Option<f64> {
    nonzero(value).map(|v| round_to(v as f64 / battery::MICRO, 2))
}

/// Charge threshold and battery telemetry
pub struct BatteryController {
    sysfs: Sysfs,
    limit_path: Option<PathBuf>,
    battery_dir: Option<PathBuf>,
}

impl BatteryController {
    pub fn new(sysfs: Sysfs, caps: &CapabilityMap) -> Self {
        let limit_path = caps
            .get(WmiAttribute::ChargeControlEndThreshold)
            .map(|p| p.to_path_buf());
        let battery_dir = paths::BATTERY_DIRS
            .iter()
            .find(|dir| sysfs.is_dir(dir))
            .map(PathBuf::from);

        debug!(
            target: "armoury::battery",
            "Battery controller: limit={:?} battery={:?}",
            limit_path,
            battery_dir
        );

        Self { sysfs, limit_path, battery_dir }
    }

    /// Whether the charge threshold can be controlled
    pub fn is_available(&self) -> bool {
        self.limit_path.is_some()
    }

    pub fn get_charge_limit(&self) -> Option<i32> {
        self.sysfs.read_parsed(self.limit_path.as_ref()?)
    }

    /// Write a threshold clamped to 20-100
    pub fn set_charge_limit(&self, limit: i32) -> bool {
        let Some(path) = &self.limit_path else {
            warn!(target: "armoury::battery", "Battery charge limit control not available");
            return false;
        };

        let limit = limit.clamp(battery::MIN_CHARGE_LIMIT, battery::MAX_CHARGE_LIMIT);
        info!(target: "armoury::battery", "Setting battery charge limit to: {}%", limit);

        match self.sysfs.try_write(path, limit) {
            Ok(()) => true,
            Err(e) => {
                error!(target: "armoury::battery", "Failed to set charge limit: {}", e);
                false
            }
        }
    }

    /// `max_lifespan`, `balanced` or `full_charge`
    pub fn apply_preset(&self, preset: &str) -> bool {
        match preset.parse::<ChargePreset>() {
            Ok(preset) => self.set_charge_limit(preset.limit()),
            Err(e) => {
                error!(target: "armoury::battery", "{}", e);
                false
            }
        }
    }

    pub fn get_battery_info(&self) -> BatteryInfo {
        let Some(dir) = &self.battery_dir else {
            return BatteryInfo::absent();
        };
        if self.sysfs.read(dir.join("present")).as_deref() != Some("1") {
            return BatteryInfo::absent();
        }

        let text = |name: &str| {
            Some(self.sysfs.read(dir.join(name)).unwrap_or_else(|| "Unknown".to_string()))
        };
        let number = |name: &str| self.sysfs.read(dir.join(name)).map(AttrValue::parse);

        let mut info = BatteryInfo {
            present: true,
            status: text("status"),
            capacity: number("capacity"),
            capacity_level: text("capacity_level"),
            charge_limit: self.get_charge_limit(),
            voltage_now: number("voltage_now"),
            power_now: number("power_now"),
            energy_now: number("energy_now"),
            energy_full: number("energy_full"),
            energy_full_design: number("energy_full_design"),
            cycle_count: number("cycle_count"),
            technology: text("technology"),
            manufacturer: text("manufacturer"),
            model_name: text("model_name"),
            ..BatteryInfo::default()
        };

        if let (Some(full), Some(design)) = (nonzero(&info.energy_full), nonzero(&info.energy_full_design)) {
            info.health = Some(round_to(full as f64 / design as f64 * 100.0, 1));
        }
        info.voltage_v = micro_to_unit(&info.voltage_now);
        info.power_w = micro_to_unit(&info.power_now);
        info.energy_wh = micro_to_unit(&info.energy_now);
        info.energy_full_wh = micro_to_unit(&info.energy_full);

        info
    }

    /// True when any known AC adapter reports online
    pub fn get_ac_status(&self) -> bool {
        paths::AC_ONLINE
            .iter()
            .any(|path| self.sysfs.read(path).as_deref() == Some("1"))
    }

    /// Minutes of discharge left at the current draw
    pub fn estimate_time_remaining(&self) -> Option<i64> {
        let info = self.get_battery_info();
        if !info.present || info.is_charging() {
            return None;
        }
        let energy = info.energy_now.as_ref()?.as_int().filter(|e| *e > 0)?;
        let power = info.power_now.as_ref()?.as_int().filter(|p| *p > 0)?;
        Some((energy as f64 / power as f64 * 60.0) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeSysfs;

    const LIMIT: &str = "/sys/class/power_supply/BAT0/charge_control_end_threshold";
    const BAT: &str = "/sys/class/power_supply/BAT0";

    fn controller(fake: &FakeSysfs) -> BatteryController {
        let sysfs = fake.sysfs();
        let caps = CapabilityMap::resolve(&sysfs);
        BatteryController::new(sysfs, &caps)
    }

    fn battery_fixture() -> FakeSysfs {
        let fake = FakeSysfs::new();
        fake.file(LIMIT, "80\n");
        fake.file(&format!("{}/present", BAT), "1");
        fake.file(&format!("{}/status", BAT), "Discharging");
        fake.file(&format!("{}/capacity", BAT), "76");
        fake.file(&format!("{}/energy_full", BAT), "45000000");
        fake.file(&format!("{}/energy_full_design", BAT), "50000000");
        fake.file(&format!("{}/energy_now", BAT), "30000000");
        fake.file(&format!("{}/power_now", BAT), "15000000");
        fake.file(&format!("{}/voltage_now", BAT), "16234567");
        fake.file(&format!("{}/cycle_count", BAT), "not supported");
        fake
    }

    #[test]
    fn test_limit_clamped() {
        let fake = battery_fixture();
        let bat = controller(&fake);

        assert!(bat.is_available());
        assert_eq!(bat.get_charge_limit(), Some(80));

        assert!(bat.set_charge_limit(5));
        assert_eq!(fake.read(LIMIT), "20");
        assert!(bat.set_charge_limit(250));
        assert_eq!(fake.read(LIMIT), "100");
    }

    #[test]
    fn test_presets() {
        let fake = battery_fixture();
        let bat = controller(&fake);

        assert!(bat.apply_preset("max_lifespan"));
        assert_eq!(fake.read(LIMIT), "60");
        assert!(!bat.apply_preset("forever"));
        assert_eq!(fake.read(LIMIT), "60");
    }

    #[test]
    fn test_info_derived_fields() {
        let fake = battery_fixture();
        let info = controller(&fake).get_battery_info();

        assert!(info.present);
        assert_eq!(info.health, Some(90.0));
        assert_eq!(info.capacity, Some(AttrValue::Int(76)));
        assert_eq!(info.cycle_count, Some(AttrValue::Text("not supported".into())));
        assert_eq!(info.voltage_v, Some(16.23));
        assert_eq!(info.energy_full_wh, Some(45.0));
        assert_eq!(info.charge_limit, Some(80));
        assert_eq!(info.technology.as_deref(), Some("Unknown"));
    }

    #[test]
    fn test_absent_battery_has_only_present() {
        let fake = FakeSysfs::new();
        fake.file(&format!("{}/present", BAT), "0");
        fake.file(&format!("{}/capacity", BAT), "50");
        let info = controller(&fake).get_battery_info();

        assert_eq!(info, BatteryInfo::absent());
        assert_eq!(serde_json::to_string(&info).unwrap(), r#"{"present":false}"#);
    }

    #[test]
    fn test_ac_and_time_remaining() {
        let fake = battery_fixture();
        fake.file("/sys/class/power_supply/AC0/online", "0");
        fake.file("/sys/class/power_supply/ADP1/online", "1");
        let bat = controller(&fake);

        assert!(bat.get_ac_status());
        assert_eq!(bat.estimate_time_remaining(), Some(120));

        fake.file(&format!("{}/status", BAT), "Charging");
        assert_eq!(bat.estimate_time_remaining(), None);
    }

    #[test]
    fn test_time_remaining_needs_stored_energy() {
        let fake = battery_fixture();
        fake.file(&format!("{}/energy_now", BAT), "0");
        let bat = controller(&fake);

        assert_eq!(bat.estimate_time_remaining(), None);

        fake.file(&format!("{}/energy_now", BAT), "7500000");
        fake.file(&format!("{}/power_now", BAT), "0");
        assert_eq!(bat.estimate_time_remaining(), None);
    }

    #[test]
    fn test_unavailable_limit() {
        let fake = FakeSysfs::new();
        let bat = controller(&fake);
        assert!(!bat.is_available());
        assert_eq!(bat.get_charge_limit(), None);
        assert!(!bat.set_charge_limit(80));
        assert!(!bat.get_ac_status());
    }
}
