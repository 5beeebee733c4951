//! Profile value types and the built-in set

use serde::{Deserialize, Serialize};

use crate::fan::FanCurvePoint;

/// Names of the profiles that ship with the application and cannot be removed
pub const BUILTIN_NAMES: [&str; 4] = ["Silent", "Balanced", "Turbo", "Gaming"];

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_NAMES.contains(&name)
}

/// Fan curve stored in a profile. An empty curve means "leave fans alone".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FanCurve {
    pub name: String,
    pub points: Vec<FanCurvePoint>,
}

impl Default for FanCurve {
    fn default() -> Self {
        Self { name: "Custom".to_string(), points: Vec::new() }
    }
}

impl FanCurve {
    pub fn new(name: impl Into<String>, points: &[(i32, i32)]) -> Self {
        Self {
            name: name.into(),
            points: points
                .iter()
                .map(|&(temperature, speed_percent)| FanCurvePoint { temperature, speed_percent })
                .collect(),
        }
    }
}

/// Keyboard lighting stored in a profile. Mode and colour stay strings so an
/// unknown mode survives a load/save cycle and is only rejected on apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RgbConfig {
    pub mode: String,
    pub color: String,
    pub brightness: i32,
    pub speed: i32,
}

impl Default for RgbConfig {
    fn default() -> Self {
        Self {
            mode: "static".to_string(),
            color: "#FF0000".to_string(),
            brightness: 100,
            speed: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceProfile {
    pub name: String,
    pub cpu_mode: String,
    /// Stored and round-tripped, never applied
    pub gpu_mode: String,
    pub fan_curve: FanCurve,
    pub rgb_config: RgbConfig,
    pub battery_charge_limit: i32,
}

impl Default for PerformanceProfile {
    fn default() -> Self {
        Self {
            name: "Custom".to_string(),
            cpu_mode: "balanced".to_string(),
            gpu_mode: "hybrid".to_string(),
            fan_curve: FanCurve::default(),
            rgb_config: RgbConfig::default(),
            battery_charge_limit: 100,
        }
    }
}

impl PerformanceProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }
}

fn rgb(mode: &str, color: &str, brightness: i32, speed: i32) -> RgbConfig {
    RgbConfig {
        mode: mode.to_string(),
        color: color.to_string(),
        brightness,
        speed,
    }
}

/// Silent, Balanced, Turbo and Gaming
pub fn builtin_profiles() -> Vec<PerformanceProfile> {
    vec![
        PerformanceProfile {
            name: "Silent".to_string(),
            cpu_mode: "silent".to_string(),
            gpu_mode: "integrated".to_string(),
            fan_curve: FanCurve::new(
                "Silent",
                &[(30, 10), (50, 20), (70, 40), (80, 60), (90, 80)],
            ),
            rgb_config: rgb("off", "#FF0000", 0, 50),
            battery_charge_limit: 60,
        },
        PerformanceProfile {
            name: "Balanced".to_string(),
            cpu_mode: "balanced".to_string(),
            gpu_mode: "hybrid".to_string(),
            fan_curve: FanCurve::new(
                "Balanced",
                &[(30, 20), (50, 40), (70, 60), (80, 80), (90, 100)],
            ),
            rgb_config: rgb("static", "#00FF00", 75, 50),
            battery_charge_limit: 80,
        },
        PerformanceProfile {
            name: "Turbo".to_string(),
            cpu_mode: "turbo".to_string(),
            gpu_mode: "dedicated".to_string(),
            fan_curve: FanCurve::new(
                "Turbo",
                &[(30, 40), (50, 60), (70, 80), (80, 100), (90, 100)],
            ),
            rgb_config: rgb("rainbow", "#FF0000", 100, 70),
            battery_charge_limit: 100,
        },
        PerformanceProfile {
            name: "Gaming".to_string(),
            cpu_mode: "turbo".to_string(),
            gpu_mode: "dedicated".to_string(),
            fan_curve: FanCurve::new(
                "Gaming",
                &[(30, 30), (50, 50), (70, 75), (80, 90), (90, 100)],
            ),
            rgb_config: rgb("breathing", "#FF0000", 100, 50),
            battery_charge_limit: 100,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let profile: PerformanceProfile = serde_json::from_str(r#"{"name": "Bare"}"#).unwrap();

        assert_eq!(profile.name, "Bare");
        assert_eq!(profile.cpu_mode, "balanced");
        assert_eq!(profile.gpu_mode, "hybrid");
        assert!(profile.fan_curve.points.is_empty());
        assert_eq!(profile.rgb_config, RgbConfig::default());
        assert_eq!(profile.battery_charge_limit, 100);
    }

    #[test]
    fn test_profile_file_schema() {
        let json = r##"{
            "name": "Night",
            "cpu_mode": "silent",
            "fan_curve": {"name": "Low", "points": [{"temp": 40, "speed": 15}]},
            "rgb_config": {"mode": "breathing", "color": "#0000FF"}
        }"##;
        let profile: PerformanceProfile = serde_json::from_str(json).unwrap();

        assert_eq!(profile.fan_curve.points, vec![FanCurvePoint::new(40, 15)]);
        assert_eq!(profile.rgb_config.mode, "breathing");
        assert_eq!(profile.rgb_config.brightness, 100);

        let value = serde_json::to_value(&profile).unwrap();
        assert_eq!(value["fan_curve"]["points"][0]["temp"], 40);
        assert_eq!(value["fan_curve"]["points"][0]["speed"], 15);
    }

    #[test]
    fn test_builtins() {
        let builtins = builtin_profiles();
        let names: Vec<&str> = builtins.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, BUILTIN_NAMES);

        let silent = &builtins[0];
        assert_eq!(silent.rgb_config.mode, "off");
        assert_eq!(silent.battery_charge_limit, 60);
        assert_eq!(builtins[1].rgb_config.color, "#00FF00");
        assert_eq!(builtins[3].fan_curve.points[2], FanCurvePoint::new(70, 75));
        assert!(is_builtin("Turbo"));
        assert!(!is_builtin("turbo"));
    }
}
