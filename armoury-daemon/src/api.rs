//! Remote control surface: one [`Request`] in, one [`Response`] out.
//!
//! Every hardware method keeps its fixed fallback when the facet fails
//! (limit 100, temperature 0.0, mode "unknown", RPM 0, boolean false), so
//! only malformed arguments and the profile methods produce error responses.
//! All calls block on sysfs or external tools; run them off the async runtime.

use armoury_core::{CpuMode, FanCurvePoint, FanMode, RgbColor, RgbMode};
use armoury_protocol::{Request, Response};
use tracing::{debug, warn};

use crate::service::ControlService;

const VERSION: &str = env!("CARGO_PKG_VERSION");

const UNKNOWN_MODE: &str = "unknown";
const DEFAULT_CHARGE_LIMIT: i64 = 100;

pub fn handle_request(service: &ControlService, request: Request) -> Response {
    let hw = service.hardware();

    match request {
        Request::Ping => Response::ok_string("pong"),
        Request::GetServiceVersion => Response::ok_string(VERSION),

        // CPU
        Request::GetCpuMode => Response::ok_string(
            hw.cpu.get_current_mode().map_or(UNKNOWN_MODE, |m| m.as_str()),
        ),
        Request::SetCpuMode { mode } => match mode.parse::<CpuMode>() {
            Ok(mode) => Response::ok_bool(hw.cpu.set_mode(mode)),
            Err(e) => {
                warn!(target: "armoury::service", "{}", e);
                Response::ok_bool(false)
            }
        },
        Request::GetAvailableCpuModes => Response::ok_list(
            hw.cpu
                .get_available_modes()
                .iter()
                .map(|m| m.as_str().to_string())
                .collect(),
        ),
        Request::CycleCpuMode => Response::ok_string(
            hw.cpu.cycle_mode().map_or(UNKNOWN_MODE, |m| m.as_str()),
        ),

        // Fans
        Request::GetFanCount => Response::ok_int(i64::from(hw.fan.fan_count())),
        Request::GetFanRpm { fan_id } => Response::ok_int(
            hw.fan
                .get_fan_info(fan_id)
                .map_or(0, |info| i64::from(info.current_rpm)),
        ),
        Request::GetFanInfo { fan_id } => match hw.fan.get_fan_info(fan_id) {
            Some(info) => Response::ok_json(&info),
            None => Response::error(format!("Fan {} not available", fan_id)),
        },
        Request::SetFanMode { mode, fan_id } => match mode.parse::<FanMode>() {
            Ok(mode) => Response::ok_bool(hw.fan.set_fan_mode(mode, fan_id)),
            Err(e) => {
                warn!(target: "armoury::service", "{}", e);
                Response::ok_bool(false)
            }
        },
        Request::SetFanSpeed { speed_percent, fan_id } => {
            Response::ok_bool(hw.fan.set_fan_speed(speed_percent, fan_id))
        }
        Request::SetFanCurve { curve_json, fan_id } => {
            match serde_json::from_str::<Vec<FanCurvePoint>>(&curve_json) {
                Ok(points) => Response::ok_bool(hw.fan.set_fan_curve(&points, fan_id)),
                Err(e) => {
                    warn!(target: "armoury::service", "Invalid fan curve JSON: {}", e);
                    Response::ok_bool(false)
                }
            }
        }
        Request::ResetFansToAuto => Response::ok_bool(hw.fan.reset_to_auto()),

        // Lighting
        Request::GetRgbMode => Response::ok_string(hw.rgb.get_current_state().mode.as_str()),
        Request::SetRgbMode { mode } => match mode.parse::<RgbMode>() {
            Ok(mode) => Response::ok_bool(hw.rgb.set_mode(mode)),
            Err(e) => {
                warn!(target: "armoury::service", "{}", e);
                Response::ok_bool(false)
            }
        },
        Request::SetRgbColor { hex } => Response::ok_bool(hw.rgb.set_color(RgbColor::from_hex(&hex))),
        Request::SetRgbBrightness { brightness } => Response::ok_bool(hw.rgb.set_brightness(brightness)),
        Request::GetSupportedRgbModes => Response::ok_list(
            hw.rgb
                .supported_modes()
                .iter()
                .map(|m| m.as_str().to_string())
                .collect(),
        ),
        Request::TurnOffRgb => Response::ok_bool(hw.rgb.turn_off()),

        // Battery
        Request::GetBatteryChargeLimit => Response::ok_int(
            hw.battery
                .get_charge_limit()
                .map_or(DEFAULT_CHARGE_LIMIT, i64::from),
        ),
        Request::SetBatteryChargeLimit { limit } => Response::ok_bool(hw.battery.set_charge_limit(limit)),
        Request::GetBatteryInfo => Response::ok_json(&hw.battery.get_battery_info()),
        Request::IsAcConnected => Response::ok_bool(hw.battery.get_ac_status()),

        // Thermal
        Request::GetCpuTemperature => Response::ok_temp(hw.thermal.get_cpu_package_temp().unwrap_or(0.0)),
        Request::GetGpuTemperature => Response::ok_temp(hw.thermal.get_gpu_temperature().unwrap_or(0.0)),
        Request::GetAllTemperatures => Response::ok_json(&hw.thermal.get_all_temperatures()),
        Request::GetThermalStatus => Response::ok_string(hw.thermal.get_thermal_status().as_str()),
        Request::IsThermalThrottling => Response::ok_bool(hw.thermal.is_thermal_throttling()),

        // Service
        Request::GetCapabilities => Response::ok_json(&*hw.detector.capabilities()),
        Request::GetStatus => Response::ok_json(&service.get_status()),
        Request::ListProfiles => Response::ok_list(service.profiles().profile_names()),
        Request::GetActiveProfile => match service.profiles().current_profile() {
            Some(name) => Response::ok_string(name),
            None => Response::ok(),
        },
        Request::ApplyProfile { name } => {
            let result = service.profiles().apply_profile(&name);
            match result {
                Ok(report) => {
                    debug!(target: "armoury::service", "Applied {}: {:?}", report.profile, report.failed);
                    Response::ok_json(&report)
                }
                Err(e) => Response::error(e.to_string()),
            }
        }
    }
}
