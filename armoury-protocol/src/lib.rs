//! Wire protocol between `armouryd` and its clients.
//!
//! One JSON object per line in each direction. A request carries an `id`,
//! the method name in `cmd` and its arguments in `data`; the response echoes
//! the `id` and reports `status` `ok` or `error`.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global request ID counter for correlation
static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Maximum request size (8KB)
pub const MAX_MESSAGE_SIZE: usize = 8 * 1024;

/// Maximum response size; status and capability reports exceed a request's budget
pub const MAX_RESPONSE_SIZE: usize = 64 * 1024;

/// Highest fan id accepted over the socket (0 addresses every fan)
pub const MAX_FAN_ID: u32 = 4;

const MAX_NAME_LENGTH: usize = 64;

/// Generate a unique request ID for correlation
pub fn generate_request_id() -> u64 {
    REQUEST_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub id: u64,
    #[serde(flatten)]
    pub request: Request,
}

impl RequestEnvelope {
    pub fn new(request: Request) -> Self {
        Self {
            id: generate_request_id(),
            request,
        }
    }

    pub fn with_id(request: Request, id: u64) -> Self {
        Self { id, request }
    }
}

/// Remote control surface. Wire names are the method names clients see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "data")]
pub enum Request {
    Ping,
    GetServiceVersion,

    #[serde(rename = "GetCPUMode")]
    GetCpuMode,
    #[serde(rename = "SetCPUMode")]
    SetCpuMode { mode: String },
    #[serde(rename = "GetAvailableCPUModes")]
    GetAvailableCpuModes,
    #[serde(rename = "CycleCPUMode")]
    CycleCpuMode,

    GetFanCount,
    #[serde(rename = "GetFanRPM")]
    GetFanRpm { fan_id: u32 },
    GetFanInfo { fan_id: u32 },
    SetFanMode { mode: String, fan_id: u32 },
    SetFanSpeed { speed_percent: i32, fan_id: u32 },
    /// `curve_json` is a JSON array of `{temp, speed}` objects
    SetFanCurve { curve_json: String, fan_id: u32 },
    ResetFansToAuto,

    #[serde(rename = "GetRGBMode")]
    GetRgbMode,
    #[serde(rename = "SetRGBMode")]
    SetRgbMode { mode: String },
    #[serde(rename = "SetRGBColor")]
    SetRgbColor { hex: String },
    #[serde(rename = "SetRGBBrightness")]
    SetRgbBrightness { brightness: i32 },
    #[serde(rename = "GetSupportedRGBModes")]
    GetSupportedRgbModes,
    #[serde(rename = "TurnOffRGB")]
    TurnOffRgb,

    GetBatteryChargeLimit,
    SetBatteryChargeLimit { limit: i32 },
    GetBatteryInfo,
    #[serde(rename = "IsACConnected")]
    IsAcConnected,

    #[serde(rename = "GetCPUTemperature")]
    GetCpuTemperature,
    #[serde(rename = "GetGPUTemperature")]
    GetGpuTemperature,
    GetAllTemperatures,
    GetThermalStatus,
    IsThermalThrottling,

    GetCapabilities,
    GetStatus,
    ListProfiles,
    GetActiveProfile,
    ApplyProfile { name: String },
}

impl Request {
    /// Reject malformed arguments before they reach the hardware. Numeric
    /// ranges are not checked here; the facets clamp them.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Request::SetCpuMode { mode } | Request::SetRgbMode { mode } => validate_name("mode", mode),
            Request::SetFanMode { mode, fan_id } => {
                validate_name("mode", mode)?;
                validate_fan_id(*fan_id)
            }
            Request::GetFanRpm { fan_id }
            | Request::GetFanInfo { fan_id }
            | Request::SetFanSpeed { fan_id, .. } => validate_fan_id(*fan_id),
            Request::SetFanCurve { curve_json, fan_id } => {
                validate_fan_id(*fan_id)?;
                if curve_json.trim().is_empty() {
                    return Err("curve_json is empty".to_string());
                }
                Ok(())
            }
            Request::SetRgbColor { hex } => validate_hex(hex),
            Request::ApplyProfile { name } => validate_name("profile name", name),
            _ => Ok(()),
        }
    }

    /// Whether the request changes hardware or persisted state
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Request::SetCpuMode { .. }
                | Request::CycleCpuMode
                | Request::SetFanMode { .. }
                | Request::SetFanSpeed { .. }
                | Request::SetFanCurve { .. }
                | Request::ResetFansToAuto
                | Request::SetRgbMode { .. }
                | Request::SetRgbColor { .. }
                | Request::SetRgbBrightness { .. }
                | Request::TurnOffRgb
                | Request::SetBatteryChargeLimit { .. }
                | Request::ApplyProfile { .. }
        )
    }

    /// Wire method name
    pub fn type_name(&self) -> &'static str {
        match self {
            Request::Ping => "Ping",
            Request::GetServiceVersion => "GetServiceVersion",
            Request::GetCpuMode => "GetCPUMode",
            Request::SetCpuMode { .. } => "SetCPUMode",
            Request::GetAvailableCpuModes => "GetAvailableCPUModes",
            Request::CycleCpuMode => "CycleCPUMode",
            Request::GetFanCount => "GetFanCount",
            Request::GetFanRpm { .. } => "GetFanRPM",
            Request::GetFanInfo { .. } => "GetFanInfo",
            Request::SetFanMode { .. } => "SetFanMode",
            Request::SetFanSpeed { .. } => "SetFanSpeed",
            Request::SetFanCurve { .. } => "SetFanCurve",
            Request::ResetFansToAuto => "ResetFansToAuto",
            Request::GetRgbMode => "GetRGBMode",
            Request::SetRgbMode { .. } => "SetRGBMode",
            Request::SetRgbColor { .. } => "SetRGBColor",
            Request::SetRgbBrightness { .. } => "SetRGBBrightness",
            Request::GetSupportedRgbModes => "GetSupportedRGBModes",
            Request::TurnOffRgb => "TurnOffRGB",
            Request::GetBatteryChargeLimit => "GetBatteryChargeLimit",
            Request::SetBatteryChargeLimit { .. } => "SetBatteryChargeLimit",
            Request::GetBatteryInfo => "GetBatteryInfo",
            Request::IsAcConnected => "IsACConnected",
            Request::GetCpuTemperature => "GetCPUTemperature",
            Request::GetGpuTemperature => "GetGPUTemperature",
            Request::GetAllTemperatures => "GetAllTemperatures",
            Request::GetThermalStatus => "GetThermalStatus",
            Request::IsThermalThrottling => "IsThermalThrottling",
            Request::GetCapabilities => "GetCapabilities",
            Request::GetStatus => "GetStatus",
            Request::ListProfiles => "ListProfiles",
            Request::GetActiveProfile => "GetActiveProfile",
            Request::ApplyProfile { .. } => "ApplyProfile",
        }
    }
}

fn validate_name(field: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{} is empty", field));
    }
    if value.len() > MAX_NAME_LENGTH {
        return Err(format!("{} exceeds {} characters", field, MAX_NAME_LENGTH));
    }
    if value.chars().any(char::is_control) {
        return Err(format!("{} contains control characters", field));
    }
    Ok(())
}

fn validate_fan_id(fan_id: u32) -> Result<(), String> {
    if fan_id > MAX_FAN_ID {
        return Err(format!("fan_id {} out of range (0-{})", fan_id, MAX_FAN_ID));
    }
    Ok(())
}

fn validate_hex(hex: &str) -> Result<(), String> {
    let digits = hex.strip_prefix('#').unwrap_or(hex);
    if digits.len() > 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("invalid colour: {}", hex));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub id: u64,
    #[serde(flatten)]
    pub response: Response,
}

impl ResponseEnvelope {
    pub fn new(id: u64, response: Response) -> Self {
        Self { id, response }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum Response {
    #[serde(rename = "ok")]
    Ok(ResponseData),
    #[serde(rename = "error")]
    Error { message: String },
}

/// Flat payload; each method fills exactly one field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flag: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub celsius: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list: Option<Vec<String>>,
    /// Compound values, JSON-encoded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<String>,
}

impl ResponseData {
    pub fn none() -> Self { Self::default() }
    pub fn string(v: impl Into<String>) -> Self { Self { value: Some(v.into()), ..Self::default() } }
    pub fn boolean(b: bool) -> Self { Self { flag: Some(b), ..Self::default() } }
    pub fn integer(n: i64) -> Self { Self { number: Some(n), ..Self::default() } }
    pub fn temperature(c: f64) -> Self { Self { celsius: Some(c), ..Self::default() } }
    pub fn strings(l: Vec<String>) -> Self { Self { list: Some(l), ..Self::default() } }
    pub fn encoded(j: String) -> Self { Self { json: Some(j), ..Self::default() } }
}

impl Response {
    pub fn ok() -> Self {
        Response::Ok(ResponseData::none())
    }

    pub fn ok_string(s: impl Into<String>) -> Self {
        Response::Ok(ResponseData::string(s))
    }

    pub fn ok_bool(b: bool) -> Self {
        Response::Ok(ResponseData::boolean(b))
    }

    pub fn ok_int(n: i64) -> Self {
        Response::Ok(ResponseData::integer(n))
    }

    pub fn ok_temp(c: f64) -> Self {
        Response::Ok(ResponseData::temperature(c))
    }

    pub fn ok_list(l: Vec<String>) -> Self {
        Response::Ok(ResponseData::strings(l))
    }

    /// Serialize `value` into the `json` field
    pub fn ok_json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(json) => Response::Ok(ResponseData::encoded(json)),
            Err(e) => Response::error(format!("Failed to encode response: {}", e)),
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Response::Error { message: msg.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let envelope = RequestEnvelope::with_id(Request::SetCpuMode { mode: "turbo".into() }, 7);
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value, json!({"id": 7, "cmd": "SetCPUMode", "data": {"mode": "turbo"}}));

        let parsed: RequestEnvelope = serde_json::from_str(r#"{"id": 3, "cmd": "GetFanRPM", "data": {"fan_id": 2}}"#).unwrap();
        assert_eq!(parsed.id, 3);
        assert_eq!(parsed.request, Request::GetFanRpm { fan_id: 2 });
    }

    #[test]
    fn test_unit_request_without_data() {
        let parsed: RequestEnvelope = serde_json::from_str(r#"{"id": 1, "cmd": "IsACConnected"}"#).unwrap();
        assert_eq!(parsed.request, Request::IsAcConnected);
        assert_eq!(parsed.request.type_name(), "IsACConnected");
    }

    #[test]
    fn test_response_wire_format() {
        let envelope = ResponseEnvelope::new(9, Response::ok_int(80));
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value, json!({"id": 9, "status": "ok", "number": 80}));

        let err = ResponseEnvelope::new(2, Response::error("nope"));
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value, json!({"id": 2, "status": "error", "message": "nope"}));
    }

    #[test]
    fn test_validate() {
        assert!(Request::SetFanSpeed { speed_percent: 250, fan_id: 1 }.validate().is_ok());
        assert!(Request::GetFanInfo { fan_id: 9 }.validate().is_err());
        assert!(Request::SetRgbColor { hex: "#00ff7f".into() }.validate().is_ok());
        assert!(Request::SetRgbColor { hex: "#xyz".into() }.validate().is_err());
        assert!(Request::SetCpuMode { mode: String::new() }.validate().is_err());
        assert!(Request::ApplyProfile { name: "a\nb".into() }.validate().is_err());
        assert!(Request::SetFanCurve { curve_json: " ".into(), fan_id: 0 }.validate().is_err());
    }

    #[test]
    fn test_write_classification() {
        assert!(Request::ApplyProfile { name: "Silent".into() }.is_write());
        assert!(Request::CycleCpuMode.is_write());
        assert!(!Request::GetStatus.is_write());
    }

    #[test]
    fn test_request_ids_increase() {
        let a = generate_request_id();
        let b = generate_request_id();
        assert!(b > a);
    }
}
