//! Command-line mapping: `armoury <method> [args...]` to a [`Request`],
//! and a [`ResponseData`] back to printable text.

use std::path::PathBuf;

use armoury_core::constants::paths;
use armoury_core::FanCurvePoint;
use armoury_protocol::{Request, ResponseData};

/// Parsed command line
#[derive(Debug, PartialEq)]
pub enum Invocation {
    Call {
        socket_path: PathBuf,
        debug: bool,
        request: Request,
    },
    Help,
    Version,
}

/// Method names accepted on the command line, with their arguments
pub const METHODS: &[(&str, &str)] = &[
    ("Ping", ""),
    ("GetServiceVersion", ""),
    ("GetCPUMode", ""),
    ("SetCPUMode", "<silent|balanced|turbo|manual>"),
    ("GetAvailableCPUModes", ""),
    ("CycleCPUMode", ""),
    ("GetFanCount", ""),
    ("GetFanRPM", "[fan_id=1]"),
    ("GetFanInfo", "[fan_id=1]"),
    ("SetFanMode", "<auto|manual|full> [fan_id=0]"),
    ("SetFanSpeed", "<percent> [fan_id=0]"),
    ("SetFanCurve", "<json|temp:speed,...> [fan_id=0]"),
    ("ResetFansToAuto", ""),
    ("GetRGBMode", ""),
    ("SetRGBMode", "<mode>"),
    ("SetRGBColor", "<#RRGGBB>"),
    ("SetRGBBrightness", "<0-100>"),
    ("GetSupportedRGBModes", ""),
    ("TurnOffRGB", ""),
    ("GetBatteryChargeLimit", ""),
    ("SetBatteryChargeLimit", "<20-100>"),
    ("GetBatteryInfo", ""),
    ("IsACConnected", ""),
    ("GetCPUTemperature", ""),
    ("GetGPUTemperature", ""),
    ("GetAllTemperatures", ""),
    ("GetThermalStatus", ""),
    ("IsThermalThrottling", ""),
    ("GetCapabilities", ""),
    ("GetStatus", ""),
    ("ListProfiles", ""),
    ("GetActiveProfile", ""),
    ("ApplyProfile", "<name>"),
];

pub fn parse_args(args: &[String]) -> Result<Invocation, String> {
    let mut socket_path = PathBuf::from(paths::SOCKET_PATH);
    let mut debug = false;
    let mut rest: Vec<&str> = Vec::new();

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" if rest.is_empty() => return Ok(Invocation::Help),
            "-v" | "--version" if rest.is_empty() => return Ok(Invocation::Version),
            "--debug" if rest.is_empty() => debug = true,
            "-s" | "--socket" if rest.is_empty() => {
                let path = iter.next().ok_or("--socket requires a path argument")?;
                socket_path = PathBuf::from(path);
            }
            other => rest.push(other),
        }
    }

    let Some((method, method_args)) = rest.split_first() else {
        return Err("missing method".to_string());
    };

    Ok(Invocation::Call {
        socket_path,
        debug,
        request: parse_request(method, method_args)?,
    })
}

fn arg<'a>(args: &[&'a str], index: usize, name: &str) -> Result<&'a str, String> {
    args.get(index)
        .copied()
        .ok_or_else(|| format!("missing argument <{}>", name))
}

fn number<T: std::str::FromStr>(value: &str, name: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("invalid {}: {}", name, value))
}

fn fan_id(args: &[&str], index: usize, default: u32) -> Result<u32, String> {
    args.get(index).map_or(Ok(default), |v| number(v, "fan_id"))
}

/// `30:20,70:60` shorthand or a JSON array of `{temp, speed}` objects
pub fn curve_json(value: &str) -> Result<String, String> {
    let value = value.trim();
    if value.starts_with('[') {
        return Ok(value.to_string());
    }

    let mut points = Vec::new();
    for pair in value.split(',').filter(|p| !p.trim().is_empty()) {
        let (temp, speed) = pair
            .split_once(':')
            .ok_or_else(|| format!("invalid curve point: {}", pair))?;
        points.push(FanCurvePoint {
            temperature: number(temp.trim(), "temperature")?,
            speed_percent: number(speed.trim(), "speed")?,
        });
    }
    if points.is_empty() {
        return Err("empty fan curve".to_string());
    }
    serde_json::to_string(&points).map_err(|e| e.to_string())
}

pub fn parse_request(method: &str, args: &[&str]) -> Result<Request, String> {
    let request = match method.to_ascii_lowercase().as_str() {
        "ping" => Request::Ping,
        "getserviceversion" => Request::GetServiceVersion,

        "getcpumode" => Request::GetCpuMode,
        "setcpumode" => Request::SetCpuMode { mode: arg(args, 0, "mode")?.to_string() },
        "getavailablecpumodes" => Request::GetAvailableCpuModes,
        "cyclecpumode" => Request::CycleCpuMode,

        "getfancount" => Request::GetFanCount,
        "getfanrpm" => Request::GetFanRpm { fan_id: fan_id(args, 0, 1)? },
        "getfaninfo" => Request::GetFanInfo { fan_id: fan_id(args, 0, 1)? },
        "setfanmode" => Request::SetFanMode {
            mode: arg(args, 0, "mode")?.to_string(),
            fan_id: fan_id(args, 1, 0)?,
        },
        "setfanspeed" => Request::SetFanSpeed {
            speed_percent: number(arg(args, 0, "percent")?, "percent")?,
            fan_id: fan_id(args, 1, 0)?,
        },
        "setfancurve" => Request::SetFanCurve {
            curve_json: curve_json(arg(args, 0, "curve")?)?,
            fan_id: fan_id(args, 1, 0)?,
        },
        "resetfanstoauto" => Request::ResetFansToAuto,

        "getrgbmode" => Request::GetRgbMode,
        "setrgbmode" => Request::SetRgbMode { mode: arg(args, 0, "mode")?.to_string() },
        "setrgbcolor" => Request::SetRgbColor { hex: arg(args, 0, "color")?.to_string() },
        "setrgbbrightness" => Request::SetRgbBrightness {
            brightness: number(arg(args, 0, "brightness")?, "brightness")?,
        },
        "getsupportedrgbmodes" => Request::GetSupportedRgbModes,
        "turnoffrgb" => Request::TurnOffRgb,

        "getbatterychargelimit" => Request::GetBatteryChargeLimit,
        "setbatterychargelimit" => Request::SetBatteryChargeLimit {
            limit: number(arg(args, 0, "limit")?, "limit")?,
        },
        "getbatteryinfo" => Request::GetBatteryInfo,
        "isacconnected" => Request::IsAcConnected,

        "getcputemperature" => Request::GetCpuTemperature,
        "getgputemperature" => Request::GetGpuTemperature,
        "getalltemperatures" => Request::GetAllTemperatures,
        "getthermalstatus" => Request::GetThermalStatus,
        "isthermalthrottling" => Request::IsThermalThrottling,

        "getcapabilities" => Request::GetCapabilities,
        "getstatus" => Request::GetStatus,
        "listprofiles" => Request::ListProfiles,
        "getactiveprofile" => Request::GetActiveProfile,
        "applyprofile" => Request::ApplyProfile { name: arg(args, 0, "name")?.to_string() },

        _ => return Err(format!("unknown method: {}", method)),
    };

    request.validate()?;
    Ok(request)
}

/// Printable form of a successful response
pub fn render(data: &ResponseData) -> String {
    if let Some(json) = &data.json {
        return serde_json::from_str::<serde_json::Value>(json)
            .and_then(|v| serde_json::to_string_pretty(&v))
            .unwrap_or_else(|_| json.clone());
    }
    if let Some(list) = &data.list {
        return list.join("\n");
    }
    if let Some(value) = &data.value {
        return value.clone();
    }
    if let Some(flag) = data.flag {
        return flag.to_string();
    }
    if let Some(number) = data.number {
        return number.to_string();
    }
    if let Some(celsius) = data.celsius {
        return format!("{:.1}", celsius);
    }
    "ok".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        std::iter::once("armoury").chain(args.iter().copied()).map(String::from).collect()
    }

    fn request(args: &[&str]) -> Request {
        match parse_args(&argv(args)).unwrap() {
            Invocation::Call { request, .. } => request,
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_method_names_case_insensitive() {
        assert_eq!(request(&["GetCPUMode"]), Request::GetCpuMode);
        assert_eq!(request(&["getcpumode"]), Request::GetCpuMode);
        assert_eq!(
            request(&["setcpumode", "turbo"]),
            Request::SetCpuMode { mode: "turbo".into() }
        );
    }

    #[test]
    fn test_fan_defaults() {
        assert_eq!(request(&["GetFanRPM"]), Request::GetFanRpm { fan_id: 1 });
        assert_eq!(
            request(&["SetFanSpeed", "60"]),
            Request::SetFanSpeed { speed_percent: 60, fan_id: 0 }
        );
        assert_eq!(
            request(&["SetFanMode", "auto", "2"]),
            Request::SetFanMode { mode: "auto".into(), fan_id: 2 }
        );
    }

    #[test]
    fn test_curve_shorthand() {
        let Request::SetFanCurve { curve_json: json, fan_id } = request(&["SetFanCurve", "30:20,70:60"]) else {
            panic!("expected SetFanCurve");
        };
        assert_eq!(fan_id, 0);
        let points: Vec<FanCurvePoint> = serde_json::from_str(&json).unwrap();
        assert_eq!(points, vec![FanCurvePoint::new(30, 20), FanCurvePoint::new(70, 60)]);

        assert!(curve_json("30-20").is_err());
        assert!(curve_json("").is_err());
        assert_eq!(curve_json(r#"[{"temp":30,"speed":20}]"#).unwrap(), r#"[{"temp":30,"speed":20}]"#);
    }

    #[test]
    fn test_global_options() {
        let parsed = parse_args(&argv(&["--debug", "-s", "/tmp/x.sock", "Ping"])).unwrap();
        assert_eq!(
            parsed,
            Invocation::Call {
                socket_path: PathBuf::from("/tmp/x.sock"),
                debug: true,
                request: Request::Ping,
            }
        );
        assert_eq!(parse_args(&argv(&["-h"])).unwrap(), Invocation::Help);
        assert_eq!(parse_args(&argv(&["--version"])).unwrap(), Invocation::Version);
    }

    #[test]
    fn test_errors() {
        assert!(parse_args(&argv(&[])).is_err());
        assert!(parse_args(&argv(&["Frobnicate"])).is_err());
        assert!(parse_args(&argv(&["SetCPUMode"])).is_err());
        assert!(parse_args(&argv(&["SetFanSpeed", "fast"])).is_err());
        assert!(parse_args(&argv(&["GetFanInfo", "9"])).is_err());
    }

    #[test]
    fn test_every_listed_method_parses() {
        for (method, _) in METHODS {
            let args: &[&str] = match *method {
                "SetCPUMode" | "SetRGBMode" | "SetFanMode" => &["silent"],
                "SetFanSpeed" | "SetRGBBrightness" | "SetBatteryChargeLimit" => &["50"],
                "SetFanCurve" => &["30:20"],
                "SetRGBColor" => &["#00FF00"],
                "ApplyProfile" => &["Silent"],
                _ => &[],
            };
            let parsed = parse_request(method, args).unwrap();
            assert_eq!(parsed.type_name(), *method);
        }
    }

    #[test]
    fn test_render() {
        assert_eq!(render(&ResponseData::none()), "ok");
        assert_eq!(render(&ResponseData::boolean(false)), "false");
        assert_eq!(render(&ResponseData::temperature(45.0)), "45.0");
        assert_eq!(render(&ResponseData::strings(vec!["a".into(), "b".into()])), "a\nb");
        assert_eq!(render(&ResponseData::encoded(r#"{"a":1}"#.into())), "{\n  \"a\": 1\n}");
    }
}
