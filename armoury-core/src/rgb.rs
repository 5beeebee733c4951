//! Keyboard lighting facet
//!
//! Backend priority: `asusctl led-mode` (when its mode listing works), then the
//! `kbd_rgb_mode` sysfs attribute, then `openrgb`.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, error, info, warn};

use crate::command::{run_checked, ToolCommand, ToolRunner};
use crate::constants::{rgb, tools};
use crate::error::{ArmouryError, Result};
use crate::resolver::{CapabilityMap, WmiAttribute};
use crate::sysfs::Sysfs;

/// Lighting effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RgbMode {
    Off,
    Static,
    Breathing,
    ColorCycle,
    Rainbow,
    Strobe,
    Comet,
    Flash,
    MultiStatic,
}

impl RgbMode {
    pub const ALL: [RgbMode; 9] = [
        RgbMode::Off,
        RgbMode::Static,
        RgbMode::Breathing,
        RgbMode::ColorCycle,
        RgbMode::Rainbow,
        RgbMode::Strobe,
        RgbMode::Comet,
        RgbMode::Flash,
        RgbMode::MultiStatic,
    ];

    /// Advertised when the vendor tool lists nothing recognizable
    pub const DEFAULT_SUPPORTED: [RgbMode; 5] = [
        RgbMode::Off,
        RgbMode::Static,
        RgbMode::Breathing,
        RgbMode::ColorCycle,
        RgbMode::Rainbow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RgbMode::Off => "off",
            RgbMode::Static => "static",
            RgbMode::Breathing => "breathing",
            RgbMode::ColorCycle => "color_cycle",
            RgbMode::Rainbow => "rainbow",
            RgbMode::Strobe => "strobe",
            RgbMode::Comet => "comet",
            RgbMode::Flash => "flash",
            RgbMode::MultiStatic => "multi_static",
        }
    }

    /// Name used by `asusctl led-mode`
    pub fn tool_name(&self) -> &'static str {
        match self {
            RgbMode::Off => "Off",
            RgbMode::Static => "Static",
            RgbMode::Breathing => "Breathe",
            RgbMode::ColorCycle => "Spectrum",
            RgbMode::Rainbow => "Rainbow",
            RgbMode::Strobe => "Strobe",
            RgbMode::Comet => "Comet",
            RgbMode::Flash => "Flash",
            RgbMode::MultiStatic => "MultiStatic",
        }
    }

    /// Index used by `openrgb -m`
    pub fn ordinal(&self) -> usize {
        Self::ALL.iter().position(|m| m == self).unwrap_or(0)
    }

    /// Modes that draw their own colours
    pub fn ignores_color(&self) -> bool {
        matches!(self, RgbMode::Off | RgbMode::Rainbow | RgbMode::ColorCycle)
    }

    pub fn is_animated(&self) -> bool {
        matches!(
            self,
            RgbMode::Breathing | RgbMode::ColorCycle | RgbMode::Rainbow | RgbMode::Strobe | RgbMode::Comet
        )
    }
}

impl fmt::Display for RgbMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RgbMode {
    type Err = ArmouryError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| ArmouryError::invalid_mode("RGB", s))
    }
}

/// 8-bit RGB colour; serialized as `#RRGGBB`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RgbColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl RgbColor {
    pub const RED: RgbColor = RgbColor { red: 255, green: 0, blue: 0 };
    pub const WHITE: RgbColor = RgbColor { red: 255, green: 255, blue: 255 };

    /// Out-of-range channels saturate
    pub fn new(red: i32, green: i32, blue: i32) -> Self {
        let channel = |v: i32| v.clamp(0, 255) as u8;
        Self {
            red: channel(red),
            green: channel(green),
            blue: channel(blue),
        }
    }

    /// Parse `#RRGGBB` or `RRGGBB`; anything else is white
    pub fn from_hex(hex: &str) -> Self {
        let digits = hex.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Self::WHITE;
        }
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&digits[range], 16).unwrap_or(255);
        Self {
            red: channel(0..2),
            green: channel(2..4),
            blue: channel(4..6),
        }
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.red, self.green, self.blue)
    }

    pub fn to_tuple(&self) -> (u8, u8, u8) {
        (self.red, self.green, self.blue)
    }
}

impl fmt::Display for RgbColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for RgbColor {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for RgbColor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Ok(Self::from_hex(&hex))
    }
}

/// Best-effort view of the keyboard lighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RgbState {
    pub mode: RgbMode,
    pub color: RgbColor,
    pub brightness: u8,
    pub speed: u8,
    pub enabled: bool,
}

impl Default for RgbState {
    fn default() -> Self {
        Self {
            mode: RgbMode::Static,
            color: RgbColor::RED,
            brightness: 100,
            speed: 50,
            enabled: true,
        }
    }
}

/// Modes named in `asusctl led-mode -s` output; `off` is always present
pub fn parse_supported_modes(output: &str) -> Vec<RgbMode> {
    let mut modes: Vec<RgbMode> = Vec::new();
    for line in output.to_lowercase().lines() {
        for mode in RgbMode::ALL {
            if line.contains(&mode.tool_name().to_lowercase()) && !modes.contains(&mode) {
                modes.push(mode);
            }
        }
    }

    if modes.is_empty() {
        return RgbMode::DEFAULT_SUPPORTED.to_vec();
    }
    if !modes.contains(&RgbMode::Off) {
        modes.insert(0, RgbMode::Off);
    }
    modes
}

lazy_static! {
    static ref HEX_COLOR: Option<Regex> = Regex::new(r"(?i)#([0-9a-f]{6})").ok();
    static ref BRIGHTNESS: Option<Regex> = Regex::new(r"(?i)brightness[:\s]*(\d+)").ok();
}

/// Parse `asusctl led-mode -c` output; `None` when no mode name is recognizable.
///
/// Effect names win over a bare "off", which then only clears `enabled`.
pub fn parse_state(output: &str) -> Option<RgbState> {
    let lower = output.to_lowercase();
    let named = |m: &RgbMode| lower.contains(&m.tool_name().to_lowercase());
    let mode = RgbMode::ALL[1..]
        .iter()
        .copied()
        .find(named)
        .or_else(|| named(&RgbMode::Off).then_some(RgbMode::Off))?;

    let mut state = RgbState { mode, ..RgbState::default() };

    if let Some(caps) = HEX_COLOR.as_ref().and_then(|re| re.captures(output)) {
        state.color = RgbColor::from_hex(&caps[1]);
    }
    if let Some(value) = BRIGHTNESS
        .as_ref()
        .and_then(|re| re.captures(output))
        .and_then(|caps| caps[1].parse::<u64>().ok())
    {
        state.brightness = value.min(100) as u8;
    }
    if lower.contains("off") && mode != RgbMode::Off {
        state.enabled = false;
    }
    Some(state)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RgbBackend {
    Tool,
    Sysfs,
    OpenRgb,
    None,
}

/// Keyboard lighting control
pub struct RgbController {
    tools: Arc<dyn ToolRunner>,
    backend: RgbBackend,
    supported_modes: Vec<RgbMode>,
}

impl RgbController {
    pub fn new(sysfs: &Sysfs, tools: Arc<dyn ToolRunner>, caps: &CapabilityMap) -> Self {
        let (backend, supported_modes) = Self::probe(sysfs, tools.as_ref(), caps);
        debug!(
            target: "armoury::rgb",
            "RGB controller backend: {:?} ({} modes)",
            backend,
            supported_modes.len()
        );
        Self { tools, backend, supported_modes }
    }

    fn probe(sysfs: &Sysfs, tools: &dyn ToolRunner, caps: &CapabilityMap) -> (RgbBackend, Vec<RgbMode>) {
        if tools.is_installed(tools::ASUSCTL) {
            let cmd = ToolCommand::new(tools::ASUSCTL).args(["led-mode", "-s"]);
            if let Ok(out) = run_checked(tools, &cmd) {
                return (RgbBackend::Tool, parse_supported_modes(&out));
            }
        }

        if caps
            .get(WmiAttribute::KbdRgbMode)
            .is_some_and(|path| sysfs.exists(path))
        {
            return (RgbBackend::Sysfs, vec![RgbMode::Static, RgbMode::Off]);
        }

        if tools.is_installed(tools::OPENRGB) {
            return (RgbBackend::OpenRgb, RgbMode::ALL.to_vec());
        }

        (RgbBackend::None, Vec::new())
    }

    pub fn is_available(&self) -> bool {
        self.backend != RgbBackend::None
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            RgbBackend::Tool => "asusctl",
            RgbBackend::Sysfs => "sysfs",
            RgbBackend::OpenRgb => "openrgb",
            RgbBackend::None => "none",
        }
    }

    pub fn supported_modes(&self) -> &[RgbMode] {
        &self.supported_modes
    }

    /// Live state from `asusctl`, otherwise the fixed default
    pub fn get_current_state(&self) -> RgbState {
        if self.backend == RgbBackend::Tool {
            let cmd = ToolCommand::new(tools::ASUSCTL).args(["led-mode", "-c"]);
            if let Some(state) = run_checked(self.tools.as_ref(), &cmd)
                .ok()
                .and_then(|out| parse_state(&out))
            {
                return state;
            }
        }
        RgbState::default()
    }

    fn dispatch(&self, what: &str, tool: Option<ToolCommand>, openrgb: Option<ToolCommand>) -> bool {
        let cmd = match self.backend {
            RgbBackend::Tool => tool,
            RgbBackend::OpenRgb => openrgb,
            RgbBackend::Sysfs | RgbBackend::None => None,
        };
        let Some(cmd) = cmd else {
            warn!(target: "armoury::rgb", "Cannot set RGB {} with the {} backend", what, self.backend_name());
            return false;
        };

        match run_checked(self.tools.as_ref(), &cmd) {
            Ok(_) => true,
            Err(e) => {
                error!(target: "armoury::rgb", "Failed to set RGB {}: {}", what, e);
                false
            }
        }
    }

    pub fn set_mode(&self, mode: RgbMode) -> bool {
        if !self.supported_modes.contains(&mode) {
            warn!(target: "armoury::rgb", "Mode {} not supported", mode);
            return false;
        }
        info!(target: "armoury::rgb", "Setting RGB mode to: {}", mode);

        self.dispatch(
            "mode",
            Some(ToolCommand::new(tools::ASUSCTL).args(["led-mode", "-s", mode.tool_name()])),
            Some(ToolCommand::new(tools::OPENRGB).arg("-m").arg(mode.ordinal().to_string())),
        )
    }

    pub fn set_color(&self, color: RgbColor) -> bool {
        info!(target: "armoury::rgb", "Setting RGB color to: {}", color);
        let digits = color.to_hex().trim_start_matches('#').to_string();

        self.dispatch(
            "color",
            Some(ToolCommand::new(tools::ASUSCTL).args(["led-mode", "static", "-c", digits.as_str()])),
            Some(ToolCommand::new(tools::OPENRGB).args(["-c", digits.as_str()])),
        )
    }

    /// 0-100; `asusctl` only knows levels 0-3
    pub fn set_brightness(&self, brightness: i32) -> bool {
        let brightness = brightness.clamp(0, 100);
        info!(target: "armoury::rgb", "Setting RGB brightness to: {}%", brightness);
        let level = (brightness / rgb::TOOL_BRIGHTNESS_STEP).min(rgb::TOOL_BRIGHTNESS_MAX);

        self.dispatch(
            "brightness",
            Some(ToolCommand::new(tools::ASUSCTL).args(["led-mode", "-b"]).arg(level.to_string())),
            Some(ToolCommand::new(tools::OPENRGB).arg("-b").arg(brightness.to_string())),
        )
    }

    /// 0-100 animation speed; `asusctl` only knows levels 0-2
    pub fn set_speed(&self, speed: i32) -> bool {
        let speed = speed.clamp(0, 100);
        info!(target: "armoury::rgb", "Setting RGB speed to: {}%", speed);
        let level = (speed / rgb::TOOL_SPEED_STEP).min(rgb::TOOL_SPEED_MAX);

        self.dispatch(
            "speed",
            Some(ToolCommand::new(tools::ASUSCTL).args(["led-mode", "--speed"]).arg(level.to_string())),
            None,
        )
    }

    /// Mode first, then whichever of colour/brightness/speed apply to it
    pub fn apply_config(
        &self,
        mode: RgbMode,
        color: Option<RgbColor>,
        brightness: Option<i32>,
        speed: Option<i32>,
    ) -> bool {
        let mut success = self.set_mode(mode);

        if let Some(color) = color.filter(|_| !mode.ignores_color()) {
            success &= self.set_color(color);
        }
        if let Some(brightness) = brightness {
            success &= self.set_brightness(brightness);
        }
        if let Some(speed) = speed.filter(|_| mode.is_animated()) {
            success &= self.set_speed(speed);
        }
        success
    }

    pub fn turn_off(&self) -> bool {
        self.set_mode(RgbMode::Off)
    }

    pub fn turn_on(&self) -> bool {
        self.set_mode(RgbMode::Static)
    }
}

/// Named colours offered by front ends
pub fn preset_colors() -> Vec<(&'static str, RgbColor)> {
    vec![
        ("Red", RgbColor::new(255, 0, 0)),
        ("Green", RgbColor::new(0, 255, 0)),
        ("Blue", RgbColor::new(0, 0, 255)),
        ("Cyan", RgbColor::new(0, 255, 255)),
        ("Magenta", RgbColor::new(255, 0, 255)),
        ("Yellow", RgbColor::new(255, 255, 0)),
        ("Orange", RgbColor::new(255, 128, 0)),
        ("Purple", RgbColor::new(128, 0, 255)),
        ("Pink", RgbColor::new(255, 128, 192)),
        ("White", RgbColor::new(255, 255, 255)),
        ("ROG Red", RgbColor::new(255, 0, 50)),
        ("TUF Orange", RgbColor::new(255, 85, 0)),
    ]
}
