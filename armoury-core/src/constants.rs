//! Constants and configuration values for ASUS Armoury
//!
//! Centralizes sysfs paths, attribute names, lookup tables and defaults.
//! Other modules reference these instead of repeating literals.

use std::time::Duration;

/// Filesystem locations (always absolute; resolved through [`crate::Sysfs`])
pub mod paths {
    use std::path::PathBuf;

    /// Candidate platform-device directories for the `asus-nb-wmi` driver, in probe order
    pub const WMI_PLATFORM_DIRS: &[&str] = &[
        "/sys/devices/platform/asus-nb-wmi",
        "/sys/devices/platform/asus_nb_wmi",
        "/sys/bus/platform/devices/asus-nb-wmi",
    ];

    /// Per-battery charge threshold files used when the WMI directory lacks one
    pub const BATTERY_THRESHOLD_FALLBACKS: &[&str] = &[
        "/sys/class/power_supply/BAT0/charge_control_end_threshold",
        "/sys/class/power_supply/BAT1/charge_control_end_threshold",
        "/sys/class/power_supply/BATC/charge_control_end_threshold",
    ];

    /// Battery power-supply directories, first existing wins
    pub const BATTERY_DIRS: &[&str] = &[
        "/sys/class/power_supply/BAT0",
        "/sys/class/power_supply/BAT1",
        "/sys/class/power_supply/BATC",
    ];

    /// AC adapter `online` attributes
    pub const AC_ONLINE: &[&str] = &[
        "/sys/class/power_supply/AC0/online",
        "/sys/class/power_supply/AC/online",
        "/sys/class/power_supply/ADP0/online",
        "/sys/class/power_supply/ADP1/online",
    ];

    pub const DMI_DIR: &str = "/sys/class/dmi/id";
    pub const HWMON_BASE: &str = "/sys/class/hwmon";
    pub const THERMAL_BASE: &str = "/sys/class/thermal";
    pub const CPUFREQ_DIR: &str = "/sys/devices/system/cpu/cpu0/cpufreq";
    pub const PROC_STAT: &str = "/proc/stat";
    pub const PROC_CPUINFO: &str = "/proc/cpuinfo";
    pub const PROC_MODULES: &str = "/proc/modules";

    pub const ANIME_MATRIX_PATHS: &[&str] = &["/sys/class/leds/asus::anime_matrix", "/dev/asusd-anime"];

    /// Application directory name under `~/.config` and `/etc`
    pub const APP_DIR_NAME: &str = "asus-armoury";

    /// System-wide configuration directory
    pub const SYSTEM_CONFIG_DIR: &str = "/etc/asus-armoury";

    /// Settings file name
    pub const CONFIG_FILE: &str = "config.json";

    /// Directory of one-profile-per-file JSON documents
    pub const PROFILES_DIR: &str = "profiles";

    /// Default Unix socket of the control daemon
    pub const SOCKET_PATH: &str = "/run/armouryd.sock";

    /// PID file of the control daemon
    pub const PID_FILE: &str = "/run/armouryd.pid";

    /// User configuration directory (`~/.config/asus-armoury`).
    ///
    /// When running elevated through sudo or pkexec this resolves the invoking
    /// user's home instead of root's.
    pub fn user_config_dir() -> Option<PathBuf> {
        let config_base = if let Ok(sudo_user) = std::env::var("SUDO_USER") {
            passwd_home(|name, _| name == sudo_user).map(|h| h.join(".config"))
        } else if let Ok(pkexec_uid) = std::env::var("PKEXEC_UID") {
            pkexec_uid
                .parse::<u32>()
                .ok()
                .and_then(|uid| passwd_home(|_, line_uid| line_uid == uid))
                .map(|h| h.join(".config"))
        } else {
            None
        };

        let config_base = config_base.or_else(|| {
            if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
                Some(PathBuf::from(xdg))
            } else if let Ok(home) = std::env::var("HOME") {
                Some(PathBuf::from(home).join(".config"))
            } else {
                dirs::config_dir()
            }
        });

        config_base.map(|p| p.join(APP_DIR_NAME))
    }

    /// System configuration directory (`/etc/asus-armoury`)
    pub fn system_config_dir() -> PathBuf {
        PathBuf::from(SYSTEM_CONFIG_DIR)
    }

    /// Look up a home directory in `/etc/passwd`
    fn passwd_home(matches: impl Fn(&str, u32) -> bool) -> Option<PathBuf> {
        let passwd = std::fs::read_to_string("/etc/passwd").ok()?;
        passwd.lines().find_map(|line| {
            let parts: Vec<&str> = line.split(':').collect();
            if parts.len() < 6 {
                return None;
            }
            let uid = parts[2].parse::<u32>().ok()?;
            matches(parts[0], uid).then(|| PathBuf::from(parts[5]))
        })
    }
}

/// Attribute file names under the WMI platform directory
pub mod wmi {
    pub const THROTTLE_THERMAL_POLICY: &str = "throttle_thermal_policy";
    pub const CHARGE_CONTROL_END_THRESHOLD: &str = "charge_control_end_threshold";
    pub const KBD_RGB_MODE: &str = "kbd_rgb_mode";
    pub const GPU_MUX_MODE: &str = "gpu_mux_mode";
    pub const DGPU_DISABLE: &str = "dgpu_disable";
    pub const EGPU_ENABLE: &str = "egpu_enable";
    pub const PANEL_OD: &str = "panel_od";
}

/// External helper tools
pub mod tools {
    use std::time::Duration;

    pub const ASUSCTL: &str = "asusctl";
    pub const OPENRGB: &str = "openrgb";
    pub const SENSORS: &str = "sensors";
    pub const NVIDIA_SMI: &str = "nvidia-smi";
    pub const LSPCI: &str = "lspci";
    pub const SUPERGFXCTL: &str = "supergfxctl";

    /// Upper bound on any single tool invocation
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Poll granularity while waiting for a child process
    pub const WAIT_POLL: Duration = Duration::from_millis(10);
}

/// `throttle_thermal_policy` codes
pub mod thermal_policy {
    pub const BALANCED: i64 = 0;
    pub const TURBO: i64 = 1;
    pub const SILENT: i64 = 2;
}

/// Fan control values
pub mod fan {
    /// Highest `fan{N}_input` index probed
    pub const MAX_FANS: u32 = 4;

    /// Logical fans exposed by `asusctl` (CPU, GPU)
    pub const TOOL_FAN_COUNT: u32 = 2;

    pub const PWM_MAX: f64 = 255.0;

    /// PWM value reported when the backend cannot read one
    pub const PLACEHOLDER_PWM: u8 = 128;

    /// `pwm{N}_enable` values
    pub mod enable {
        pub const FULL: i64 = 0;
        pub const MANUAL: i64 = 1;
        pub const AUTO: i64 = 2;
    }
}

/// Keyboard lighting scaling
pub mod rgb {
    /// `asusctl` brightness is 0-3
    pub const TOOL_BRIGHTNESS_STEP: i32 = 25;
    pub const TOOL_BRIGHTNESS_MAX: i32 = 3;

    /// `asusctl` speed is 0-2
    pub const TOOL_SPEED_STEP: i32 = 34;
    pub const TOOL_SPEED_MAX: i32 = 2;
}

/// Battery charge thresholds
pub mod battery {
    pub const MIN_CHARGE_LIMIT: i32 = 20;
    pub const MAX_CHARGE_LIMIT: i32 = 100;

    /// Sysfs energy/power/voltage attributes are in micro-units
    pub const MICRO: f64 = 1_000_000.0;

    pub const PRESET_MAX_LIFESPAN: i32 = 60;
    pub const PRESET_BALANCED: i32 = 80;
    pub const PRESET_FULL_CHARGE: i32 = 100;
}

/// Temperature conversion and status breakpoints
pub mod temperature {
    /// Sysfs temperatures are millidegrees Celsius
    pub const MILLIDEGREE: f64 = 1000.0;

    /// Fraction of a critical trip point treated as throttling
    pub const THROTTLE_FRACTION: f64 = 0.95;

    pub const COOL_BELOW: f64 = 50.0;
    pub const NORMAL_BELOW: f64 = 70.0;
    pub const WARM_BELOW: f64 = 85.0;
    pub const HOT_BELOW: f64 = 95.0;
}

/// Control service timing
pub mod service {
    pub const DEFAULT_POLL_MS: u64 = 1000;
    pub const MIN_POLL_MS: u64 = 100;
    pub const MAX_POLL_MS: u64 = 60_000;

    /// Capacity of the service event channel
    pub const EVENT_CHANNEL_CAPACITY: usize = 64;
}

/// Default poll interval as a [`Duration`]
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(service::DEFAULT_POLL_MS);

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_tables_are_distinct() {
        let codes = [thermal_policy::BALANCED, thermal_policy::TURBO, thermal_policy::SILENT];
        assert_eq!(codes, [0, 1, 2]);
        assert!(fan::enable::FULL < fan::enable::MANUAL && fan::enable::MANUAL < fan::enable::AUTO);
    }

    #[test]
    #[serial]
    fn test_user_config_dir_prefers_xdg() {
        let saved_sudo = std::env::var("SUDO_USER").ok();
        let saved_xdg = std::env::var("XDG_CONFIG_HOME").ok();
        std::env::remove_var("SUDO_USER");
        std::env::remove_var("PKEXEC_UID");
        std::env::set_var("XDG_CONFIG_HOME", "/tmp/xdg-armoury");

        let dir = paths::user_config_dir();
        assert_eq!(dir, Some(std::path::PathBuf::from("/tmp/xdg-armoury/asus-armoury")));

        match saved_xdg {
            Some(v) => std::env::set_var("XDG_CONFIG_HOME", v),
            None => std::env::remove_var("XDG_CONFIG_HOME"),
        }
        if let Some(v) = saved_sudo {
            std::env::set_var("SUDO_USER", v);
        }
    }
}
