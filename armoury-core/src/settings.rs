//! Settings file (`config.json`)
//!
//! The file holds two top-level objects: `settings`, a flat key/value map,
//! and `profiles`, inline performance profiles keyed by name. Keys read from
//! the file override the built-in defaults; unknown keys are kept and written
//! back on save.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::constants::{paths, service};
use crate::error::{ArmouryError, Result};
use crate::profiles::PerformanceProfile;

pub const KEY_ACTIVE_PROFILE: &str = "active_profile";
pub const KEY_POLLING_INTERVAL: &str = "polling_interval";

/// Built-in setting values, overridden key by key from the file
pub fn default_settings() -> Map<String, Value> {
    let defaults = json!({
        "version": "1.0.0",
        "auto_start": true,
        "minimize_to_tray": true,
        "check_updates": true,
        "dark_mode": true,
        "active_profile": "Balanced",
        "temperature_unit": "celsius",
        "polling_interval": service::DEFAULT_POLL_MS,
        "enable_notifications": true,
        "safe_mode": true,
    });
    match defaults {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    settings: Map<String, Value>,
    #[serde(default)]
    profiles: BTreeMap<String, Value>,
}

/// Parse one inline profile, using its map key when `name` is absent
fn inline_profile(key: &str, mut value: Value) -> Result<PerformanceProfile> {
    if let Value::Object(obj) = &mut value {
        obj.entry("name").or_insert_with(|| Value::String(key.to_string()));
    }
    Ok(serde_json::from_value(value)?)
}

/// Serialize `value` to `path` through a temp file, fsync and rename
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| ArmouryError::FileWrite {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
    }

    let json = serde_json::to_string_pretty(value)?;
    let temp_path = path.with_extension("json.tmp");

    let mut file = fs::File::create(&temp_path)
        .map_err(|e| ArmouryError::FileWrite { path: temp_path.clone(), source: e })?;
    file.write_all(json.as_bytes())
        .map_err(|e| ArmouryError::FileWrite { path: temp_path.clone(), source: e })?;
    file.sync_all()
        .map_err(|e| ArmouryError::FileWrite { path: temp_path.clone(), source: e })?;
    drop(file);

    fs::rename(&temp_path, path)
        .map_err(|e| ArmouryError::FileWrite { path: path.to_path_buf(), source: e })?;
    Ok(())
}

/// In-memory view of the settings file
#[derive(Debug, Clone)]
pub struct Settings {
    path: PathBuf,
    values: Map<String, Value>,
    profiles: BTreeMap<String, PerformanceProfile>,
}

impl Settings {
    /// Defaults only, bound to `path` for later saves
    pub fn with_defaults(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            values: default_settings(),
            profiles: BTreeMap::new(),
        }
    }

    /// Pick the settings path: the user file if it exists, else the system
    /// file if that exists, else the user path (created on first save).
    pub fn default_path() -> PathBuf {
        let user = paths::user_config_dir()
            .unwrap_or_else(|| PathBuf::from(".").join(paths::APP_DIR_NAME))
            .join(paths::CONFIG_FILE);
        if user.exists() {
            return user;
        }
        let system = paths::system_config_dir().join(paths::CONFIG_FILE);
        if system.exists() {
            return system;
        }
        user
    }

    /// Load from `path` (or the default location). A missing or unreadable
    /// file leaves the defaults in place.
    pub fn load(path: Option<PathBuf>) -> Self {
        let path = path.unwrap_or_else(Self::default_path);
        let mut settings = Self::with_defaults(&path);
        if !path.exists() {
            debug!(target: "armoury::settings", "No settings file at {:?}, using defaults", path);
            return settings;
        }
        if let Err(e) = settings.reload() {
            warn!(target: "armoury::settings", "Failed to load settings: {}", e);
        }
        settings
    }

    /// Re-read the file, merging it over the current values
    pub fn reload(&mut self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .map_err(|e| ArmouryError::FileRead { path: self.path.clone(), source: e })?;
        let file: SettingsFile = serde_json::from_str(&contents)?;

        for (key, value) in file.settings {
            self.values.insert(key, value);
        }
        for (key, value) in file.profiles {
            match inline_profile(&key, value) {
                Ok(profile) => {
                    self.profiles.insert(profile.name.clone(), profile);
                }
                Err(e) => {
                    warn!(target: "armoury::settings", "Skipping invalid profile {:?}: {}", key, e)
                }
            }
        }

        info!(
            target: "armoury::settings",
            "Loaded settings from {:?} ({} inline profiles)",
            self.path,
            self.profiles.len()
        );
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let mut profiles = BTreeMap::new();
        for (name, profile) in &self.profiles {
            profiles.insert(name.clone(), serde_json::to_value(profile)?);
        }
        let file = SettingsFile { settings: self.values.clone(), profiles };
        write_json_atomic(&self.path, &file)?;
        debug!(target: "armoury::settings", "Saved settings to {:?}", self.path);
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn active_profile(&self) -> Option<&str> {
        self.get_str(KEY_ACTIVE_PROFILE)
    }

    pub fn set_active_profile(&mut self, name: &str) {
        self.set(KEY_ACTIVE_PROFILE, name);
    }

    /// Monitor poll interval in milliseconds, clamped to 100..=60000
    pub fn polling_interval_ms(&self) -> u64 {
        self.get(KEY_POLLING_INTERVAL)
            .and_then(Value::as_u64)
            .unwrap_or(service::DEFAULT_POLL_MS)
            .clamp(service::MIN_POLL_MS, service::MAX_POLL_MS)
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms())
    }

    /// Profiles stored inline in the settings file
    pub fn profiles(&self) -> &BTreeMap<String, PerformanceProfile> {
        &self.profiles
    }

    pub fn set_profile(&mut self, profile: PerformanceProfile) {
        self.profiles.insert(profile.name.clone(), profile);
    }

    pub fn remove_profile(&mut self, name: &str) -> bool {
        self.profiles.remove(name).is_some()
    }
}
