//! Profile manager: owns the profile set and applies profiles to the hardware

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::cpu::CpuMode;
use crate::error::{ArmouryError, Result};
use crate::hardware::Hardware;
use crate::rgb::{RgbColor, RgbMode};
use crate::settings::{write_json_atomic, Settings};

use super::store::{load_profile_file, ProfileDirs, ProfileStore};
use super::types::{is_builtin, FanCurve, PerformanceProfile, RgbConfig};

/// Callback invoked with the profile name after every apply
pub type ProfileListener = Box<dyn Fn(&str) + Send + Sync>;

/// Outcome of [`ProfileManager::apply_profile`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub profile: String,
    /// Facets whose write failed, in apply order
    pub failed: Vec<String>,
}

impl ApplyReport {
    pub fn success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn into_result(self) -> Result<()> {
        if self.success() {
            Ok(())
        } else {
            Err(ArmouryError::PartialApply { profile: self.profile, failed: self.failed })
        }
    }
}

pub struct ProfileManager {
    hardware: Arc<Hardware>,
    settings: Settings,
    store: ProfileStore,
    current: Option<String>,
    listeners: Vec<(u64, ProfileListener)>,
    next_listener_id: u64,
}

impl ProfileManager {
    pub fn new(hardware: Arc<Hardware>, settings: Settings, dirs: &ProfileDirs) -> Self {
        let store = ProfileStore::load(&settings, dirs);
        info!(target: "armoury::profiles", "Loaded {} profiles", store.len());

        Self {
            hardware,
            settings,
            store,
            current: None,
            listeners: Vec::new(),
            next_listener_id: 1,
        }
    }

    pub fn profiles(&self) -> &BTreeMap<String, PerformanceProfile> {
        self.store.as_map()
    }

    pub fn profile_names(&self) -> Vec<String> {
        self.store.names()
    }

    /// Last applied profile, whether or not every facet succeeded
    pub fn current_profile(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn get_profile(&self, name: &str) -> Option<&PerformanceProfile> {
        self.store.get(name)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn hardware(&self) -> &Arc<Hardware> {
        &self.hardware
    }

    /// Add or replace a profile and persist it to the settings file
    pub fn add_profile(&mut self, profile: PerformanceProfile) -> Result<()> {
        info!(target: "armoury::profiles", "Saving profile: {}", profile.name);
        self.store.insert(profile.clone());
        self.settings.set_profile(profile);
        self.settings.save()
    }

    /// Remove a user profile; the four built-ins are protected
    pub fn remove_profile(&mut self, name: &str) -> Result<()> {
        if is_builtin(name) {
            warn!(target: "armoury::profiles", "Cannot remove built-in profile: {}", name);
            return Err(ArmouryError::ProtectedProfile(name.to_string()));
        }
        if self.store.remove(name).is_none() {
            return Err(ArmouryError::ProfileNotFound(name.to_string()));
        }

        info!(target: "armoury::profiles", "Removed profile: {}", name);
        if self.settings.remove_profile(name) {
            self.settings.save()?;
        }
        Ok(())
    }

    /// Apply every facet of a profile.
    ///
    /// Each facet is attempted even after an earlier failure. Unavailable
    /// facets are skipped without counting as a failure. The profile becomes
    /// current and is persisted as `active_profile` even when some facets
    /// fail; the report lists which ones did.
    pub fn apply_profile(&mut self, name: &str) -> Result<ApplyReport> {
        let profile = self.store.get(name).cloned().ok_or_else(|| {
            error!(target: "armoury::profiles", "Profile not found: {}", name);
            ArmouryError::ProfileNotFound(name.to_string())
        })?;

        info!(target: "armoury::profiles", "Applying profile: {}", name);
        let report = ApplyReport {
            profile: name.to_string(),
            failed: self.apply_facets(&profile),
        };

        if report.success() {
            info!(target: "armoury::profiles", "Profile {} applied successfully", name);
        } else {
            warn!(
                target: "armoury::profiles",
                "Profile {} applied with errors: {}",
                name,
                report.failed.join(", ")
            );
        }

        self.current = Some(name.to_string());
        self.settings.set_active_profile(name);
        if let Err(e) = self.settings.save() {
            warn!(target: "armoury::profiles", "Failed to persist active profile: {}", e);
        }
        self.notify(name);

        Ok(report)
    }

    fn apply_facets(&self, profile: &PerformanceProfile) -> Vec<String> {
        let hw = &self.hardware;
        let mut failed = Vec::new();

        match profile.cpu_mode.parse::<CpuMode>() {
            Ok(mode) => {
                if hw.cpu.is_available() && !hw.cpu.set_mode(mode) {
                    failed.push("CPU mode".to_string());
                }
            }
            Err(e) => {
                warn!(target: "armoury::profiles", "{}", e);
                failed.push("CPU mode (invalid)".to_string());
            }
        }

        let points = &profile.fan_curve.points;
        if hw.fan.is_available() && !points.is_empty() && !hw.fan.set_fan_curve(points, 0) {
            failed.push("Fan curve".to_string());
        }

        if hw.rgb.is_available() {
            let rgb = &profile.rgb_config;
            match rgb.mode.parse::<RgbMode>() {
                Ok(mode) => {
                    let applied = hw.rgb.apply_config(
                        mode,
                        Some(RgbColor::from_hex(&rgb.color)),
                        Some(rgb.brightness),
                        Some(rgb.speed),
                    );
                    if !applied {
                        failed.push("RGB settings".to_string());
                    }
                }
                Err(e) => {
                    warn!(target: "armoury::profiles", "{}", e);
                    failed.push("RGB settings (invalid)".to_string());
                }
            }
        }

        if hw.battery.is_available() && !hw.battery.set_charge_limit(profile.battery_charge_limit) {
            failed.push("Battery limit".to_string());
        }

        failed
    }

    /// Snapshot the live hardware state into a new profile named `name`
    pub fn save_current_as_profile(&mut self, name: &str) -> Result<()> {
        let hw = &self.hardware;
        let state = hw.rgb.get_current_state();

        let profile = PerformanceProfile {
            name: name.to_string(),
            cpu_mode: hw
                .cpu
                .get_current_mode()
                .map(|m| m.as_str())
                .unwrap_or("balanced")
                .to_string(),
            gpu_mode: "hybrid".to_string(),
            fan_curve: FanCurve {
                name: format!("{} Curve", name),
                points: hw.fan.get_fan_curve(1).unwrap_or_default(),
            },
            rgb_config: RgbConfig {
                mode: state.mode.as_str().to_string(),
                color: state.color.to_hex(),
                brightness: i32::from(state.brightness),
                speed: i32::from(state.speed),
            },
            battery_charge_limit: hw.battery.get_charge_limit().unwrap_or(100),
        };

        self.add_profile(profile)
    }

    /// Write one profile as a standalone JSON file
    pub fn export_profile(&self, name: &str, path: &Path) -> Result<()> {
        let profile = self
            .store
            .get(name)
            .ok_or_else(|| ArmouryError::ProfileNotFound(name.to_string()))?;
        write_json_atomic(path, profile)?;
        info!(target: "armoury::profiles", "Exported profile {} to {:?}", name, path);
        Ok(())
    }

    /// Read a profile file, add it, and return its name
    pub fn import_profile(&mut self, path: &Path) -> Result<String> {
        let profile = load_profile_file(path)?;
        let name = profile.name.clone();
        self.add_profile(profile)?;
        info!(target: "armoury::profiles", "Imported profile {} from {:?}", name, path);
        Ok(name)
    }

    /// Register a profile-change callback; returns an id for removal
    pub fn add_listener<F>(&mut self, listener: F) -> u64
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let id = self.next_listener_id;
        self.next_listener_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn remove_listener(&mut self, id: u64) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    fn notify(&self, name: &str) {
        for (id, listener) in &self.listeners {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(name))).is_err() {
                error!(target: "armoury::profiles", "Profile listener {} panicked", id);
            }
        }
    }
}
