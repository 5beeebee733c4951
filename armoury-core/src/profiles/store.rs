//! Profile loading from built-ins, the settings file and profile directories

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::constants::paths;
use crate::error::{ArmouryError, Result};
use crate::settings::Settings;

use super::types::{builtin_profiles, PerformanceProfile};

/// Directories scanned for `*.json` profile files
#[derive(Debug, Clone, Default)]
pub struct ProfileDirs {
    pub user: Option<PathBuf>,
    pub system: Option<PathBuf>,
}

impl ProfileDirs {
    /// `~/.config/asus-armoury/profiles` and `/etc/asus-armoury/profiles`
    pub fn default_locations() -> Self {
        Self {
            user: paths::user_config_dir().map(|dir| dir.join(paths::PROFILES_DIR)),
            system: Some(paths::system_config_dir().join(paths::PROFILES_DIR)),
        }
    }

    /// No directory scanning
    pub fn none() -> Self {
        Self::default()
    }
}

/// Read a single profile file
pub fn load_profile_file(path: &Path) -> Result<PerformanceProfile> {
    let contents = fs::read_to_string(path)
        .map_err(|e| ArmouryError::FileRead { path: path.to_path_buf(), source: e })?;
    Ok(serde_json::from_str(&contents)?)
}

/// Every parseable `*.json` profile in `dir`, in file-name order.
/// Unreadable or invalid files are logged and skipped.
pub fn load_profile_dir(dir: &Path) -> Vec<PerformanceProfile> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    files
        .iter()
        .filter_map(|path| match load_profile_file(path) {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!(target: "armoury::profiles", "Failed to load profile {:?}: {}", path, e);
                None
            }
        })
        .collect()
}

/// Name-keyed collection of profiles
#[derive(Debug, Clone, Default)]
pub struct ProfileStore {
    profiles: BTreeMap<String, PerformanceProfile>,
}

impl ProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-ins, overridden by profiles from the settings file, then the
    /// user directory and the system directory. Directory profiles never
    /// replace a name that is already loaded.
    pub fn load(settings: &Settings, dirs: &ProfileDirs) -> Self {
        let mut store = Self::new();
        for profile in builtin_profiles() {
            store.insert(profile);
        }
        for profile in settings.profiles().values() {
            store.insert(profile.clone());
        }

        for dir in [&dirs.user, &dirs.system].into_iter().flatten() {
            for profile in load_profile_dir(dir) {
                if store.contains(&profile.name) {
                    debug!(
                        target: "armoury::profiles",
                        "Skipping {:?} from {:?}: already loaded",
                        profile.name,
                        dir
                    );
                    continue;
                }
                store.insert(profile);
            }
        }

        debug!(target: "armoury::profiles", "Loaded {} profiles", store.len());
        store
    }

    pub fn get(&self, name: &str) -> Option<&PerformanceProfile> {
        self.profiles.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    /// Add or replace by name
    pub fn insert(&mut self, profile: PerformanceProfile) {
        self.profiles.insert(profile.name.clone(), profile);
    }

    pub fn remove(&mut self, name: &str) -> Option<PerformanceProfile> {
        self.profiles.remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    pub fn as_map(&self) -> &BTreeMap<String, PerformanceProfile> {
        &self.profiles
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
