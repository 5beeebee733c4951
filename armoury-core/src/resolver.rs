//! Backend path resolver
//!
//! Finds the `asus-nb-wmi` platform directory and records which control
//! attributes it exposes. Nothing found is not an error: the map is simply
//! empty and each facet treats a missing path as "backend unavailable".

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{paths, wmi};
use crate::sysfs::Sysfs;

/// A control attribute of the WMI platform device
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WmiAttribute {
    ThrottleThermalPolicy,
    ChargeControlEndThreshold,
    KbdRgbMode,
    GpuMuxMode,
    DgpuDisable,
    EgpuEnable,
    PanelOd,
}

impl WmiAttribute {
    pub const ALL: [WmiAttribute; 7] = [
        WmiAttribute::ThrottleThermalPolicy,
        WmiAttribute::ChargeControlEndThreshold,
        WmiAttribute::KbdRgbMode,
        WmiAttribute::GpuMuxMode,
        WmiAttribute::DgpuDisable,
        WmiAttribute::EgpuEnable,
        WmiAttribute::PanelOd,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            WmiAttribute::ThrottleThermalPolicy => wmi::THROTTLE_THERMAL_POLICY,
            WmiAttribute::ChargeControlEndThreshold => wmi::CHARGE_CONTROL_END_THRESHOLD,
            WmiAttribute::KbdRgbMode => wmi::KBD_RGB_MODE,
            WmiAttribute::GpuMuxMode => wmi::GPU_MUX_MODE,
            WmiAttribute::DgpuDisable => wmi::DGPU_DISABLE,
            WmiAttribute::EgpuEnable => wmi::EGPU_ENABLE,
            WmiAttribute::PanelOd => wmi::PANEL_OD,
        }
    }
}

/// Resolved control paths, built once at startup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CapabilityMap {
    pub platform: Option<PathBuf>,
    attributes: BTreeMap<WmiAttribute, PathBuf>,
}

impl CapabilityMap {
    /// Probe the WMI platform directories (first existing wins)
    pub fn resolve(sysfs: &Sysfs) -> Self {
        let mut map = Self::default();

        if let Some(platform) = paths::WMI_PLATFORM_DIRS.iter().find(|dir| sysfs.is_dir(dir)) {
            let platform = PathBuf::from(platform);
            for attr in WmiAttribute::ALL {
                let path = platform.join(attr.file_name());
                if sysfs.exists(&path) {
                    map.attributes.insert(attr, path);
                }
            }
            debug!(
                target: "armoury::detect",
                "WMI platform at {} with {} attributes",
                platform.display(),
                map.attributes.len()
            );
            map.platform = Some(platform);
        }

        if !map.has(WmiAttribute::ChargeControlEndThreshold) {
            if let Some(path) = paths::BATTERY_THRESHOLD_FALLBACKS.iter().find(|p| sysfs.exists(p)) {
                map.attributes
                    .insert(WmiAttribute::ChargeControlEndThreshold, PathBuf::from(path));
            }
        }

        map
    }

    pub fn get(&self, attr: WmiAttribute) -> Option<&Path> {
        self.attributes.get(&attr).map(PathBuf::as_path)
    }

    pub fn has(&self, attr: WmiAttribute) -> bool {
        self.attributes.contains_key(&attr)
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (WmiAttribute, &Path)> {
        self.attributes.iter().map(|(k, v)| (*k, v.as_path()))
    }
}
