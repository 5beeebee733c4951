//! Control service: shared state behind the socket server and the monitor

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use armoury_core::{
    ApplyReport, BatteryInfo, Hardware, ProfileDirs, ProfileManager, RgbState, Settings,
};
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};

use armoury_core::constants::service::EVENT_CHANNEL_CAPACITY;

/// Telemetry and state changes published to subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum ServiceEvent {
    Temperature(BTreeMap<String, f64>),
    AcPower { connected: bool },
    Profile(String),
}

/// `GetStatus` payload
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub cpu_mode: Option<String>,
    pub temperatures: BTreeMap<String, f64>,
    pub thermal_status: String,
    pub battery: BatteryInfo,
    pub ac_connected: bool,
    pub active_profile: Option<String>,
    pub rgb_state: RgbState,
}

pub struct ControlService {
    hardware: Arc<Hardware>,
    profiles: Mutex<ProfileManager>,
    events: broadcast::Sender<ServiceEvent>,
    /// Monitor poll interval in milliseconds
    poll_interval_ms: AtomicU64,
}

impl ControlService {
    pub fn new(hardware: Arc<Hardware>, settings: Settings, dirs: &ProfileDirs) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let poll_interval_ms = settings.polling_interval_ms();

        let mut manager = ProfileManager::new(Arc::clone(&hardware), settings, dirs);
        let profile_events = events.clone();
        manager.add_listener(move |name| {
            // No subscribers is fine
            let _ = profile_events.send(ServiceEvent::Profile(name.to_string()));
        });

        Arc::new(Self {
            hardware,
            profiles: Mutex::new(manager),
            events,
            poll_interval_ms: AtomicU64::new(poll_interval_ms),
        })
    }

    pub fn hardware(&self) -> &Hardware {
        &self.hardware
    }

    pub fn profiles(&self) -> MutexGuard<'_, ProfileManager> {
        self.profiles.lock()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.events.subscribe()
    }

    pub fn emit(&self, event: ServiceEvent) {
        let _ = self.events.send(event);
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.load(Ordering::Relaxed))
    }

    /// Re-apply the `active_profile` recorded in the settings file
    pub fn restore_active_profile(&self) -> Option<ApplyReport> {
        let mut manager = self.profiles();
        let name = manager.settings().active_profile()?.to_string();

        info!(target: "armoury::service", "Restoring profile: {}", name);
        match manager.apply_profile(&name) {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(target: "armoury::service", "Could not restore profile {}: {}", name, e);
                None
            }
        }
    }

    pub fn get_status(&self) -> StatusReport {
        let hw = &self.hardware;
        StatusReport {
            cpu_mode: hw.cpu.get_current_mode().map(|m| m.as_str().to_string()),
            temperatures: hw.thermal.get_all_temperatures(),
            thermal_status: hw.thermal.get_thermal_status().as_str().to_string(),
            battery: hw.battery.get_battery_info(),
            ac_connected: hw.battery.get_ac_status(),
            active_profile: self.profiles().current_profile().map(str::to_string),
            rgb_state: hw.rgb.get_current_state(),
        }
    }
}
