//! Telemetry monitor
//!
//! Polls the thermal snapshot and then the AC-power state once per interval
//! and publishes a [`ServiceEvent`] whenever a snapshot differs from the
//! previous one.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::service::{ControlService, ServiceEvent};

/// Log every Nth consecutive failure after the first
const ERROR_LOG_EVERY: u32 = 10;

/// Previous snapshots for change detection
#[derive(Debug, Default)]
pub struct MonitorState {
    last_temps: Option<BTreeMap<String, f64>>,
    last_ac: Option<bool>,
}

/// One monitor iteration. Returns the events it emitted.
pub fn poll_once(service: &ControlService, state: &mut MonitorState) -> Vec<ServiceEvent> {
    let mut emitted = Vec::new();
    let hw = service.hardware();

    let temps = hw.thermal.get_all_temperatures();
    if state.last_temps.as_ref() != Some(&temps) {
        if hw.thermal.is_thermal_throttling() {
            warn!(target: "armoury::service", "Thermal throttling detected!");
        }
        state.last_temps = Some(temps.clone());
        emitted.push(ServiceEvent::Temperature(temps));
    }

    let connected = hw.battery.get_ac_status();
    if state.last_ac != Some(connected) {
        state.last_ac = Some(connected);
        emitted.push(ServiceEvent::AcPower { connected });
    }

    for event in &emitted {
        service.emit(event.clone());
    }
    emitted
}

/// Run until `shutdown` is set. The flag is checked after each sleep, so a
/// poll already in progress always completes.
pub async fn run_monitor_loop(service: Arc<ControlService>, shutdown: Arc<AtomicBool>) {
    info!(
        target: "armoury::service",
        "Monitor loop starting (interval {:?})",
        service.poll_interval()
    );

    let mut state = MonitorState::default();
    let mut consecutive_errors: u32 = 0;

    loop {
        let svc = Arc::clone(&service);
        let result = tokio::task::spawn_blocking(move || {
            let events = poll_once(&svc, &mut state);
            (state, events)
        })
        .await;

        match result {
            Ok((next, events)) => {
                state = next;
                if consecutive_errors > 0 {
                    debug!(target: "armoury::service", "Monitor recovered after {} errors", consecutive_errors);
                    consecutive_errors = 0;
                }
                if !events.is_empty() {
                    debug!(target: "armoury::service", "Monitor emitted {} events", events.len());
                }
            }
            Err(e) => {
                // The state moved into the failed task; start change detection over
                state = MonitorState::default();
                consecutive_errors += 1;
                if consecutive_errors == 1 || consecutive_errors % ERROR_LOG_EVERY == 0 {
                    error!(target: "armoury::service", "Monitor poll failed (count: {}): {}", consecutive_errors, e);
                }
            }
        }

        tokio::time::sleep(service.poll_interval()).await;

        if shutdown.load(Ordering::SeqCst) {
            info!(target: "armoury::service", "Monitor loop shutting down");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Machine;
    use std::time::Duration;

    #[test]
    fn test_first_poll_emits_both_snapshots() {
        let machine = Machine::new();
        let service = machine.service();
        let mut state = MonitorState::default();

        let events = poll_once(&service, &mut state);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], ServiceEvent::Temperature(t) if t.get("CPU Package") == Some(&45.0)));
        assert_eq!(events[1], ServiceEvent::AcPower { connected: true });
    }

    #[test]
    fn test_unchanged_snapshot_is_quiet() {
        let machine = Machine::new();
        let service = machine.service();
        let mut state = MonitorState::default();

        poll_once(&service, &mut state);
        assert!(poll_once(&service, &mut state).is_empty());
    }

    #[test]
    fn test_any_change_emits() {
        let machine = Machine::new();
        let service = machine.service();
        let mut state = MonitorState::default();
        let mut rx = service.subscribe();
        poll_once(&service, &mut state);
        while rx.try_recv().is_ok() {}

        machine.file("/sys/class/hwmon/hwmon1/temp1_input", "45001");
        machine.file("/sys/class/power_supply/AC0/online", "0");

        let events = poll_once(&service, &mut state);
        assert_eq!(events.len(), 2);
        assert!(matches!(rx.try_recv().unwrap(), ServiceEvent::Temperature(_)));
        assert_eq!(rx.try_recv().unwrap(), ServiceEvent::AcPower { connected: false });
    }

    #[tokio::test]
    async fn test_loop_stops_on_flag() {
        let machine = Machine::new();
        machine.write_settings(r#"{"settings": {"polling_interval": 100}}"#);
        let service = machine.service();
        let mut rx = service.subscribe();
        let shutdown = Arc::new(AtomicBool::new(false));

        let handle = tokio::spawn(run_monitor_loop(Arc::clone(&service), Arc::clone(&shutdown)));
        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert!(matches!(first, ServiceEvent::Temperature(_)));

        shutdown.store(true, Ordering::SeqCst);
        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    }
}
