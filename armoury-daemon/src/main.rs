//! ASUS Armoury Daemon (armouryd)
//!
//! Privileged control service for ASUS laptops. Owns the hardware facets,
//! runs the telemetry monitor and serves the remote control surface to
//! unprivileged clients over a Unix domain socket.
//!
//! # Lifecycle
//! - Detect the hardware (warn when the machine is not an ASUS)
//! - Start the monitor loop
//! - Restore the `active_profile` recorded in the settings file
//! - Serve the socket until SIGINT/SIGTERM

mod api;
mod monitor;
mod server;
mod service;

#[cfg(test)]
mod test_support;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context};
use armoury_core::constants::paths;
use armoury_core::{Hardware, ProfileDirs, Settings};
use tracing::{debug, error, info, warn};

use crate::service::{ControlService, ServiceEvent};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Global shutdown flag for clean termination
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

// ============================================================================
// Security Checks
// ============================================================================

fn verify_privileges() -> anyhow::Result<()> {
    // SAFETY: geteuid and getuid only return the process's user IDs.
    let euid = unsafe { libc::geteuid() };
    let uid = unsafe { libc::getuid() };

    if euid != 0 {
        bail!("armouryd must run as root (euid=0) for hardware access");
    }
    if uid != 0 {
        warn!("Running as setuid root - this is not recommended");
    }

    info!("Running as root (uid={}, euid={})", uid, euid);
    Ok(())
}

fn validate_socket_path(path: &Path) -> Result<(), String> {
    let text = path.to_string_lossy();

    if !path.is_absolute() {
        return Err("Socket path must be absolute".into());
    }
    if text.contains("..") {
        return Err("Socket path contains path traversal".into());
    }
    if text.contains('\0') {
        return Err("Socket path contains null byte".into());
    }
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            return Err(format!("Parent directory does not exist: {}", parent.display()));
        }
    }
    if path
        .symlink_metadata()
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
    {
        return Err("Socket path is a symlink - refusing to use it".into());
    }

    Ok(())
}

// ============================================================================
// PID File Management
// ============================================================================

fn write_pid_file(path: &Path) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    if path.exists() {
        if let Ok(content) = std::fs::read_to_string(path) {
            if let Ok(old_pid) = content.trim().parse::<i32>() {
                // SAFETY: signal 0 only checks that the process exists.
                if unsafe { libc::kill(old_pid, 0) } == 0 {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::AddrInUse,
                        format!("Another instance is running (PID {})", old_pid),
                    ));
                }
            }
        }
        // Stale
        let _ = std::fs::remove_file(path);
    }

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o644)
        .open(path)?;

    writeln!(file, "{}", std::process::id())?;
    file.sync_all()?;

    debug!("PID file written: {}", path.display());
    Ok(())
}

fn cleanup(socket_path: &Path) {
    debug!("Starting cleanup...");

    for (what, path) in [("socket", socket_path), ("PID file", Path::new(paths::PID_FILE))] {
        if path.exists() {
            if let Err(e) = std::fs::remove_file(path) {
                warn!("Failed to remove {}: {}", what, e);
            }
        }
    }

    info!("Cleanup complete");
}

// ============================================================================
// CLI
// ============================================================================

struct Options {
    socket_path: PathBuf,
    debug: bool,
    detect: bool,
}

enum Command {
    Run(Options),
    Help,
    Version,
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    let mut options = Options {
        socket_path: PathBuf::from(paths::SOCKET_PATH),
        debug: false,
        detect: false,
    };

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "-v" | "--version" => return Ok(Command::Version),
            "--debug" => options.debug = true,
            "--detect" => options.detect = true,
            "-s" | "--socket" => {
                let path = iter.next().ok_or("--socket requires a path argument")?;
                options.socket_path = PathBuf::from(path);
            }
            other => return Err(format!("Unknown argument: {}", other)),
        }
    }

    Ok(Command::Run(options))
}

fn print_help() {
    eprintln!("armouryd {} - ASUS laptop control daemon", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    armouryd [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("        --debug         Enable debug logging");
    eprintln!("        --detect        Print detected hardware as JSON and exit");
    eprintln!("    -s, --socket PATH   Socket path (default {})", paths::SOCKET_PATH);
    eprintln!("    -v, --version       Print version");
    eprintln!("    -h, --help          Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    ARMOURY_LOG         Log filter (trace, debug, info, warn, error)");
}

/// Journald when the systemd journal is reachable, stderr otherwise.
/// Returns whether journald is in use.
fn init_logging(debug: bool) -> bool {
    use tracing_subscriber::prelude::*;

    let filter = if debug {
        "debug".to_string()
    } else {
        std::env::var("ARMOURY_LOG").unwrap_or_else(|_| "info".to_string())
    };

    if Path::new("/run/systemd/journal/socket").exists() {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(tracing_subscriber::EnvFilter::new(&filter))
                    .init();
                return true;
            }
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stderr", e);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(debug)
        .with_env_filter(&filter)
        .init();
    false
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // PHASE 0: Panic hook so crashes reach the journal
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("PANIC at {}: {}", location, message);
    }));

    // PHASE 1: Arguments
    let args: Vec<String> = std::env::args().collect();
    let options = match parse_args(&args) {
        Ok(Command::Run(options)) => options,
        Ok(Command::Help) => {
            print_help();
            return Ok(());
        }
        Ok(Command::Version) => {
            println!("armouryd {}", VERSION);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    // PHASE 2: Logging
    let use_journald = init_logging(options.debug);

    // PHASE 3: Detection-only mode needs no privileges
    if options.detect {
        let hardware = Hardware::system();
        let summary = hardware.detector.detect().summary();
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to encode detection report")?
        );
        return Ok(());
    }

    info!("STARTUP: armouryd {} starting", VERSION);
    info!("STARTUP: Logging to {}", if use_journald { "systemd journal" } else { "stderr" });

    // PHASE 4: Privilege and socket checks
    verify_privileges()?;
    if let Err(e) = validate_socket_path(&options.socket_path) {
        bail!("Invalid socket path: {}", e);
    }

    // PHASE 5: PID file
    write_pid_file(Path::new(paths::PID_FILE)).context("Could not write PID file")?;

    // PHASE 6: Signal handlers
    let socket_path_clone = options.socket_path.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("SIGNAL: Received SIGINT/SIGTERM - initiating shutdown");
        SHUTDOWN.store(true, Ordering::SeqCst);
        cleanup(&socket_path_clone);
        info!("SHUTDOWN: Daemon terminated");
        std::process::exit(0);
    }) {
        warn!("Failed to set signal handler: {}", e);
    }

    info!("STARTUP: Socket path: {}", options.socket_path.display());
    info!("STARTUP: PID: {}", std::process::id());

    // PHASE 7: Hardware and service
    let hardware = Arc::new(Hardware::system());
    let caps = hardware.detector.detect();
    if caps.is_asus {
        info!("STARTUP: {} ({})", caps.model_name, caps.model_family);
    } else {
        warn!("STARTUP: Not an ASUS system; most features will be unavailable");
    }

    let settings = Settings::load(None);
    info!("STARTUP: Settings file: {}", settings.path().display());
    let service = ControlService::new(hardware, settings, &ProfileDirs::default_locations());

    // PHASE 8: Event log
    let mut events = service.subscribe();
    let event_task = tokio::spawn(async move {
        use tokio::sync::broadcast::error::RecvError;
        loop {
            match events.recv().await {
                Ok(ServiceEvent::Temperature(temps)) => debug!("Temperatures: {:?}", temps),
                Ok(ServiceEvent::AcPower { connected }) => {
                    info!("AC power {}", if connected { "connected" } else { "disconnected" })
                }
                Ok(ServiceEvent::Profile(name)) => info!("Profile changed: {}", name),
                Err(RecvError::Lagged(n)) => debug!("Event log skipped {} events", n),
                Err(RecvError::Closed) => break,
            }
        }
    });

    // PHASE 9: Monitor loop
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let monitor_handle = tokio::spawn(monitor::run_monitor_loop(
        Arc::clone(&service),
        Arc::clone(&shutdown_flag),
    ));
    info!("Monitor loop started");

    // PHASE 10: Restore the last profile
    let restore_service = Arc::clone(&service);
    match tokio::task::spawn_blocking(move || restore_service.restore_active_profile()).await {
        Ok(Some(report)) if !report.success() => {
            warn!("Profile {} restored with failures: {}", report.profile, report.failed.join(", "))
        }
        Ok(_) => {}
        Err(e) => error!("Profile restore task failed: {}", e),
    }

    // PHASE 11: Serve
    let result = server::run_server(&options.socket_path, Arc::clone(&service), Arc::clone(&shutdown_flag)).await;

    // PHASE 12: Shutdown
    shutdown_flag.store(true, Ordering::SeqCst);
    let _ = monitor_handle.await;
    event_task.abort();
    cleanup(&options.socket_path);

    result.context("Server error")
}
