//! Unix Socket Server
//!
//! Serves the remote control surface to unprivileged clients.
//!
//! # Security Features
//! - **Socket permissions**: world read/write, symlinks refused on creation
//! - **Peer credentials**: UID/PID audit logging for every write request
//! - **Connection limits**: maximum concurrent connections enforced
//! - **Rate limiting**: per-UID request window
//! - **Timeouts**: read/write timeouts per message
//! - **Message limits**: lines longer than the protocol maximum are rejected

use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use armoury_error::{ArmouryError, Result};
use armoury_protocol::{Request, RequestEnvelope, Response, ResponseEnvelope, MAX_MESSAGE_SIZE};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use crate::api;
use crate::service::ControlService;

// ============================================================================
// Security Constants
// ============================================================================

/// Maximum concurrent client connections
const MAX_CONNECTIONS: usize = 64;

/// Read timeout per message
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Write timeout per message
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Requests allowed per client per window
const RATE_LIMIT_REQUESTS: u32 = 600;

const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(10);

/// 0666: any local user may query and control the laptop
const SOCKET_MODE: u32 = 0o666;

/// How often the accept loop checks the shutdown flag
const SHUTDOWN_POLL: Duration = Duration::from_millis(250);

/// Global connection counter
static ACTIVE_CONNECTIONS: AtomicUsize = AtomicUsize::new(0);

async fn read_line_bounded<R: tokio::io::AsyncBufRead + Unpin>(
    reader: &mut R,
    out: &mut Vec<u8>,
    max_len: usize,
) -> std::io::Result<usize> {
    out.clear();

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(0);
        }

        let mut take_len = available.len();
        let mut found_newline = false;
        if let Some(pos) = available.iter().position(|b| *b == b'\n') {
            take_len = pos + 1;
            found_newline = true;
        }

        let remaining = max_len.saturating_sub(out.len());
        if take_len > remaining {
            // Consume enough to make forward progress without buffering past max_len
            let consume_len = remaining.min(available.len());
            reader.consume(consume_len);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "Message too large",
            ));
        }

        out.extend_from_slice(&available[..take_len]);
        reader.consume(take_len);

        if found_newline {
            return Ok(out.len());
        }
    }
}

/// Rate limiter state per client (keyed by UID)
struct RateLimiter {
    clients: HashMap<u32, ClientState>,
    max_requests: u32,
}

struct ClientState {
    request_count: u32,
    window_start: Instant,
}

impl RateLimiter {
    fn new(max_requests: u32) -> Self {
        Self {
            clients: HashMap::new(),
            max_requests,
        }
    }

    /// True if the request is allowed
    fn check_and_increment(&mut self, uid: u32) -> bool {
        let now = Instant::now();

        let state = self.clients.entry(uid).or_insert(ClientState {
            request_count: 0,
            window_start: now,
        });

        if now.duration_since(state.window_start) > RATE_LIMIT_WINDOW {
            state.request_count = 0;
            state.window_start = now;
        }

        if state.request_count >= self.max_requests {
            return false;
        }

        state.request_count += 1;
        true
    }

    fn cleanup(&mut self) {
        let now = Instant::now();
        self.clients
            .retain(|_, state| now.duration_since(state.window_start) < RATE_LIMIT_WINDOW * 2);
    }
}

// ============================================================================
// Server
// ============================================================================

/// Remove a stale socket, bind and set the socket mode
fn bind_socket(socket_path: &Path) -> Result<UnixListener> {
    if socket_path.exists() {
        let metadata = socket_path.symlink_metadata()?;
        if metadata.file_type().is_symlink() {
            return Err(ArmouryError::DaemonConnection(
                "Socket path is a symlink - refusing to replace it".to_string(),
            ));
        }
        std::fs::remove_file(socket_path)?;
        debug!(target: "armoury::server", "Removed existing socket file");
    }

    let listener = UnixListener::bind(socket_path)?;
    std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(SOCKET_MODE))?;
    Ok(listener)
}

/// Serve until SIGINT/SIGTERM or until `shutdown` is set
pub async fn run_server(
    socket_path: &Path,
    service: Arc<ControlService>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let listener = bind_socket(socket_path)?;

    info!(target: "armoury::server", "Listening on {} (mode {:o})", socket_path.display(), SOCKET_MODE);
    info!(
        target: "armoury::server",
        "Limits: max_conn={}, max_msg={}, rate_limit={}/{:?}",
        MAX_CONNECTIONS, MAX_MESSAGE_SIZE, RATE_LIMIT_REQUESTS, RATE_LIMIT_WINDOW
    );

    let rate_limiter = Arc::new(Mutex::new(RateLimiter::new(RATE_LIMIT_REQUESTS)));

    let rate_limiter_cleanup = Arc::clone(&rate_limiter);
    let cleanup_task = tokio::spawn(async move {
        loop {
            tokio::time::sleep(RATE_LIMIT_WINDOW).await;
            rate_limiter_cleanup.lock().await.cleanup();
        }
    });

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let current = ACTIVE_CONNECTIONS.load(Ordering::SeqCst);
                        if current >= MAX_CONNECTIONS {
                            warn!(target: "armoury::server", "Connection limit reached ({}), rejecting new connection", current);
                            drop(stream);
                            continue;
                        }

                        ACTIVE_CONNECTIONS.fetch_add(1, Ordering::SeqCst);
                        let rate_limiter = Arc::clone(&rate_limiter);
                        let service = Arc::clone(&service);

                        tokio::spawn(async move {
                            handle_client(stream, rate_limiter, service).await;
                            ACTIVE_CONNECTIONS.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                    Err(e) => {
                        error!(target: "armoury::server", "Accept error: {}", e);
                    }
                }
            }
            _ = &mut ctrl_c => {
                info!(target: "armoury::server", "Shutdown signal received");
                break;
            }
            _ = tokio::time::sleep(SHUTDOWN_POLL) => {
                if shutdown.load(Ordering::SeqCst) {
                    info!(target: "armoury::server", "Shutdown requested");
                    break;
                }
            }
        }
    }

    cleanup_task.abort();
    let _ = std::fs::remove_file(socket_path);
    info!(target: "armoury::server", "Server stopped");

    Ok(())
}

/// Client credentials from Unix socket peer
#[derive(Debug, Clone, Copy)]
struct PeerCredentials {
    uid: u32,
    gid: u32,
    pid: i32,
}

async fn handle_client(
    stream: UnixStream,
    rate_limiter: Arc<Mutex<RateLimiter>>,
    service: Arc<ControlService>,
) {
    let Some(cred) = get_peer_credentials(&stream) else {
        error!(target: "armoury::server", "Failed to get peer credentials, rejecting connection");
        return;
    };

    debug!(
        target: "armoury::server",
        "Connection from uid={}, gid={}, pid={}",
        cred.uid, cred.gid, cred.pid
    );

    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line: Vec<u8> = Vec::with_capacity(MAX_MESSAGE_SIZE);
    let mut request_count: u64 = 0;
    let connection_start = Instant::now();

    loop {
        let read_result = timeout(
            READ_TIMEOUT,
            read_line_bounded(&mut reader, &mut line, MAX_MESSAGE_SIZE),
        )
        .await;

        match read_result {
            Ok(Ok(0)) => {
                debug!(
                    target: "armoury::server",
                    "Client disconnected: uid={}, pid={}, requests={}, duration={:?}",
                    cred.uid, cred.pid, request_count, connection_start.elapsed()
                );
                break;
            }
            Ok(Ok(n)) => {
                if !rate_limiter.lock().await.check_and_increment(cred.uid) {
                    warn!(target: "armoury::server", "Rate limit exceeded for uid={}, pid={}", cred.uid, cred.pid);
                    let envelope = ResponseEnvelope::new(0, Response::error("Rate limit exceeded"));
                    let _ = send_response(&mut writer, &envelope).await;
                    continue;
                }

                request_count += 1;
                trace!(target: "armoury::server", "Request #{} from uid={}: {} bytes", request_count, cred.uid, n);

                let Ok(line_str) = std::str::from_utf8(&line) else {
                    debug!(target: "armoury::server", "Non-UTF8 request from uid={}", cred.uid);
                    let envelope = ResponseEnvelope::new(0, Response::error("Invalid request encoding"));
                    let _ = send_response(&mut writer, &envelope).await;
                    break;
                };

                let envelope = process_request(line_str, &cred, &service).await;
                if send_response(&mut writer, &envelope).await.is_err() {
                    break;
                }
            }
            Ok(Err(e)) => {
                if e.kind() == std::io::ErrorKind::InvalidData {
                    warn!(
                        target: "armoury::server",
                        "Message too large (>{} bytes) from uid={}, pid={}",
                        MAX_MESSAGE_SIZE, cred.uid, cred.pid
                    );
                    let envelope = ResponseEnvelope::new(0, Response::error("Message too large"));
                    let _ = send_response(&mut writer, &envelope).await;
                } else {
                    error!(target: "armoury::server", "Read error from uid={}, pid={}: {}", cred.uid, cred.pid, e);
                }
                break;
            }
            Err(_) => {
                debug!(target: "armoury::server", "Read timeout for uid={}, pid={}", cred.uid, cred.pid);
                break;
            }
        }
    }
}

async fn send_response(
    writer: &mut tokio::net::unix::OwnedWriteHalf,
    envelope: &ResponseEnvelope,
) -> std::result::Result<(), ()> {
    let json = serde_json::to_string(envelope).unwrap_or_else(|_| {
        r#"{"id":0,"status":"error","message":"Serialization error"}"#.to_string()
    });

    let write_result = timeout(WRITE_TIMEOUT, async {
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        Ok::<_, std::io::Error>(())
    })
    .await;

    match write_result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!(target: "armoury::server", "Write error: {}", e);
            Err(())
        }
        Err(_) => {
            error!(target: "armoury::server", "Write timeout");
            Err(())
        }
    }
}

/// SO_PEERCRED of the connected client
fn get_peer_credentials(stream: &UnixStream) -> Option<PeerCredentials> {
    use std::os::unix::io::AsRawFd;

    let fd = stream.as_raw_fd();

    // SAFETY: ucred is a plain C struct; all-zero is a valid value.
    let mut cred: libc::ucred = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;

    // SAFETY: fd is a live socket owned by `stream`, and cred/len describe a
    // correctly sized ucred buffer.
    let result = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_PEERCRED,
            &mut cred as *mut _ as *mut libc::c_void,
            &mut len,
        )
    };

    (result == 0).then_some(PeerCredentials {
        uid: cred.uid,
        gid: cred.gid,
        pid: cred.pid,
    })
}

/// Describe a write request's arguments for the audit log
fn audit_detail(request: &Request) -> String {
    match request {
        Request::SetCpuMode { mode } | Request::SetRgbMode { mode } => format!("mode={}", mode),
        Request::SetFanMode { mode, fan_id } => format!("mode={} fan_id={}", mode, fan_id),
        Request::SetFanSpeed { speed_percent, fan_id } => {
            format!("speed={}% fan_id={}", speed_percent, fan_id)
        }
        Request::SetFanCurve { curve_json, fan_id } => format!("curve={} fan_id={}", curve_json, fan_id),
        Request::SetRgbColor { hex } => format!("color={}", hex),
        Request::SetRgbBrightness { brightness } => format!("brightness={}", brightness),
        Request::SetBatteryChargeLimit { limit } => format!("limit={}", limit),
        Request::ApplyProfile { name } => format!("name={}", name),
        _ => String::new(),
    }
}

async fn process_request(
    line: &str,
    cred: &PeerCredentials,
    service: &Arc<ControlService>,
) -> ResponseEnvelope {
    let envelope: RequestEnvelope = match serde_json::from_str(line.trim()) {
        Ok(e) => e,
        Err(e) => {
            debug!(target: "armoury::server", "Invalid JSON from uid={}: {}", cred.uid, e);
            return ResponseEnvelope::new(0, Response::error("Invalid request format"));
        }
    };

    let request_id = envelope.id;
    let request = envelope.request;

    if let Err(e) = request.validate() {
        warn!(target: "armoury::server", "Request validation failed from uid={}: {}", cred.uid, e);
        return ResponseEnvelope::new(request_id, Response::error(e));
    }

    let request_type = request.type_name();
    let is_write = request.is_write();
    if is_write {
        info!(
            target: "armoury::server",
            "AUDIT: {} {} by uid={}, pid={}",
            request_type, audit_detail(&request), cred.uid, cred.pid
        );
    } else {
        debug!(target: "armoury::server", "Processing {} (id={}) from uid={}", request_type, request_id, cred.uid);
    }

    let svc = Arc::clone(service);
    let response = match tokio::task::spawn_blocking(move || api::handle_request(&svc, request)).await {
        Ok(response) => response,
        Err(e) => {
            error!(target: "armoury::server", "{} handler failed: {}", request_type, e);
            Response::error("Internal error")
        }
    };

    if is_write && !response_succeeded(&response) {
        warn!(target: "armoury::server", "AUDIT: {} failed for uid={}", request_type, cred.uid);
    }

    ResponseEnvelope::new(request_id, response)
}

fn response_succeeded(response: &Response) -> bool {
    match response {
        Response::Ok(data) => data.flag != Some(false),
        Response::Error { .. } => false,
    }
}
