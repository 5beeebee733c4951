//! Daemon Client
//!
//! Talks to the privileged `armouryd` daemon over its Unix socket, one
//! newline-terminated JSON envelope per request.

use std::io::{BufRead, BufReader, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use armoury_protocol::{
    generate_request_id, Request, RequestEnvelope, Response, ResponseData, ResponseEnvelope,
    MAX_MESSAGE_SIZE, MAX_RESPONSE_SIZE,
};
use tracing::debug;

use crate::constants::paths;
use crate::error::{ArmouryError, Result};

const TIMEOUT: Duration = Duration::from_secs(5);

/// Initial buffer size for responses
const INITIAL_BUFFER_SIZE: usize = 4096;

pub struct DaemonClient {
    writer: UnixStream,
    reader: BufReader<UnixStream>,
    socket_path: PathBuf,
}

impl DaemonClient {
    /// Connect to the default socket
    pub fn connect_default() -> Result<Self> {
        Self::connect(paths::SOCKET_PATH)
    }

    pub fn connect(socket_path: impl AsRef<Path>) -> Result<Self> {
        let socket_path = socket_path.as_ref();
        let stream = UnixStream::connect(socket_path).map_err(|e| {
            ArmouryError::DaemonConnection(format!(
                "Failed to connect to daemon at {}: {}",
                socket_path.display(),
                e
            ))
        })?;

        let reader_stream = stream.try_clone().map_err(|e| {
            ArmouryError::DaemonConnection(format!("Failed to clone daemon socket: {}", e))
        })?;

        for s in [&stream, &reader_stream] {
            s.set_read_timeout(Some(TIMEOUT))?;
            s.set_write_timeout(Some(TIMEOUT))?;
        }

        Ok(Self {
            writer: stream,
            reader: BufReader::new(reader_stream),
            socket_path: socket_path.to_path_buf(),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Send a request and wait for its response
    pub fn request(&mut self, req: Request) -> Result<Response> {
        req.validate().map_err(ArmouryError::IpcProtocol)?;

        let request_id = generate_request_id();
        let envelope = RequestEnvelope::with_id(req, request_id);

        let mut json = serde_json::to_vec(&envelope)?;
        json.push(b'\n');
        if json.len() > MAX_MESSAGE_SIZE {
            return Err(ArmouryError::MessageTooLarge {
                size: json.len(),
                max_size: MAX_MESSAGE_SIZE,
            });
        }

        debug!(target: "armoury::client", "-> {} (id {})", envelope.request.type_name(), request_id);
        self.writer.write_all(&json).map_err(|e| {
            ArmouryError::DaemonConnection(format!("Failed to send request: {}", e))
        })?;

        let mut response_buf: Vec<u8> = Vec::with_capacity(INITIAL_BUFFER_SIZE);
        self.reader
            .by_ref()
            .take(MAX_RESPONSE_SIZE as u64 + 1)
            .read_until(b'\n', &mut response_buf)
            .map_err(|e| {
                ArmouryError::DaemonConnection(format!("Failed to read response: {}", e))
            })?;

        if response_buf.is_empty() {
            return Err(ArmouryError::DaemonConnection(
                "Daemon closed connection".to_string(),
            ));
        }
        if response_buf.len() > MAX_RESPONSE_SIZE {
            return Err(ArmouryError::MessageTooLarge {
                size: response_buf.len(),
                max_size: MAX_RESPONSE_SIZE,
            });
        }
        if response_buf.last() == Some(&b'\n') {
            response_buf.pop();
        }

        let response: ResponseEnvelope = serde_json::from_slice(&response_buf)?;
        if response.id != request_id {
            return Err(ArmouryError::IpcProtocol(format!(
                "Response ID mismatch: expected {}, got {}",
                request_id, response.id
            )));
        }

        Ok(response.response)
    }

    /// Like [`request`](Self::request), turning an error response into `Err`
    pub fn call(&mut self, req: Request) -> Result<ResponseData> {
        match self.request(req)? {
            Response::Ok(data) => Ok(data),
            Response::Error { message } => Err(ArmouryError::DaemonResponse(message)),
        }
    }
}

/// Whether the daemon socket exists
pub fn is_daemon_available(socket_path: impl AsRef<Path>) -> bool {
    socket_path.as_ref().exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;
    use std::thread;
    use tempfile::TempDir;

    fn serve_once<F>(dir: &TempDir, reply: F) -> PathBuf
    where
        F: FnOnce(RequestEnvelope) -> String + Send + 'static,
    {
        let path = dir.path().join("armouryd.sock");
        let listener = UnixListener::bind(&path).unwrap();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let envelope: RequestEnvelope = serde_json::from_str(line.trim()).unwrap();
            let mut writer = stream;
            writer.write_all(reply(envelope).as_bytes()).unwrap();
        });
        path
    }

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = serve_once(&dir, |env| {
            assert_eq!(env.request, Request::GetBatteryChargeLimit);
            let resp = ResponseEnvelope::new(env.id, Response::ok_int(80));
            format!("{}\n", serde_json::to_string(&resp).unwrap())
        });

        let mut client = DaemonClient::connect(&path).unwrap();
        let data = client.call(Request::GetBatteryChargeLimit).unwrap();
        assert_eq!(data.number, Some(80));
    }

    #[test]
    fn test_id_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = serve_once(&dir, |env| {
            let resp = ResponseEnvelope::new(env.id + 1000, Response::ok());
            format!("{}\n", serde_json::to_string(&resp).unwrap())
        });

        let mut client = DaemonClient::connect(&path).unwrap();
        let err = client.request(Request::Ping).unwrap_err();
        assert!(matches!(err, ArmouryError::IpcProtocol(_)));
    }

    #[test]
    fn test_error_response() {
        let dir = TempDir::new().unwrap();
        let path = serve_once(&dir, |env| {
            let resp = ResponseEnvelope::new(env.id, Response::error("Profile not found: X"));
            format!("{}\n", serde_json::to_string(&resp).unwrap())
        });

        let mut client = DaemonClient::connect(&path).unwrap();
        let err = client.call(Request::ApplyProfile { name: "X".into() }).unwrap_err();
        assert!(matches!(err, ArmouryError::DaemonResponse(_)));
    }

    #[test]
    fn test_connect_missing_socket() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.sock");
        assert!(!is_daemon_available(&path));
        assert!(matches!(
            DaemonClient::connect(&path),
            Err(ArmouryError::DaemonConnection(_))
        ));
    }
}
