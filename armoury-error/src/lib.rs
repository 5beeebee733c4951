//! Unified error handling for ASUS Armoury
//!
//! A single error type shared by the core library, the daemon and the client.
//! Facet operations exposed over the control surface still report plain
//! booleans; this type carries the detail behind them into logs and, through
//! [`ErrorKind`], into typed results for callers that want more than a bool.

use std::io;
use std::path::PathBuf;

/// Result type alias using ArmouryError
pub type Result<T> = std::result::Result<T, ArmouryError>;

/// Coarse classification of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The facet's backend path or tool is not present
    Unavailable,
    /// Sysfs or filesystem read/write failed
    Io,
    /// An external tool exited non-zero, was missing, or timed out
    Tool,
    /// A value or name was rejected
    InvalidInput,
    /// Some facets of a multi-facet operation failed
    PartialFailure,
    /// A named entity does not exist
    NotFound,
    /// Daemon / wire protocol problem
    Protocol,
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Io => "io",
            ErrorKind::Tool => "tool",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::PartialFailure => "partial_failure",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Other => "other",
        }
    }
}

/// Unified error type for all ASUS Armoury operations
#[derive(thiserror::Error, Debug)]
pub enum ArmouryError {
    // ============================================================================
    // I/O and File System Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file {}: {source}", path.display())]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to write file {}: {source}", path.display())]
    FileWrite {
        path: PathBuf,
        source: io::Error,
    },

    // ============================================================================
    // Hardware Access Errors
    // ============================================================================
    #[error("Failed to read {}: {reason}", path.display())]
    SysfsRead {
        path: PathBuf,
        reason: String,
    },

    #[error("Failed to write {}: {reason}", path.display())]
    SysfsWrite {
        path: PathBuf,
        reason: String,
    },

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    // ============================================================================
    // External Tool Errors
    // ============================================================================
    #[error("Command not found: {0}")]
    ToolNotFound(String),

    #[error("Command timed out: {0}")]
    ToolTimeout(String),

    #[error("{program} exited with code {code}: {stderr}")]
    ToolFailed {
        program: String,
        code: i32,
        stderr: String,
    },

    // ============================================================================
    // Validation Errors
    // ============================================================================
    #[error("Invalid {kind} mode: {value}")]
    InvalidMode {
        kind: &'static str,
        value: String,
    },

    #[error("Fan curve rejected: {0}")]
    InvalidCurve(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        field: String,
        reason: String,
    },

    // ============================================================================
    // Profile Errors
    // ============================================================================
    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("Cannot remove built-in profile: {0}")]
    ProtectedProfile(String),

    #[error("Profile {profile} applied with errors: {}", failed.join(", "))]
    PartialApply {
        profile: String,
        failed: Vec<String>,
    },

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Daemon and IPC Errors
    // ============================================================================
    #[error("Daemon connection failed: {0}")]
    DaemonConnection(String),

    #[error("Daemon response error: {0}")]
    DaemonResponse(String),

    #[error("IPC protocol error: {0}")]
    IpcProtocol(String),

    #[error("Message too large: {size} bytes (max {max_size} bytes)")]
    MessageTooLarge {
        size: usize,
        max_size: usize,
    },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Generic(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),
}

impl ArmouryError {
    /// Create a generic error from a string
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn unavailable(what: impl Into<String>) -> Self {
        Self::BackendUnavailable(what.into())
    }

    pub fn unsupported(what: impl Into<String>) -> Self {
        Self::NotSupported(what.into())
    }

    pub fn invalid_mode(kind: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidMode {
            kind,
            value: value.into(),
        }
    }

    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn sysfs_write(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::SysfsWrite {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Classify this error for typed results
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) | Self::FileRead { .. } | Self::FileWrite { .. } => ErrorKind::Io,
            Self::SysfsRead { .. } | Self::SysfsWrite { .. } => ErrorKind::Io,
            Self::BackendUnavailable(_) | Self::NotSupported(_) => ErrorKind::Unavailable,
            Self::ToolNotFound(_) | Self::ToolTimeout(_) | Self::ToolFailed { .. } => {
                ErrorKind::Tool
            }
            Self::InvalidMode { .. } | Self::InvalidCurve(_) | Self::InvalidValue { .. } => {
                ErrorKind::InvalidInput
            }
            Self::ProtectedProfile(_) => ErrorKind::InvalidInput,
            Self::ProfileNotFound(_) => ErrorKind::NotFound,
            Self::PartialApply { .. } => ErrorKind::PartialFailure,
            Self::DaemonConnection(_)
            | Self::DaemonResponse(_)
            | Self::IpcProtocol(_)
            | Self::MessageTooLarge { .. } => ErrorKind::Protocol,
            Self::Config(_) | Self::JsonParse(_) | Self::Generic(_) => ErrorKind::Other,
        }
    }
}

// Allow converting from String to ArmouryError
impl From<String> for ArmouryError {
    fn from(s: String) -> Self {
        Self::Generic(s)
    }
}

impl From<&str> for ArmouryError {
    fn from(s: &str) -> Self {
        Self::Generic(s.to_string())
    }
}
