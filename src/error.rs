//! Error types for the kjarni bindings.
//!
//! Engine failures arrive as an integer status code plus a message fetched
//! from the engine's last-error slot. Everything else (loading, symbol
//! resolution, argument marshaling, closed handles) is detected host-side.

use std::fmt;

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Closed set of status kinds reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Ok,
    NullPointer,
    InvalidUtf8,
    ModelNotFound,
    LoadFailed,
    InferenceFailed,
    /// The engine reports this as "GPU unavailable".
    DeviceUnavailable,
    InvalidConfig,
    Cancelled,
    Timeout,
    StreamEnded,
    Unknown,
}

impl ErrorKind {
    /// Map a raw status code to its kind. Codes outside the table are `Unknown`.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => ErrorKind::Ok,
            1 => ErrorKind::NullPointer,
            2 => ErrorKind::InvalidUtf8,
            3 => ErrorKind::ModelNotFound,
            4 => ErrorKind::LoadFailed,
            5 => ErrorKind::InferenceFailed,
            6 => ErrorKind::DeviceUnavailable,
            7 => ErrorKind::InvalidConfig,
            8 => ErrorKind::Cancelled,
            9 => ErrorKind::Timeout,
            10 => ErrorKind::StreamEnded,
            _ => ErrorKind::Unknown,
        }
    }

    /// The engine's code for this kind.
    pub fn code(&self) -> i32 {
        match self {
            ErrorKind::Ok => 0,
            ErrorKind::NullPointer => 1,
            ErrorKind::InvalidUtf8 => 2,
            ErrorKind::ModelNotFound => 3,
            ErrorKind::LoadFailed => 4,
            ErrorKind::InferenceFailed => 5,
            ErrorKind::DeviceUnavailable => 6,
            ErrorKind::InvalidConfig => 7,
            ErrorKind::Cancelled => 8,
            ErrorKind::Timeout => 9,
            ErrorKind::StreamEnded => 10,
            ErrorKind::Unknown => 255,
        }
    }

    /// Message used when the engine leaves no last-error text behind.
    pub fn fallback_message(&self) -> &'static str {
        match self {
            ErrorKind::Ok => "no error",
            ErrorKind::NullPointer => "null pointer passed to engine",
            ErrorKind::InvalidUtf8 => "invalid UTF-8 in input text",
            ErrorKind::ModelNotFound => "model not found",
            ErrorKind::LoadFailed => "failed to load model",
            ErrorKind::InferenceFailed => "inference failed",
            ErrorKind::DeviceUnavailable => "requested device is unavailable",
            ErrorKind::InvalidConfig => "invalid configuration",
            ErrorKind::Cancelled => "operation cancelled",
            ErrorKind::Timeout => "operation timed out",
            ErrorKind::StreamEnded => "stream ended",
            ErrorKind::Unknown => "unknown error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Ok => "ok",
            ErrorKind::NullPointer => "null-pointer",
            ErrorKind::InvalidUtf8 => "invalid-utf8",
            ErrorKind::ModelNotFound => "model-not-found",
            ErrorKind::LoadFailed => "load-failed",
            ErrorKind::InferenceFailed => "inference-failed",
            ErrorKind::DeviceUnavailable => "device-unavailable",
            ErrorKind::InvalidConfig => "invalid-config",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Timeout => "timeout",
            ErrorKind::StreamEnded => "stream-ended",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Errors produced by the bindings.
///
/// `Clone` so that a failed one-time initialisation can be cached and handed
/// to every later constructor.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("No engine binary for platform {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("Failed to extract engine binary: {0}")]
    ExtractionFailed(String),

    #[error("Failed to load engine library '{path}': {message}")]
    LoadFailed { path: String, message: String },

    #[error("Engine symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("kjarni: {message} ({kind}, code {code})")]
    Engine {
        kind: ErrorKind,
        code: i32,
        message: String,
    },

    #[error("{0} is closed")]
    UsedAfterClose(&'static str),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Build an engine error from a status code and optional engine text.
    pub fn from_status(code: i32, message: Option<String>) -> Self {
        let kind = ErrorKind::from_code(code);
        let message = message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| kind.fallback_message().to_string());
        Error::Engine {
            kind,
            code,
            message,
        }
    }

    /// Engine status kind, if this error came from the engine.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Engine { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// True when the call was rejected because the instance was closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::UsedAfterClose(_))
    }
}

impl From<crate::config::ConfigError> for Error {
    fn from(e: crate::config::ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}
