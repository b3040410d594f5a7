// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the session manager

use crate::backends::camera::{BackendError, MediaKind, OutputKind};
use std::fmt;

/// Result type alias using SessionError
pub type SessionResult<T> = Result<T, SessionError>;

/// Session manager error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No physical device of the required kind exists
    DeviceUnavailable(MediaKind),
    /// The session refused an input (device name)
    CannotAddInput(String),
    /// The session refused an output
    CannotAddOutput(OutputKind),
    /// The device could not be locked for configuration (busy or disconnected)
    ConfigurationLockFailed(String),
    /// Operation requires a configured session
    NotConfigured,
    /// The session queue has shut down
    QueueClosed,
    /// Backend error
    Backend(BackendError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::DeviceUnavailable(kind) => write!(f, "No {} device available", kind),
            SessionError::CannotAddInput(name) => {
                write!(f, "Session cannot add input for {}", name)
            }
            SessionError::CannotAddOutput(kind) => {
                write!(f, "Session cannot add {} output", kind)
            }
            SessionError::ConfigurationLockFailed(msg) => {
                write!(f, "Failed to lock device for configuration: {}", msg)
            }
            SessionError::NotConfigured => write!(f, "Session is not configured"),
            SessionError::QueueClosed => write!(f, "Session queue is closed"),
            SessionError::Backend(e) => write!(f, "Backend error: {}", e),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Backend(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BackendError> for SessionError {
    fn from(err: BackendError) -> Self {
        SessionError::Backend(err)
    }
}

/// Configuration loading/saving errors
#[derive(Debug)]
pub enum ConfigError {
    /// Reading or writing the config file failed
    Io(std::io::Error),
    /// The config file is not valid JSON for [`crate::config::Config`]
    Parse(serde_json::Error),
    /// No per-user config directory on this platform
    NoConfigDir,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Config I/O error: {}", e),
            ConfigError::Parse(e) => write!(f, "Invalid config: {}", e),
            ConfigError::NoConfigDir => write!(f, "No config directory available"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            ConfigError::NoConfigDir => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err)
    }
}
