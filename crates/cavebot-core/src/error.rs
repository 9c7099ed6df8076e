//! Agent error taxonomy.
//!
//! Very little in this domain is fatal: device timeouts are retried and
//! then surfaced as action failures, perception misses are plain `None`
//! returns, and a permanently missing waypoint is skipped. The variants
//! here exist so that the non-fatal paths are logged with a consistent
//! shape and the few fatal ones (device or matcher unavailable at
//! startup) carry enough context to act on.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error categories for the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// No acknowledgement within the retry budget. Never fatal.
    DeviceTimeout,
    /// Explicit `ERR` response from the device. Action aborted.
    DeviceError,
    /// The device link could not be established at startup. Fatal.
    DeviceUnavailable,
    /// The external matcher could not be reached at startup. Fatal.
    VisionUnavailable,
    /// A waypoint was never found within its attempt budget. Skipped.
    RouteStall,
    /// A battle-resolution signal never confirmed; progression forced.
    LivenessFallback,
    /// A caller-supplied value could not be encoded or validated.
    InvalidInput,
    /// The configuration file could not be parsed or failed validation.
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::DeviceTimeout => "DEVICE_TIMEOUT",
            ErrorKind::DeviceError => "DEVICE_ERROR",
            ErrorKind::DeviceUnavailable => "DEVICE_UNAVAILABLE",
            ErrorKind::VisionUnavailable => "VISION_UNAVAILABLE",
            ErrorKind::RouteStall => "ROUTE_STALL",
            ErrorKind::LivenessFallback => "LIVENESS_FALLBACK",
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::Config => "CONFIG",
        };
        write!(f, "{}", name)
    }
}

/// An agent error with its category and context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentError {
    pub kind: ErrorKind,
    pub message: String,
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::error::Error for AgentError {}

impl AgentError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn device_timeout(verb: &str, attempts: u32) -> Self {
        Self::new(
            ErrorKind::DeviceTimeout,
            format!("no acknowledgement for '{}' after {} attempts", verb, attempts),
        )
    }

    pub fn device_error(verb: &str, reason: &str) -> Self {
        Self::new(
            ErrorKind::DeviceError,
            format!("device rejected '{}': {}", verb, reason),
        )
    }

    pub fn device_unavailable(port: &str, detail: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::DeviceUnavailable,
            format!("cannot open device '{}': {}", port, detail),
        )
    }

    pub fn vision_unavailable(detail: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::VisionUnavailable,
            format!("cannot reach matcher: {}", detail),
        )
    }

    pub fn route_stall(label: &str, attempts: u32) -> Self {
        Self::new(
            ErrorKind::RouteStall,
            format!("waypoint '{}' not found after {} attempts", label, attempts),
        )
    }

    pub fn liveness_fallback(label: &str) -> Self {
        Self::new(
            ErrorKind::LivenessFallback,
            format!("engagement with '{}' never confirmed, forcing progression", label),
        )
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }
}
