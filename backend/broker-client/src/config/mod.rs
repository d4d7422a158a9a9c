//! Client configuration.
//!
//! Defaults follow the broker's documented contract: 2 MiB maximum frame,
//! 3 s dial deadline, 5 s acknowledgement timeout and a reconnect backoff that
//! starts at 200 ms and doubles up to 3 s. The maximum frame size can be
//! overridden from the environment with [`ENV_MAX_FRAME_BYTES`].

use crate::error::config::ConfigError;

use common::ErrorLocation;

use std::env::{self, VarError};
use std::panic::Location;
use std::path::PathBuf;
use std::time::Duration;

use log::debug;
use serde::Serialize;

pub const ENV_MAX_FRAME_BYTES: &str = "BROKER_CLIENT_MAX_FRAME_BYTES";
pub const ENV_SOCKET: &str = "BROKER_CLIENT_SOCKET";
pub const ENV_BASE_DIR: &str = "BROKER_CLIENT_BASE_DIR";

pub const DEFAULT_MAX_FRAME_BYTES: usize = 2 * 1024 * 1024;
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MESSAGE_BUFFER: usize = 32;
pub const DEFAULT_EVENT_BUFFER: usize = 8;
pub const DEFAULT_RECONNECT_INITIAL_BACKOFF: Duration = Duration::from_millis(200);
pub const DEFAULT_RECONNECT_MAX_BACKOFF: Duration = Duration::from_secs(3);

const DEFAULT_BASE_DIR: &str = ".broker";
const DEFAULT_SOCKET_NAME: &str = "broker.sock";

#[derive(Debug, Clone, Serialize)]
pub struct ClientConfig {
    /// Path of the broker's local socket.
    pub socket_path: PathBuf,

    /// Longest inbound line accepted before the connection is dropped.
    pub max_frame_bytes: usize,

    /// Deadline for a single dial when the caller supplies none.
    pub dial_timeout: Duration,

    /// Acknowledgement timeout used when a caller passes a zero timeout.
    pub ack_timeout: Duration,

    /// Capacity of the inbound message queue.
    pub message_buffer: usize,

    /// Capacity of the asynchronous event queue. Overflow is dropped.
    pub event_buffer: usize,

    pub reconnect_initial_backoff: Duration,
    pub reconnect_max_backoff: Duration,
}

impl ClientConfig {
    /// Configuration with every default applied.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            message_buffer: DEFAULT_MESSAGE_BUFFER,
            event_buffer: DEFAULT_EVENT_BUFFER,
            reconnect_initial_backoff: DEFAULT_RECONNECT_INITIAL_BACKOFF,
            reconnect_max_backoff: DEFAULT_RECONNECT_MAX_BACKOFF,
        }
    }

    /// Defaults plus the [`ENV_MAX_FRAME_BYTES`] override.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the override is set but is not a
    /// positive integer, and [`ConfigError::Validation`] if the socket path
    /// is empty.
    pub fn from_env(socket_path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let config = Self::new(socket_path).with_max_frame_bytes(max_frame_bytes_from_env()?);
        config.validate()?;
        Ok(config)
    }

    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    pub fn with_dial_timeout(mut self, dial_timeout: Duration) -> Self {
        self.dial_timeout = dial_timeout;
        self
    }

    pub fn with_ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.ack_timeout = ack_timeout;
        self
    }

    pub fn with_message_buffer(mut self, message_buffer: usize) -> Self {
        self.message_buffer = message_buffer;
        self
    }

    pub fn with_event_buffer(mut self, event_buffer: usize) -> Self {
        self.event_buffer = event_buffer;
        self
    }

    pub fn with_reconnect_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.reconnect_initial_backoff = initial;
        self.reconnect_max_backoff = max;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.socket_path.as_os_str().is_empty() {
            return Err(ConfigError::validation("socket path is required"));
        }
        if self.max_frame_bytes == 0 {
            return Err(ConfigError::validation("max frame bytes must be positive"));
        }
        if self.message_buffer == 0 || self.event_buffer == 0 {
            return Err(ConfigError::validation("queue capacities must be positive"));
        }
        if self.dial_timeout.is_zero() || self.ack_timeout.is_zero() {
            return Err(ConfigError::validation("timeouts must be positive"));
        }
        if self.reconnect_initial_backoff.is_zero()
            || self.reconnect_initial_backoff > self.reconnect_max_backoff
        {
            return Err(ConfigError::validation(format!(
                "reconnect backoff must satisfy 0 < initial ({:?}) <= max ({:?})",
                self.reconnect_initial_backoff, self.reconnect_max_backoff
            )));
        }
        Ok(())
    }
}

/// Reads [`ENV_MAX_FRAME_BYTES`], falling back to [`DEFAULT_MAX_FRAME_BYTES`]
/// when the variable is unset or empty.
pub fn max_frame_bytes_from_env() -> Result<usize, ConfigError> {
    match env::var(ENV_MAX_FRAME_BYTES) {
        Ok(raw) if raw.trim().is_empty() => Ok(DEFAULT_MAX_FRAME_BYTES),
        Ok(raw) => parse_max_frame_bytes(&raw),
        Err(VarError::NotPresent) => Ok(DEFAULT_MAX_FRAME_BYTES),
        Err(VarError::NotUnicode(_)) => Err(ConfigError::parse(
            ENV_MAX_FRAME_BYTES,
            "contains invalid unicode",
        )),
    }
}

pub(crate) fn parse_max_frame_bytes(raw: &str) -> Result<usize, ConfigError> {
    let size: i64 = raw
        .trim()
        .parse()
        .map_err(|e| ConfigError::parse(ENV_MAX_FRAME_BYTES, format!("{raw:?}: {e}")))?;

    if size <= 0 {
        return Err(ConfigError::parse(ENV_MAX_FRAME_BYTES, "must be positive"));
    }

    let size = usize::try_from(size)
        .map_err(|e| ConfigError::parse(ENV_MAX_FRAME_BYTES, e.to_string()))?;
    debug!("Using max frame size override of {size} bytes");
    Ok(size)
}

/// Resolves the broker socket path.
///
/// Order: [`ENV_SOCKET`], then `$`[`ENV_BASE_DIR`]`/broker.sock`, then
/// `~/.broker/broker.sock`.
pub fn default_socket_path() -> Result<PathBuf, ConfigError> {
    if let Some(path) = non_empty_var(ENV_SOCKET) {
        return Ok(PathBuf::from(path));
    }

    let base_dir = match non_empty_var(ENV_BASE_DIR) {
        Some(dir) => PathBuf::from(dir),
        None => dirs::home_dir()
            .ok_or_else(|| ConfigError::HomeDirectory {
                reason: "could not determine the user's home directory".to_string(),
                location: ErrorLocation::from(Location::caller()),
            })?
            .join(DEFAULT_BASE_DIR),
    };

    Ok(base_dir.join(DEFAULT_SOCKET_NAME))
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}
