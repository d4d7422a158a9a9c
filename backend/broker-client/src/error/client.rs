//! Error taxonomy for the broker client.
//!
//! - `Closed` is final: the client was closed and will never serve again.
//! - `NotConnected` means no live connection existed when the frame was sent.
//!   Publish calls retry exactly once after reconnecting on this error.
//! - `Timeout` means the acknowledgement did not arrive in time; the pending
//!   request was removed.
//! - `Rejected` carries the broker's own error string.
//! - `Protocol` covers malformed, oversized or undecodable frames.

use crate::error::config::ConfigError;
use crate::error::frame::FrameError;

use common::ErrorLocation;

use std::panic::Location;

use thiserror::Error as ThisError;

const CLOSED_MESSAGE: &str = "broker client closed";
const NOT_CONNECTED_MESSAGE: &str = "broker client not connected";

#[derive(Debug, ThisError)]
pub enum ClientError {
    #[error("Closed Error: {message} {location}")]
    Closed {
        message: String,
        location: ErrorLocation,
    },

    #[error("Not Connected Error: {message} {location}")]
    NotConnected {
        message: String,
        location: ErrorLocation,
    },

    #[error("Timeout Error: {message} {location}")]
    Timeout {
        message: String,
        location: ErrorLocation,
    },

    #[error("Rejected Error: {message} {location}")]
    Rejected {
        message: String,
        location: ErrorLocation,
    },

    #[error("Protocol Error: {message} {location}")]
    Protocol {
        message: String,
        location: ErrorLocation,
    },

    #[error("Validation Error: {message} {location}")]
    Validation {
        message: String,
        location: ErrorLocation,
    },

    #[error("Connect Error: {message} {location}")]
    Connect {
        message: String,
        location: ErrorLocation,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ClientError {
    #[track_caller]
    pub fn closed() -> Self {
        ClientError::Closed {
            message: CLOSED_MESSAGE.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn not_connected() -> Self {
        ClientError::NotConnected {
            message: NOT_CONNECTED_MESSAGE.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn timeout(message: impl Into<String>) -> Self {
        ClientError::Timeout {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    /// Rejection with the broker's error string, or a generic one when the
    /// broker gave none.
    #[track_caller]
    pub fn rejected(what: &str, broker_error: Option<&str>) -> Self {
        let message = match broker_error {
            Some(detail) if !detail.is_empty() => format!("{what} rejected: {detail}"),
            _ => format!("{what} rejected"),
        };
        ClientError::Rejected {
            message,
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn protocol(message: impl Into<String>) -> Self {
        ClientError::Protocol {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn validation(message: impl Into<String>) -> Self {
        ClientError::Validation {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn connect(message: impl Into<String>) -> Self {
        ClientError::Connect {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, ClientError::Closed { .. })
    }

    pub fn is_not_connected(&self) -> bool {
        matches!(self, ClientError::NotConnected { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, ClientError::Rejected { .. })
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, ClientError::Protocol { .. })
    }
}

impl From<FrameError> for ClientError {
    #[track_caller]
    fn from(error: FrameError) -> Self {
        match error {
            // A failed read or write means the stream is gone.
            FrameError::Read { message, location } => {
                ClientError::NotConnected { message, location }
            }
            other => ClientError::Protocol {
                message: other.to_string(),
                location: ErrorLocation::from(Location::caller()),
            },
        }
    }
}
