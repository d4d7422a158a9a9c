use broker_client::{ClientError, ConfigError};

use common::ErrorLocation;

use std::io::Error as IoError;
use std::panic::Location;

use thiserror::Error;

/// Errors surfaced by the `brokerctl` binary.
#[derive(Debug, Error)]
pub enum CliError {
    /// Error from this app (argument handling, logger setup)
    #[error("Brokerctl Error: {message} {location}")]
    Brokerctl {
        message: String,
        location: ErrorLocation,
    },

    /// Writing output failed
    #[error("Output Error: {message} {location}")]
    Output {
        message: String,
        location: ErrorLocation,
    },

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl CliError {
    #[track_caller]
    pub fn brokerctl(message: impl Into<String>) -> Self {
        CliError::Brokerctl {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<IoError> for CliError {
    #[track_caller]
    fn from(error: IoError) -> Self {
        CliError::Output {
            message: format!("Failed to write output: {error}"),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
