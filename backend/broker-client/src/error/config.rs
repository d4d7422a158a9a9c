use common::ErrorLocation;

use std::panic::Location;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("Config Validation Error: {reason} {location}")]
    Validation {
        reason: String,
        location: ErrorLocation,
    },

    #[error("Config Parse Error: invalid {variable}: {reason} {location}")]
    Parse {
        variable: String,
        reason: String,
        location: ErrorLocation,
    },

    #[error("Config Home Directory Error: {reason} {location}")]
    HomeDirectory {
        reason: String,
        location: ErrorLocation,
    },
}

impl ConfigError {
    #[track_caller]
    pub fn validation(reason: impl Into<String>) -> Self {
        ConfigError::Validation {
            reason: reason.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn parse(variable: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Parse {
            variable: variable.into(),
            reason: reason.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
