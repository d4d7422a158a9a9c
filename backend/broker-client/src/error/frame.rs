use common::ErrorLocation;

use std::io::Error as IoError;
use std::panic::Location;

use thiserror::Error as ThisError;

/// Errors raised while encoding, reading or decoding a single frame.
#[derive(Debug, ThisError)]
pub enum FrameError {
    #[error("Frame Encode Error: {message} {location}")]
    Encode {
        message: String,
        location: ErrorLocation,
    },

    #[error("Frame Decode Error: {message} {location}")]
    Decode {
        message: String,
        location: ErrorLocation,
    },

    #[error("Frame Too Large Error: transport frame exceeds max size of {limit} bytes {location}")]
    TooLarge {
        limit: usize,
        location: ErrorLocation,
    },

    #[error("Frame Read Error: {message} {location}")]
    Read {
        message: String,
        location: ErrorLocation,
    },
}

impl FrameError {
    #[track_caller]
    pub fn encode(message: impl Into<String>) -> Self {
        FrameError::Encode {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn decode(message: impl Into<String>) -> Self {
        FrameError::Decode {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn too_large(limit: usize) -> Self {
        FrameError::TooLarge {
            limit,
            location: ErrorLocation::from(Location::caller()),
        }
    }

    pub fn is_too_large(&self) -> bool {
        matches!(self, FrameError::TooLarge { .. })
    }
}

impl From<IoError> for FrameError {
    #[track_caller]
    fn from(error: IoError) -> Self {
        FrameError::Read {
            message: format!("transport read error: {error}"),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
