//! Shared building blocks for the broker client workspace.
//!
//! Every error enum in the workspace carries an [`ErrorLocation`] so that a
//! failure reported far from its origin (for example through the client's
//! asynchronous event queue) still names the exact call site that produced it.

pub mod error;

pub use error::error_location::ErrorLocation;
