//! Reconnecting client for a local publish/subscribe broker.
//!
//! The broker runs as a separate process and is reached over a private duplex
//! byte stream (a Unix domain socket by default). Frames are newline-delimited
//! JSON objects; see [`protocol`] for the wire shapes.
//!
//! # Architecture
//!
//! - [`protocol`] - frame codec (encode requests, route inbound lines)
//! - [`transport`] - dialing, bounded frame reads, the per-connection read loop
//! - [`client`] - the [`Client`] handle: correlation of acks, subscription
//!   registry, reconnect driver and inbound dispatch
//! - [`config`] - [`ClientConfig`] and environment overrides
//! - [`error`] - error taxonomy
//!
//! A single [`Client`] owns one logical connection. Publish and subscribe calls
//! may be issued concurrently from any number of tasks; acknowledgements are
//! matched back to their callers by request id. When the broker goes away the
//! client reconnects with exponential backoff and replays every acknowledged
//! subscription.

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod transport;

#[cfg(test)]
mod tests;

pub use client::{Client, ClientEvent, Message, Subscription};
pub use config::ClientConfig;
pub use error::{ClientError, ConfigError, FrameError};
