pub mod client;
pub mod config;
pub mod frame;

pub use client::ClientError;
pub use config::ConfigError;
pub use frame::FrameError;
