mod client;
mod error;
mod frame_reader;
mod reconnect;
mod registry;
