//! Transport plumbing: how a byte stream to the broker is opened, how frames
//! are read from it without unbounded buffering, and the handle that owns the
//! write side of one live connection.

pub mod connection;
pub mod dial;
pub mod frame_reader;

pub use connection::{Connection, FrameWriter};
pub use dial::{BoxedTransport, Dialer, Transport};
pub use frame_reader::FrameReader;
