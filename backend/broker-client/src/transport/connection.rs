use crate::error::client::ClientError;
use crate::transport::dial::BoxedTransport;

use std::sync::Arc;

use log::{debug, trace};
use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio::runtime::Handle as RuntimeHandle;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

type SharedWriter = Arc<AsyncMutex<WriteHalf<BoxedTransport>>>;

/// One live connection instance.
///
/// `id` is unique for the lifetime of a client. The read loop bound to this
/// connection carries the same id and compares it before tearing anything
/// down, so a loop belonging to a superseded connection can never clear a
/// newer one.
pub struct Connection {
    id: u64,
    writer: SharedWriter,
    reader: Option<JoinHandle<()>>,
}

impl Connection {
    pub fn new(id: u64, writer: WriteHalf<BoxedTransport>) -> Self {
        Self {
            id,
            writer: Arc::new(AsyncMutex::new(writer)),
            reader: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Records the read loop task serving this connection.
    pub fn attach_reader(&mut self, reader: JoinHandle<()>) {
        self.reader = Some(reader);
    }

    pub fn frame_writer(&self) -> FrameWriter {
        FrameWriter {
            connection_id: self.id,
            writer: Arc::clone(&self.writer),
        }
    }

    /// Stops the read loop and half-closes the write side so the broker
    /// observes EOF.
    pub fn shutdown(mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }

        let connection_id = self.id;
        let writer = self.writer;
        if let Ok(runtime) = RuntimeHandle::try_current() {
            runtime.spawn(async move {
                let mut writer = writer.lock().await;
                if let Err(e) = writer.shutdown().await {
                    trace!("Shutdown of connection {connection_id} write side failed: {e}");
                }
            });
        }
    }
}

/// Write access to one connection, shared by every caller task.
///
/// The inner lock serializes whole frames so concurrent publishes never
/// interleave partial lines on the wire.
#[derive(Clone)]
pub struct FrameWriter {
    connection_id: u64,
    writer: SharedWriter,
}

impl FrameWriter {
    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Writes one encoded frame (terminator included) and flushes it.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] if the stream rejects the write.
    pub async fn write_frame(&self, frame: &[u8]) -> Result<(), ClientError> {
        let mut writer = self.writer.lock().await;

        if let Err(e) = writer.write_all(frame).await {
            debug!("Write to connection {} failed: {e}", self.connection_id);
            return Err(ClientError::not_connected());
        }
        if let Err(e) = writer.flush().await {
            debug!("Flush of connection {} failed: {e}", self.connection_id);
            return Err(ClientError::not_connected());
        }

        Ok(())
    }
}
