//! Connection management: dialing, installing a live connection, and the
//! read loop bound to it.

use crate::client::dispatcher;
use crate::client::reconnect;
use crate::client::state::ClientInner;
use crate::error::client::ClientError;
use crate::transport::{BoxedTransport, Connection, FrameReader};

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{ReadHalf, split};
use tokio::spawn as TokioSpawn;

/// Returns immediately when a connection exists; otherwise dials.
pub(crate) async fn ensure_connected(
    inner: &Arc<ClientInner>,
    deadline: Duration,
) -> Result<(), ClientError> {
    {
        let state = inner.lock_state();
        if state.closed {
            return Err(ClientError::closed());
        }
        if state.conn.is_some() {
            return Ok(());
        }
    }

    dial_and_start(inner, deadline).await
}

/// Dials and installs a new connection unless one already exists.
///
/// Dials are serialized: a caller arriving while another dial is in flight
/// waits for it and then finds the connection in place. On success exactly
/// one read loop is started for the new connection and subscription replay
/// is scheduled.
pub(crate) async fn dial_and_start(
    inner: &Arc<ClientInner>,
    deadline: Duration,
) -> Result<(), ClientError> {
    let _dialing = inner.dial_lock.lock().await;

    {
        let state = inner.lock_state();
        if state.closed {
            return Err(ClientError::closed());
        }
        if state.conn.is_some() {
            debug!("Connection already established by a concurrent dial");
            return Ok(());
        }
    }

    let transport = inner.dialer.dial(deadline).await?;
    let (reader, writer) = split(transport);

    let connection_id = {
        let mut state = inner.lock_state();
        if state.closed {
            return Err(ClientError::closed());
        }

        let connection_id = state.allocate_connection_id();
        let mut conn = Connection::new(connection_id, writer);
        conn.attach_reader(TokioSpawn(read_loop(
            Arc::clone(inner),
            connection_id,
            reader,
        )));
        state.conn = Some(conn);
        connection_id
    };

    info!(
        "Connected to broker at {} (connection {connection_id})",
        inner.dialer.target()
    );

    TokioSpawn(reconnect::replay_subscriptions(
        Arc::clone(inner),
        connection_id,
    ));

    Ok(())
}

/// Reads frames until EOF or a read error, then hands the connection to the
/// reconnect driver.
///
/// Per-frame failures (malformed JSON, bad payloads) are reported and
/// skipped. An oversized frame ends the loop: the stream is mid-line and
/// cannot be resynchronized.
async fn read_loop(
    inner: Arc<ClientInner>,
    connection_id: u64,
    reader: ReadHalf<BoxedTransport>,
) {
    let mut frames = FrameReader::new(reader, inner.config.max_frame_bytes);

    loop {
        match frames.next_frame().await {
            Ok(Some(line)) => {
                if let Err(e) = dispatcher::handle_line(&inner, &line).await {
                    warn!("Skipping inbound frame on connection {connection_id}: {e}");
                    inner.emit_error(e);
                }
            }
            Ok(None) => {
                info!("Broker closed connection {connection_id}");
                break;
            }
            Err(e) => {
                if e.is_too_large() {
                    warn!(
                        "Connection {connection_id} sent a frame over {} bytes, disconnecting",
                        frames.max_frame_bytes()
                    );
                } else {
                    warn!("Read from connection {connection_id} failed: {e}");
                }
                inner.emit_error(e.into());
                break;
            }
        }
    }

    reconnect::handle_disconnect(&inner, connection_id);
}
