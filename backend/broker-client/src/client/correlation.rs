//! Request/acknowledgement correlation.
//!
//! Each request gets a fresh id and a one-shot slot registered in the pending
//! map *before* its frame is written, so an ack that races ahead of the
//! writer still finds its slot. The slot is resolved exactly once: by the
//! matching ack, by a disconnect or close, or removed by the waiting caller
//! when it times out or is dropped.

use crate::client::state::ClientInner;
use crate::client::types::Subscription;
use crate::error::client::ClientError;
use crate::protocol::{RequestAck, SubscribeRequest, encode_frame};

use std::time::Duration;

use log::{debug, trace};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::time::timeout as TokioTimeout;
use uuid::Uuid;

pub(crate) fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Removes the pending entry when the waiting future ends for any reason,
/// including the caller dropping it.
struct PendingGuard<'a> {
    inner: &'a ClientInner,
    request_id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.inner.lock_state().pending.remove(self.request_id);
    }
}

/// An ack together with the connection that carried the request.
pub(crate) struct Acknowledged {
    pub(crate) ack: RequestAck,
    pub(crate) connection_id: u64,
}

/// Writes `frame` and waits up to `timeout` for the ack carrying `request_id`.
/// The connection id in the result is the one the frame was written to.
///
/// # Errors
///
/// - [`ClientError::Closed`] if the client is closed before or while waiting
/// - [`ClientError::NotConnected`] if there is no connection, the write
///   fails, or the connection drops before the ack arrives
/// - [`ClientError::Timeout`] if no ack arrives in time
/// - [`ClientError::Protocol`] if the frame cannot be encoded
pub(crate) async fn send_and_await_ack<T: Serialize>(
    inner: &ClientInner,
    request_id: &str,
    frame: &T,
    timeout: Duration,
) -> Result<Acknowledged, ClientError> {
    let bytes = encode_frame(frame)?;
    let (slot, outcome) = oneshot::channel();

    let writer = {
        let mut state = inner.lock_state();
        if state.closed {
            return Err(ClientError::closed());
        }
        let Some(conn) = state.conn.as_ref() else {
            return Err(ClientError::not_connected());
        };
        let writer = conn.frame_writer();
        state.pending.insert(request_id.to_string(), slot);
        writer
    };
    let _pending = PendingGuard { inner, request_id };

    let connection_id = writer.connection_id();
    writer.write_frame(&bytes).await?;
    trace!("Sent request {request_id} on connection {connection_id}");

    match TokioTimeout(timeout, outcome).await {
        Ok(Ok(result)) => result.map(|ack| Acknowledged { ack, connection_id }),
        // Slot dropped unresolved: only happens if the state was torn down.
        Ok(Err(_)) => Err(ClientError::not_connected()),
        Err(_) => Err(ClientError::timeout(format!(
            "request {request_id} timed out after {timeout:?}"
        ))),
    }
}

/// Hands an inbound ack to the request waiting for it.
///
/// Acks whose id matches nothing (stale, duplicated or foreign) are
/// discarded without error.
pub(crate) fn resolve_pending(inner: &ClientInner, ack: RequestAck) {
    let slot = inner.lock_state().pending.remove(&ack.request_id);

    match slot {
        Some(slot) => {
            let request_id = ack.request_id.clone();
            if slot.send(Ok(ack)).is_err() {
                trace!("Ack for {request_id} arrived after its caller gave up");
            }
        }
        None => trace!("Discarding ack for unknown request {:?}", ack.request_id),
    }
}

/// Turns an `ok: false` ack into [`ClientError::Rejected`].
pub(crate) fn check_ack(ack: RequestAck, what: &str) -> Result<(), ClientError> {
    if ack.ok {
        Ok(())
    } else {
        Err(ClientError::rejected(what, ack.error.as_deref()))
    }
}

/// Sends one `subscribe.v1` on the current connection and checks the ack.
/// Does not touch the registry.
///
/// Returns the id of the connection the broker acknowledged on.
pub(crate) async fn request_subscription(
    inner: &ClientInner,
    subscription: &Subscription,
) -> Result<u64, ClientError> {
    let request_id = new_request_id();
    let request = SubscribeRequest::new(&request_id, subscription);

    debug!(
        "Subscribing {} to channel {} (request {request_id})",
        subscription.subscription_id, subscription.channel
    );

    let acknowledged =
        send_and_await_ack(inner, &request_id, &request, inner.config.ack_timeout).await?;
    check_ack(acknowledged.ack, "subscription")?;
    Ok(acknowledged.connection_id)
}
