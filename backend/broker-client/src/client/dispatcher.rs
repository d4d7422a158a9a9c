//! Inbound dispatch: routes each decoded frame to the pending request it
//! answers or to the message queue.

use crate::client::correlation;
use crate::client::state::ClientInner;
use crate::client::types::Message;
use crate::error::client::ClientError;
use crate::protocol::{Inbound, decode_inbound};

use log::{debug, trace};

/// Routes one inbound line.
///
/// Unknown operations are ignored. Malformed frames and undecodable payloads
/// come back as errors for the read loop to report; they never end the loop.
pub(crate) async fn handle_line(inner: &ClientInner, line: &[u8]) -> Result<(), ClientError> {
    match decode_inbound(line)? {
        Inbound::Ack(ack) => correlation::resolve_pending(inner, ack),
        Inbound::Message(envelope) => deliver(inner, Message::try_from(envelope)?).await,
        Inbound::Unknown(op) => trace!("Ignoring frame with unknown op {op:?}"),
    }

    Ok(())
}

/// Queues a message for the caller, waiting for room when the queue is full.
///
/// Waiting stalls the read loop, and with it ack processing for this
/// connection, until the caller catches up. Messages are never dropped to
/// make room.
async fn deliver(inner: &ClientInner, message: Message) {
    let Some(messages_tx) = inner.lock_state().messages_tx.clone() else {
        trace!("Client closed, discarding message {}", message.message_id);
        return;
    };

    if messages_tx.capacity() == 0 {
        debug!(
            "Message queue full, waiting to deliver {} for {}",
            message.message_id, message.subscription_id
        );
    }

    if let Err(rejected) = messages_tx.send(message).await {
        trace!("Message receiver gone, discarding {}", rejected.0.message_id);
    }
}
