use crate::error::client::ClientError;
use crate::error::frame::FrameError;
use crate::protocol::{MessageEnvelope, decode_payload};

use serde::{Deserialize, Serialize};

/// A channel/event binding the broker should deliver messages for.
///
/// `subscription_id` is chosen by the caller and identifies the subscription
/// for the lifetime of the client; subscribing again with the same id
/// replaces the earlier binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub subscription_id: String,
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
}

impl Subscription {
    pub fn new(subscription_id: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            channel: channel.into(),
            event: None,
        }
    }

    /// Restricts the subscription to one event name.
    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }
}

/// A message delivered for one of this client's subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subscription_id: String,
    pub message_id: String,
    pub channel: String,
    pub event: String,
    pub payload: Vec<u8>,
    /// Broker-assigned receive time, milliseconds since the Unix epoch.
    pub received_at_ms: i64,
}

impl TryFrom<MessageEnvelope> for Message {
    type Error = FrameError;

    fn try_from(envelope: MessageEnvelope) -> Result<Self, Self::Error> {
        let payload = decode_payload(&envelope.payload_b64)?;
        Ok(Self {
            subscription_id: envelope.subscription_id,
            message_id: envelope.message_id,
            channel: envelope.channel,
            event: envelope.event,
            payload,
            received_at_ms: envelope.received_at_ms,
        })
    }
}

/// Something that happened in the background, outside any caller's request.
///
/// Read with [`Client::next_event`](crate::Client::next_event). The queue is
/// bounded and drops new events when full.
#[derive(Debug)]
pub enum ClientEvent {
    /// A lost connection was re-established.
    Reconnected { attempts: u32 },

    /// One automatic reconnect attempt failed; another will follow.
    ReconnectFailed { attempt: u32, error: ClientError },

    /// A subscription could not be replayed on a new connection.
    RestoreFailed {
        subscription_id: String,
        error: ClientError,
    },

    /// A read-loop failure: malformed or oversized frame, bad payload.
    Error(ClientError),
}

impl ClientEvent {
    /// The error carried by this event, if any.
    pub fn error(&self) -> Option<&ClientError> {
        match self {
            ClientEvent::Reconnected { .. } => None,
            ClientEvent::ReconnectFailed { error, .. }
            | ClientEvent::RestoreFailed { error, .. }
            | ClientEvent::Error(error) => Some(error),
        }
    }
}
