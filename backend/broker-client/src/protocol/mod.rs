//! Frame codec for the broker wire protocol.
//!
//! Every frame is one JSON object terminated by `\n` with a mandatory `op`
//! discriminator. Inbound lines are first decoded as a bare
//! [`OperationEnvelope`] to pick a shape, then decoded again as that shape.
//!
//! | op                 | direction        |
//! |--------------------|------------------|
//! | `publish.v1`       | client -> broker |
//! | `publish.ack.v1`   | both (request and ack) |
//! | `subscribe.v1`     | client -> broker |
//! | `subscribe.ack.v1` | broker -> client |
//! | `message.v1`       | broker -> client |
//!
//! Payload bytes travel base64 encoded (standard alphabet, padded).

use crate::client::Subscription;
use crate::error::frame::FrameError;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

pub const OP_PUBLISH: &str = "publish.v1";
pub const OP_PUBLISH_ACK: &str = "publish.ack.v1";
pub const OP_SUBSCRIBE: &str = "subscribe.v1";
pub const OP_SUBSCRIBE_ACK: &str = "subscribe.ack.v1";
pub const OP_MESSAGE: &str = "message.v1";

/// Which publish operation a request uses. Both are answered with
/// `publish.ack.v1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOp {
    Publish,
    PublishAck,
}

impl PublishOp {
    pub fn as_str(self) -> &'static str {
        match self {
            PublishOp::Publish => OP_PUBLISH,
            PublishOp::PublishAck => OP_PUBLISH_ACK,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRequest {
    pub op: String,
    pub request_id: String,
    pub channel: String,
    pub event: String,
    pub payload_b64: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl PublishRequest {
    pub fn new(
        op: PublishOp,
        request_id: &str,
        channel: &str,
        event: &str,
        payload: &[u8],
        timeout_ms: Option<u64>,
    ) -> Self {
        Self {
            op: op.as_str().to_string(),
            request_id: request_id.to_string(),
            channel: channel.to_string(),
            event: event.to_string(),
            payload_b64: encode_payload(payload),
            timeout_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub op: String,
    pub request_id: String,
    pub subscription_id: String,
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
}

impl SubscribeRequest {
    pub fn new(request_id: &str, subscription: &Subscription) -> Self {
        Self {
            op: OP_SUBSCRIBE.to_string(),
            request_id: request_id.to_string(),
            subscription_id: subscription.subscription_id.clone(),
            channel: subscription.channel.clone(),
            event: subscription
                .event
                .as_ref()
                .filter(|event| !event.is_empty())
                .cloned(),
        }
    }
}

/// Acknowledgement for a publish or subscribe request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestAck {
    pub op: String,
    pub request_id: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `message.v1` exactly as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub op: String,
    pub subscription_id: String,
    pub message_id: String,
    pub channel: String,
    pub event: String,
    pub payload_b64: String,
    pub received_at_ms: i64,
}

/// Minimal shape used to route a frame. A missing `op` decodes as the empty
/// string, which is treated like any other unknown operation.
#[derive(Debug, Deserialize)]
pub struct OperationEnvelope {
    #[serde(default)]
    pub op: String,
}

/// A routed inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Ack(RequestAck),
    Message(MessageEnvelope),
    /// Operation this client does not know. Ignored by the dispatcher.
    Unknown(String),
}

/// Serializes `frame` as one JSON line.
pub fn encode_frame<T: Serialize>(frame: &T) -> Result<Vec<u8>, FrameError> {
    let mut bytes = serde_json::to_vec(frame)
        .map_err(|e| FrameError::encode(format!("failed to encode transport payload: {e}")))?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decodes one inbound line (without its terminating newline).
pub fn decode_inbound(line: &[u8]) -> Result<Inbound, FrameError> {
    let envelope: OperationEnvelope = serde_json::from_slice(line)
        .map_err(|e| FrameError::decode(format!("invalid transport envelope: {e}")))?;

    match envelope.op.as_str() {
        OP_PUBLISH_ACK => serde_json::from_slice(line)
            .map(Inbound::Ack)
            .map_err(|e| FrameError::decode(format!("invalid publish ack: {e}"))),
        OP_SUBSCRIBE_ACK => serde_json::from_slice(line)
            .map(Inbound::Ack)
            .map_err(|e| FrameError::decode(format!("invalid subscribe ack: {e}"))),
        OP_MESSAGE => serde_json::from_slice(line)
            .map(Inbound::Message)
            .map_err(|e| FrameError::decode(format!("invalid message envelope: {e}"))),
        _ => Ok(Inbound::Unknown(envelope.op)),
    }
}

pub fn encode_payload(payload: &[u8]) -> String {
    BASE64.encode(payload)
}

pub fn decode_payload(payload_b64: &str) -> Result<Vec<u8>, FrameError> {
    BASE64
        .decode(payload_b64)
        .map_err(|e| FrameError::decode(format!("invalid message payload: {e}")))
}
