//! Test helpers for broker client integration tests.
//!
//! This module provides an in-memory stand-in for the broker:
//! - A dialer that hands the broker side of every new duplex pipe to the test
//! - Reading client requests as JSON values
//! - Writing acks, messages and raw bytes back to the client
//! - Waiting for background events with a deadline

use broker_client::transport::Dialer;
use broker_client::{Client, ClientConfig, ClientEvent};

use std::io::Error as IoError;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{
    AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf, duplex,
    split,
};
use tokio::sync::mpsc;
use tokio::time::timeout;

/// How long any single helper waits before failing the test.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(3);

/// Config with a fast reconnect schedule so tests don't wait seconds per redial.
pub fn test_config() -> ClientConfig {
    ClientConfig::new("/unused/broker.sock")
        .with_ack_timeout(Duration::from_secs(2))
        .with_reconnect_backoff(Duration::from_millis(20), Duration::from_millis(100))
}

/// Client whose every dial produces a fresh duplex pipe. The broker half of each
/// pipe is delivered through the returned [`TestBroker`].
pub fn duplex_client(config: ClientConfig) -> (Client, TestBroker) {
    let (broker_tx, broker_rx) = mpsc::unbounded_channel();
    let dialer = Dialer::from_fn("duplex", move || {
        let broker_tx = broker_tx.clone();
        async move {
            let (client_side, broker_side) = duplex(64 * 1024);
            let _ = broker_tx.send(broker_side);
            Ok::<_, IoError>(client_side)
        }
    });

    let client = Client::with_dialer(config, dialer).expect("Failed to build client");
    (
        client,
        TestBroker {
            connections: broker_rx,
        },
    )
}

pub struct TestBroker {
    connections: mpsc::UnboundedReceiver<DuplexStream>,
}

impl TestBroker {
    /// Waits for the client's next dial.
    pub async fn accept(&mut self) -> BrokerConnection {
        let stream = timeout(STEP_TIMEOUT, self.connections.recv())
            .await
            .expect("Timed out waiting for the client to dial")
            .expect("Dialer dropped");
        BrokerConnection::new(stream)
    }

    /// Whether the client has dialed since the last `accept`.
    pub fn has_pending_dial(&mut self) -> bool {
        !self.connections.is_empty()
    }
}

/// Broker side of one connection.
pub struct BrokerConnection {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl BrokerConnection {
    pub fn new(stream: DuplexStream) -> Self {
        let (reader, writer) = split(stream);
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    /// Next request frame the client wrote, decoded as JSON.
    pub async fn next_request(&mut self) -> Value {
        let line = timeout(STEP_TIMEOUT, self.lines.next_line())
            .await
            .expect("Timed out waiting for a client request")
            .expect("Failed to read client request")
            .expect("Client closed the connection");
        serde_json::from_str(&line).expect("Client sent invalid JSON")
    }

    /// Next request, or `None` if the client closes the stream first.
    pub async fn next_request_or_eof(&mut self) -> Option<Value> {
        let line = timeout(STEP_TIMEOUT, self.lines.next_line())
            .await
            .expect("Timed out waiting for the client")
            .ok()
            .flatten()?;
        serde_json::from_str(&line).ok()
    }

    pub async fn send(&mut self, frame: Value) {
        let mut bytes = serde_json::to_vec(&frame).expect("Failed to encode frame");
        bytes.push(b'\n');
        self.send_raw(&bytes).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer
            .write_all(bytes)
            .await
            .expect("Failed to write to client");
        self.writer.flush().await.expect("Failed to flush");
    }

    /// Acks `request` with the op matching its kind.
    pub async fn ack(&mut self, request: &Value, ok: bool, error: Option<&str>) {
        let request_id = request["request_id"]
            .as_str()
            .expect("Request should carry a request_id");
        self.ack_id(ack_op_for(request), request_id, ok, error).await;
    }

    pub async fn ack_id(&mut self, op: &str, request_id: &str, ok: bool, error: Option<&str>) {
        let mut frame = json!({ "op": op, "request_id": request_id, "ok": ok });
        if let Some(error) = error {
            frame["error"] = json!(error);
        }
        self.send(frame).await;
    }

    pub async fn message(&mut self, subscription_id: &str, message_id: &str, payload_b64: &str) {
        self.send(json!({
            "op": "message.v1",
            "subscription_id": subscription_id,
            "message_id": message_id,
            "channel": "orders",
            "event": "created",
            "payload_b64": payload_b64,
            "received_at_ms": 1_700_000_000_000_i64,
        }))
        .await;
    }
}

fn ack_op_for(request: &Value) -> &'static str {
    match request["op"].as_str() {
        Some("subscribe.v1") => "subscribe.ack.v1",
        _ => "publish.ack.v1",
    }
}

/// Waits for the first event matching `predicate`, discarding the others.
pub async fn wait_for_event<F>(client: &Client, mut predicate: F) -> ClientEvent
where
    F: FnMut(&ClientEvent) -> bool,
{
    timeout(STEP_TIMEOUT, async {
        loop {
            let event = client.next_event().await.expect("Event queue closed");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("Timed out waiting for client event")
}
