// Unit tests for subcommand output and execution against an in-memory broker.

use crate::cli::{PublishArgs, SubscribeArgs};
use crate::commands::{publish, render_message, subscribe};

use broker_client::transport::Dialer;
use broker_client::{Client, ClientConfig, Message};

use std::io::Error as IoError;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, duplex};
use tokio::sync::mpsc;
use tokio::time::timeout;

fn message(payload: &[u8]) -> Message {
    Message {
        subscription_id: "sub-1".to_string(),
        message_id: "msg-1".to_string(),
        channel: "orders".to_string(),
        event: "created".to_string(),
        payload: payload.to_vec(),
        received_at_ms: 42,
    }
}

fn duplex_client() -> (Client, mpsc::UnboundedReceiver<DuplexStream>) {
    let (broker_tx, broker_rx) = mpsc::unbounded_channel();
    let dialer = Dialer::from_fn("duplex", move || {
        let broker_tx = broker_tx.clone();
        async move {
            let (client_side, broker_side) = duplex(64 * 1024);
            let _ = broker_tx.send(broker_side);
            Ok::<_, IoError>(client_side)
        }
    });
    let client = Client::with_dialer(ClientConfig::new("/unused.sock"), dialer)
        .expect("Failed to build client");
    (client, broker_rx)
}

/// Answers every request on the first connection with `ok: true`, then sends
/// `messages` once the subscribe has been acked.
async fn run_broker(mut connections: mpsc::UnboundedReceiver<DuplexStream>, messages: Vec<Value>) {
    let stream = connections.recv().await.expect("Client never dialed");
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = BufReader::new(reader).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let request: Value = serde_json::from_str(&line).expect("Invalid request");
        let ack_op = if request["op"] == "subscribe.v1" {
            "subscribe.ack.v1"
        } else {
            "publish.ack.v1"
        };
        let mut frames = vec![json!({ "op": ack_op, "request_id": request["request_id"], "ok": true })];
        if ack_op == "subscribe.ack.v1" {
            frames.extend(messages.iter().cloned());
        }
        for frame in frames {
            let mut bytes = serde_json::to_vec(&frame).expect("Failed to encode");
            bytes.push(b'\n');
            if writer.write_all(&bytes).await.is_err() {
                return;
            }
        }
    }
}

/// **VALUE**: Verifies text payloads are printed as text.
///
/// **WHY THIS MATTERS**: Most payloads are JSON or plain text; printing them base64
/// encoded would make the tool useless for quick inspection.
#[test]
fn given_utf8_payload_when_rendered_then_printed_as_text() {
    // GIVEN/WHEN: A UTF-8 payload
    let line = render_message(&message(b"{\"id\":7}"));

    // THEN: Plain text under "payload"
    assert_eq!(line["payload"], "{\"id\":7}");
    assert!(line.get("payload_b64").is_none());
    assert_eq!(line["subscription_id"], "sub-1");
    assert_eq!(line["received_at_ms"], 42);
}

/// **VALUE**: Verifies binary payloads are printed losslessly.
///
/// **BUG THIS CATCHES**: Would catch lossy UTF-8 conversion replacing bytes with U+FFFD.
#[test]
fn given_binary_payload_when_rendered_then_printed_as_base64() {
    // GIVEN/WHEN: A non-UTF-8 payload
    let line = render_message(&message(&[0xff, 0xfe]));

    // THEN: Base64 under "payload_b64"
    assert_eq!(line["payload_b64"], "//4=");
    assert!(line.get("payload").is_none());
}

/// **VALUE**: Verifies the publish command drives a publish through the client.
#[tokio::test]
async fn given_acking_broker_when_publish_command_runs_then_succeeds() {
    // GIVEN: A client wired to a broker that acks everything
    let (client, connections) = duplex_client();
    let broker = tokio::spawn(run_broker(connections, Vec::new()));
    let args = PublishArgs {
        channel: "orders".to_string(),
        event: "created".to_string(),
        payload: "hello".to_string(),
        ack: true,
        timeout_ms: 1000,
    };

    // WHEN: Running the command
    let result = publish(&client, &args).await;

    // THEN: Success
    assert!(result.is_ok(), "Publish command failed: {result:?}");
    client.close();
    broker.abort();
}

/// **VALUE**: Verifies subscribe prints one JSON line per message and stops at --count.
///
/// **BUG THIS CATCHES**: Would catch lines missing their newline (breaking line-based
/// consumers) or `--count` being ignored so the command never exits.
#[tokio::test]
async fn given_two_messages_when_subscribe_command_runs_with_count_then_prints_two_lines() {
    // GIVEN: A broker that delivers two messages after the subscribe ack
    let (client, connections) = duplex_client();
    let messages = ["first", "second"]
        .into_iter()
        .map(|id| {
            json!({
                "op": "message.v1",
                "subscription_id": "sub-1",
                "message_id": id,
                "channel": "orders",
                "event": "created",
                "payload_b64": "aGk=",
                "received_at_ms": 1,
            })
        })
        .collect();
    let broker = tokio::spawn(run_broker(connections, messages));
    let args = SubscribeArgs {
        id: "sub-1".to_string(),
        channel: "orders".to_string(),
        event: None,
        count: Some(2),
    };

    // WHEN: Running the command into a buffer
    let mut out = Vec::new();
    let written = timeout(Duration::from_secs(3), subscribe(&client, &args, &mut out))
        .await
        .expect("Subscribe command hung")
        .expect("Subscribe command failed");

    // THEN: Two JSON lines, in order
    assert_eq!(written, 2);
    let text = String::from_utf8(out).expect("Output should be UTF-8");
    let lines: Vec<Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).expect("Each line should be JSON"))
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["message_id"], "first");
    assert_eq!(lines[1]["message_id"], "second");
    assert_eq!(lines[1]["payload"], "hi");

    client.close();
    broker.abort();
}
