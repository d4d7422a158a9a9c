//! Subcommand implementations. Each takes an already-built [`Client`] so they can run
//! against any transport.

use crate::cli::{PublishArgs, SubscribeArgs};
use crate::error::CliError;

use broker_client::protocol::encode_payload;
use broker_client::{Client, ClientEvent, Message, Subscription};

use std::io::Write;
use std::time::Duration;

use log::{debug, info, warn};
use serde_json::{Value, json};

pub async fn publish(client: &Client, args: &PublishArgs) -> Result<(), CliError> {
    let timeout = Duration::from_millis(args.timeout_ms);
    let payload = args.payload.as_bytes();

    if args.ack {
        client
            .publish_ack(&args.channel, &args.event, payload, timeout)
            .await?;
    } else {
        client
            .publish(&args.channel, &args.event, payload, timeout)
            .await?;
    }

    info!(
        "Published {} byte(s) to {}/{}",
        payload.len(),
        args.channel,
        args.event
    );
    Ok(())
}

/// Subscribes and writes one JSON line per message to `out` until `count` messages
/// were written or the client is closed. Returns how many were written.
pub async fn subscribe<W: Write>(
    client: &Client,
    args: &SubscribeArgs,
    out: &mut W,
) -> Result<usize, CliError> {
    let mut subscription = Subscription::new(&args.id, &args.channel);
    if let Some(event) = &args.event {
        subscription = subscription.with_event(event);
    }
    client.subscribe(subscription).await?;
    info!("Subscribed {} to {}", args.id, args.channel);

    let mut written = 0;
    while args.count.is_none_or(|count| written < count) {
        tokio::select! {
            message = client.next_message() => {
                let Some(message) = message else { break };
                writeln!(out, "{}", render_message(&message))?;
                out.flush()?;
                written += 1;
            }
            event = client.next_event() => {
                let Some(event) = event else { break };
                log_event(&event);
            }
        }
    }

    Ok(written)
}

/// JSON line for one message. UTF-8 payloads are printed as text, anything else as
/// base64 under `payload_b64`.
pub fn render_message(message: &Message) -> Value {
    let mut line = json!({
        "subscription_id": message.subscription_id,
        "message_id": message.message_id,
        "channel": message.channel,
        "event": message.event,
        "received_at_ms": message.received_at_ms,
    });

    match std::str::from_utf8(&message.payload) {
        Ok(text) => line["payload"] = json!(text),
        Err(_) => line["payload_b64"] = json!(encode_payload(&message.payload)),
    }

    line
}

fn log_event(event: &ClientEvent) {
    match event {
        ClientEvent::Reconnected { attempts } => {
            info!("Reconnected to broker after {attempts} attempt(s)")
        }
        ClientEvent::ReconnectFailed { attempt, error } => {
            debug!("Reconnect attempt {attempt} failed: {error}")
        }
        ClientEvent::RestoreFailed {
            subscription_id,
            error,
        } => warn!("Could not restore subscription {subscription_id}: {error}"),
        ClientEvent::Error(error) => warn!("{error}"),
    }
}
