use crate::helpers::{STEP_TIMEOUT, duplex_client, test_config, wait_for_event};

use broker_client::ClientEvent;

use tokio::time::timeout;

/// **VALUE**: Verifies an oversized inbound line is reported and ends the connection.
///
/// **WHY THIS MATTERS**: A frame over the limit leaves the stream mid-line; the only way
/// back to a clean frame boundary is a fresh connection.
///
/// **BUG THIS CATCHES**: Would catch the client buffering the whole line, silently
/// truncating it, or crashing the read loop without reconnecting.
#[tokio::test]
async fn given_64_byte_limit_when_broker_sends_200_byte_line_then_protocol_error_and_reconnect() {
    // GIVEN: A client with a 64-byte frame limit
    let (client, mut broker) = duplex_client(test_config().with_max_frame_bytes(64));
    client.connect().await.expect("Connect should succeed");
    let mut conn = broker.accept().await;

    // WHEN: The broker sends a 200-byte line
    let mut line = vec![b'x'; 200];
    line.push(b'\n');
    conn.send_raw(&line).await;

    // THEN: A protocol error naming the limit is reported
    let event = wait_for_event(&client, |e| matches!(e, ClientEvent::Error(_))).await;
    let error = event.error().expect("Error event should carry an error");
    assert!(error.is_protocol(), "Expected protocol error, got {error:?}");
    assert!(error.to_string().contains("exceeds max size of 64 bytes"));

    // AND: The client reconnects on its own
    let _conn = broker.accept().await;
    wait_for_event(&client, |e| matches!(e, ClientEvent::Reconnected { .. })).await;
    assert!(client.is_connected());

    client.close();
}

/// **VALUE**: Verifies bad frames are skipped without disturbing the connection.
///
/// **WHY THIS MATTERS**: A newer broker may send operations this client does not know,
/// and one corrupt frame should not cost every subscriber a reconnect.
///
/// **BUG THIS CATCHES**: Would catch a decode error ending the read loop, or unknown
/// operations being reported as errors.
#[tokio::test]
async fn given_malformed_and_unknown_frames_when_read_then_reported_and_loop_continues() {
    // GIVEN: A connected client
    let (client, mut broker) = duplex_client(test_config());
    client.connect().await.expect("Connect should succeed");
    let mut conn = broker.accept().await;

    // WHEN: The broker sends broken JSON, an unknown op, a bad payload, then a good message
    conn.send_raw(b"{not json\n").await;
    conn.send_raw(b"{\"op\":\"presence.v1\"}\n").await;
    conn.message("sub-1", "bad-payload", "!!!not base64").await;
    conn.message("sub-1", "good", "aGk=").await;

    // THEN: The good message still arrives
    let message = timeout(STEP_TIMEOUT, client.next_message())
        .await
        .expect("Timed out waiting for message")
        .expect("Message queue closed");
    assert_eq!(message.message_id, "good");

    // AND: Exactly the two broken frames were reported, both as protocol errors
    let mut errors = Vec::new();
    while let Some(event) = client.try_next_event() {
        errors.push(event);
    }
    assert_eq!(errors.len(), 2, "Unexpected events: {errors:?}");
    assert!(errors.iter().all(|e| e.error().is_some_and(|err| err.is_protocol())));
    assert!(errors[0].error().is_some_and(|e| e.to_string().contains("invalid transport envelope")));
    assert!(errors[1].error().is_some_and(|e| e.to_string().contains("invalid message payload")));

    // AND: No reconnect happened
    assert!(client.is_connected());
    assert!(!broker.has_pending_dial());

    client.close();
}
