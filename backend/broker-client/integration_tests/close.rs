use crate::helpers::{STEP_TIMEOUT, duplex_client, test_config};

use broker_client::{ClientError, Subscription};

use std::time::Duration;

use tokio::time::timeout;

/// **VALUE**: Verifies `close()` is final and releases everything waiting on the client.
///
/// **WHY THIS MATTERS**: Shutdown code calls `close()` and then joins its tasks. A
/// publish still waiting on an ack, or a reader parked on the message queue, would hang
/// that shutdown.
///
/// **BUG THIS CATCHES**: Would catch pending requests being left in the map on close,
/// later calls redialing, or the message queue never ending.
#[tokio::test]
async fn given_pending_publish_when_closed_then_resolves_closed_and_later_calls_fail() {
    // GIVEN: A connected client with a publish waiting for its ack
    let (client, mut broker) = duplex_client(test_config());
    client.connect().await.expect("Connect should succeed");
    let mut conn = broker.accept().await;

    let publisher = client.clone();
    let pending = tokio::spawn(async move {
        publisher
            .publish("orders", "created", b"x", Duration::from_secs(5))
            .await
    });
    let _request = conn.next_request().await;

    // WHEN: Closing
    client.close();

    // THEN: The pending publish resolves with Closed promptly
    let result = timeout(STEP_TIMEOUT, pending)
        .await
        .expect("Pending publish hung after close")
        .expect("Publish task panicked");
    match result {
        Err(ClientError::Closed { location, .. }) => {
            // AND: The error points at close() rather than the error constructor
            let file = location.file.replace('\\', "/");
            assert!(file.ends_with("client/mod.rs"), "Located at {file}");
        }
        other => panic!("Expected Closed, got {other:?}"),
    }

    // AND: Every later call fails with Closed without dialing
    let publish = client
        .publish("orders", "created", b"x", Duration::from_secs(1))
        .await;
    let subscribe = client.subscribe(Subscription::new("sub-1", "orders")).await;
    let connect = client.connect().await;
    assert!(publish.is_err_and(|e| e.is_closed()));
    assert!(subscribe.is_err_and(|e| e.is_closed()));
    assert!(connect.is_err_and(|e| e.is_closed()));
    assert!(!broker.has_pending_dial());

    // AND: The broker sees the stream end, and the queues end for readers
    assert!(conn.next_request_or_eof().await.is_none());
    let next = timeout(STEP_TIMEOUT, client.next_message())
        .await
        .expect("Message queue should end after close");
    assert!(next.is_none());
    assert!(client.subscriptions().is_empty());

    // AND: Closing again is harmless
    client.close();
    assert!(client.is_closed());
}

/// **VALUE**: Verifies a client closed before its first call never dials.
#[tokio::test]
async fn given_unconnected_client_when_closed_then_publish_fails_without_dial() {
    // GIVEN: A fresh client, closed immediately
    let (client, mut broker) = duplex_client(test_config());
    client.close();

    // WHEN: Publishing
    let result = client
        .publish("orders", "created", b"x", Duration::from_secs(1))
        .await;

    // THEN: Closed, and no connection was attempted
    assert!(result.is_err_and(|e| e.is_closed()));
    assert!(!broker.has_pending_dial());
    assert!(!client.is_connected());
}
