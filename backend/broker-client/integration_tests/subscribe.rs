use crate::helpers::{STEP_TIMEOUT, duplex_client, test_config};

use broker_client::{ClientError, Subscription};

use tokio::time::timeout;

/// **VALUE**: Verifies the core subscribe path: ack, record, then deliver.
///
/// **WHY THIS MATTERS**: This is the main read path of the library. A message must reach
/// the caller with its subscription id and exact payload bytes.
///
/// **BUG THIS CATCHES**: Would catch payloads being delivered still base64 encoded, a
/// subscription being recorded before its ack, or the event filter being dropped.
#[tokio::test]
async fn given_acked_subscription_when_message_arrives_then_delivered_with_exact_payload() {
    // GIVEN: A connected client
    let (client, mut broker) = duplex_client(test_config());
    client.connect().await.expect("Connect should succeed");
    let mut conn = broker.accept().await;

    // WHEN: Subscribing with an event filter and the broker acks
    let subscription = Subscription::new("sub-1", "orders").with_event("created");
    let (result, request) = tokio::join!(client.subscribe(subscription.clone()), async {
        let request = conn.next_request().await;
        conn.ack(&request, true, None).await;
        request
    });

    // THEN: The subscribe frame is correct and the subscription is recorded
    assert!(result.is_ok(), "Subscribe should succeed: {result:?}");
    assert_eq!(request["op"], "subscribe.v1");
    assert_eq!(request["subscription_id"], "sub-1");
    assert_eq!(request["channel"], "orders");
    assert_eq!(request["event"], "created");
    assert_eq!(client.subscriptions(), vec![subscription]);

    // WHEN: The broker delivers a binary payload
    conn.message("sub-1", "msg-1", "//4APg==").await;

    // THEN: The caller receives the decoded bytes
    let message = timeout(STEP_TIMEOUT, client.next_message())
        .await
        .expect("Timed out waiting for message")
        .expect("Message queue closed");
    assert_eq!(message.subscription_id, "sub-1");
    assert_eq!(message.message_id, "msg-1");
    assert_eq!(message.channel, "orders");
    assert_eq!(message.event, "created");
    assert_eq!(message.payload, vec![0xff, 0xfe, 0x00, 0x3e]);
    assert_eq!(message.received_at_ms, 1_700_000_000_000);

    client.close();
}

/// **VALUE**: Verifies a rejected subscription is not recorded.
///
/// **WHY THIS MATTERS**: Only acknowledged subscriptions are replayed after a reconnect.
/// Recording a rejected one would re-issue it on every reconnect forever.
///
/// **BUG THIS CATCHES**: Would catch the registry being updated before checking `ok`.
#[tokio::test]
async fn given_rejecting_broker_when_subscribing_then_rejected_and_not_recorded() {
    // GIVEN: A connected client
    let (client, mut broker) = duplex_client(test_config());
    client.connect().await.expect("Connect should succeed");
    let mut conn = broker.accept().await;

    // WHEN: The broker rejects the subscription
    let (result, _) = tokio::join!(client.subscribe(Subscription::new("sub-1", "secret")), async {
        let request = conn.next_request().await;
        conn.ack(&request, false, Some("denied")).await;
    });

    // THEN: Rejected with the reason, nothing recorded
    let error = result.expect_err("Subscribe should be rejected");
    assert!(error.is_rejected());
    assert!(error.to_string().contains("denied"));
    assert!(client.subscriptions().is_empty());

    client.close();
}

/// **VALUE**: Verifies a full message queue applies backpressure instead of dropping.
///
/// **WHY THIS MATTERS**: Delivery is at-least-once from the broker's side. Silently
/// dropping messages when the caller is slow would lose data.
///
/// **BUG THIS CATCHES**: Would catch `try_send` being used for messages, which would drop
/// everything after the first queued message here.
#[tokio::test]
async fn given_single_slot_queue_when_burst_arrives_then_every_message_delivered_in_order() {
    // GIVEN: A client with room for one queued message
    let (client, mut broker) = duplex_client(test_config().with_message_buffer(1));
    client.connect().await.expect("Connect should succeed");
    let mut conn = broker.accept().await;

    // WHEN: The broker writes five messages before the caller reads any
    for i in 0..5 {
        conn.message("sub-1", &format!("msg-{i}"), "aGk=").await;
    }

    // THEN: All five arrive, in order
    for i in 0..5 {
        let message = timeout(STEP_TIMEOUT, client.next_message())
            .await
            .expect("Timed out waiting for message")
            .expect("Message queue closed");
        assert_eq!(message.message_id, format!("msg-{i}"));
    }

    client.close();
}

/// **VALUE**: Verifies subscription arguments are validated before any I/O.
#[tokio::test]
async fn given_missing_id_or_channel_when_subscribing_then_validation_error() {
    // GIVEN: A client that has never connected
    let (client, mut broker) = duplex_client(test_config());

    // WHEN: Subscribing with an empty id, then an empty channel
    let no_id = client.subscribe(Subscription::new("", "orders")).await;
    let no_channel = client.subscribe(Subscription::new("sub-1", "")).await;

    // THEN: Validation errors and no dial
    assert!(matches!(no_id, Err(ClientError::Validation { .. })));
    assert!(matches!(no_channel, Err(ClientError::Validation { .. })));
    assert!(!broker.has_pending_dial());

    client.close();
}
