use crate::helpers::{duplex_client, test_config};

use broker_client::ClientError;

use std::time::{Duration, Instant};

use tokio::time::sleep;

/// **VALUE**: Verifies a publish completes only when its own ack arrives.
///
/// **WHY THIS MATTERS**: Many publishes share one connection. Completing on the wrong
/// ack would report success for a message the broker has not accepted yet.
///
/// **BUG THIS CATCHES**: Would catch correlation by arrival order instead of request id,
/// or a mismatched ack being treated as an error instead of being discarded.
#[tokio::test]
async fn given_mismatched_ack_first_when_publishing_then_completes_on_matching_ack() {
    // GIVEN: A connected client
    let (client, mut broker) = duplex_client(test_config());
    client.connect().await.expect("Connect should succeed");
    let mut conn = broker.accept().await;

    // WHEN: Publishing while the broker acks "other" first and the real id 50 ms later
    let started = Instant::now();
    let (result, request) = tokio::join!(
        client.publish("orders", "created", b"hello", Duration::from_secs(2)),
        async {
            let request = conn.next_request().await;
            conn.ack_id("publish.ack.v1", "other", true, None).await;
            sleep(Duration::from_millis(50)).await;
            conn.ack(&request, true, None).await;
            request
        }
    );

    // THEN: Success, no earlier than the matching ack
    assert!(result.is_ok(), "Publish should succeed: {result:?}");
    assert!(
        started.elapsed() >= Duration::from_millis(50),
        "Publish completed before its ack was sent"
    );

    // AND: The request carried the wire fields
    assert_eq!(request["op"], "publish.v1");
    assert_eq!(request["channel"], "orders");
    assert_eq!(request["event"], "created");
    assert_eq!(request["payload_b64"], "aGVsbG8=");
    assert_eq!(request["timeout_ms"], 2000);
    assert!(
        !request["request_id"].as_str().unwrap_or_default().is_empty(),
        "Request id should be set"
    );

    client.close();
}

/// **VALUE**: Verifies concurrent publishes each get their own ack, in any order.
///
/// **BUG THIS CATCHES**: Would catch a single shared pending slot, or frames from two
/// tasks interleaving on the wire.
#[tokio::test]
async fn given_concurrent_publishes_when_acked_in_reverse_then_both_succeed() {
    // GIVEN: A connected client
    let (client, mut broker) = duplex_client(test_config());
    client.connect().await.expect("Connect should succeed");
    let mut conn = broker.accept().await;

    // WHEN: Two publishes are in flight and acked in reverse order
    let (first, second, _) = tokio::join!(
        client.publish("a", "e", b"1", Duration::from_secs(2)),
        client.publish("b", "e", b"2", Duration::from_secs(2)),
        async {
            let one = conn.next_request().await;
            let two = conn.next_request().await;
            assert_ne!(one["request_id"], two["request_id"]);
            conn.ack(&two, true, None).await;
            conn.ack(&one, true, None).await;
        }
    );

    // THEN: Both succeed
    assert!(first.is_ok(), "First publish failed: {first:?}");
    assert!(second.is_ok(), "Second publish failed: {second:?}");

    client.close();
}

/// **VALUE**: Verifies the confirmed-publish variant sends its own op.
#[tokio::test]
async fn given_publish_ack_when_sent_then_uses_publish_ack_op() {
    // GIVEN: A connected client
    let (client, mut broker) = duplex_client(test_config());
    client.connect().await.expect("Connect should succeed");
    let mut conn = broker.accept().await;

    // WHEN: Calling publish_ack
    let (result, request) = tokio::join!(
        client.publish_ack("orders", "created", b"", Duration::from_secs(1)),
        async {
            let request = conn.next_request().await;
            conn.ack(&request, true, None).await;
            request
        }
    );

    // THEN: publish.ack.v1 on the wire, success returned
    assert!(result.is_ok());
    assert_eq!(request["op"], "publish.ack.v1");
    assert_eq!(request["payload_b64"], "");

    client.close();
}

/// **VALUE**: Verifies broker rejections surface as `Rejected` with the broker's reason.
///
/// **WHY THIS MATTERS**: A rejection is final. Callers must be able to tell it apart from
/// a timeout (which may be retried) and see why.
///
/// **BUG THIS CATCHES**: Would catch `ok: false` being reported as success, or the
/// broker's error string being dropped.
#[tokio::test]
async fn given_rejecting_broker_when_publishing_then_returns_rejected_with_reason() {
    // GIVEN: A connected client
    let (client, mut broker) = duplex_client(test_config());
    client.connect().await.expect("Connect should succeed");
    let mut conn = broker.accept().await;

    // WHEN: The broker rejects with a reason, then without one
    let (with_reason, _) = tokio::join!(
        client.publish("orders", "created", b"x", Duration::from_secs(1)),
        async {
            let request = conn.next_request().await;
            conn.ack(&request, false, Some("channel not allowed")).await;
        }
    );
    let (without_reason, _) = tokio::join!(
        client.publish("orders", "created", b"x", Duration::from_secs(1)),
        async {
            let request = conn.next_request().await;
            conn.ack(&request, false, None).await;
        }
    );

    // THEN: Both are Rejected; only the first carries the reason
    let with_reason = with_reason.expect_err("Publish should be rejected");
    assert!(with_reason.is_rejected());
    assert!(with_reason.to_string().contains("channel not allowed"));

    let without_reason = without_reason.expect_err("Publish should be rejected");
    assert!(without_reason.is_rejected());
    assert!(without_reason.to_string().contains("publish rejected"));

    client.close();
}

/// **VALUE**: Verifies an unanswered publish times out, and that the stale entry does
/// not leak into later requests.
///
/// **BUG THIS CATCHES**: Would catch a publish hanging forever, the timeout being
/// retried, or a late ack for the timed-out request breaking the connection.
#[tokio::test]
async fn given_silent_broker_when_publishing_then_times_out_and_connection_survives() {
    // GIVEN: A connected client
    let (client, mut broker) = duplex_client(test_config());
    client.connect().await.expect("Connect should succeed");
    let mut conn = broker.accept().await;

    // WHEN: The broker never answers within 100 ms
    let (result, request) = tokio::join!(
        client.publish("orders", "created", b"x", Duration::from_millis(100)),
        conn.next_request()
    );

    // THEN: Timeout, with exactly one request sent
    let error = result.expect_err("Publish should time out");
    assert!(error.is_timeout(), "Expected timeout, got {error:?}");

    // WHEN: The late ack arrives and another publish follows
    conn.ack(&request, true, None).await;
    let (next, _) = tokio::join!(
        client.publish("orders", "created", b"y", Duration::from_secs(1)),
        async {
            let request = conn.next_request().await;
            assert_eq!(request["payload_b64"], "eQ==", "Timed-out publish must not be resent");
            conn.ack(&request, true, None).await;
        }
    );

    // THEN: The connection is still usable
    assert!(next.is_ok(), "Publish after late ack should succeed: {next:?}");
    assert!(client.is_connected());

    client.close();
}

/// **VALUE**: Verifies a zero timeout falls back to the configured default.
///
/// **BUG THIS CATCHES**: Would catch a zero timeout expiring immediately, or being sent
/// to the broker as `timeout_ms: 0`.
#[tokio::test]
async fn given_zero_timeout_when_publishing_then_configured_default_used() {
    // GIVEN: A client whose ack timeout is 150 ms
    let (client, mut broker) =
        duplex_client(test_config().with_ack_timeout(Duration::from_millis(150)));
    client.connect().await.expect("Connect should succeed");
    let mut conn = broker.accept().await;

    // WHEN: Publishing with a zero timeout and no ack
    let started = Instant::now();
    let (result, request) = tokio::join!(
        client.publish("orders", "created", b"x", Duration::ZERO),
        conn.next_request()
    );

    // THEN: Times out after the default and advertises it on the wire
    assert!(result.is_err_and(|e| e.is_timeout()));
    assert!(started.elapsed() >= Duration::from_millis(150));
    assert_eq!(request["timeout_ms"], 150);

    client.close();
}

/// **VALUE**: Verifies argument validation happens before any I/O.
///
/// **BUG THIS CATCHES**: Would catch an empty channel being sent to the broker, or a
/// bad call triggering a dial.
#[tokio::test]
async fn given_empty_channel_or_event_when_publishing_then_validation_error_without_dial() {
    // GIVEN: A client that has never connected
    let (client, mut broker) = duplex_client(test_config());

    // WHEN: Publishing with an empty channel, then an empty event
    let no_channel = client
        .publish("", "created", b"x", Duration::from_secs(1))
        .await;
    let no_event = client
        .publish_ack("orders", "", b"x", Duration::from_secs(1))
        .await;

    // THEN: Validation errors and no dial
    assert!(matches!(no_channel, Err(ClientError::Validation { .. })));
    assert!(matches!(no_event, Err(ClientError::Validation { .. })));
    assert!(!broker.has_pending_dial(), "Validation failure must not dial");
    assert!(!client.is_connected());

    client.close();
}
