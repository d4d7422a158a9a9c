use crate::helpers::{BrokerConnection, STEP_TIMEOUT, duplex_client, test_config, wait_for_event};

use broker_client::transport::Dialer;
use broker_client::{Client, ClientConfig, ClientEvent, Subscription};

use std::io::{Error as IoError, ErrorKind};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{DuplexStream, duplex};
use tokio::time::{sleep, timeout};

/// **VALUE**: Verifies subscriptions come back on their own after the broker restarts.
///
/// **WHY THIS MATTERS**: Callers subscribe once at startup. If a broker restart silently
/// ended their subscriptions, they would stop receiving messages with no error.
///
/// **BUG THIS CATCHES**: Would catch replay not running after the driver's dial, replay
/// running on the old connection, or the registry being cleared on disconnect.
#[tokio::test]
async fn given_active_subscription_when_connection_severed_then_replayed_and_delivery_resumes() {
    // GIVEN: A client with one acknowledged subscription
    let (client, mut broker) = duplex_client(test_config());
    client.connect().await.expect("Connect should succeed");
    let mut conn = broker.accept().await;
    let (subscribed, _) = tokio::join!(client.subscribe(Subscription::new("sub-1", "orders")), async {
        let request = conn.next_request().await;
        conn.ack(&request, true, None).await;
    });
    subscribed.expect("Subscribe should succeed");

    // WHEN: The broker drops the connection
    drop(conn);

    // THEN: The client redials and re-issues subscribe.v1 unprompted
    let mut conn = broker.accept().await;
    let replayed = conn.next_request().await;
    assert_eq!(replayed["op"], "subscribe.v1");
    assert_eq!(replayed["subscription_id"], "sub-1");
    assert_eq!(replayed["channel"], "orders");
    conn.ack(&replayed, true, None).await;

    let event = wait_for_event(&client, |e| matches!(e, ClientEvent::Reconnected { .. })).await;
    assert!(matches!(event, ClientEvent::Reconnected { attempts: 1 }));

    // AND: Messages on the new connection are delivered
    conn.message("sub-1", "after-reconnect", "aGk=").await;
    let message = timeout(STEP_TIMEOUT, client.next_message())
        .await
        .expect("Timed out waiting for message")
        .expect("Message queue closed");
    assert_eq!(message.message_id, "after-reconnect");
    assert_eq!(message.payload, b"hi");
    assert_eq!(client.subscriptions().len(), 1);

    client.close();
}

/// Subscribes `ids` on channel "orders" one after another, acking each on `conn`.
async fn subscribe_all(client: &Client, conn: &mut BrokerConnection, ids: &[&str]) {
    for id in ids {
        let (subscribed, _) = tokio::join!(client.subscribe(Subscription::new(*id, "orders")), async {
            let request = conn.next_request().await;
            conn.ack(&request, true, None).await;
        });
        subscribed.expect("Subscribe should succeed");
    }
}

/// **VALUE**: Verifies a subscription acked just before the connection drops is still
/// restored on the next connection.
///
/// **WHY THIS MATTERS**: `subscribe` returning Ok promises the subscription survives
/// reconnects. The reconnect can race ahead of the caller recording the subscription.
///
/// **BUG THIS CATCHES**: Would catch the new connection's replay running before the
/// subscription was recorded, with nothing re-issuing it afterwards.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn given_subscribe_acked_when_connection_drops_immediately_then_restored_on_new_connection()
{
    for round in 0..20 {
        // GIVEN: A connected client
        let (client, mut broker) = duplex_client(test_config());
        client.connect().await.expect("Connect should succeed");
        let conn = broker.accept().await;

        // WHEN: The broker acks the subscribe and drops the connection right away
        let (subscribed, _) = tokio::join!(client.subscribe(Subscription::new("sub-1", "orders")), async move {
            let mut conn = conn;
            let request = conn.next_request().await;
            conn.ack(&request, true, None).await;
        });
        subscribed.expect("Subscribe should succeed");

        // THEN: The next connection receives subscribe.v1 for it
        let mut conn = broker.accept().await;
        let replayed = conn.next_request().await;
        assert_eq!(replayed["op"], "subscribe.v1", "round {round}");
        assert_eq!(replayed["subscription_id"], "sub-1", "round {round}");
        conn.ack(&replayed, true, None).await;

        client.close();
    }
}

/// **VALUE**: Verifies a replay whose connection dies stops instead of failing every
/// remaining subscription.
///
/// **WHY THIS MATTERS**: The event queue is small and drops on overflow. A burst of
/// bogus restore failures would crowd out the events callers act on.
///
/// **BUG THIS CATCHES**: Would catch replay checking the connection only once, which
/// reports NotConnected for each remaining subscription or sends them on a newer
/// connection out of turn.
#[tokio::test]
async fn given_replay_in_progress_when_connection_lost_then_stops_without_restore_failures() {
    // GIVEN: Two acknowledged subscriptions
    let (client, mut broker) = duplex_client(test_config());
    client.connect().await.expect("Connect should succeed");
    let mut conn = broker.accept().await;
    subscribe_all(&client, &mut conn, &["sub-a", "sub-b"]).await;

    // WHEN: The connection drops, and the next one drops during its replay
    drop(conn);
    let mut conn = broker.accept().await;
    let interrupted = conn.next_request().await;
    assert_eq!(interrupted["subscription_id"], "sub-a");
    drop(conn);

    // THEN: The third connection replays both subscriptions in order
    let mut conn = broker.accept().await;
    for expected in ["sub-a", "sub-b"] {
        let replayed = conn.next_request().await;
        assert_eq!(replayed["op"], "subscribe.v1");
        assert_eq!(replayed["subscription_id"], expected);
        conn.ack(&replayed, true, None).await;
    }
    sleep(Duration::from_millis(100)).await;

    // AND: No restore failure was reported for the interrupted replay
    let mut events = Vec::new();
    while let Some(event) = client.try_next_event() {
        events.push(event);
    }
    assert!(
        !events.iter().any(|e| matches!(e, ClientEvent::RestoreFailed { .. })),
        "Unexpected restore failures: {events:?}"
    );

    client.close();
}

/// **VALUE**: Verifies one rejected restore does not stop the others.
///
/// **WHY THIS MATTERS**: The broker may refuse a single subscription after a restart
/// (revoked channel, changed permissions). The caller's other subscriptions must
/// still come back.
///
/// **BUG THIS CATCHES**: Would catch replay returning on the first error.
#[tokio::test]
async fn given_restore_rejected_when_replaying_then_reports_failure_and_continues() {
    // GIVEN: Two acknowledged subscriptions
    let (client, mut broker) = duplex_client(test_config());
    client.connect().await.expect("Connect should succeed");
    let mut conn = broker.accept().await;
    subscribe_all(&client, &mut conn, &["sub-a", "sub-b"]).await;

    // WHEN: After a reconnect the broker rejects the first restore
    drop(conn);
    let mut conn = broker.accept().await;
    let first = conn.next_request().await;
    assert_eq!(first["subscription_id"], "sub-a");
    conn.ack(&first, false, Some("denied")).await;

    // THEN: The second subscription is still restored
    let second = conn.next_request().await;
    assert_eq!(second["op"], "subscribe.v1");
    assert_eq!(second["subscription_id"], "sub-b");
    conn.ack(&second, true, None).await;

    // AND: The rejection is reported for the first one
    let event = wait_for_event(&client, |e| matches!(e, ClientEvent::RestoreFailed { .. })).await;
    match event {
        ClientEvent::RestoreFailed {
            subscription_id,
            error,
        } => {
            assert_eq!(subscription_id, "sub-a");
            assert!(error.is_rejected());
            assert!(error.to_string().contains("denied"));
        }
        other => panic!("Expected RestoreFailed, got {other:?}"),
    }

    client.close();
}

/// **VALUE**: Verifies a publish caught by a disconnect is retried exactly once on the
/// new connection.
///
/// **WHY THIS MATTERS**: A broker restart should not surface as a publish failure when
/// the broker is back quickly.
///
/// **BUG THIS CATCHES**: Would catch in-flight requests hanging until their timeout
/// after a disconnect, or the retry reusing the old request id.
#[tokio::test]
async fn given_publish_in_flight_when_connection_drops_then_retried_on_new_connection() {
    // GIVEN: A connected client
    let (client, mut broker) = duplex_client(test_config());
    client.connect().await.expect("Connect should succeed");
    let conn = broker.accept().await;

    // WHEN: The broker reads the publish and drops the connection without acking
    let (result, (first, retried)) = tokio::join!(
        client.publish("orders", "created", b"x", Duration::from_secs(2)),
        async move {
            let mut conn = conn;
            let first = conn.next_request().await;
            drop(conn);

            let mut conn = broker.accept().await;
            let retried = conn.next_request().await;
            conn.ack(&retried, true, None).await;
            (first, retried)
        }
    );

    // THEN: The retry carries the same content under a new request id
    assert!(result.is_ok(), "Retried publish should succeed: {result:?}");
    assert_eq!(retried["op"], "publish.v1");
    assert_eq!(retried["payload_b64"], first["payload_b64"]);
    assert_ne!(retried["request_id"], first["request_id"]);

    client.close();
}

/// Dialer that succeeds once and refuses every later attempt, recording when each
/// attempt happened.
struct FlakyDialer {
    first: Arc<Mutex<Option<DuplexStream>>>,
    attempts: Arc<Mutex<Vec<Instant>>>,
}

impl FlakyDialer {
    fn build() -> (Dialer, Self) {
        let state = Self {
            first: Arc::new(Mutex::new(None)),
            attempts: Arc::new(Mutex::new(Vec::new())),
        };
        let first = Arc::clone(&state.first);
        let attempts = Arc::clone(&state.attempts);
        let dialed = Arc::new(Mutex::new(false));

        let dialer = Dialer::from_fn("flaky", move || {
            let first = Arc::clone(&first);
            let attempts = Arc::clone(&attempts);
            let dialed = Arc::clone(&dialed);
            async move {
                let mut dialed = dialed.lock().expect("lock");
                if !*dialed {
                    *dialed = true;
                    let (client_side, broker_side) = duplex(1024);
                    *first.lock().expect("lock") = Some(broker_side);
                    return Ok(client_side);
                }
                attempts.lock().expect("lock").push(Instant::now());
                Err(IoError::from(ErrorKind::ConnectionRefused))
            }
        });

        (dialer, state)
    }
}

/// **VALUE**: Verifies only one reconnect sequence runs for a lost connection.
///
/// **WHY THIS MATTERS**: Parallel drivers would hammer a restarting broker and race to
/// install competing connections.
///
/// **BUG THIS CATCHES**: Would catch a second driver being started (attempts would come
/// in pairs), backoff being skipped, or the driver surviving `close()`.
#[tokio::test]
async fn given_broker_down_when_reconnecting_then_single_driver_respects_backoff() {
    // GIVEN: A client that connects once, with a flat 150 ms backoff
    let (dialer, flaky) = FlakyDialer::build();
    let config = ClientConfig::new("/unused/broker.sock")
        .with_reconnect_backoff(Duration::from_millis(150), Duration::from_millis(150));
    let client = Client::with_dialer(config, dialer).expect("Failed to build client");
    client.connect().await.expect("First dial should succeed");

    // WHEN: The connection drops and every redial is refused for a while
    drop(flaky.first.lock().expect("lock").take());
    sleep(Duration::from_millis(800)).await;
    client.close();
    let attempts_at_close = flaky.attempts.lock().expect("lock").clone();

    // THEN: Attempts are spaced by the backoff interval, never in parallel
    assert!(
        attempts_at_close.len() >= 3,
        "Expected several redial attempts, got {}",
        attempts_at_close.len()
    );
    assert!(attempts_at_close.len() <= 7, "Too many attempts: {}", attempts_at_close.len());
    for pair in attempts_at_close.windows(2) {
        let gap = pair[1].duration_since(pair[0]);
        assert!(gap >= Duration::from_millis(140), "Attempts only {gap:?} apart");
    }

    // AND: Failures were reported as events
    let event = wait_for_event(&client, |e| matches!(e, ClientEvent::ReconnectFailed { .. })).await;
    assert!(event.error().is_some());

    // AND: The driver stops after close
    sleep(Duration::from_millis(400)).await;
    let attempts_later = flaky.attempts.lock().expect("lock").len();
    assert!(
        attempts_later <= attempts_at_close.len() + 1,
        "Driver kept dialing after close"
    );
}
