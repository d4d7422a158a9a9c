// Unit tests for connection ownership and request bookkeeping inside the client.
// End-to-end behavior against a fake broker lives in integration_tests/.

use crate::client::Client;
use crate::client::reconnect::handle_disconnect;
use crate::config::ClientConfig;
use crate::error::client::ClientError;
use crate::transport::Dialer;

use std::io::Error as IoError;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream, duplex};
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::time::{sleep, timeout};

const STEP_TIMEOUT: Duration = Duration::from_secs(3);

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
        .expect("Client should build");
    (client, broker_rx)
}

/// Like [`duplex_client`], but every dial after the first waits for a permit on
/// the returned semaphore. The counter records how many dials were started.
fn gated_client() -> (
    Client,
    mpsc::UnboundedReceiver<DuplexStream>,
    Arc<Semaphore>,
    Arc<AtomicUsize>,
) {
    let (broker_tx, broker_rx) = mpsc::unbounded_channel();
    let gate = Arc::new(Semaphore::new(0));
    let dials = Arc::new(AtomicUsize::new(0));

    let dialer = {
        let gate = Arc::clone(&gate);
        let dials = Arc::clone(&dials);
        Dialer::from_fn("gated", move || {
            let broker_tx = broker_tx.clone();
            let gate = Arc::clone(&gate);
            let dials = Arc::clone(&dials);
            async move {
                if dials.fetch_add(1, Ordering::SeqCst) > 0 {
                    let _permit = gate.acquire().await;
                }
                let (client_side, broker_side) = duplex(64 * 1024);
                let _ = broker_tx.send(broker_side);
                Ok::<_, IoError>(client_side)
            }
        })
    };

    let client = Client::with_dialer(ClientConfig::new("/unused.sock"), dialer)
        .expect("Client should build");
    (client, broker_rx, gate, dials)
}

fn installed_connection_id(client: &Client) -> Option<u64> {
    client
        .inner
        .lock_state()
        .conn
        .as_ref()
        .map(|conn| conn.id())
}

/// **VALUE**: Verifies a read loop from a superseded connection cannot tear down the
/// current one.
///
/// **WHY THIS MATTERS**: After a reconnect the old read loop may still be unwinding. If
/// its disconnect were honored, it would drop the fresh connection and fail requests
/// that were waiting on it.
///
/// **BUG THIS CATCHES**: Would catch `handle_disconnect` clearing the connection without
/// comparing connection ids.
#[tokio::test]
async fn given_live_connection_when_stale_loop_disconnects_then_connection_kept() {
    // GIVEN: A connected client
    let (client, mut broker_rx) = duplex_client();
    client.connect().await.expect("Connect should succeed");
    let _broker = broker_rx.recv().await.expect("Broker side should be handed over");
    let live_id = installed_connection_id(&client).expect("Connection should be installed");

    // WHEN: A loop for some other connection id reports a disconnect
    handle_disconnect(&client.inner, live_id + 1);

    // THEN: The live connection is untouched and no reconnect is started
    assert!(client.is_connected(), "Live connection should survive");
    assert_eq!(installed_connection_id(&client), Some(live_id));
    assert!(!client.inner.lock_state().reconnecting);

    client.close();
}

/// **VALUE**: Verifies a disconnect after close is ignored.
///
/// **BUG THIS CATCHES**: Would catch a late read loop flipping the client back into
/// reconnecting after the caller closed it.
#[tokio::test]
async fn given_closed_client_when_disconnect_reported_then_no_reconnect() {
    // GIVEN: A client that connected and was then closed
    let (client, mut broker_rx) = duplex_client();
    client.connect().await.expect("Connect should succeed");
    let _broker = broker_rx.recv().await;
    let id = installed_connection_id(&client).expect("Connection should be installed");
    client.close();

    // WHEN: The old loop reports its disconnect
    handle_disconnect(&client.inner, id);

    // THEN: Still closed, not reconnecting
    assert!(client.is_closed());
    assert!(!client.is_connected());
    assert!(!client.inner.lock_state().reconnecting);
}

/// **VALUE**: Verifies a second disconnect report for the same connection is a no-op.
///
/// **WHY THIS MATTERS**: The read loop and a failed write can both notice the same
/// dead connection. Each report must not start its own reconnect sequence.
///
/// **BUG THIS CATCHES**: Would catch `handle_disconnect` spawning a driver per call,
/// which shows up as two redials for one lost connection.
#[tokio::test]
async fn given_lost_connection_when_disconnect_reported_twice_then_single_redial() {
    // GIVEN: A connected client
    let (client, mut broker_rx) = duplex_client();
    client.connect().await.expect("Connect should succeed");
    let _first = broker_rx.recv().await.expect("Broker side should be handed over");
    let id = installed_connection_id(&client).expect("Connection should be installed");

    // WHEN: The same connection is reported lost twice
    handle_disconnect(&client.inner, id);
    assert!(client.inner.lock_state().reconnecting);
    handle_disconnect(&client.inner, id);

    // THEN: Exactly one redial happens
    let _second = timeout(STEP_TIMEOUT, broker_rx.recv())
        .await
        .expect("Client should redial")
        .expect("Dialer dropped");
    timeout(STEP_TIMEOUT, async {
        while !client.is_connected() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Redial should install a connection");
    sleep(Duration::from_millis(100)).await;

    assert!(broker_rx.try_recv().is_err(), "A second redial was started");
    assert_ne!(installed_connection_id(&client), Some(id));
    assert!(!client.inner.lock_state().reconnecting);

    client.close();
}

/// **VALUE**: Verifies a publish whose caller goes away leaves nothing behind in the
/// pending map.
///
/// **WHY THIS MATTERS**: Callers wrap publishes in their own timeouts and select
/// arms. Each abandoned request would otherwise leak a slot for the life of the
/// connection.
///
/// **BUG THIS CATCHES**: Would catch pending cleanup that only runs on the timeout or
/// ack paths and not when the waiting future is dropped.
#[tokio::test]
async fn given_publish_waiting_for_ack_when_caller_aborted_then_pending_entry_removed() {
    // GIVEN: A publish that the broker has read but not acked
    let (client, mut broker_rx) = duplex_client();
    client.connect().await.expect("Connect should succeed");
    let broker = broker_rx.recv().await.expect("Broker side should be handed over");
    let mut lines = BufReader::new(broker).lines();

    let publisher = client.clone();
    let handle = tokio::spawn(async move {
        publisher
            .publish("orders", "created", b"x", Duration::from_secs(5))
            .await
    });
    let request = timeout(STEP_TIMEOUT, lines.next_line())
        .await
        .expect("Timed out waiting for the publish")
        .expect("Failed to read publish");
    assert!(request.is_some());
    assert_eq!(client.inner.lock_state().pending.len(), 1);

    // WHEN: The caller's task is aborted
    handle.abort();
    let joined = handle.await;

    // THEN: The task was cancelled and its slot is gone
    assert!(joined.is_err_and(|e| e.is_cancelled()));
    assert!(client.inner.lock_state().pending.is_empty());

    client.close();
}

/// **VALUE**: Verifies requests failed by a disconnect carry the location of the
/// disconnect handling.
///
/// **BUG THIS CATCHES**: Would catch the error being built inside a shared helper, so
/// every failed request pointed at the error constructor instead.
#[tokio::test]
async fn given_pending_request_when_connection_lost_then_error_located_at_disconnect() {
    // GIVEN: A connection with one request waiting for its ack
    let (client, mut broker_rx) = duplex_client();
    client.connect().await.expect("Connect should succeed");
    let _broker = broker_rx.recv().await.expect("Broker side should be handed over");
    let id = installed_connection_id(&client).expect("Connection should be installed");

    let (slot, outcome) = oneshot::channel();
    client
        .inner
        .lock_state()
        .pending
        .insert("req-1".to_string(), slot);

    // WHEN: The connection is reported lost
    handle_disconnect(&client.inner, id);

    // THEN: The request fails with NotConnected raised from the reconnect module
    let result = outcome.await.expect("Slot should be resolved");
    match result {
        Err(ClientError::NotConnected { location, .. }) => {
            let file = location.file.replace('\\', "/");
            assert!(file.ends_with("client/reconnect.rs"), "Located at {file}");
        }
        other => panic!("Expected NotConnected, got {other:?}"),
    }

    client.close();
}

/// **VALUE**: Verifies a publish whose retry runs into `close()` reports Closed.
///
/// **WHY THIS MATTERS**: Closed is final. A caller that sees NotConnected treats the
/// failure as transient and may loop retrying on a client that will never connect.
///
/// **BUG THIS CATCHES**: Would catch the retry path returning the first NotConnected
/// when the reconnect before the retry failed because the client was closed.
#[tokio::test]
async fn given_publish_retrying_when_client_closed_then_fails_closed() {
    // GIVEN: A publish in flight, with redials held back
    let (client, mut broker_rx, gate, dials) = gated_client();
    client.connect().await.expect("Connect should succeed");
    let broker = broker_rx.recv().await.expect("Broker side should be handed over");
    let mut lines = BufReader::new(broker).lines();

    let publisher = client.clone();
    let handle = tokio::spawn(async move {
        publisher
            .publish("orders", "created", b"x", Duration::from_secs(5))
            .await
    });
    let request = timeout(STEP_TIMEOUT, lines.next_line())
        .await
        .expect("Timed out waiting for the publish")
        .expect("Failed to read publish");
    assert!(request.is_some());

    // WHEN: The connection drops, the first attempt fails, and the client is closed
    // while the redial is still waiting
    drop(lines);
    timeout(STEP_TIMEOUT, async {
        while dials.load(Ordering::SeqCst) < 2 || !client.inner.lock_state().pending.is_empty()
        {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Disconnect should fail the request and start a redial");
    sleep(Duration::from_millis(50)).await;
    client.close();
    gate.add_permits(8);

    // THEN: The publish ends with Closed
    let result = timeout(STEP_TIMEOUT, handle)
        .await
        .expect("Publish hung after close")
        .expect("Publish task panicked");
    assert!(
        result.as_ref().is_err_and(|e| e.is_closed()),
        "Expected Closed, got {result:?}"
    );
}
