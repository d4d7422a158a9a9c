use broker_client::config::ENV_MAX_FRAME_BYTES;
use broker_client::{Client, ClientConfig, ClientError, ConfigError};

use std::env;
use std::time::Duration;

use serde_json::{Value, json};
use serial_test::serial;
use tempfile::tempdir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;

/// **VALUE**: Verifies the default dialer speaks the protocol over a real Unix socket.
///
/// **WHY THIS MATTERS**: Every other integration test uses in-memory pipes. This is the
/// only check that the production transport is wired up.
///
/// **BUG THIS CATCHES**: Would catch `Client::new` ignoring `socket_path`, or the Unix
/// dialer failing to split into independent read and write halves.
#[tokio::test]
async fn given_unix_listener_when_publishing_then_acked_over_socket() {
    // GIVEN: A broker listening on a socket in a temp directory
    let dir = tempdir().expect("Failed to create temp dir");
    let socket_path = dir.path().join("broker.sock");
    let listener = UnixListener::bind(&socket_path).expect("Failed to bind socket");

    let broker = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("Failed to accept");
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        let line = lines
            .next_line()
            .await
            .expect("Failed to read")
            .expect("Client closed early");
        let request: Value = serde_json::from_str(&line).expect("Invalid JSON");

        let ack = json!({
            "op": "publish.ack.v1",
            "request_id": request["request_id"],
            "ok": true,
        });
        let mut bytes = serde_json::to_vec(&ack).expect("Failed to encode ack");
        bytes.push(b'\n');
        writer.write_all(&bytes).await.expect("Failed to write ack");
        request
    });

    // WHEN: Publishing through a client built from the socket path
    let client = Client::new(ClientConfig::new(&socket_path)).expect("Failed to build client");
    let result = client
        .publish("orders", "created", b"hello", Duration::from_secs(2))
        .await;

    // THEN: The publish is acked and the broker saw the request
    assert!(result.is_ok(), "Publish should succeed: {result:?}");
    let request = broker.await.expect("Broker task panicked");
    assert_eq!(request["channel"], "orders");

    client.close();
}

/// **VALUE**: Verifies dialing a missing socket fails with a connect error naming it.
///
/// **BUG THIS CATCHES**: Would catch a missing broker being reported as a timeout or
/// protocol error, which points operators at the wrong problem.
#[tokio::test]
async fn given_missing_socket_when_connecting_then_returns_connect_error() {
    // GIVEN: A path with nothing listening
    let dir = tempdir().expect("Failed to create temp dir");
    let socket_path = dir.path().join("missing.sock");
    let client = Client::new(ClientConfig::new(&socket_path)).expect("Failed to build client");

    // WHEN: Connecting
    let result = client.connect().await;

    // THEN: Connect error naming the socket
    let error = result.expect_err("Connect should fail");
    assert!(matches!(error, ClientError::Connect { .. }), "Got {error:?}");
    assert!(error.to_string().contains("missing.sock"));
    assert!(!client.is_connected());

    client.close();
}

/// **VALUE**: Verifies an invalid frame-size override stops client construction.
///
/// **BUG THIS CATCHES**: Would catch `Client::from_env` ignoring the override entirely.
#[test]
#[serial]
fn given_invalid_frame_size_override_when_building_from_env_then_config_error() {
    // GIVEN: A negative override
    // SAFETY: environment-mutating tests are #[serial].
    unsafe { env::set_var(ENV_MAX_FRAME_BYTES, "-5") };

    // WHEN: Building from the environment
    let result = Client::from_env("/tmp/broker.sock");

    // SAFETY: as above.
    unsafe { env::remove_var(ENV_MAX_FRAME_BYTES) };

    // THEN: Config parse error
    assert!(
        matches!(result, Err(ClientError::Config(ConfigError::Parse { .. }))),
        "Expected config parse error"
    );
}
