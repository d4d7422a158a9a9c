//! Reconnect driver.
//!
//! States: idle -> reconnecting -> idle, with closed reachable from both.
//! A disconnect moves the client to reconnecting and starts one driver task;
//! further disconnects while that task runs never start a second one. The
//! driver dials with exponential backoff (200 ms doubling to 3 s by default)
//! until a connection is installed or the client is closed.

use crate::client::connection;
use crate::client::correlation;
use crate::client::state::{ClientInner, fail_pending};
use crate::client::types::{ClientEvent, Subscription};
use crate::config::ClientConfig;
use crate::error::client::ClientError;

use std::sync::Arc;

use backoff::{ExponentialBackoff, backoff::Backoff};
use log::{debug, info, warn};
use tokio::spawn as TokioSpawn;
use tokio::time::sleep as TokioSleep;

pub(crate) fn reconnect_backoff(config: &ClientConfig) -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: config.reconnect_initial_backoff,
        current_interval: config.reconnect_initial_backoff,
        randomization_factor: 0.0,
        multiplier: 2.0,
        max_interval: config.reconnect_max_backoff,
        max_elapsed_time: None,
        ..Default::default()
    }
}

/// Called by the read loop of `connection_id` when it ends.
///
/// Does nothing if the client is closed or `connection_id` is no longer the
/// installed connection. Otherwise clears the connection, fails every pending
/// request with `NotConnected`, and starts the driver unless one is running.
pub(crate) fn handle_disconnect(inner: &Arc<ClientInner>, connection_id: u64) {
    let (pending, start_driver) = {
        let mut state = inner.lock_state();
        if state.closed {
            return;
        }
        if !state.owns_connection(connection_id) {
            debug!("Ignoring disconnect from superseded connection {connection_id}");
            return;
        }

        state.conn = None;
        let start_driver = !state.reconnecting;
        state.reconnecting = true;
        (state.take_pending(), start_driver)
    };

    warn!(
        "Lost connection {connection_id} to broker at {} ({} request(s) in flight)",
        inner.dialer.target(),
        pending.len()
    );
    fail_pending(pending, || ClientError::not_connected());

    if start_driver {
        TokioSpawn(reconnect_loop(Arc::clone(inner)));
    } else {
        debug!("Reconnect driver already running");
    }
}

async fn reconnect_loop(inner: Arc<ClientInner>) {
    let mut backoff = reconnect_backoff(&inner.config);
    let mut attempt: u32 = 0;

    loop {
        {
            let mut state = inner.lock_state();
            if state.closed {
                state.reconnecting = false;
                debug!("Client closed, reconnect driver exiting");
                return;
            }
            if state.conn.is_some() {
                state.reconnecting = false;
                return;
            }
        }

        attempt += 1;
        match connection::dial_and_start(&inner, inner.config.dial_timeout).await {
            Ok(()) => {
                info!(
                    "Reconnected to broker at {} after {attempt} attempt(s)",
                    inner.dialer.target()
                );
                inner.emit(ClientEvent::Reconnected { attempts: attempt });
                // The check at the top of the loop leaves the reconnecting
                // state, or keeps dialing if the new connection already died.
                attempt = 0;
                backoff.reset();
            }
            Err(error) if error.is_closed() => {}
            Err(error) => {
                let delay = backoff
                    .next_backoff()
                    .unwrap_or(inner.config.reconnect_max_backoff);
                warn!("Reconnect attempt {attempt} failed, retrying in {delay:?}: {error}");
                inner.emit(ClientEvent::ReconnectFailed { attempt, error });
                TokioSleep(delay).await;
            }
        }
    }
}

/// Re-issues `subscribe.v1` for every recorded subscription on
/// `connection_id`.
pub(crate) async fn replay_subscriptions(inner: Arc<ClientInner>, connection_id: u64) {
    let subscriptions = {
        let state = inner.lock_state();
        if state.closed || !state.owns_connection(connection_id) || state.subscriptions.is_empty() {
            return;
        }
        state.subscriptions.all()
    };

    info!(
        "Restoring {} subscription(s) on connection {connection_id}",
        subscriptions.len()
    );
    replay(inner, connection_id, subscriptions).await;
}

/// Sends `subscriptions` one at a time while `connection_id` stays the
/// installed connection.
///
/// A failure is reported as [`ClientEvent::RestoreFailed`] and replay moves
/// on to the next subscription. Once the connection is closed or superseded
/// replay stops silently; the next connection replays the full registry.
pub(crate) async fn replay(
    inner: Arc<ClientInner>,
    connection_id: u64,
    subscriptions: Vec<Subscription>,
) {
    for subscription in subscriptions {
        if !is_current(&inner, connection_id) {
            debug!("Connection {connection_id} superseded, stopping replay");
            return;
        }

        match correlation::request_subscription(&inner, &subscription).await {
            Ok(_) => debug!("Restored subscription {}", subscription.subscription_id),
            Err(_) if !is_current(&inner, connection_id) => {
                debug!(
                    "Connection {connection_id} lost while restoring {}",
                    subscription.subscription_id
                );
                return;
            }
            Err(error) => {
                warn!(
                    "Failed to restore subscription {}: {error}",
                    subscription.subscription_id
                );
                inner.emit(ClientEvent::RestoreFailed {
                    subscription_id: subscription.subscription_id,
                    error,
                });
            }
        }
    }
}

fn is_current(inner: &ClientInner, connection_id: u64) -> bool {
    let state = inner.lock_state();
    !state.closed && state.owns_connection(connection_id)
}
