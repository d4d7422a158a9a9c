//! The broker client.
//!
//! [`Client`] is a cheap, cloneable handle; every clone drives the same
//! connection. Publish and subscribe calls may run concurrently from any
//! number of tasks.
//!
//! # Delivery
//!
//! - Inbound messages are read with [`Client::next_message`]. The queue is
//!   bounded; when it is full the read loop waits instead of dropping.
//! - Background failures and reconnects are read with
//!   [`Client::next_event`]. That queue drops new events when full.
//!
//! # Reconnects
//!
//! A lost connection fails every in-flight request with
//! [`ClientError::NotConnected`], then the client redials with exponential
//! backoff and replays every acknowledged subscription. Publish calls that
//! hit `NotConnected` retry once after reconnecting.

pub(crate) mod connection;
pub(crate) mod correlation;
pub(crate) mod dispatcher;
pub(crate) mod reconnect;
pub(crate) mod registry;
pub(crate) mod state;
mod types;

pub use types::{ClientEvent, Message, Subscription};

use crate::client::state::{ClientInner, fail_pending};
use crate::config::ClientConfig;
use crate::error::client::ClientError;
use crate::protocol::{PublishOp, PublishRequest, RequestAck};
use crate::transport::Dialer;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio::spawn as TokioSpawn;
use tokio::sync::{Mutex as AsyncMutex, mpsc};

#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<ClientInner>,
    messages_rx: Arc<AsyncMutex<mpsc::Receiver<Message>>>,
    events_rx: Arc<AsyncMutex<mpsc::Receiver<ClientEvent>>>,
}

impl Client {
    /// Client for the Unix domain socket named in `config`.
    ///
    /// No connection is made until the first call that needs one.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if `config` fails validation.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let dialer = Dialer::unix(config.socket_path.clone());
        Self::with_dialer(config, dialer)
    }

    /// Client for `socket_path` with defaults and environment overrides
    /// applied (see [`ClientConfig::from_env`]).
    pub fn from_env(socket_path: impl Into<PathBuf>) -> Result<Self, ClientError> {
        Self::new(ClientConfig::from_env(socket_path)?)
    }

    /// Client that opens its transports through `dialer`.
    pub fn with_dialer(config: ClientConfig, dialer: Dialer) -> Result<Self, ClientError> {
        config.validate()?;

        let (messages_tx, messages_rx) = mpsc::channel(config.message_buffer);
        let (events_tx, events_rx) = mpsc::channel(config.event_buffer);

        debug!(
            "Created broker client for {} (max frame {} bytes)",
            dialer.target(),
            config.max_frame_bytes
        );

        Ok(Self {
            inner: Arc::new(ClientInner::new(config, dialer, messages_tx, events_tx)),
            messages_rx: Arc::new(AsyncMutex::new(messages_rx)),
            events_rx: Arc::new(AsyncMutex::new(events_rx)),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Connects if not already connected, using the configured dial timeout.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.connect_with_timeout(self.inner.config.dial_timeout)
            .await
    }

    /// Connects if not already connected.
    ///
    /// Concurrent calls share one dial. A zero `deadline` uses the configured
    /// dial timeout.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Closed`] after [`Client::close`]
    /// - [`ClientError::Connect`] if the dial fails or times out
    pub async fn connect_with_timeout(&self, deadline: Duration) -> Result<(), ClientError> {
        let deadline = if deadline.is_zero() {
            self.inner.config.dial_timeout
        } else {
            deadline
        };
        connection::ensure_connected(&self.inner, deadline).await
    }

    /// Sends `publish.v1` and waits for its `publish.ack.v1`.
    ///
    /// A zero `timeout` uses the configured ack timeout (5 s by default).
    ///
    /// # Errors
    ///
    /// - [`ClientError::Validation`] if `channel` or `event` is empty
    /// - [`ClientError::Rejected`] if the broker answers `ok: false`
    /// - [`ClientError::Timeout`] if no ack arrives in time
    /// - [`ClientError::NotConnected`] if the single retry also found no
    ///   connection
    /// - [`ClientError::Closed`] after [`Client::close`]
    pub async fn publish(
        &self,
        channel: &str,
        event: &str,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<(), ClientError> {
        self.publish_with(PublishOp::Publish, channel, event, payload, timeout)
            .await
    }

    /// Same as [`Client::publish`] but sends `publish.ack.v1`, asking the
    /// broker to acknowledge only once the upstream publish is confirmed.
    pub async fn publish_ack(
        &self,
        channel: &str,
        event: &str,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<(), ClientError> {
        self.publish_with(PublishOp::PublishAck, channel, event, payload, timeout)
            .await
    }

    async fn publish_with(
        &self,
        op: PublishOp,
        channel: &str,
        event: &str,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<(), ClientError> {
        if channel.is_empty() {
            return Err(ClientError::validation("channel is required"));
        }
        if event.is_empty() {
            return Err(ClientError::validation("event is required"));
        }

        let timeout = if timeout.is_zero() {
            self.inner.config.ack_timeout
        } else {
            timeout
        };

        connection::ensure_connected(&self.inner, self.inner.config.dial_timeout).await?;

        let ack = match self.send_publish(op, channel, event, payload, timeout).await {
            Err(first) if first.is_not_connected() => {
                debug!("Publish to {channel} found no connection, reconnecting for one retry");
                if let Err(reconnect_error) =
                    connection::ensure_connected(&self.inner, self.inner.config.dial_timeout).await
                {
                    return Err(if reconnect_error.is_closed() {
                        reconnect_error
                    } else {
                        first
                    });
                }
                self.send_publish(op, channel, event, payload, timeout)
                    .await?
            }
            other => other?,
        };

        correlation::check_ack(ack, "publish")
    }

    async fn send_publish(
        &self,
        op: PublishOp,
        channel: &str,
        event: &str,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<RequestAck, ClientError> {
        let request_id = correlation::new_request_id();
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let request = PublishRequest::new(
            op,
            &request_id,
            channel,
            event,
            payload,
            Some(timeout_ms),
        );

        let acknowledged =
            correlation::send_and_await_ack(&self.inner, &request_id, &request, timeout).await?;
        Ok(acknowledged.ack)
    }

    /// Registers `subscription` with the broker and records it for replay
    /// after reconnects.
    ///
    /// The subscription is recorded only once the broker acknowledges it.
    /// Subscribing again with the same id replaces the earlier entry.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Validation`] if the id or channel is empty
    /// - [`ClientError::Rejected`] if the broker answers `ok: false`
    /// - [`ClientError::Timeout`], [`ClientError::NotConnected`],
    ///   [`ClientError::Closed`] as for publish, without the retry
    pub async fn subscribe(&self, subscription: Subscription) -> Result<(), ClientError> {
        if subscription.subscription_id.is_empty() {
            return Err(ClientError::validation("subscription id is required"));
        }
        if subscription.channel.is_empty() {
            return Err(ClientError::validation("subscription channel is required"));
        }

        connection::ensure_connected(&self.inner, self.inner.config.dial_timeout).await?;
        let acked_on = correlation::request_subscription(&self.inner, &subscription).await?;

        let replay_on = {
            let mut state = self.inner.lock_state();
            if state.closed {
                return Ok(());
            }
            info!(
                "Subscribed {} to channel {}",
                subscription.subscription_id, subscription.channel
            );
            state.subscriptions.record(subscription.clone());

            // A connection installed after the ack may already have taken its
            // replay snapshot. With no connection the next dial replays the
            // registry, which now holds this entry.
            match state.conn.as_ref() {
                Some(conn) if conn.id() != acked_on => Some(conn.id()),
                _ => None,
            }
        };

        if let Some(connection_id) = replay_on {
            debug!(
                "Connection {acked_on} was replaced after acking {}, re-issuing on {connection_id}",
                subscription.subscription_id
            );
            TokioSpawn(reconnect::replay(
                Arc::clone(&self.inner),
                connection_id,
                vec![subscription],
            ));
        }

        Ok(())
    }

    /// Every acknowledged subscription, ordered by id.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.inner.lock_state().subscriptions.all()
    }

    /// Next inbound message. Returns `None` once the client is closed and
    /// every queued message has been read.
    pub async fn next_message(&self) -> Option<Message> {
        self.messages_rx.lock().await.recv().await
    }

    /// Next background event. Returns `None` once the client is closed and
    /// every queued event has been read.
    pub async fn next_event(&self) -> Option<ClientEvent> {
        self.events_rx.lock().await.recv().await
    }

    /// Next background event if one is queued right now.
    pub fn try_next_event(&self) -> Option<ClientEvent> {
        self.events_rx.try_lock().ok()?.try_recv().ok()
    }

    pub fn is_connected(&self) -> bool {
        let state = self.inner.lock_state();
        state.conn.is_some() && !state.closed
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock_state().closed
    }

    /// Closes the client. Idempotent.
    ///
    /// Pending requests fail with [`ClientError::Closed`], the live
    /// connection is shut down, and every later call fails with
    /// [`ClientError::Closed`]. A running reconnect driver stops at its next
    /// iteration.
    pub fn close(&self) {
        let (conn, pending) = {
            let mut state = self.inner.lock_state();
            if state.closed {
                return;
            }
            state.closed = true;
            state.messages_tx = None;
            state.events_tx = None;
            state.subscriptions.clear();
            (state.conn.take(), state.take_pending())
        };

        if let Some(conn) = conn {
            debug!("Shutting down connection {}", conn.id());
            conn.shutdown();
        }
        fail_pending(pending, || ClientError::closed());

        info!("Broker client for {} closed", self.inner.dialer.target());
    }
}
