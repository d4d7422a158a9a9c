//! Shared client state.
//!
//! Everything mutable lives in one [`ClientState`] behind a single
//! `std::sync::Mutex`. The lock is only held for bookkeeping and is never
//! held across an `.await`; frame writes go through the per-connection
//! [`FrameWriter`](crate::transport::FrameWriter) lock instead.

use crate::client::registry::SubscriptionRegistry;
use crate::client::types::{ClientEvent, Message};
use crate::config::ClientConfig;
use crate::error::client::ClientError;
use crate::protocol::RequestAck;
use crate::transport::{Connection, Dialer};

use std::collections::HashMap;
use std::mem;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, trace};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex as AsyncMutex, mpsc, oneshot};

/// What a pending request's slot eventually receives: the broker's ack, or
/// the local reason the ack will never come.
pub(crate) type AckOutcome = Result<RequestAck, ClientError>;

pub(crate) type AckSlot = oneshot::Sender<AckOutcome>;

pub(crate) struct ClientState {
    /// Present only while a read loop is running for it.
    pub(crate) conn: Option<Connection>,

    /// One-way: once set, never cleared.
    pub(crate) closed: bool,

    /// Set while a reconnect driver is running.
    pub(crate) reconnecting: bool,

    /// Requests sent and still waiting for their ack.
    pub(crate) pending: HashMap<String, AckSlot>,

    pub(crate) subscriptions: SubscriptionRegistry,

    /// Dropped on close so the message receiver drains and then ends.
    pub(crate) messages_tx: Option<mpsc::Sender<Message>>,

    pub(crate) events_tx: Option<mpsc::Sender<ClientEvent>>,

    last_connection_id: u64,
}

impl ClientState {
    fn new(messages_tx: mpsc::Sender<Message>, events_tx: mpsc::Sender<ClientEvent>) -> Self {
        Self {
            conn: None,
            closed: false,
            reconnecting: false,
            pending: HashMap::new(),
            subscriptions: SubscriptionRegistry::default(),
            messages_tx: Some(messages_tx),
            events_tx: Some(events_tx),
            last_connection_id: 0,
        }
    }

    pub(crate) fn allocate_connection_id(&mut self) -> u64 {
        self.last_connection_id += 1;
        self.last_connection_id
    }

    /// Whether `connection_id` is the connection currently installed.
    pub(crate) fn owns_connection(&self, connection_id: u64) -> bool {
        self.conn
            .as_ref()
            .is_some_and(|conn| conn.id() == connection_id)
    }

    pub(crate) fn take_pending(&mut self) -> HashMap<String, AckSlot> {
        mem::take(&mut self.pending)
    }
}

pub(crate) struct ClientInner {
    pub(crate) config: ClientConfig,
    pub(crate) dialer: Dialer,

    /// Serializes dials so concurrent connect attempts collapse into one.
    pub(crate) dial_lock: AsyncMutex<()>,

    state: Mutex<ClientState>,
}

impl ClientInner {
    pub(crate) fn new(
        config: ClientConfig,
        dialer: Dialer,
        messages_tx: mpsc::Sender<Message>,
        events_tx: mpsc::Sender<ClientEvent>,
    ) -> Self {
        Self {
            config,
            dialer,
            dial_lock: AsyncMutex::new(()),
            state: Mutex::new(ClientState::new(messages_tx, events_tx)),
        }
    }

    /// Locks the shared state. A panic while the lock was held leaves the
    /// maps consistent (every mutation is a single insert/remove/take), so a
    /// poisoned lock is recovered rather than propagated.
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pushes an event without ever blocking. Dropped when the queue is full
    /// or the client is closed.
    pub(crate) fn emit(&self, event: ClientEvent) {
        let Some(events_tx) = self.lock_state().events_tx.clone() else {
            trace!("Client closed, discarding event {event:?}");
            return;
        };

        match events_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => debug!("Event queue full, dropping {event:?}"),
            Err(TrySendError::Closed(event)) => trace!("Event receiver gone, dropping {event:?}"),
        }
    }

    pub(crate) fn emit_error(&self, error: ClientError) {
        self.emit(ClientEvent::Error(error));
    }
}

/// Resolves every slot in `pending` with a locally produced error.
///
/// `reason` is a closure at the call site so each error records where the
/// requests were failed.
pub(crate) fn fail_pending(pending: HashMap<String, AckSlot>, reason: impl Fn() -> ClientError) {
    for (request_id, slot) in pending {
        if slot.send(Err(reason())).is_err() {
            trace!("Pending request {request_id} was already abandoned by its caller");
        }
    }
}
