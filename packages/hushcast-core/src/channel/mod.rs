//! Named, bidirectional JSON message channels between sender and receiver.
//!
//! This module provides:
//! - [`Channel`]: one namespace with at most one inbound handler
//! - [`ChannelHub`]: the set of channels sharing one transport
//! - [`messages`]: the tagged message types carried on each namespace
//! - [`request`]: correlation of outstanding requests with their responses
//!
//! # Listener semantics
//!
//! A channel holds zero or one inbound handler. Registering a handler
//! *replaces* whatever was registered before; there is no fan-out. Each
//! registration returns a [`ListenerId`] so its owner can later remove exactly
//! that registration without disturbing a newer one.

pub mod messages;
pub mod request;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{ReceiverError, ReceiverResult};

pub use request::{PendingRequest, RequestQueue};

/// Frame exchanged with the transport: a payload tagged with its namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub namespace: String,
    pub data: Value,
}

impl Envelope {
    pub fn new(namespace: impl Into<String>, data: Value) -> Self {
        Self {
            namespace: namespace.into(),
            data,
        }
    }
}

/// Identifies one handler registration on a [`Channel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Inbound handler. Returning an error marks the frame as rejected.
pub type MessageHandler = Arc<dyn Fn(Value) -> ReceiverResult<()> + Send + Sync>;

/// A single namespace on the sender link.
pub struct Channel {
    namespace: String,
    outbound: mpsc::UnboundedSender<Envelope>,
    listener: RwLock<Option<(ListenerId, MessageHandler)>>,
    next_listener_id: AtomicU64,
    closed: CancellationToken,
}

impl Channel {
    fn new(
        namespace: String,
        outbound: mpsc::UnboundedSender<Envelope>,
        closed: CancellationToken,
    ) -> Self {
        Self {
            namespace,
            outbound,
            listener: RwLock::new(None),
            next_listener_id: AtomicU64::new(1),
            closed,
        }
    }

    /// Returns the namespace this channel carries.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Writes a payload to the sender. Best effort: failures are logged, never
    /// returned, and nothing is sent once the channel is closed.
    pub fn send<T: Serialize>(&self, payload: &T) {
        if self.closed.is_cancelled() {
            log::debug!("[Channel] Dropping send on closed {}", self.namespace);
            return;
        }

        let data = match serde_json::to_value(payload) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("[Channel] Failed to serialize for {}: {}", self.namespace, e);
                return;
            }
        };

        if let Err(e) = self
            .outbound
            .send(Envelope::new(self.namespace.clone(), data))
        {
            log::trace!("[Channel] No transport for {}: {}", self.namespace, e);
        }
    }

    /// Registers the inbound handler, replacing any previous one.
    pub fn on_message<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(Value) -> ReceiverResult<()> + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        let previous = self.listener.write().replace((id, Arc::new(handler)));
        if previous.is_some() {
            log::debug!("[Channel] Listener replaced on {}", self.namespace);
        }
        id
    }

    /// Removes the handler registered as `id`.
    ///
    /// Returns `false` (and leaves the channel untouched) if a newer
    /// registration has already replaced it.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut guard = self.listener.write();
        match guard.as_ref() {
            Some((current, _)) if *current == id => {
                *guard = None;
                true
            }
            _ => false,
        }
    }

    /// Returns `true` if `id` is still the registered handler.
    pub fn holds_listener(&self, id: ListenerId) -> bool {
        matches!(self.listener.read().as_ref(), Some((current, _)) if *current == id)
    }

    /// Removes whatever handler is registered.
    pub fn clear_listener(&self) {
        self.listener.write().take();
    }

    /// Returns `true` if an inbound handler is registered.
    pub fn has_listener(&self) -> bool {
        self.listener.read().is_some()
    }

    /// Hands an inbound payload to the registered handler.
    ///
    /// The handler runs without the listener lock held so it may deregister
    /// itself or install a replacement.
    pub fn deliver(&self, data: Value) -> ReceiverResult<()> {
        if self.closed.is_cancelled() {
            return Err(ReceiverError::ChannelClosed(self.namespace.clone()));
        }

        let handler = self.listener.read().as_ref().map(|(_, h)| Arc::clone(h));
        match handler {
            Some(handler) => handler(data),
            None => {
                log::debug!("[Channel] No listener on {}, dropping frame", self.namespace);
                Ok(())
            }
        }
    }
}

/// All channels of one session, sharing a transport and a close signal.
pub struct ChannelHub {
    channels: DashMap<String, Arc<Channel>>,
    outbound: mpsc::UnboundedSender<Envelope>,
    closed: CancellationToken,
}

impl ChannelHub {
    /// Creates a hub writing outbound frames to `outbound`.
    pub fn new(outbound: mpsc::UnboundedSender<Envelope>) -> Self {
        Self {
            channels: DashMap::new(),
            outbound,
            closed: CancellationToken::new(),
        }
    }

    /// Returns the channel for `namespace`, creating it on first use.
    pub fn channel(&self, namespace: &str) -> Arc<Channel> {
        self.channels
            .entry(namespace.to_string())
            .or_insert_with(|| {
                Arc::new(Channel::new(
                    namespace.to_string(),
                    self.outbound.clone(),
                    self.closed.clone(),
                ))
            })
            .clone()
    }

    /// Routes an inbound frame to its namespace.
    pub fn deliver(&self, envelope: Envelope) -> ReceiverResult<()> {
        if self.closed.is_cancelled() {
            return Err(ReceiverError::ChannelClosed(envelope.namespace));
        }

        // Clone out of the map so handlers never run under a shard lock.
        let channel = self.channels.get(&envelope.namespace).map(|c| Arc::clone(&c));
        match channel {
            Some(channel) => channel.deliver(envelope.data),
            None => {
                log::debug!(
                    "[Channel] Frame for unknown namespace {} dropped",
                    envelope.namespace
                );
                Ok(())
            }
        }
    }

    /// Severs every channel: handlers are cleared, sends become no-ops and
    /// pending requests observe the close.
    pub fn close(&self) {
        if self.closed.is_cancelled() {
            return;
        }
        self.closed.cancel();
        for entry in self.channels.iter() {
            entry.value().clear_listener();
        }
        log::info!("[Channel] Closed {} channel(s)", self.channels.len());
    }

    /// Returns `true` once [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Token cancelled when the hub closes.
    pub fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }
}
