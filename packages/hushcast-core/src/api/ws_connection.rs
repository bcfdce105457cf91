//! Ownership of the single sender connection.
//!
//! A receiver serves exactly one sender at a time:
//!
//! - `SenderSlot`: holds the outbound frame queue while nobody is connected
//! - `SenderGuard`: RAII claim on the slot, handing the queue back on drop

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::channel::Envelope;
use crate::error::{ReceiverError, ReceiverResult};

/// The one place a sender connection can attach to.
///
/// Outbound frames produced by the channels queue up in the slot until a
/// connection claims it. Frames queued before the claim are delivered on
/// connect.
pub struct SenderSlot {
    outbound: Mutex<Option<mpsc::UnboundedReceiver<Envelope>>>,
    next_id: AtomicU64,
    /// Cancelled to force the current connection closed.
    cancel: CancellationToken,
}

impl SenderSlot {
    pub fn new(outbound: mpsc::UnboundedReceiver<Envelope>) -> Self {
        Self {
            outbound: Mutex::new(Some(outbound)),
            next_id: AtomicU64::new(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Claims the slot for a new connection.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiverError::SenderBusy`] while another connection holds it.
    pub fn claim(self: &Arc<Self>) -> ReceiverResult<SenderGuard> {
        let outbound = self.outbound.lock().take().ok_or(ReceiverError::SenderBusy)?;
        let id = format!("sender-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        log::info!("[WS] Sender connection claimed slot: {}", id);

        Ok(SenderGuard {
            id,
            slot: Arc::clone(self),
            outbound: Some(outbound),
            cancel_token: self.cancel.child_token(),
        })
    }

    /// Returns `true` while a connection holds the slot.
    #[must_use]
    pub fn is_claimed(&self) -> bool {
        self.outbound.lock().is_none()
    }

    /// Force-closes the current connection, if any. The slot stays closed to
    /// new connections afterwards.
    pub fn close(&self) {
        log::info!("[WS] Closing sender slot");
        self.cancel.cancel();
    }

    fn release(&self, id: &str, outbound: mpsc::UnboundedReceiver<Envelope>) {
        *self.outbound.lock() = Some(outbound);
        log::info!("[WS] Sender connection released slot: {}", id);
    }
}

/// Exclusive claim on a [`SenderSlot`]. Dropping it frees the slot.
pub struct SenderGuard {
    id: String,
    slot: Arc<SenderSlot>,
    outbound: Option<mpsc::UnboundedReceiver<Envelope>>,
    cancel_token: CancellationToken,
}

impl SenderGuard {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next frame to write to the sender. `None` once every channel handle
    /// is gone.
    pub async fn next_outbound(&mut self) -> Option<Envelope> {
        match self.outbound.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Cancelled when the slot is force-closed.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }
}

impl Drop for SenderGuard {
    fn drop(&mut self) {
        if let Some(outbound) = self.outbound.take() {
            self.slot.release(&self.id, outbound);
        }
    }
}
