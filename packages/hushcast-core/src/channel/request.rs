//! Correlation of outstanding requests with their responses.
//!
//! A [`RequestQueue`] owns the single listener on a response channel and
//! hands each inbound payload to the oldest request still waiting. Every
//! [`PendingRequest`] keeps its own deadline. Whichever comes first (a
//! response, the deadline, or the session closing) settles it, and its place
//! in the queue is released on every exit path, including when the waiting
//! future is dropped. The listener is installed with the first waiter and
//! removed with the last.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::{Channel, ListenerId};
use crate::error::{ReceiverError, ReceiverResult};

type Parser<T> = Arc<dyn Fn(Value) -> ReceiverResult<T> + Send + Sync>;
type Settle<T> = oneshot::Sender<ReceiverResult<T>>;

struct Waiters<T> {
    next_id: u64,
    queue: VecDeque<(u64, Settle<T>)>,
    listener: Option<ListenerId>,
}

/// Requests awaiting responses on one channel, answered oldest first.
pub struct RequestQueue<T> {
    channel: Arc<Channel>,
    parse: Parser<T>,
    waiters: Arc<Mutex<Waiters<T>>>,
}

impl<T: Send + 'static> RequestQueue<T> {
    /// Creates a queue whose responses arrive on `channel` and are turned
    /// into results by `parse`.
    pub fn new<F>(channel: Arc<Channel>, parse: F) -> Self
    where
        F: Fn(Value) -> ReceiverResult<T> + Send + Sync + 'static,
    {
        Self {
            channel,
            parse: Arc::new(parse),
            waiters: Arc::new(Mutex::new(Waiters {
                next_id: 1,
                queue: VecDeque::new(),
                listener: None,
            })),
        }
    }

    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    /// Number of requests still waiting for a response.
    pub fn pending(&self) -> usize {
        self.waiters.lock().queue.len()
    }

    /// Joins the queue. The listener is installed here, before any request
    /// goes out, so an immediate reply cannot be missed.
    pub fn open(&self, timeout: Duration) -> PendingRequest<T> {
        let (tx, rx) = oneshot::channel();

        let mut waiters = self.waiters.lock();
        let id = waiters.next_id;
        waiters.next_id += 1;
        waiters.queue.push_back((id, tx));

        let installed = waiters
            .listener
            .is_some_and(|listener| self.channel.holds_listener(listener));
        if !installed {
            waiters.listener = Some(self.install());
        }
        drop(waiters);

        PendingRequest {
            slot: WaiterSlot {
                id,
                channel: Arc::clone(&self.channel),
                waiters: Arc::clone(&self.waiters),
            },
            timeout,
            response: rx,
        }
    }

    /// Sends `request` and waits for its answer.
    ///
    /// `what` names the awaited thing in the timeout error.
    pub async fn send<R>(
        &self,
        request: &R,
        timeout: Duration,
        closed: &CancellationToken,
        what: &'static str,
    ) -> ReceiverResult<T>
    where
        R: Serialize + Sync,
    {
        let pending = self.open(timeout);
        self.channel.send(request);
        pending.wait(what, closed).await
    }

    fn install(&self) -> ListenerId {
        let waiters = Arc::clone(&self.waiters);
        let parse = Arc::clone(&self.parse);
        let namespace = self.channel.namespace().to_string();

        self.channel.on_message(move |data| {
            loop {
                let next = waiters.lock().queue.pop_front();
                match next {
                    Some((_, tx)) if tx.is_closed() => continue,
                    Some((_, tx)) => {
                        let _ = tx.send(parse(data));
                        break;
                    }
                    None => {
                        log::debug!("[Request] Unsolicited response on {} dropped", namespace);
                        break;
                    }
                }
            }
            Ok(())
        })
    }
}

/// Place of one request in its queue. Leaving the queue with the last waiter
/// also removes the listener.
struct WaiterSlot<T> {
    id: u64,
    channel: Arc<Channel>,
    waiters: Arc<Mutex<Waiters<T>>>,
}

impl<T> Drop for WaiterSlot<T> {
    fn drop(&mut self) {
        let mut waiters = self.waiters.lock();
        waiters.queue.retain(|(id, _)| *id != self.id);
        if !waiters.queue.is_empty() {
            return;
        }
        if let Some(listener) = waiters.listener.take() {
            if self.channel.remove_listener(listener) {
                log::trace!("[Request] Listener removed from {}", self.channel.namespace());
            }
        }
    }
}

/// One request awaiting its response.
pub struct PendingRequest<T> {
    // Declared first: the slot leaves the queue before the receiver drops.
    slot: WaiterSlot<T>,
    timeout: Duration,
    response: oneshot::Receiver<ReceiverResult<T>>,
}

impl<T: Send + 'static> PendingRequest<T> {
    /// Waits for the response, the deadline, or `closed`.
    pub async fn wait(self, what: &'static str, closed: &CancellationToken) -> ReceiverResult<T> {
        let Self {
            slot,
            timeout,
            response,
        } = self;

        let result = tokio::select! {
            settled = response => settled.unwrap_or_else(|_| {
                Err(ReceiverError::ChannelClosed(slot.channel.namespace().to_string()))
            }),
            _ = tokio::time::sleep(timeout) => {
                Err(ReceiverError::Timeout(timeout.as_millis() as u64, what))
            }
            _ = closed.cancelled() => {
                Err(ReceiverError::ChannelClosed(slot.channel.namespace().to_string()))
            }
        };

        drop(slot);
        result
    }
}
