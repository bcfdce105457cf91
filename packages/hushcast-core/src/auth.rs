//! Access token broker backed by the sender.
//!
//! The receiver holds no credentials of its own. When the CDN needs one, the
//! broker asks the sender over the auth channel and waits for its answer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::channel::messages::{AuthRequest, AuthResponse};
use crate::channel::{Channel, RequestQueue};
use crate::error::ReceiverResult;

/// Source of access tokens for authenticated fetches.
///
/// `Ok(None)` means "no credential available" and is a valid answer.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn request_access_token(&self) -> ReceiverResult<Option<String>>;
}

/// Requests access tokens from the sender over the auth channel.
///
/// Every call sends exactly one request and runs its own deadline. Calls that
/// overlap share the channel listener and are answered in the order they
/// were made; a call that times out leaves the others waiting.
pub struct TokenBroker {
    requests: RequestQueue<Option<String>>,
    timeout: Duration,
    closed: CancellationToken,
}

impl TokenBroker {
    /// Creates a broker on `channel`. Pending requests fail with
    /// `ChannelClosed` once `closed` is cancelled.
    pub fn new(channel: Arc<Channel>, timeout: Duration, closed: CancellationToken) -> Self {
        Self {
            requests: RequestQueue::new(channel, |data| {
                AuthResponse::parse(data).map(AuthResponse::into_token)
            }),
            timeout,
            closed,
        }
    }
}

#[async_trait]
impl AccessTokenProvider for TokenBroker {
    async fn request_access_token(&self) -> ReceiverResult<Option<String>> {
        log::debug!("[TokenBroker] Requesting access token from sender");
        let result = self
            .requests
            .send(&AuthRequest::AccessToken, self.timeout, &self.closed, "access token")
            .await;

        match &result {
            Ok(Some(_)) => log::debug!("[TokenBroker] Received access token"),
            Ok(None) => log::info!("[TokenBroker] Sender has no access token"),
            Err(e) => log::warn!("[TokenBroker] Access token request failed: {}", e),
        }
        result
    }
}
