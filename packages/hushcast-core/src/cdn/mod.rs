//! Authenticated access to the sound library CDN.
//!
//! [`ResourceClient`] attaches the cached access token to every request and,
//! on a 401, asks the [`AccessTokenProvider`] for a fresh one and retries
//! exactly once. [`SegmentSource`] builds on it to fetch HLS playlists and
//! segments for a sound.

pub mod segments;

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use reqwest::{Client, StatusCode};

use crate::auth::AccessTokenProvider;
use crate::error::{ReceiverError, ReceiverResult};

pub use segments::{Playlist, SegmentRef, SegmentSource};

/// Outcome of one CDN fetch, whatever its status.
#[derive(Debug, Clone)]
pub struct Resource {
    pub status: StatusCode,
    pub path: String,
    pub body: Bytes,
}

impl Resource {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns the body of a 2xx response, or the error its status stands for.
    pub fn into_bytes(self) -> ReceiverResult<Bytes> {
        match self.status {
            s if s.is_success() => Ok(self.body),
            StatusCode::UNAUTHORIZED => Err(ReceiverError::AuthRejected(self.path)),
            s => Err(ReceiverError::ResourceUnavailable {
                status: s.as_u16(),
                path: self.path,
            }),
        }
    }

    /// Like [`into_bytes`](Self::into_bytes), decoded as UTF-8.
    pub fn into_text(self) -> ReceiverResult<String> {
        let path = self.path.clone();
        let bytes = self.into_bytes()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| ReceiverError::Protocol(format!("{} is not valid UTF-8", path)))
    }
}

/// CDN client with bearer-token refresh.
pub struct ResourceClient {
    http: Client,
    base_url: String,
    token: RwLock<Option<String>>,
    tokens: Arc<dyn AccessTokenProvider>,
}

impl ResourceClient {
    pub fn new(http: Client, base_url: impl Into<String>, tokens: Arc<dyn AccessTokenProvider>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: RwLock::new(None),
            tokens,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Token attached to the next request, if any.
    pub fn cached_token(&self) -> Option<String> {
        self.token.read().clone()
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.token.write() = token;
    }

    /// Fetches `{base}/{path}`.
    ///
    /// A 401 triggers one token refresh and one retry; every other status,
    /// including a second 401, is returned to the caller as-is. A failed
    /// refresh fails the fetch without retrying.
    pub async fn fetch(&self, path: &str) -> ReceiverResult<Resource> {
        let first = self.fetch_once(path).await?;
        if first.status != StatusCode::UNAUTHORIZED {
            return Ok(first);
        }

        log::info!("[CDN] {} answered 401, refreshing access token", path);
        let token = self.tokens.request_access_token().await?;
        self.set_token(token);

        let retry = self.fetch_once(path).await?;
        if retry.status == StatusCode::UNAUTHORIZED {
            log::warn!("[CDN] {} still unauthorized after token refresh", path);
        }
        Ok(retry)
    }

    async fn fetch_once(&self, path: &str) -> ReceiverResult<Resource> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let token = self.cached_token();

        let mut request = self.http.get(&url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let start = std::time::Instant::now();
        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        log::debug!(
            "[CDN] GET {} -> {} ({} bytes, {:?})",
            url,
            status,
            body.len(),
            start.elapsed()
        );

        Ok(Resource {
            status,
            path: path.to_string(),
            body,
        })
    }
}
