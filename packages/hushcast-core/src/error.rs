//! Centralized error types for the Hushcast receiver runtime.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Provides machine-readable codes for log lines and status responses
//! - Maps errors to HTTP status codes for the local API

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    fn code(&self) -> &'static str;
}

/// Application-wide error type for the receiver runtime.
#[derive(Debug, Error)]
pub enum ReceiverError {
    /// A received message matched no known `kind`, or lacked required fields.
    ///
    /// Unknown kinds mean the sender and receiver builds disagree on the
    /// protocol, so this is raised rather than ignored.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A correlated request (access token) got no answer before its deadline.
    #[error("Timed out after {0}ms waiting for {1}")]
    Timeout(u64, &'static str),

    /// The CDN answered 401 again after one credential refresh.
    #[error("Resource rejected credentials: {0}")]
    AuthRejected(String),

    /// The CDN answered with a non-2xx status other than 401.
    #[error("Resource unavailable ({status}): {path}")]
    ResourceUnavailable { status: u16, path: String },

    /// Transport-level failure while talking to the CDN.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The session (and its channels) closed while an operation was pending.
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// A second sender tried to connect while one is already attached.
    #[error("A sender is already connected")]
    SenderBusy,

    /// Invalid receiver configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ReceiverError {
    /// Convenience constructor for protocol violations.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Returns `true` if a CDN 403 caused this error.
    ///
    /// Premium segments requested without entitlement are rejected with 403;
    /// that is an expected outcome, not a fault.
    #[must_use]
    pub fn is_premium_gated(&self) -> bool {
        matches!(self, Self::ResourceUnavailable { status: 403, .. })
    }

    /// Maps the error to an HTTP status code for the local API.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Protocol(_) | Self::Configuration(_) => StatusCode::BAD_REQUEST,
            Self::SenderBusy => StatusCode::CONFLICT,
            Self::Timeout(..) => StatusCode::GATEWAY_TIMEOUT,
            Self::AuthRejected(_) | Self::ResourceUnavailable { .. } | Self::Http(_) => {
                StatusCode::BAD_GATEWAY
            }
            Self::ChannelClosed(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl ErrorCode for ReceiverError {
    fn code(&self) -> &'static str {
        match self {
            Self::Protocol(_) => "protocol_error",
            Self::Timeout(..) => "timeout",
            Self::AuthRejected(_) => "auth_rejected",
            Self::ResourceUnavailable { .. } => "resource_unavailable",
            Self::Http(_) => "http_request_failed",
            Self::ChannelClosed(_) => "channel_closed",
            Self::SenderBusy => "sender_busy",
            Self::Configuration(_) => "configuration_error",
        }
    }
}

impl From<serde_json::Error> for ReceiverError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

/// Convenient Result alias for receiver operations.
pub type ReceiverResult<T> = Result<T, ReceiverError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for ReceiverError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}
