//! Error types for request operations.
//!
//! Every failure of [`ApiClient::request`](crate::ApiClient::request) surfaces
//! as an [`ApiError`] with a machine-readable [`ErrorCode`] and a
//! [`Severity`], so callers branch on data rather than on messages.

use std::fmt;

use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::TransportError;

/// How serious a failure is, for the caller to decide on presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational, nothing to surface.
    Info,
    /// Recoverable; the user can retry or fix input.
    Warning,
    /// The operation failed.
    Error,
    /// The backend is failing.
    Critical,
}

impl Severity {
    /// Returns the severity as a string slice.
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The attempt timed out or the call was aborted.
    RequestTimeout,
    /// The transport failed before a response was received.
    RequestFailed,
    /// The server answered with a non-success status after all attempts.
    Api(StatusCode),
    /// The response body is not valid JSON for the requested type.
    InvalidResponse,
    /// The request could not be built (bad URL, header or body).
    InvalidRequest,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::RequestTimeout => f.write_str("REQUEST_TIMEOUT"),
            ErrorCode::RequestFailed => f.write_str("REQUEST_FAILED"),
            ErrorCode::Api(status) => write!(f, "API_ERROR_{}", status.as_u16()),
            ErrorCode::InvalidResponse => f.write_str("INVALID_RESPONSE"),
            ErrorCode::InvalidRequest => f.write_str("INVALID_REQUEST"),
        }
    }
}

/// What the client was doing when the failure happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// HTTP method of the call.
    pub method: Method,
    /// Full request URL, query string included.
    pub url: String,
    /// Number of transport attempts made.
    pub attempts: u32,
    /// Status of the last response, if one was received.
    pub status: Option<StatusCode>,
}

impl ErrorContext {
    pub(crate) fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            attempts: 0,
            status: None,
        }
    }
}

/// Normalized request failure.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ApiError {
    message: String,
    code: ErrorCode,
    severity: Severity,
    context: ErrorContext,
    #[source]
    source: Option<TransportError>,
}

impl ApiError {
    /// Creates an error from its parts.
    pub fn new(
        message: impl Into<String>,
        code: ErrorCode,
        severity: Severity,
        context: ErrorContext,
    ) -> Self {
        Self {
            message: message.into(),
            code,
            severity,
            context,
            source: None,
        }
    }

    pub(crate) fn timeout(context: ErrorContext) -> Self {
        Self::new(
            format!("Request to {} timed out", context.url),
            ErrorCode::RequestTimeout,
            Severity::Warning,
            context,
        )
    }

    pub(crate) fn aborted(context: ErrorContext) -> Self {
        Self::new(
            format!("Request to {} was aborted", context.url),
            ErrorCode::RequestTimeout,
            Severity::Warning,
            context,
        )
    }

    pub(crate) fn transport(context: ErrorContext, source: TransportError) -> Self {
        Self {
            message: format!("Request to {} failed: {source}", context.url),
            code: ErrorCode::RequestFailed,
            severity: Severity::Error,
            context,
            source: Some(source),
        }
    }

    pub(crate) fn status(context: ErrorContext, status: StatusCode, message: String) -> Self {
        let severity = if status.is_server_error() {
            Severity::Critical
        } else {
            Severity::Warning
        };
        Self::new(message, ErrorCode::Api(status), severity, context)
    }

    pub(crate) fn invalid_response(context: ErrorContext, error: serde_json::Error) -> Self {
        Self::new(
            format!("Invalid response from {}: {error}", context.url),
            ErrorCode::InvalidResponse,
            Severity::Error,
            context,
        )
    }

    pub(crate) fn invalid_request(context: ErrorContext, reason: impl fmt::Display) -> Self {
        Self::new(
            format!("Invalid request: {reason}"),
            ErrorCode::InvalidRequest,
            Severity::Error,
            context,
        )
    }

    /// Human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Machine-readable failure kind.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Severity tag.
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Call details.
    pub fn context(&self) -> &ErrorContext {
        &self.context
    }

    /// Status of the last response, if any.
    pub fn status_code(&self) -> Option<StatusCode> {
        self.context.status
    }

    /// Returns `true` for timeouts and aborts.
    pub fn is_timeout(&self) -> bool {
        self.code == ErrorCode::RequestTimeout
    }
}
