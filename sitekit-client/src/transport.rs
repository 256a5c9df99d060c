//! Transport abstraction.
//!
//! The client never talks to the network directly: it hands fully built
//! requests to a [`Transport`] and receives buffered responses back. The
//! default implementation is [`ReqwestTransport`]; tests and embedders can
//! supply their own.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Boxed error type used by transports.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Transport-level failure. Never escapes the client unwrapped.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be converted for the underlying client.
    #[error("failed to build request: {0}")]
    Request(#[source] BoxError),

    /// Connecting or sending failed.
    #[error("connection failed: {0}")]
    Connection(#[source] BoxError),

    /// The response body could not be read.
    #[error("failed to read response body: {0}")]
    Body(#[source] BoxError),
}

/// Sends a single HTTP request and buffers the response.
///
/// Implementations must not retry or time out on their own; the client owns
/// both policies.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` and returns the buffered response.
    async fn send(&self, request: http::Request<Bytes>)
    -> Result<http::Response<Bytes>, TransportError>;
}

#[async_trait]
impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    async fn send(
        &self,
        request: http::Request<Bytes>,
    ) -> Result<http::Response<Bytes>, TransportError> {
        self.as_ref().send(request).await
    }
}

#[async_trait]
impl Transport for Box<dyn Transport> {
    async fn send(
        &self,
        request: http::Request<Bytes>,
    ) -> Result<http::Response<Bytes>, TransportError> {
        (**self).send(request).await
    }
}

/// [`Transport`] backed by a [`reqwest::Client`].
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Wraps an existing reqwest client.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: http::Request<Bytes>,
    ) -> Result<http::Response<Bytes>, TransportError> {
        let request = reqwest::Request::try_from(request)
            .map_err(|error| TransportError::Request(Box::new(error)))?;

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|error| TransportError::Connection(Box::new(error)))?;

        let status = response.status();
        let version = response.version();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|error| TransportError::Body(Box::new(error)))?;

        let mut http_response = http::Response::new(body);
        *http_response.status_mut() = status;
        *http_response.version_mut() = version;
        *http_response.headers_mut() = headers;
        Ok(http_response)
    }
}
