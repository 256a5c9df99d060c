//! Per-call cancellation.
//!
//! Each call started with [`ApiClient::request`](crate::ApiClient::request)
//! returns a [`PendingRequest`] carrying its own [`RequestHandle`]. Aborting
//! the handle cancels that call only; [`ApiClient::abort`](crate::ApiClient::abort)
//! cancels every call still in flight on the client.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use dashmap::DashMap;
use futures::future::{AbortHandle, BoxFuture};

use crate::error::ApiError;

/// Cancels one in-flight call.
#[derive(Debug, Clone)]
pub struct RequestHandle {
    id: u64,
    abort: AbortHandle,
}

impl RequestHandle {
    pub(crate) fn new(id: u64, abort: AbortHandle) -> Self {
        Self { id, abort }
    }

    /// Identifier of the call, unique per client.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Cancels the call. The pending future resolves to a
    /// [`ErrorCode::RequestTimeout`](crate::ErrorCode::RequestTimeout) error.
    pub fn abort(&self) {
        self.abort.abort();
    }

    /// Returns `true` once [`abort`](Self::abort) has been called.
    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }
}

/// A call in progress. Await it to get the parsed response.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct PendingRequest<'a, R> {
    handle: RequestHandle,
    future: BoxFuture<'a, Result<R, ApiError>>,
}

impl<'a, R> PendingRequest<'a, R> {
    pub(crate) fn new(handle: RequestHandle, future: BoxFuture<'a, Result<R, ApiError>>) -> Self {
        Self { handle, future }
    }

    /// Returns a handle that can cancel this call.
    pub fn handle(&self) -> RequestHandle {
        self.handle.clone()
    }
}

impl<R> Future for PendingRequest<'_, R> {
    type Output = Result<R, ApiError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.future.as_mut().poll(cx)
    }
}

impl<R> std::fmt::Debug for PendingRequest<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequest")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// Removes a call from the client registry when the call finishes or is dropped.
pub(crate) struct InFlightGuard<'a> {
    registry: &'a DashMap<u64, AbortHandle>,
    id: u64,
}

impl<'a> InFlightGuard<'a> {
    pub(crate) fn register(
        registry: &'a DashMap<u64, AbortHandle>,
        id: u64,
        abort: AbortHandle,
    ) -> Self {
        registry.insert(id, abort);
        Self { registry, id }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
    }
}
