#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]
//! # sitekit-client
//!
//! JSON request client for site frontends and small services.
//!
//! [`ApiClient`] wraps an HTTP [`Transport`] with:
//!
//! - **Timeouts** - each attempt is cut off after the configured duration
//!   and reported as [`ErrorCode::RequestTimeout`]
//! - **Bounded retries** - 5xx responses and transport failures are retried
//!   with a fixed delay; 4xx responses never are
//! - **Response caching** - successful GET responses are kept in a
//!   [`CacheStore`] keyed by method and full URL, with lazy TTL expiry
//! - **Cancellation** - every call has its own [`RequestHandle`], and
//!   [`ApiClient::abort`] cancels all calls in flight
//!
//! All failures are normalized into [`ApiError`], carrying an [`ErrorCode`]
//! and a [`Severity`].
//!
//! ## Feature Flags
//!
//! - `metrics` - record cache, retry and latency metrics with the `metrics` crate

mod client;
mod handle;
mod request;

pub mod cache;
pub mod config;
pub mod error;
#[allow(missing_docs)]
pub mod metrics;
pub mod transport;

pub use cache::{CacheEntry, CacheKey, CacheStore};
pub use client::ApiClient;
pub use config::{CachePolicy, ConfigError, EnabledCacheConfig, RequestConfig, RequestConfigBuilder};
pub use error::{ApiError, ErrorCode, ErrorContext, Severity};
pub use handle::{PendingRequest, RequestHandle};
pub use request::{QueryParams, RequestOptions, build_url};
pub use transport::{BoxError, ReqwestTransport, Transport, TransportError};
