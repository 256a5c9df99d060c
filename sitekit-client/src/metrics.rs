//! Metrics declaration and recording.

use std::time::Duration;

use crate::error::ErrorCode;

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    /// Track number of cache hit events.
    pub static ref CACHE_HIT_COUNTER: &'static str = {
        metrics::describe_counter!(
            "sitekit_cache_hit_total",
            "Total number of requests answered from the response cache."
        );
        "sitekit_cache_hit_total"
    };
    /// Track number of cache miss events.
    pub static ref CACHE_MISS_COUNTER: &'static str = {
        metrics::describe_counter!(
            "sitekit_cache_miss_total",
            "Total number of cacheable requests not found in the response cache."
        );
        "sitekit_cache_miss_total"
    };
    /// Track number of retried attempts.
    pub static ref REQUEST_RETRY_COUNTER: &'static str = {
        metrics::describe_counter!(
            "sitekit_request_retry_total",
            "Total number of retried request attempts."
        );
        "sitekit_request_retry_total"
    };
    /// Track number of failed requests per error code.
    pub static ref REQUEST_ERROR_COUNTER: &'static str = {
        metrics::describe_counter!(
            "sitekit_request_error_total",
            "Total number of failed requests."
        );
        "sitekit_request_error_total"
    };
    /// Histogram of request duration, retries included.
    pub static ref REQUEST_DURATION: &'static str = {
        metrics::describe_histogram!(
            "sitekit_request_duration_seconds",
            metrics::Unit::Seconds,
            "Duration of requests in seconds."
        );
        "sitekit_request_duration_seconds"
    };
}

#[cfg(feature = "metrics")]
#[inline]
pub(crate) fn record_cache_lookup(hit: bool) {
    let counter = if hit {
        *CACHE_HIT_COUNTER
    } else {
        *CACHE_MISS_COUNTER
    };
    metrics::counter!(counter).increment(1);
}

#[cfg(not(feature = "metrics"))]
#[inline]
pub(crate) fn record_cache_lookup(_hit: bool) {}

#[cfg(feature = "metrics")]
#[inline]
pub(crate) fn record_retry() {
    metrics::counter!(*REQUEST_RETRY_COUNTER).increment(1);
}

#[cfg(not(feature = "metrics"))]
#[inline]
pub(crate) fn record_retry() {}

#[cfg(feature = "metrics")]
#[inline]
pub(crate) fn record_request(method: &http::Method, duration: Duration, error: Option<ErrorCode>) {
    let outcome = if error.is_some() { "error" } else { "ok" };
    metrics::histogram!(
        *REQUEST_DURATION,
        "method" => method.as_str().to_owned(),
        "outcome" => outcome
    )
    .record(duration.as_secs_f64());

    if let Some(code) = error {
        metrics::counter!(*REQUEST_ERROR_COUNTER, "code" => code.to_string()).increment(1);
    }
}

#[cfg(not(feature = "metrics"))]
#[inline]
pub(crate) fn record_request(
    _method: &http::Method,
    _duration: Duration,
    _error: Option<ErrorCode>,
) {
}
