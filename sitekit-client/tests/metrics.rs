//! Metrics recorded by `ApiClient` for cache lookups, retries and failures.

#![cfg(feature = "metrics")]

mod common;

use std::sync::Arc;
use std::time::Duration;

use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use metrics_util::{CompositeKey, MetricKind};
use http::StatusCode;
use serde_json::Value;
use sitekit_client::{ApiClient, ErrorCode, RequestConfig};

use common::{MockTransport, Reply};

type SnapshotEntry = (
    CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
);

fn counter(entries: &[SnapshotEntry], name: &str) -> u64 {
    entries
        .iter()
        .filter(|(key, ..)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .map(|(.., value)| match value {
            DebugValue::Counter(count) => *count,
            _ => 0,
        })
        .sum()
}

fn histogram_samples(entries: &[SnapshotEntry], name: &str, outcome: &str) -> usize {
    entries
        .iter()
        .filter(|(key, ..)| key.kind() == MetricKind::Histogram && key.key().name() == name)
        .filter(|(key, ..)| {
            key.key()
                .labels()
                .any(|label| label.key() == "outcome" && label.value() == outcome)
        })
        .map(|(.., value)| match value {
            DebugValue::Histogram(samples) => samples.len(),
            _ => 0,
        })
        .sum()
}

/// Runs `scenario` on a current-thread runtime so the local recorder sees
/// every metric.
fn record<F, Fut>(scenario: F) -> Vec<SnapshotEntry>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ()>,
{
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(scenario());
    });

    snapshotter.snapshot().into_vec()
}

fn config(retries: u32) -> RequestConfig {
    RequestConfig::builder("https://api.example.com")
        .retries(retries)
        .retry_delay(Duration::from_millis(1))
        .build()
}

#[test]
fn test_cache_lookups_are_counted() {
    let transport = Arc::new(MockTransport::always(Reply::ok(r#"{"id": 1}"#)));

    let entries = record(|| {
        let transport = Arc::clone(&transport);
        async move {
            let client = ApiClient::with_transport(config(0), transport).unwrap();
            client.get::<Value>("/posts/1").await.unwrap();
            client.get::<Value>("/posts/1").await.unwrap();
        }
    });

    assert_eq!(transport.calls(), 1);
    assert_eq!(counter(&entries, "sitekit_cache_miss_total"), 1);
    assert_eq!(counter(&entries, "sitekit_cache_hit_total"), 1);
    assert_eq!(
        histogram_samples(&entries, "sitekit_request_duration_seconds", "ok"),
        2
    );
}

#[test]
fn test_retries_and_errors_are_counted() {
    let transport = Arc::new(MockTransport::always(Reply::Status(503, "")));

    let entries = record(|| {
        let transport = Arc::clone(&transport);
        async move {
            let client = ApiClient::with_transport(config(2), transport).unwrap();
            let err = client.get::<Value>("/health").await.unwrap_err();
            assert_eq!(err.code(), ErrorCode::Api(StatusCode::SERVICE_UNAVAILABLE));
        }
    });

    assert_eq!(transport.calls(), 3);
    assert_eq!(counter(&entries, "sitekit_request_retry_total"), 2);
    assert_eq!(counter(&entries, "sitekit_request_error_total"), 1);
    assert_eq!(
        histogram_samples(&entries, "sitekit_request_duration_seconds", "error"),
        1
    );
}
