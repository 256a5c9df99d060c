//! The request client.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use futures::future::{AbortHandle, Abortable, Aborted};
use http::{HeaderMap, Method, StatusCode, Uri};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::cache::{CacheKey, CacheStore};
use crate::config::{ConfigError, RequestConfig};
use crate::error::{ApiError, ErrorContext};
use crate::handle::{InFlightGuard, PendingRequest, RequestHandle};
use crate::metrics;
use crate::request::{QueryParams, RequestOptions, build_url};
use crate::transport::{ReqwestTransport, Transport};

/// JSON request client with timeout, bounded retry and a GET response cache.
///
/// A client owns its configuration and cache; build a new client when the
/// configuration changes.
///
/// ```no_run
/// use serde::Deserialize;
/// use sitekit_client::{ApiClient, QueryParams, RequestConfig, RequestOptions};
///
/// #[derive(Deserialize)]
/// struct Post {
///     title: String,
/// }
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ApiClient::new(RequestConfig::new("https://api.example.com"))?;
///
/// let posts: Vec<Post> = client
///     .request(RequestOptions::get("/posts").param("page", 1))
///     .await?;
///
/// // Drop the cached page so the next call refetches it.
/// client.invalidate("/posts", &QueryParams::new().insert("page", 1));
/// # let _ = posts;
/// # Ok(())
/// # }
/// ```
pub struct ApiClient<T = ReqwestTransport> {
    config: RequestConfig,
    default_headers: HeaderMap,
    transport: T,
    cache: CacheStore,
    in_flight: DashMap<u64, AbortHandle>,
    next_call: AtomicU64,
}

impl ApiClient<ReqwestTransport> {
    /// Creates a client backed by a default [`reqwest::Client`].
    pub fn new(config: RequestConfig) -> Result<Self, ConfigError> {
        Self::with_transport(config, ReqwestTransport::default())
    }
}

impl<T> ApiClient<T>
where
    T: Transport,
{
    /// Creates a client sending requests through `transport`.
    pub fn with_transport(config: RequestConfig, transport: T) -> Result<Self, ConfigError> {
        config.validate()?;
        let default_headers = config.header_map()?;
        let cache = CacheStore::new(config.cache.max_entries());
        Ok(Self {
            config,
            default_headers,
            transport,
            cache,
            in_flight: DashMap::new(),
            next_call: AtomicU64::new(1),
        })
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &RequestConfig {
        &self.config
    }

    /// Returns the response cache.
    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Starts a call.
    ///
    /// The returned [`PendingRequest`] resolves to the response body parsed
    /// as `R`, and exposes a [`RequestHandle`] to cancel this call alone.
    pub fn request<'a, R>(&'a self, options: RequestOptions) -> PendingRequest<'a, R>
    where
        R: DeserializeOwned + Send + 'a,
    {
        let id = self.next_call.fetch_add(1, Ordering::Relaxed);
        let (abort, registration) = AbortHandle::new_pair();
        let guard = InFlightGuard::register(&self.in_flight, id, abort.clone());

        let url = build_url(&self.config.base_url, &options.endpoint, &options.query);
        let method = options.method.clone();

        let future = async move {
            let _guard = guard;
            let started = Instant::now();
            let context = ErrorContext::new(method.clone(), url.clone());

            let result = match Abortable::new(self.execute(options, url), registration).await {
                Ok(result) => result,
                Err(Aborted) => {
                    debug!(call = id, url = %context.url, "request aborted");
                    Err(ApiError::aborted(context))
                }
            };

            metrics::record_request(
                &method,
                started.elapsed(),
                result.as_ref().err().map(ApiError::code),
            );
            result
        };

        PendingRequest::new(RequestHandle::new(id, abort), Box::pin(future))
    }

    /// Sends a GET request to `endpoint`.
    pub async fn get<R>(&self, endpoint: &str) -> Result<R, ApiError>
    where
        R: DeserializeOwned + Send + 'static,
    {
        self.request(RequestOptions::get(endpoint)).await
    }

    /// Sends a POST request with a JSON body to `endpoint`.
    pub async fn post<R, B>(&self, endpoint: &str, body: &B) -> Result<R, ApiError>
    where
        R: DeserializeOwned + Send + 'static,
        B: Serialize + ?Sized,
    {
        self.request(RequestOptions::post(endpoint).json(body)).await
    }

    /// Cancels every call in flight on this client. Returns how many were cancelled.
    pub fn abort(&self) -> usize {
        let mut aborted = 0;
        for entry in self.in_flight.iter() {
            entry.value().abort();
            aborted += 1;
        }
        if aborted > 0 {
            debug!(aborted, "aborted in-flight requests");
        }
        aborted
    }

    /// Number of calls currently in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Drops every cached response.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Drops the cached GET response for `endpoint` with `query`.
    /// Returns `true` if an entry was removed.
    pub fn invalidate(&self, endpoint: &str, query: &QueryParams) -> bool {
        let url = build_url(&self.config.base_url, endpoint, query);
        let key = CacheKey::new(&Method::GET, &url);
        let removed = self.cache.remove(&key);
        trace!(key = %key, removed, "cache invalidation");
        removed
    }

    fn cache_key(&self, options: &RequestOptions, url: &str) -> Option<CacheKey> {
        let cacheable =
            options.method == Method::GET && options.cache && self.config.cache.is_enabled();
        cacheable.then(|| CacheKey::new(&options.method, url))
    }

    async fn execute<R>(&self, options: RequestOptions, url: String) -> Result<R, ApiError>
    where
        R: DeserializeOwned,
    {
        let mut context = ErrorContext::new(options.method.clone(), url.clone());
        let cache_key = self.cache_key(&options, &url);

        if let Some(key) = &cache_key {
            let cached = self.cache.get(key);
            metrics::record_cache_lookup(cached.is_some());
            if let Some(value) = cached {
                debug!(key = %key, "cache hit");
                return serde_json::from_value(value)
                    .map_err(|error| ApiError::invalid_response(context, error));
            }
            trace!(key = %key, "cache miss");
        }

        let headers = match options.merged_headers(&self.default_headers) {
            Ok(headers) => headers,
            Err(reason) => return Err(ApiError::invalid_request(context, reason)),
        };
        let body = match options.body {
            Some(Ok(body)) => body,
            Some(Err(reason)) => return Err(ApiError::invalid_request(context, reason)),
            None => Bytes::new(),
        };
        let uri = match url.parse::<Uri>() {
            Ok(uri) => uri,
            Err(error) => return Err(ApiError::invalid_request(context, error)),
        };
        let timeout = options.timeout.unwrap_or(self.config.timeout);

        let response = self
            .send_with_retry(&options.method, &uri, &headers, &body, timeout, &mut context)
            .await?;

        let status = response.status();
        context.status = Some(status);
        let payload = response.into_body();

        if !status.is_success() {
            let message = error_message(status, &payload);
            warn!(
                url = %context.url,
                status = status.as_u16(),
                attempts = context.attempts,
                "request failed"
            );
            return Err(ApiError::status(context, status, message));
        }

        let value: Value = if payload.is_empty() {
            Value::Null
        } else {
            match serde_json::from_slice(&payload) {
                Ok(value) => value,
                Err(error) => return Err(ApiError::invalid_response(context, error)),
            }
        };

        if let Some(key) = cache_key {
            trace!(key = %key, "caching response");
            self.cache.insert(key, value.clone(), self.config.cache.ttl());
        }

        serde_json::from_value(value).map_err(|error| ApiError::invalid_response(context, error))
    }

    /// Sends the request, retrying 5xx responses and transport errors.
    ///
    /// Timeouts end the call immediately. Responses below 500 are returned
    /// as they are, as is the last response once attempts run out.
    async fn send_with_retry(
        &self,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        body: &Bytes,
        timeout: Duration,
        context: &mut ErrorContext,
    ) -> Result<http::Response<Bytes>, ApiError> {
        let max_attempts = self.config.retries.saturating_add(1);
        loop {
            context.attempts += 1;
            let attempt = context.attempts;

            let mut request = http::Request::new(body.clone());
            *request.method_mut() = method.clone();
            *request.uri_mut() = uri.clone();
            *request.headers_mut() = headers.clone();

            match tokio::time::timeout(timeout, self.transport.send(request)).await {
                Err(_elapsed) => {
                    warn!(url = %context.url, attempt, ?timeout, "request timed out");
                    return Err(ApiError::timeout(context.clone()));
                }
                Ok(Err(error)) => {
                    if attempt >= max_attempts {
                        warn!(url = %context.url, attempt, %error, "request failed");
                        return Err(ApiError::transport(context.clone(), error));
                    }
                    debug!(url = %context.url, attempt, %error, "transport error, retrying");
                }
                Ok(Ok(response)) => {
                    let status = response.status();
                    if !status.is_server_error() || attempt >= max_attempts {
                        return Ok(response);
                    }
                    context.status = Some(status);
                    debug!(
                        url = %context.url,
                        attempt,
                        status = status.as_u16(),
                        "server error, retrying"
                    );
                }
            }

            metrics::record_retry();
            tokio::time::sleep(self.config.retry_delay).await;
        }
    }
}

impl<T> std::fmt::Debug for ApiClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("config", &self.config)
            .field("cached", &self.cache.len())
            .field("in_flight", &self.in_flight.len())
            .field("transport", &std::any::type_name::<T>())
            .finish()
    }
}

/// Extracts a human-readable message from a JSON error body.
///
/// Looks at `message`, then `error` (string or `{ "message": .. }`), and
/// falls back to the status code.
fn error_message(status: StatusCode, body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|json| {
            json.get("message")
                .and_then(Value::as_str)
                .or_else(|| json.get("error").and_then(Value::as_str))
                .or_else(|| {
                    json.get("error")
                        .and_then(|error| error.get("message"))
                        .and_then(Value::as_str)
                })
                .map(str::to_owned)
        })
        .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()))
}
