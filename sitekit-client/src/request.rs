//! Per-call request options and URL construction.

use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;

/// Ordered query parameters. Parameters without a value are skipped when
/// the URL is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, Option<String>)>);

impl QueryParams {
    /// Creates an empty parameter list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `key=value`.
    pub fn insert(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.0.push((key.into(), Some(value.to_string())));
        self
    }

    /// Appends `key=value` when `value` is present.
    pub fn insert_opt<V: ToString>(mut self, key: impl Into<String>, value: Option<V>) -> Self {
        self.0.push((key.into(), value.map(|value| value.to_string())));
        self
    }

    /// Returns `true` if no parameter carries a value.
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|(_, value)| value.is_none())
    }

    /// URL-encodes the parameters that carry a value.
    pub fn encode(&self) -> String {
        let pairs: Vec<(&str, &str)> = self
            .0
            .iter()
            .filter_map(|(key, value)| value.as_deref().map(|value| (key.as_str(), value)))
            .collect();
        serde_urlencoded::to_string(pairs).unwrap_or_default()
    }
}

impl<K, V> FromIterator<(K, Option<V>)> for QueryParams
where
    K: Into<String>,
    V: ToString,
{
    fn from_iter<I: IntoIterator<Item = (K, Option<V>)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.map(|value| value.to_string())))
                .collect(),
        )
    }
}

/// Joins `base_url`, `endpoint` and the encoded `query`.
///
/// ```
/// use sitekit_client::{QueryParams, build_url};
///
/// let query = QueryParams::new()
///     .insert("tag", "rust & web")
///     .insert_opt("page", None::<u32>);
/// assert_eq!(
///     build_url("https://api.example.com", "/posts", &query),
///     "https://api.example.com/posts?tag=rust+%26+web"
/// );
/// ```
pub fn build_url(base_url: &str, endpoint: &str, query: &QueryParams) -> String {
    let mut url = format!("{base_url}{endpoint}");
    let encoded = query.encode();
    if !encoded.is_empty() {
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(&encoded);
    }
    url
}

/// Options of a single call.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub(crate) method: Method,
    pub(crate) endpoint: String,
    pub(crate) body: Option<Result<Bytes, String>>,
    pub(crate) query: QueryParams,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) cache: bool,
}

impl RequestOptions {
    /// Creates options for `method` on `endpoint` (relative to the base URL).
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            body: None,
            query: QueryParams::default(),
            headers: Vec::new(),
            timeout: None,
            cache: true,
        }
    }

    /// Shorthand for [`RequestOptions::new`] with `GET`.
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::GET, endpoint)
    }

    /// Shorthand for [`RequestOptions::new`] with `POST`.
    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::POST, endpoint)
    }

    /// Shorthand for [`RequestOptions::new`] with `PUT`.
    pub fn put(endpoint: impl Into<String>) -> Self {
        Self::new(Method::PUT, endpoint)
    }

    /// Shorthand for [`RequestOptions::new`] with `PATCH`.
    pub fn patch(endpoint: impl Into<String>) -> Self {
        Self::new(Method::PATCH, endpoint)
    }

    /// Shorthand for [`RequestOptions::new`] with `DELETE`.
    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::DELETE, endpoint)
    }

    /// Serializes `body` as the JSON request body.
    ///
    /// Serialization errors are reported when the request is sent.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Self {
        self.body = Some(
            serde_json::to_vec(body)
                .map(Bytes::from)
                .map_err(|error| error.to_string()),
        );
        self
    }

    /// Replaces the query parameters.
    pub fn query(mut self, query: QueryParams) -> Self {
        self.query = query;
        self
    }

    /// Appends one query parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query = self.query.insert(key, value);
        self
    }

    /// Adds a header, overriding a default header of the same name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Overrides the client timeout for this call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Opts this call in or out of the response cache.
    pub fn cache(mut self, enabled: bool) -> Self {
        self.cache = enabled;
        self
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Endpoint relative to the base URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub(crate) fn merged_headers(&self, defaults: &HeaderMap) -> Result<HeaderMap, String> {
        let mut headers = defaults.clone();
        for (name, value) in &self.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| format!("invalid header name `{name}`"))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| format!("invalid value for header `{name}`"))?;
            headers.insert(header_name, header_value);
        }
        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_without_query() {
        assert_eq!(
            build_url("https://e.com/api", "/posts", &QueryParams::new()),
            "https://e.com/api/posts"
        );
    }

    #[test]
    fn test_url_skips_missing_values() {
        let query = QueryParams::new()
            .insert("page", 2)
            .insert_opt("tag", None::<&str>)
            .insert_opt("sort", Some("date"));
        assert_eq!(
            build_url("https://e.com", "/posts", &query),
            "https://e.com/posts?page=2&sort=date"
        );
    }

    #[test]
    fn test_url_appends_to_existing_query() {
        let query = QueryParams::new().insert("b", "2");
        assert_eq!(
            build_url("https://e.com", "/x?a=1", &query),
            "https://e.com/x?a=1&b=2"
        );
    }

    #[test]
    fn test_all_missing_values_is_empty() {
        let query: QueryParams = [("a", None::<String>), ("b", None)].into_iter().collect();
        assert!(query.is_empty());
        assert_eq!(build_url("https://e.com", "/x", &query), "https://e.com/x");
    }

    #[test]
    fn test_headers_override_defaults() {
        let mut defaults = HeaderMap::new();
        defaults.insert("accept", HeaderValue::from_static("text/plain"));
        let options = RequestOptions::get("/x").header("Accept", "application/json");
        let headers = options.merged_headers(&defaults).unwrap();
        assert_eq!(headers.get("accept").unwrap(), "application/json");
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_invalid_header_reported() {
        let options = RequestOptions::get("/x").header("bad name", "v");
        assert!(options.merged_headers(&HeaderMap::new()).is_err());
    }
}
