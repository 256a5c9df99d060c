//! In-memory response cache.
//!
//! - [`CacheKey`] - `"<METHOD>:<full url>"`
//! - [`CacheEntry`] - a cached value with an optional expiry timestamp
//! - [`CacheStore`] - the concurrent key/entry map owned by one client
//!
//! ## Expiration
//!
//! Expiry is checked lazily when an entry is read; there is no background
//! sweeper. An entry is expired once `expire <= now`, so a lookup at exactly
//! the expiry instant is a miss. Expired entries found during a lookup are
//! removed. Long-lived processes can bound the store with `max_entries`
//! and call [`CacheStore::purge_expired`] periodically.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use http::Method;
use smol_str::{SmolStr, format_smolstr};

/// Key of a cached response.
///
/// ```
/// use http::Method;
/// use sitekit_client::CacheKey;
///
/// let key = CacheKey::new(&Method::GET, "https://api.example.com/posts?page=2");
/// assert_eq!(key.as_str(), "GET:https://api.example.com/posts?page=2");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(SmolStr);

impl CacheKey {
    /// Builds the key for `method` and the full request URL.
    pub fn new(method: &Method, url: &str) -> Self {
        Self(format_smolstr!("{}:{}", method.as_str(), url))
    }

    /// Returns the key as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A cached value with an optional expiry timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry<T> {
    value: T,
    expire: Option<DateTime<Utc>>,
}

impl<T> CacheEntry<T> {
    /// Creates an entry expiring at `expire` (`None` never expires).
    pub fn new(value: T, expire: Option<DateTime<Utc>>) -> Self {
        Self { value, expire }
    }

    /// Creates an entry that expires `ttl` after `now`.
    pub fn with_ttl(value: T, ttl: Option<Duration>, now: DateTime<Utc>) -> Self {
        let expire = ttl.map(|ttl| match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            Err(_) => DateTime::<Utc>::MAX_UTC,
        });
        Self::new(value, expire)
    }

    /// Returns a reference to the cached value.
    #[inline]
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Returns the expiry timestamp.
    #[inline]
    pub fn expire(&self) -> Option<DateTime<Utc>> {
        self.expire
    }

    /// Returns `true` if the entry must not be served at `now`.
    #[inline]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expire, Some(expire) if expire <= now)
    }

    /// Consumes the entry and returns the value.
    pub fn into_inner(self) -> T {
        self.value
    }
}

/// Concurrent map of cached responses.
#[derive(Debug)]
pub struct CacheStore<T = serde_json::Value> {
    entries: DashMap<CacheKey, CacheEntry<T>>,
    max_entries: Option<usize>,
}

impl<T> Default for CacheStore<T> {
    fn default() -> Self {
        Self::new(None)
    }
}

impl<T> CacheStore<T> {
    /// Creates an empty store, optionally bounded to `max_entries`.
    pub fn new(max_entries: Option<usize>) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
        }
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes one entry. Returns `true` if it existed.
    pub fn remove(&self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Removes every entry expired at the current time.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    /// Removes every entry expired at `now`. Returns the number removed.
    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired_at(now));
        before.saturating_sub(self.entries.len())
    }

    /// Stores `value` under `key` for `ttl`.
    pub fn insert(&self, key: CacheKey, value: T, ttl: Option<Duration>) {
        self.insert_at(key, value, ttl, Utc::now());
    }

    /// Stores `value` under `key`, computing its expiry from `now`.
    pub fn insert_at(&self, key: CacheKey, value: T, ttl: Option<Duration>, now: DateTime<Utc>) {
        if let Some(capacity) = self.max_entries {
            if capacity == 0 {
                return;
            }
            if !self.entries.contains_key(&key) && self.entries.len() >= capacity {
                self.make_room(capacity, now);
            }
        }
        self.entries.insert(key, CacheEntry::with_ttl(value, ttl, now));
    }

    fn make_room(&self, capacity: usize, now: DateTime<Utc>) {
        let purged = self.purge_expired_at(now);
        if purged > 0 {
            tracing::trace!(purged, "purged expired cache entries");
        }
        while self.entries.len() >= capacity {
            // Entries without expiry sort last.
            let victim = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().expire.unwrap_or(DateTime::<Utc>::MAX_UTC))
                .map(|entry| entry.key().clone());
            match victim {
                Some(key) => {
                    tracing::trace!(key = %key, "evicting cache entry");
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

impl<T: Clone> CacheStore<T> {
    /// Returns the value stored under `key` if it has not expired.
    pub fn get(&self, key: &CacheKey) -> Option<T> {
        self.get_at(key, Utc::now())
    }

    /// Returns the value stored under `key` if it has not expired at `now`.
    ///
    /// An expired entry is removed as a side effect.
    pub fn get_at(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<T> {
        match self.entries.get(key) {
            None => return None,
            Some(entry) if !entry.is_expired_at(now) => return Some(entry.value.clone()),
            Some(_) => {}
        }
        self.entries.remove_if(key, |_, entry| entry.is_expired_at(now));
        None
    }
}
