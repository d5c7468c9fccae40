// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Read-through query cache.
//!
//! Entries are keyed by (query shape, variables) and expire according to
//! the TTL class of their shape. Concurrent misses for the same key share a
//! single fetch through an in-flight map keyed the same way as the entries.
//!
//! Lock order is always `in_flight` before `entries`.

use crate::error::AppError;
use crate::models::NearbyQuery;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde_json::{json, Value};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Freshness policy bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TtlClass {
    /// Listings, by-id and city lookups
    List,
    /// Nearby searches
    ProximitySearch,
}

impl TtlClass {
    pub fn ttl(self) -> Duration {
        match self {
            TtlClass::List => Duration::from_secs(5 * 60),
            TtlClass::ProximitySearch => Duration::from_secs(2 * 60),
        }
    }
}

/// Cached query shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryShape {
    AllParkings,
    ParkingById,
    ParkingsByCity,
    NearbyParkings,
}

impl QueryShape {
    pub const ALL: [QueryShape; 4] = [
        QueryShape::AllParkings,
        QueryShape::ParkingById,
        QueryShape::ParkingsByCity,
        QueryShape::NearbyParkings,
    ];

    pub fn ttl_class(self) -> TtlClass {
        match self {
            QueryShape::NearbyParkings => TtlClass::ProximitySearch,
            QueryShape::AllParkings | QueryShape::ParkingById | QueryShape::ParkingsByCity => {
                TtlClass::List
            }
        }
    }

    /// Backend field the shape reads.
    pub fn field_name(self) -> &'static str {
        match self {
            QueryShape::AllParkings => "parkings",
            QueryShape::ParkingById => "parking",
            QueryShape::ParkingsByCity => "parkingsByCity",
            QueryShape::NearbyParkings => "nearbyParkings",
        }
    }
}

/// Cache key: query shape plus canonical JSON of its variables.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub shape: QueryShape,
    pub variables: String,
}

impl CacheKey {
    /// Key for `shape` with the given variables. Object keys are sorted by
    /// `serde_json`, so equal variables give equal keys.
    pub fn new(shape: QueryShape, variables: Value) -> Self {
        Self {
            shape,
            variables: variables.to_string(),
        }
    }

    pub fn all_parkings() -> Self {
        Self::new(QueryShape::AllParkings, json!({}))
    }

    pub fn parking_by_id(id: &str) -> Self {
        Self::new(QueryShape::ParkingById, json!({ "id": id }))
    }

    pub fn parkings_by_city(city: &str) -> Self {
        Self::new(QueryShape::ParkingsByCity, json!({ "city": city }))
    }

    pub fn nearby(query: &NearbyQuery) -> Self {
        Self::new(
            QueryShape::NearbyParkings,
            json!({
                "latitude": query.latitude,
                "longitude": query.longitude,
                "maxDistance": query.max_distance_meters,
            }),
        )
    }

    pub fn ttl_class(&self) -> TtlClass {
        self.shape.ttl_class()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.shape.field_name(), self.variables)
    }
}

/// Selects keys to evict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPattern {
    All,
    Shape(QueryShape),
    Key(CacheKey),
}

impl KeyPattern {
    pub fn matches(&self, key: &CacheKey) -> bool {
        match self {
            KeyPattern::All => true,
            KeyPattern::Shape(shape) => key.shape == *shape,
            KeyPattern::Key(k) => k == key,
        }
    }
}

type SharedFetch = Shared<BoxFuture<'static, Result<Arc<Value>, AppError>>>;

struct CacheEntry {
    value: Arc<Value>,
    fetched_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.fetched_at) < self.ttl
    }
}

struct InFlight {
    id: u64,
    fetch: SharedFetch,
}

struct CacheInner {
    entries: DashMap<CacheKey, CacheEntry>,
    in_flight: DashMap<CacheKey, InFlight>,
    next_fetch_id: AtomicU64,
}

impl CacheInner {
    fn fresh(&self, key: &CacheKey) -> Option<Arc<Value>> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|e| e.is_fresh(now))
            .map(|e| Arc::clone(&e.value))
    }

    /// Publish the outcome of fetch `id`. Only the fetch still registered
    /// for `key` may populate the entry.
    fn complete(&self, key: &CacheKey, id: u64, ttl: Duration, result: &Result<Arc<Value>, AppError>) {
        match self.in_flight.entry(key.clone()) {
            Entry::Occupied(slot) if slot.get().id == id => {
                if let Ok(value) = result {
                    self.entries.insert(
                        key.clone(),
                        CacheEntry {
                            value: Arc::clone(value),
                            fetched_at: Instant::now(),
                            ttl,
                        },
                    );
                }
                slot.remove();
            }
            _ => {
                tracing::debug!(key = %key, "Discarding result of superseded fetch");
            }
        }
    }
}

/// Shared read-through cache. Cloning shares the underlying maps.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<CacheInner>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: DashMap::new(),
                in_flight: DashMap::new(),
                next_fetch_id: AtomicU64::new(1),
            }),
        }
    }

    /// Read `key`, calling `fetch` on a miss. The entry lives for the TTL of
    /// the key's query shape.
    ///
    /// A fresh entry is returned without calling `fetch`. Otherwise at most
    /// one fetch per key runs at a time and every concurrent caller receives
    /// its outcome. A failed fetch leaves any previous entry in place.
    pub async fn get<F, Fut>(&self, key: &CacheKey, fetch: F) -> Result<Arc<Value>, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, AppError>> + Send + 'static,
    {
        if let Some(value) = self.inner.fresh(key) {
            tracing::debug!(key = %key, "Cache hit");
            return Ok(value);
        }

        let shared = match self.inner.in_flight.entry(key.clone()) {
            Entry::Occupied(slot) => {
                tracing::debug!(key = %key, "Joining in-flight fetch");
                slot.get().fetch.clone()
            }
            Entry::Vacant(slot) => {
                // A fetch may have completed since the first check.
                if let Some(value) = self.inner.fresh(key) {
                    return Ok(value);
                }

                tracing::debug!(key = %key, "Cache miss");
                let id = self.inner.next_fetch_id.fetch_add(1, Ordering::Relaxed);
                let inner = Arc::clone(&self.inner);
                let owned_key = key.clone();
                let ttl = key.ttl_class().ttl();
                let pending = fetch();

                let fetch = async move {
                    let result = pending.await.map(Arc::new);
                    inner.complete(&owned_key, id, ttl, &result);
                    result
                }
                .boxed()
                .shared();

                slot.insert(InFlight {
                    id,
                    fetch: fetch.clone(),
                });
                fetch
            }
        };

        shared.await
    }

    /// Evict every entry matching `pattern`. In-flight fetches for matching
    /// keys still resolve their waiters but no longer populate the cache.
    pub fn invalidate(&self, pattern: &KeyPattern) {
        self.inner.in_flight.retain(|k, _| !pattern.matches(k));
        let before = self.inner.entries.len();
        self.inner.entries.retain(|k, _| !pattern.matches(k));
        tracing::debug!(
            ?pattern,
            evicted = before.saturating_sub(self.inner.entries.len()),
            "Cache invalidated"
        );
    }

    /// Warm `key` in the background. Failures are logged, never returned.
    pub fn prefetch<F, Fut>(&self, key: CacheKey, fetch: F) -> JoinHandle<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value, AppError>> + Send + 'static,
    {
        let cache = self.clone();
        tokio::spawn(async move {
            if let Err(e) = cache.get(&key, fetch).await {
                tracing::warn!(key = %key, error = %e, "Prefetch failed");
            }
        })
    }

    /// Approximate byte size of all entries (key text plus serialized value).
    pub fn size_estimate(&self) -> usize {
        self.inner
            .entries
            .iter()
            .map(|e| {
                let value_len = serde_json::to_string(e.value().value.as_ref())
                    .map(|s| s.len())
                    .unwrap_or(0);
                e.key().to_string().len() + value_len
            })
            .sum()
    }

    /// Number of stored entries, fresh or not.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }
}
