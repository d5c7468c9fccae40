// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Parking reads served through the query cache, plus local search,
//! favorites and recent searches kept in the token store.

use crate::error::AppError;
use crate::models::{Coordinates, NearbyQuery, ParkingListing};
use crate::services::backend::ParkingBackend;
use crate::services::cache::{CacheKey, KeyPattern, QueryCache, QueryShape};
use crate::store::TokenStore;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Recent searches kept.
pub const MAX_RECENT_SEARCHES: usize = 10;

/// Outcome of the last local search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
    pub query: String,
    pub listings: Vec<ParkingListing>,
}

/// Parking service: cached listing reads plus cache management.
#[derive(Clone)]
pub struct ParkingService {
    backend: Arc<dyn ParkingBackend>,
    cache: QueryCache,
    store: TokenStore,
    default_radius_meters: f64,
    last_search: Arc<Mutex<SearchResults>>,
    // Serializes read-modify-write of stored preferences
    preferences_lock: Arc<Mutex<()>>,
}

impl ParkingService {
    pub fn new(
        backend: Arc<dyn ParkingBackend>,
        store: TokenStore,
        default_radius_meters: f64,
    ) -> Self {
        Self {
            backend,
            cache: QueryCache::new(),
            store,
            default_radius_meters,
            last_search: Arc::new(Mutex::new(SearchResults::default())),
            preferences_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn default_radius_meters(&self) -> f64 {
        self.default_radius_meters
    }

    async fn cached(&self, key: CacheKey) -> Result<Arc<Value>, AppError> {
        let backend = Arc::clone(&self.backend);
        let fetch_key = key.clone();
        self.cache.get(&key, move || fetch(backend, fetch_key)).await
    }

    /// Full listing.
    pub async fn parkings(&self) -> Result<Vec<ParkingListing>, AppError> {
        let value = self.cached(CacheKey::all_parkings()).await?;
        Ok(ParkingListing::list_from_value(&value))
    }

    /// Single listing by id.
    pub async fn parking_by_id(&self, id: &str) -> Result<ParkingListing, AppError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(AppError::InvalidInput("parking id is required".to_string()));
        }

        let value = self.cached(CacheKey::parking_by_id(id)).await?;
        if value.is_null() {
            return Err(AppError::NotFound(format!("parking {id}")));
        }
        ParkingListing::from_value(&value)
            .ok_or_else(|| AppError::NotFound(format!("parking {id} has an unreadable shape")))
    }

    /// Listings within `radius_meters` (default from config) of a point,
    /// nearest first. Listings without coordinates sort last.
    pub async fn nearby_parkings(
        &self,
        latitude: f64,
        longitude: f64,
        radius_meters: Option<f64>,
    ) -> Result<Vec<ParkingListing>, AppError> {
        let query = self.nearby_query(latitude, longitude, radius_meters)?;
        let value = self.cached(CacheKey::nearby(&query)).await?;

        let origin = query.origin();
        let mut listings: Vec<(f64, ParkingListing)> = ParkingListing::list_from_value(&value)
            .into_iter()
            .map(|l| {
                let distance = l
                    .location()
                    .map(|c| origin.distance_meters(c))
                    .unwrap_or(f64::INFINITY);
                (distance, l)
            })
            .collect();
        listings.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(listings.into_iter().map(|(_, l)| l).collect())
    }

    /// Listings in a city.
    pub async fn parkings_by_city(&self, city: &str) -> Result<Vec<ParkingListing>, AppError> {
        let city = city.trim();
        if city.is_empty() {
            return Err(AppError::InvalidInput("city is required".to_string()));
        }

        let value = self.cached(CacheKey::parkings_by_city(city)).await?;
        Ok(ParkingListing::list_from_value(&value))
    }

    // ─── Local search ───────────────────────────────────────────

    /// Filter the cached full listing by `query`, case-insensitively, on
    /// name, description and address. A blank query clears the results.
    /// A non-blank query is also recorded as a recent search.
    pub async fn search(&self, query: &str) -> Result<Vec<ParkingListing>, AppError> {
        let query = query.trim();
        if query.is_empty() {
            self.clear_search().await;
            return Ok(Vec::new());
        }

        let needle = query.to_lowercase();
        let listings: Vec<ParkingListing> = self
            .parkings()
            .await?
            .into_iter()
            .filter(|l| l.matches_text(&needle))
            .collect();
        tracing::debug!(query, matches = listings.len(), "Local parking search");

        *self.last_search.lock().await = SearchResults {
            query: query.to_string(),
            listings: listings.clone(),
        };
        self.add_recent_search(query).await?;
        Ok(listings)
    }

    /// Results of the last search; empty after [`Self::clear_search`].
    pub async fn last_search(&self) -> SearchResults {
        self.last_search.lock().await.clone()
    }

    pub async fn clear_search(&self) {
        *self.last_search.lock().await = SearchResults::default();
    }

    /// Recent queries, most recent first.
    pub async fn recent_searches(&self) -> Result<Vec<String>, AppError> {
        self.store.recent_searches().await
    }

    /// Move `query` to the front of the recent searches, dropping an earlier
    /// copy and anything past [`MAX_RECENT_SEARCHES`]. Blank queries are ignored.
    pub async fn add_recent_search(&self, query: &str) -> Result<(), AppError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(());
        }

        let _guard = self.preferences_lock.lock().await;
        let mut recent = self.store.recent_searches().await?;
        recent.retain(|q| q != query);
        recent.insert(0, query.to_string());
        recent.truncate(MAX_RECENT_SEARCHES);
        self.store.put_recent_searches(&recent).await
    }

    // ─── Favorites ──────────────────────────────────────────────

    /// Add or remove `id` from the favorites. Returns whether it is now a
    /// favorite.
    pub async fn toggle_favorite(&self, id: &str) -> Result<bool, AppError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(AppError::InvalidInput("parking id is required".to_string()));
        }

        let _guard = self.preferences_lock.lock().await;
        let mut ids = self.store.favorites().await?;
        let now_favorite = match ids.iter().position(|f| f == id) {
            Some(i) => {
                ids.remove(i);
                false
            }
            None => {
                ids.push(id.to_string());
                true
            }
        };
        self.store.put_favorites(&ids).await?;
        tracing::debug!(parking_id = id, favorite = now_favorite, "Favorite toggled");
        Ok(now_favorite)
    }

    pub async fn is_favorite(&self, id: &str) -> Result<bool, AppError> {
        let id = id.trim();
        Ok(self.store.favorites().await?.iter().any(|f| f == id))
    }

    pub async fn favorite_ids(&self) -> Result<Vec<String>, AppError> {
        self.store.favorites().await
    }

    /// Favorite listings present in the full listing, in listing order.
    pub async fn favorites(&self) -> Result<Vec<ParkingListing>, AppError> {
        let ids = self.store.favorites().await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .parkings()
            .await?
            .into_iter()
            .filter(|l| ids.iter().any(|id| id == l.id()))
            .collect())
    }

    /// Evict every cached parking query.
    pub fn clear_cache(&self) {
        for shape in QueryShape::ALL {
            self.cache.invalidate(&KeyPattern::Shape(shape));
        }
        tracing::info!("Parking cache cleared");
    }

    /// Evict entries matching `pattern`.
    pub fn invalidate(&self, pattern: &KeyPattern) {
        self.cache.invalidate(pattern);
    }

    /// Evict everything whose availability counters may have changed.
    pub fn invalidate_availability(&self) {
        self.clear_cache();
    }

    /// Drop the cached full listing and fetch it again.
    pub async fn refresh_data(&self) -> Result<Vec<ParkingListing>, AppError> {
        self.cache.invalidate(&KeyPattern::Shape(QueryShape::AllParkings));
        self.parkings().await
    }

    /// Approximate byte size of cached parking data.
    pub fn size_estimate(&self) -> usize {
        self.cache.size_estimate()
    }

    /// Warm the nearby search for a point without waiting for it.
    pub fn prefetch_nearby(
        &self,
        latitude: f64,
        longitude: f64,
        radius_meters: Option<f64>,
    ) -> Result<JoinHandle<()>, AppError> {
        let query = self.nearby_query(latitude, longitude, radius_meters)?;
        let key = CacheKey::nearby(&query);
        let backend = Arc::clone(&self.backend);
        let fetch_key = key.clone();
        Ok(self.cache.prefetch(key, move || fetch(backend, fetch_key)))
    }

    fn nearby_query(
        &self,
        latitude: f64,
        longitude: f64,
        radius_meters: Option<f64>,
    ) -> Result<NearbyQuery, AppError> {
        let origin = Coordinates::new(latitude, longitude)
            .map_err(|e| AppError::InvalidInput(e.to_string()))?;
        let radius = radius_meters.unwrap_or(self.default_radius_meters);
        if !radius.is_finite() || radius <= 0.0 {
            return Err(AppError::InvalidInput(format!(
                "radius must be positive, got {radius}"
            )));
        }
        Ok(NearbyQuery::new(origin.latitude, origin.longitude, radius))
    }
}

/// Run the backend query behind `key`.
async fn fetch(backend: Arc<dyn ParkingBackend>, key: CacheKey) -> Result<Value, AppError> {
    let variables: Value = serde_json::from_str(&key.variables)
        .map_err(|e| AppError::Internal(format!("cache key {key}: {e}")))?;
    let str_var = |name: &str| -> Result<String, AppError> {
        variables
            .get(name)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AppError::Internal(format!("cache key {key} lacks {name}")))
    };
    let num_var = |name: &str| -> Result<f64, AppError> {
        variables
            .get(name)
            .and_then(Value::as_f64)
            .ok_or_else(|| AppError::Internal(format!("cache key {key} lacks {name}")))
    };

    match key.shape {
        QueryShape::AllParkings => backend.all_parkings().await,
        QueryShape::ParkingById => backend.parking_by_id(&str_var("id")?).await,
        QueryShape::ParkingsByCity => backend.parkings_by_city(&str_var("city")?).await,
        QueryShape::NearbyParkings => {
            let query = NearbyQuery::new(
                num_var("latitude")?,
                num_var("longitude")?,
                num_var("maxDistance")?,
            );
            backend.nearby_parkings(&query).await
        }
    }
}
