// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Parking listing model, coordinate parsing and boundary conversion.
//!
//! The backend serves two shapes of the same concept: the current
//! `Parking` shape (capacity in `totalSpaces`, a `coordinates` field and a
//! structured address) and the legacy `ParkingSpot` shape (flat
//! `latitude`/`longitude`, `totalSpots`, string address). Payloads are
//! converted into [`ParkingListing`] once, when they leave the backend
//! layer, so nothing downstream inspects field presence again.

use geo::{Distance, Haversine, Point};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Build a validated pair.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(CoordinateError::NonNumeric);
        }
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(CoordinateError::OutOfRange {
                latitude,
                longitude,
            });
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Point in (x = longitude, y = latitude) order.
    pub fn to_point(self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }

    /// Great-circle distance in meters.
    pub fn distance_meters(self, other: Coordinates) -> f64 {
        Haversine.distance(self.to_point(), other.to_point())
    }
}

/// Reasons a coordinate payload could not be read.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoordinateError {
    #[error("coordinates are missing")]
    Missing,

    #[error("coordinates are malformed: {0}")]
    Malformed(String),

    #[error("coordinates are not numeric")]
    NonNumeric,

    #[error("coordinates out of range (lat {latitude}, lng {longitude})")]
    OutOfRange { latitude: f64, longitude: f64 },
}

/// Parse a coordinate payload.
///
/// Accepts a `"lng,lat"` string or a `[lng, lat]` array (GeoJSON order).
/// Total: every input yields either coordinates or a [`CoordinateError`].
pub fn parse_coordinates(input: Option<&Value>) -> Result<Coordinates, CoordinateError> {
    match input {
        None | Some(Value::Null) => Err(CoordinateError::Missing),
        Some(Value::String(text)) => parse_coordinate_text(text),
        Some(Value::Array(items)) => parse_coordinate_pair(items),
        Some(other) => Err(CoordinateError::Malformed(format!(
            "unsupported coordinate value: {other}"
        ))),
    }
}

/// Parse the `"lng,lat"` string form.
pub fn parse_coordinate_text(text: &str) -> Result<Coordinates, CoordinateError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(CoordinateError::Missing);
    }

    let parts: Vec<&str> = text.split(',').map(str::trim).collect();
    let [lng, lat] = parts.as_slice() else {
        return Err(CoordinateError::Malformed(format!(
            "expected \"lng,lat\", got {} part(s)",
            parts.len()
        )));
    };

    let longitude: f64 = lng.parse().map_err(|_| CoordinateError::NonNumeric)?;
    let latitude: f64 = lat.parse().map_err(|_| CoordinateError::NonNumeric)?;
    Coordinates::new(latitude, longitude)
}

fn parse_coordinate_pair(items: &[Value]) -> Result<Coordinates, CoordinateError> {
    let [lng, lat] = items else {
        return Err(CoordinateError::Malformed(format!(
            "expected [lng, lat], got {} element(s)",
            items.len()
        )));
    };
    Coordinates::new(component(lat)?, component(lng)?)
}

fn component(value: &Value) -> Result<f64, CoordinateError> {
    match value {
        Value::Number(n) => n.as_f64().ok_or(CoordinateError::NonNumeric),
        Value::String(s) => s.trim().parse().map_err(|_| CoordinateError::NonNumeric),
        _ => Err(CoordinateError::NonNumeric),
    }
}

/// Structured address of a current-shape listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParkingAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
}

impl fmt::Display for ParkingAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, {} {}, {}",
            self.street, self.city, self.state, self.zip_code, self.country
        )
    }
}

/// Current listing shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Parking {
    pub id: String,
    pub name: String,
    pub description: String,
    pub total_spaces: u32,
    pub available_spaces: u32,
    pub location: Option<Coordinates>,
    pub address: ParkingAddress,
}

/// Legacy listing shape.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyParkingSpot {
    pub id: String,
    pub name: String,
    pub address: String,
    pub location: Option<Coordinates>,
    pub price_per_hour: f64,
    pub is_available: bool,
    pub total_spots: u32,
    pub available_spots: u32,
}

/// Occupancy counters common to both shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacity {
    pub total: u32,
    pub available: u32,
}

/// A parking listing, tagged by the shape it arrived in.
#[derive(Debug, Clone, PartialEq)]
pub enum ParkingListing {
    Current(Parking),
    Legacy(LegacyParkingSpot),
}

impl ParkingListing {
    pub fn id(&self) -> &str {
        match self {
            ParkingListing::Current(p) => &p.id,
            ParkingListing::Legacy(s) => &s.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ParkingListing::Current(p) => &p.name,
            ParkingListing::Legacy(s) => &s.name,
        }
    }

    pub fn location(&self) -> Option<Coordinates> {
        match self {
            ParkingListing::Current(p) => p.location,
            ParkingListing::Legacy(s) => s.location,
        }
    }

    pub fn capacity(&self) -> Capacity {
        match self {
            ParkingListing::Current(p) => Capacity {
                total: p.total_spaces,
                available: p.available_spaces,
            },
            ParkingListing::Legacy(s) => Capacity {
                total: s.total_spots,
                available: s.available_spots,
            },
        }
    }

    pub fn address_line(&self) -> String {
        match self {
            ParkingListing::Current(p) => p.address.to_string(),
            ParkingListing::Legacy(s) => s.address.clone(),
        }
    }

    pub fn has_availability(&self) -> bool {
        match self {
            ParkingListing::Current(p) => p.available_spaces > 0,
            ParkingListing::Legacy(s) => s.is_available && s.available_spots > 0,
        }
    }

    /// Case-insensitive substring match against the name, description and
    /// street, city and state of the address. `needle` must be lowercase.
    pub fn matches_text(&self, needle: &str) -> bool {
        let hit = |field: &str| field.to_lowercase().contains(needle);
        match self {
            ParkingListing::Current(p) => {
                hit(&p.name)
                    || hit(&p.description)
                    || hit(&p.address.street)
                    || hit(&p.address.city)
                    || hit(&p.address.state)
            }
            // Legacy spots carry the whole address as one line.
            ParkingListing::Legacy(s) => hit(&s.name) || hit(&s.address),
        }
    }

    /// Convert one backend record. Returns `None` for records matching
    /// neither shape.
    pub fn from_value(value: &Value) -> Option<Self> {
        let wire: WireListing = match serde_json::from_value(value.clone()) {
            Ok(wire) => wire,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping parking record of unknown shape");
                return None;
            }
        };
        Some(wire.into_listing())
    }

    /// Convert a list payload, skipping unreadable records.
    pub fn list_from_value(value: &Value) -> Vec<Self> {
        match value {
            Value::Array(items) => items.iter().filter_map(Self::from_value).collect(),
            Value::Null => Vec::new(),
            other => {
                tracing::warn!(kind = %value_kind(other), "Expected a list of parkings");
                Vec::new()
            }
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ─── Wire shapes (backend boundary only) ─────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum WireListing {
    Current(WireParking),
    Legacy(WireParkingSpot),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireParking {
    id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    total_spaces: u32,
    available_spaces: u32,
    #[serde(default)]
    coordinates: Option<Value>,
    address: ParkingAddress,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireParkingSpot {
    id: String,
    name: String,
    address: String,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    price_per_hour: f64,
    #[serde(default)]
    is_available: bool,
    total_spots: u32,
    available_spots: u32,
}

impl WireListing {
    fn into_listing(self) -> ParkingListing {
        match self {
            WireListing::Current(p) => {
                let location = match parse_coordinates(p.coordinates.as_ref()) {
                    Ok(c) => Some(c),
                    Err(e) => {
                        tracing::warn!(parking_id = %p.id, error = %e, "Unparseable coordinates");
                        None
                    }
                };
                ParkingListing::Current(Parking {
                    id: p.id,
                    name: p.name,
                    description: p.description.unwrap_or_default(),
                    total_spaces: p.total_spaces,
                    available_spaces: p.available_spaces,
                    location,
                    address: p.address,
                })
            }
            WireListing::Legacy(s) => {
                let location = match Coordinates::new(s.latitude, s.longitude) {
                    Ok(c) => Some(c),
                    Err(e) => {
                        tracing::warn!(parking_id = %s.id, error = %e, "Unparseable coordinates");
                        None
                    }
                };
                ParkingListing::Legacy(LegacyParkingSpot {
                    id: s.id,
                    name: s.name,
                    address: s.address,
                    location,
                    price_per_hour: s.price_per_hour,
                    is_available: s.is_available,
                    total_spots: s.total_spots,
                    available_spots: s.available_spots,
                })
            }
        }
    }
}

/// Variables of a proximity search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyQuery {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "maxDistance")]
    pub max_distance_meters: f64,
}

impl NearbyQuery {
    pub fn new(latitude: f64, longitude: f64, max_distance_meters: f64) -> Self {
        Self {
            latitude,
            longitude,
            max_distance_meters,
        }
    }

    pub fn origin(&self) -> Coordinates {
        Coordinates {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}
