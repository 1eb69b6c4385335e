//! Gazetteer Provider
//!
//! Offline provider answering from a JSON lookup table:
//!
//! ```json
//! {
//!   "addresses": { "203 rue de Bercy, Paris": { "lat": 48.84444, "lng": 2.371837 } },
//!   "places": [
//!     { "lat": 48.84444, "lng": 2.371837, "city": "Paris", "postal": "75012", "country": "France" }
//!   ]
//! }
//! ```
//!
//! Address lookups ignore case and repeated whitespace. Coordinate lookups
//! are exact.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{GeoError, Result};
use crate::models::{Coordinates, Feature, FeatureSet, Key, Value};
use crate::provider::{Provider, ProviderError, ProviderSettings};

#[derive(Debug, Default, Deserialize)]
struct GazetteerFile {
    #[serde(default)]
    addresses: HashMap<String, PointRecord>,
    #[serde(default)]
    places: Vec<PlaceRecord>,
}

#[derive(Debug, Deserialize)]
struct PointRecord {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct PlaceRecord {
    lat: f64,
    lng: f64,
    address: Option<String>,
    city: Option<String>,
    postal: Option<String>,
    state: Option<String>,
    country: Option<String>,
}

impl PlaceRecord {
    fn features(self) -> FeatureSet {
        let mut features = FeatureSet::new();
        features.insert(Feature::Address, self.address);
        features.insert(Feature::City, self.city);
        features.insert(Feature::Postal, self.postal);
        features.insert(Feature::State, self.state);
        features.insert(Feature::Country, self.country);
        features
    }
}

// == Gazetteer Provider ==
#[derive(Debug, Default, Clone)]
pub struct GazetteerProvider {
    addresses: HashMap<String, Coordinates>,
    places: HashMap<Coordinates, FeatureSet>,
}

impl GazetteerProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_address(mut self, address: &str, coordinates: Coordinates) -> Self {
        self.addresses.insert(normalize_address(address), coordinates);
        self
    }

    pub fn with_place(mut self, coordinates: Coordinates, features: FeatureSet) -> Self {
        self.places.insert(coordinates, features);
        self
    }

    /// Loads a lookup table from disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let file: GazetteerFile = serde_json::from_str(&raw)?;

        let mut provider = Self::new();
        for (address, point) in file.addresses {
            let coordinates = checked_point(point.lat, point.lng, &address)?;
            provider = provider.with_address(&address, coordinates);
        }
        for place in file.places {
            let coordinates = checked_point(place.lat, place.lng, "place")?;
            provider = provider.with_place(coordinates, place.features());
        }

        info!(
            "Loaded gazetteer {} ({} addresses, {} places)",
            path.display(),
            provider.addresses.len(),
            provider.places.len()
        );
        Ok(provider)
    }

    pub fn from_settings(settings: &ProviderSettings) -> Result<Self> {
        match &settings.gazetteer_path {
            Some(path) => Self::from_path(path),
            None => {
                warn!("No gazetteer table configured; every lookup will miss");
                Ok(Self::new())
            }
        }
    }
}

fn checked_point(lat: f64, lng: f64, entry: &str) -> Result<Coordinates> {
    Coordinates::new(lat, lng).ok_or_else(|| {
        GeoError::Configuration(format!(
            "gazetteer entry '{}' has invalid location ({}, {})",
            entry, lat, lng
        ))
    })
}

fn normalize_address(address: &str) -> String {
    address
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl Provider for GazetteerProvider {
    fn name(&self) -> &str {
        "gazetteer"
    }

    fn supports_batch(&self) -> bool {
        true
    }

    fn resolve_single(&self, key: &Key) -> std::result::Result<Value, ProviderError> {
        match key {
            Key::Address(address) => self
                .addresses
                .get(&normalize_address(address))
                .map(|coordinates| Value::LatLng(*coordinates))
                .ok_or_else(|| ProviderError::NotFound(key.to_string())),
            Key::Coordinates(coordinates) => self
                .places
                .get(coordinates)
                .map(|features| Value::Features(features.clone()))
                .ok_or_else(|| ProviderError::NotFound(key.to_string())),
        }
    }
}
