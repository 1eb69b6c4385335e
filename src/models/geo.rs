//! Geographic key and value types
//!
//! Keys identify one resolution request; values are what a provider answers.
//! Both are shared by the cache, the providers and the pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// == Geocode Mode ==
/// Direction of resolution for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeocodeMode {
    /// Address text to coordinates
    Forward,
    /// Coordinates to locality features
    Reverse,
}

impl GeocodeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeocodeMode::Forward => "forward",
            GeocodeMode::Reverse => "reverse",
        }
    }
}

impl fmt::Display for GeocodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GeocodeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forward" => Ok(GeocodeMode::Forward),
            "reverse" => Ok(GeocodeMode::Reverse),
            other => Err(format!("unknown geocoding mode '{}'", other)),
        }
    }
}

// == Coordinates ==
/// A latitude/longitude pair.
///
/// Equality and hashing use the exact bit pattern, so two coordinates match
/// only when they are numerically identical.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    /// Builds a coordinate pair, rejecting non-finite or out-of-range values.
    ///
    /// `-0.0` is folded into `0.0` so both spellings share one cache key.
    pub fn new(lat: f64, lng: f64) -> Option<Self> {
        if !lat.is_finite() || !lng.is_finite() {
            return None;
        }
        if lat.abs() > 90.0 || lng.abs() > 180.0 {
            return None;
        }
        Some(Self {
            lat: fold_negative_zero(lat),
            lng: fold_negative_zero(lng),
        })
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

fn fold_negative_zero(v: f64) -> f64 {
    if v == 0.0 {
        0.0
    } else {
        v
    }
}

impl PartialEq for Coordinates {
    fn eq(&self, other: &Self) -> bool {
        self.lat.to_bits() == other.lat.to_bits() && self.lng.to_bits() == other.lng.to_bits()
    }
}

impl Eq for Coordinates {}

impl Hash for Coordinates {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.lat.to_bits().hash(state);
        self.lng.to_bits().hash(state);
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.lat, self.lng)
    }
}

// == Key ==
/// Cache and provider key for one row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    /// Forward resolution input
    Address(String),
    /// Reverse resolution input
    Coordinates(Coordinates),
}

impl Key {
    pub fn mode(&self) -> GeocodeMode {
        match self {
            Key::Address(_) => GeocodeMode::Forward,
            Key::Coordinates(_) => GeocodeMode::Reverse,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Address(address) => write!(f, "address '{}'", address),
            Key::Coordinates(coords) => write!(f, "location {}", coords),
        }
    }
}

// == Feature ==
/// Locality features a reverse lookup can extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    Address,
    City,
    Postal,
    State,
    Country,
}

impl Feature {
    pub const ALL: [Feature; 5] = [
        Feature::Address,
        Feature::City,
        Feature::Postal,
        Feature::State,
        Feature::Country,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Address => "address",
            Feature::City => "city",
            Feature::Postal => "postal",
            Feature::State => "state",
            Feature::Country => "country",
        }
    }
}

impl FromStr for Feature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Feature::ALL
            .into_iter()
            .find(|f| f.as_str() == wanted)
            .ok_or_else(|| format!("unknown feature '{}'", s.trim()))
    }
}

// == Feature Set ==
/// Reverse resolution result: feature name to text, or null when unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSet(BTreeMap<Feature, Option<String>>);

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, feature: Feature, value: impl Into<String>) -> Self {
        self.insert(feature, Some(value.into()));
        self
    }

    pub fn insert(&mut self, feature: Feature, value: Option<String>) {
        self.0.insert(feature, value);
    }

    /// Returns the text for `feature`, or None when absent or null.
    pub fn get(&self, feature: Feature) -> Option<&str> {
        self.0.get(&feature).and_then(|v| v.as_deref())
    }

    /// True when no feature carries a value.
    pub fn is_blank(&self) -> bool {
        self.0.values().all(Option::is_none)
    }
}

// == Value ==
/// A provider answer, as stored in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    LatLng(Coordinates),
    Features(FeatureSet),
}

impl Value {
    pub fn mode(&self) -> GeocodeMode {
        match self {
            Value::LatLng(_) => GeocodeMode::Forward,
            Value::Features(_) => GeocodeMode::Reverse,
        }
    }

    /// True for answers that carry nothing usable.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::LatLng(coords) => !coords.is_finite(),
            Value::Features(features) => features.is_blank(),
        }
    }
}
