//! Which columns a chunk is keyed on and which ones receive results.

use serde_json::{Number, Value as Cell};

use crate::error::{GeoError, Result};
use crate::models::{Coordinates, Feature, FeatureSet, GeocodeMode, Key, Value};
use crate::pipeline::chunk::{cell_as_f64, cell_as_text, is_empty_cell};
use crate::pipeline::Chunk;

// == Key Columns ==
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyColumns {
    Address(String),
    Coordinates { lat: String, lng: String },
}

// == Output Columns ==
/// What a result column holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputField {
    Latitude,
    Longitude,
    Feature(Feature),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputColumn {
    pub field: OutputField,
    pub name: String,
}

// == Pipeline Settings ==
/// Per-run chunk processing settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub key_columns: KeyColumns,
    pub outputs: Vec<OutputColumn>,
    pub batch_enabled: bool,
    /// Ignored unless `batch_enabled`
    pub batch_size: usize,
}

impl PipelineSettings {
    /// Address column in, `<prefix>latitude` and `<prefix>longitude` out.
    pub fn forward(address_column: &str, prefix: &str) -> Self {
        Self {
            key_columns: KeyColumns::Address(address_column.to_string()),
            outputs: vec![
                OutputColumn {
                    field: OutputField::Latitude,
                    name: format!("{}latitude", prefix),
                },
                OutputColumn {
                    field: OutputField::Longitude,
                    name: format!("{}longitude", prefix),
                },
            ],
            batch_enabled: false,
            batch_size: 0,
        }
    }

    /// Coordinate columns in, one `<prefix><feature>` column per feature out.
    pub fn reverse(lat_column: &str, lng_column: &str, features: &[Feature], prefix: &str) -> Self {
        Self {
            key_columns: KeyColumns::Coordinates {
                lat: lat_column.to_string(),
                lng: lng_column.to_string(),
            },
            outputs: features
                .iter()
                .map(|feature| OutputColumn {
                    field: OutputField::Feature(*feature),
                    name: format!("{}{}", prefix, feature.as_str()),
                })
                .collect(),
            batch_enabled: false,
            batch_size: 0,
        }
    }

    pub fn with_batching(mut self, batch_size: usize) -> Self {
        self.batch_enabled = true;
        self.batch_size = batch_size;
        self
    }

    pub fn mode(&self) -> GeocodeMode {
        match self.key_columns {
            KeyColumns::Address(_) => GeocodeMode::Forward,
            KeyColumns::Coordinates { .. } => GeocodeMode::Reverse,
        }
    }

    pub fn key_column_names(&self) -> Vec<&str> {
        match &self.key_columns {
            KeyColumns::Address(address) => vec![address.as_str()],
            KeyColumns::Coordinates { lat, lng } => vec![lat.as_str(), lng.as_str()],
        }
    }

    pub fn output_names(&self) -> Vec<String> {
        self.outputs.iter().map(|o| o.name.clone()).collect()
    }
}

// == Column Layout ==
#[derive(Debug, Clone, Copy)]
enum KeyIndices {
    Address(usize),
    Coordinates { lat: usize, lng: usize },
}

/// Column positions of one prepared chunk.
#[derive(Debug, Clone)]
pub struct ColumnLayout {
    key: KeyIndices,
    outputs: Vec<(OutputField, usize)>,
}

impl ColumnLayout {
    // == Prepare ==
    /// Locates the key columns and makes sure every output column exists,
    /// adding missing ones right after the key column(s).
    pub fn prepare(chunk: &mut Chunk, settings: &PipelineSettings) -> Result<Self> {
        let locate = |chunk: &Chunk, name: &str| {
            chunk.column_index(name).ok_or_else(|| {
                GeoError::InvalidRequest(format!("chunk has no column '{}'", name))
            })
        };

        let key = match &settings.key_columns {
            KeyColumns::Address(address) => KeyIndices::Address(locate(chunk, address)?),
            KeyColumns::Coordinates { lat, lng } => KeyIndices::Coordinates {
                lat: locate(chunk, lat)?,
                lng: locate(chunk, lng)?,
            },
        };
        let anchor = match key {
            KeyIndices::Address(index) => index,
            KeyIndices::Coordinates { lat, lng } => lat.max(lng),
        };

        for name in settings.key_column_names() {
            if settings.outputs.iter().any(|o| o.name == name) {
                return Err(GeoError::InvalidRequest(format!(
                    "column '{}' cannot be both key and output",
                    name
                )));
            }
        }

        // inserting after the anchor leaves the key positions unchanged
        chunk.ensure_columns(anchor, &settings.output_names());

        let outputs = settings
            .outputs
            .iter()
            .map(|o| Ok((o.field, locate(chunk, &o.name)?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { key, outputs })
    }

    // == Read Key ==
    /// Builds the row's key, or explains why it cannot be built.
    pub fn read_key(&self, row: &[Cell]) -> std::result::Result<Key, String> {
        match self.key {
            KeyIndices::Address(index) => cell_as_text(&row[index])
                .map(Key::Address)
                .ok_or_else(|| "empty address".to_string()),
            KeyIndices::Coordinates { lat, lng } => {
                let (lat, lng) = (cell_as_f64(&row[lat]), cell_as_f64(&row[lng]));
                match (lat, lng) {
                    (Some(lat), Some(lng)) => Coordinates::new(lat, lng)
                        .map(Key::Coordinates)
                        .ok_or_else(|| format!("invalid coordinates ({}, {})", lat, lng)),
                    _ => Err("missing or non-numeric coordinates".to_string()),
                }
            }
        }
    }

    // == Existing Value ==
    /// For a row whose output columns are all filled in, returns
    /// `Some(value)` rebuilt from them (`Some(None)` when they cannot be read
    /// back as a value). Returns None when any output is still empty.
    pub fn existing_value(&self, row: &[Cell]) -> Option<Option<Value>> {
        if self.outputs.iter().any(|(_, index)| is_empty_cell(&row[*index])) {
            return None;
        }

        let value = match self.key {
            KeyIndices::Address(_) => {
                let mut lat = None;
                let mut lng = None;
                for (field, index) in &self.outputs {
                    match field {
                        OutputField::Latitude => lat = cell_as_f64(&row[*index]),
                        OutputField::Longitude => lng = cell_as_f64(&row[*index]),
                        OutputField::Feature(_) => {}
                    }
                }
                lat.zip(lng)
                    .and_then(|(lat, lng)| Coordinates::new(lat, lng))
                    .map(Value::LatLng)
            }
            KeyIndices::Coordinates { .. } => {
                let mut features = FeatureSet::new();
                for (field, index) in &self.outputs {
                    if let OutputField::Feature(feature) = field {
                        features.insert(*feature, cell_as_text(&row[*index]));
                    }
                }
                Some(Value::Features(features))
            }
        };
        Some(value)
    }

    // == Write ==
    /// Fills the row's output cells from `value`.
    pub fn write(&self, row: &mut [Cell], value: &Value) {
        for (field, index) in &self.outputs {
            row[*index] = match (field, value) {
                (OutputField::Latitude, Value::LatLng(c)) => number_cell(c.lat),
                (OutputField::Longitude, Value::LatLng(c)) => number_cell(c.lng),
                (OutputField::Feature(feature), Value::Features(features)) => features
                    .get(*feature)
                    .map(|text| Cell::String(text.to_string()))
                    .unwrap_or(Cell::Null),
                _ => Cell::Null,
            };
        }
    }
}

fn number_cell(v: f64) -> Cell {
    Number::from_f64(v).map(Cell::Number).unwrap_or(Cell::Null)
}
