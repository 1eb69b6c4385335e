//! Configuration Module
//!
//! Loads run configuration from environment variables and turns it into the
//! typed settings the cache, provider and pipeline are built from.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::cache::{CacheSettings, EvictionPolicy, DEFAULT_SIZE_LIMIT};
use crate::error::{GeoError, Result};
use crate::models::{Feature, GeocodeMode};
use crate::pipeline::PipelineSettings;
use crate::provider::{ProviderKind, ProviderSettings};

/// Raw configuration values.
///
/// Every value can be set through an environment variable and is kept as
/// written. Nothing is parsed or validated until [`Config::settings`] is
/// called, so a bad value is reported instead of replaced by its default.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// `forward` or `reverse`
    pub geocode_mode: String,
    pub provider: Option<String>,
    pub api_key: Option<String>,
    pub here_app_id: Option<String>,
    pub here_app_code: Option<String>,
    pub google_client: Option<String>,
    pub google_client_secret: Option<String>,
    pub gazetteer_path: Option<PathBuf>,
    pub cache_enabled: String,
    /// Maximum number of cached entries
    pub cache_size_limit: String,
    pub cache_eviction: String,
    /// Directory for the cache journals; None keeps the cache in memory
    pub cache_location: Option<PathBuf>,
    pub batch_enabled: String,
    /// Falls back to the provider's default when unset
    pub batch_size: Option<String>,
    /// Per-batch timeout in seconds
    pub batch_timeout: Option<String>,
    pub address_column: String,
    pub lat_column: String,
    pub lng_column: String,
    pub column_prefix: String,
    /// Comma separated reverse features
    pub features: String,
    /// HTTP server port
    pub server_port: String,
}

/// Validated settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub mode: GeocodeMode,
    pub pipeline: PipelineSettings,
    pub cache: CacheSettings,
    pub provider: ProviderSettings,
    pub server_port: u16,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `GEOCODE_MODE` - `forward` or `reverse` (default: forward)
    /// - `PROVIDER` - provider identifier (required)
    /// - `API_KEY` - provider credential
    /// - `HERE_APP_ID`, `HERE_APP_CODE` - credentials for `here`
    /// - `GOOGLE_CLIENT`, `GOOGLE_CLIENT_SECRET` - client credentials for `google`
    /// - `GAZETTEER_PATH` - lookup table for the gazetteer provider
    /// - `CACHE_ENABLED` - (default: true)
    /// - `CACHE_SIZE_LIMIT` - maximum cached entries (default: 1000000)
    /// - `CACHE_EVICTION` - `least-recently-stored` or `least-frequently-used`
    /// - `CACHE_LOCATION` - journal directory (default: $HOME/.cache/geo_enricher);
    ///   an empty value keeps the cache in memory
    /// - `BATCH_ENABLED` - (default: false)
    /// - `BATCH_SIZE`, `BATCH_TIMEOUT` - (default: per provider)
    /// - `ADDRESS_COLUMN` - (default: address)
    /// - `LAT_COLUMN`, `LNG_COLUMN` - (default: latitude, longitude)
    /// - `COLUMN_PREFIX` - prefix of output columns (default: empty)
    /// - `FEATURES` - e.g. `city,postal,country`
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            geocode_mode: env::var("GEOCODE_MODE").unwrap_or(defaults.geocode_mode),
            provider: non_empty_var("PROVIDER"),
            api_key: non_empty_var("API_KEY"),
            here_app_id: non_empty_var("HERE_APP_ID"),
            here_app_code: non_empty_var("HERE_APP_CODE"),
            google_client: non_empty_var("GOOGLE_CLIENT"),
            google_client_secret: non_empty_var("GOOGLE_CLIENT_SECRET"),
            gazetteer_path: non_empty_var("GAZETTEER_PATH").map(PathBuf::from),
            cache_enabled: env::var("CACHE_ENABLED").unwrap_or(defaults.cache_enabled),
            cache_size_limit: env::var("CACHE_SIZE_LIMIT").unwrap_or(defaults.cache_size_limit),
            cache_eviction: env::var("CACHE_EVICTION").unwrap_or(defaults.cache_eviction),
            cache_location: match env::var("CACHE_LOCATION") {
                Ok(v) if v.trim().is_empty() => None,
                Ok(v) => Some(PathBuf::from(v)),
                Err(_) => defaults.cache_location,
            },
            batch_enabled: env::var("BATCH_ENABLED").unwrap_or(defaults.batch_enabled),
            batch_size: non_empty_var("BATCH_SIZE"),
            batch_timeout: non_empty_var("BATCH_TIMEOUT"),
            address_column: env::var("ADDRESS_COLUMN").unwrap_or(defaults.address_column),
            lat_column: env::var("LAT_COLUMN").unwrap_or(defaults.lat_column),
            lng_column: env::var("LNG_COLUMN").unwrap_or(defaults.lng_column),
            column_prefix: env::var("COLUMN_PREFIX").unwrap_or(defaults.column_prefix),
            features: env::var("FEATURES").unwrap_or(defaults.features),
            server_port: env::var("SERVER_PORT").unwrap_or(defaults.server_port),
        }
    }

    // == Settings ==
    /// Validates the raw values and derives the run settings.
    ///
    /// Any missing or unusable value is a configuration error.
    pub fn settings(&self) -> Result<RunSettings> {
        let mode: GeocodeMode = parse_setting("GEOCODE_MODE", &self.geocode_mode)?;

        let kind: ProviderKind = match &self.provider {
            Some(name) => parse_setting("PROVIDER", name)?,
            None => {
                return Err(GeoError::Configuration(
                    "no provider configured (set PROVIDER)".to_string(),
                ))
            }
        };

        let policy: EvictionPolicy = parse_setting("CACHE_EVICTION", &self.cache_eviction)?;
        let cache_enabled = parse_flag("CACHE_ENABLED", &self.cache_enabled)?;
        let size_limit: i64 = parse_setting("CACHE_SIZE_LIMIT", &self.cache_size_limit)?;
        let batch_enabled = parse_flag("BATCH_ENABLED", &self.batch_enabled)?;
        let batch_size: Option<usize> = self
            .batch_size
            .as_deref()
            .map(|raw| parse_setting("BATCH_SIZE", raw))
            .transpose()?;
        let batch_timeout: Option<u64> = self
            .batch_timeout
            .as_deref()
            .map(|raw| parse_setting("BATCH_TIMEOUT", raw))
            .transpose()?;
        let server_port: u16 = parse_setting("SERVER_PORT", &self.server_port)?;

        let mut pipeline = match mode {
            GeocodeMode::Forward => {
                PipelineSettings::forward(&self.address_column, &self.column_prefix)
            }
            GeocodeMode::Reverse => {
                let features = self.feature_list()?;
                if features.is_empty() {
                    return Err(GeoError::Configuration(
                        "reverse geocoding needs at least one feature (set FEATURES)".to_string(),
                    ));
                }
                PipelineSettings::reverse(
                    &self.lat_column,
                    &self.lng_column,
                    &features,
                    &self.column_prefix,
                )
            }
        };

        for key_column in pipeline.key_column_names() {
            if pipeline.output_names().iter().any(|name| name == key_column) {
                return Err(GeoError::Configuration(format!(
                    "output column '{}' would overwrite a key column",
                    key_column
                )));
            }
        }

        if batch_enabled {
            if kind.supports_batch(mode) {
                let size = batch_size.unwrap_or_else(|| kind.default_batch_size());
                if size == 0 {
                    return Err(GeoError::Configuration(
                        "BATCH_SIZE must be at least 1 when batching is enabled".to_string(),
                    ));
                }
                pipeline = pipeline.with_batching(size);
            } else {
                warn!(
                    "Provider '{}' has no batch endpoint for {} geocoding; resolving one key at a time",
                    kind, mode
                );
            }
        }

        let mut provider = ProviderSettings::new(kind, mode);
        provider.api_key = self.api_key.clone();
        provider.here_app_id = self.here_app_id.clone();
        provider.here_app_code = self.here_app_code.clone();
        provider.google_client = self.google_client.clone();
        provider.google_client_secret = self.google_client_secret.clone();
        provider.gazetteer_path = self.gazetteer_path.clone();
        if let Some(secs) = batch_timeout {
            provider.batch_timeout = Duration::from_secs(secs);
        }

        let cache = CacheSettings {
            enabled: cache_enabled,
            size_limit,
            policy,
            location: self.cache_location.clone(),
        };

        Ok(RunSettings {
            mode,
            pipeline,
            cache,
            provider,
            server_port,
        })
    }

    /// Parses `features`, dropping blanks and repeats.
    fn feature_list(&self) -> Result<Vec<Feature>> {
        let mut features = Vec::new();
        for name in self.features.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let feature: Feature = parse_setting("FEATURES", name)?;
            if !features.contains(&feature) {
                features.push(feature);
            }
        }
        Ok(features)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            geocode_mode: "forward".to_string(),
            provider: None,
            api_key: None,
            here_app_id: None,
            here_app_code: None,
            google_client: None,
            google_client_secret: None,
            gazetteer_path: None,
            cache_enabled: "true".to_string(),
            cache_size_limit: DEFAULT_SIZE_LIMIT.to_string(),
            cache_eviction: EvictionPolicy::default().to_string(),
            cache_location: env::var_os("HOME")
                .map(|home| PathBuf::from(home).join(".cache").join("geo_enricher")),
            batch_enabled: "false".to_string(),
            batch_size: None,
            batch_timeout: None,
            address_column: "address".to_string(),
            lat_column: "latitude".to_string(),
            lng_column: "longitude".to_string(),
            column_prefix: String::new(),
            features: String::new(),
            server_port: "3000".to_string(),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_setting<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| GeoError::Configuration(format!("{} '{}': {}", name, raw.trim(), e)))
}

/// Accepts true/false, yes/no, on/off and 1/0 in any case.
fn parse_flag(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(GeoError::Configuration(format!(
            "{} '{}' is not a boolean",
            name,
            raw.trim()
        ))),
    }
}
