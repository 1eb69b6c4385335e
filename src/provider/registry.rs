//! Provider Registry
//!
//! Closed set of provider identifiers mapped to constructors, resolved once
//! at startup.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::error::{GeoError, Result};
use crate::models::GeocodeMode;
use crate::provider::{GazetteerProvider, Provider};

// == Provider Kind ==
/// Every provider identifier the configuration may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Gazetteer,
    Osm,
    Bing,
    MapQuest,
    UsCensus,
    Here,
    Google,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 7] = [
        ProviderKind::Gazetteer,
        ProviderKind::Osm,
        ProviderKind::Bing,
        ProviderKind::MapQuest,
        ProviderKind::UsCensus,
        ProviderKind::Here,
        ProviderKind::Google,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Gazetteer => "gazetteer",
            ProviderKind::Osm => "osm",
            ProviderKind::Bing => "bing",
            ProviderKind::MapQuest => "mapquest",
            ProviderKind::UsCensus => "uscensus",
            ProviderKind::Here => "here",
            ProviderKind::Google => "google",
        }
    }

    /// Whether the service offers a multi-key endpoint for `mode`.
    pub fn supports_batch(&self, mode: GeocodeMode) -> bool {
        match (self, mode) {
            (ProviderKind::Gazetteer | ProviderKind::Bing, _) => true,
            (ProviderKind::MapQuest | ProviderKind::UsCensus, GeocodeMode::Forward) => true,
            _ => false,
        }
    }

    /// Batch size used when none is configured.
    pub fn default_batch_size(&self) -> usize {
        match self {
            ProviderKind::Bing => 50,
            ProviderKind::MapQuest | ProviderKind::Gazetteer => 100,
            ProviderKind::UsCensus => 1000,
            _ => 0,
        }
    }

    /// Per-batch timeout handed to the provider when none is configured.
    pub fn default_batch_timeout(&self) -> Duration {
        match self {
            ProviderKind::Bing => Duration::from_secs(10),
            ProviderKind::MapQuest => Duration::from_secs(30),
            ProviderKind::UsCensus => Duration::from_secs(1800),
            _ => Duration::ZERO,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| format!("unknown provider '{}'", s.trim()))
    }
}

// == Provider Settings ==
/// Everything a provider constructor may need.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub mode: GeocodeMode,
    pub api_key: Option<String>,
    /// HERE credentials
    pub here_app_id: Option<String>,
    pub here_app_code: Option<String>,
    /// Google premium-plan client credentials
    pub google_client: Option<String>,
    pub google_client_secret: Option<String>,
    pub gazetteer_path: Option<PathBuf>,
    pub batch_timeout: Duration,
}

impl ProviderSettings {
    pub fn new(kind: ProviderKind, mode: GeocodeMode) -> Self {
        Self {
            kind,
            mode,
            api_key: None,
            here_app_id: None,
            here_app_code: None,
            google_client: None,
            google_client_secret: None,
            gazetteer_path: None,
            batch_timeout: kind.default_batch_timeout(),
        }
    }
}

type Constructor = Box<dyn Fn(&ProviderSettings) -> Result<Arc<dyn Provider>> + Send + Sync>;

// == Provider Registry ==
pub struct ProviderRegistry {
    constructors: HashMap<ProviderKind, Constructor>,
}

impl ProviderRegistry {
    /// A registry with no providers at all.
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// A registry holding the providers this crate ships.
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(ProviderKind::Gazetteer, |settings| {
            let provider = GazetteerProvider::from_settings(settings)?;
            Ok(Arc::new(provider) as Arc<dyn Provider>)
        });
        registry
    }

    /// Installs (or replaces) the constructor for `kind`.
    pub fn register<F>(&mut self, kind: ProviderKind, constructor: F) -> &mut Self
    where
        F: Fn(&ProviderSettings) -> Result<Arc<dyn Provider>> + Send + Sync + 'static,
    {
        self.constructors.insert(kind, Box::new(constructor));
        self
    }

    pub fn is_registered(&self, kind: ProviderKind) -> bool {
        self.constructors.contains_key(&kind)
    }

    // == Build ==
    /// Resolves the configured provider into a callable capability.
    pub fn build(&self, settings: &ProviderSettings) -> Result<Arc<dyn Provider>> {
        let constructor = self.constructors.get(&settings.kind).ok_or_else(|| {
            GeoError::Configuration(format!(
                "no constructor registered for provider '{}'",
                settings.kind
            ))
        })?;

        let provider = constructor(settings)?;
        info!(
            "Provider '{}' ready for {} geocoding",
            provider.name(),
            settings.mode
        );
        Ok(provider)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.constructors.keys().map(ProviderKind::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("ProviderRegistry")
            .field("providers", &kinds)
            .finish()
    }
}
