//! Configuration loading and path resolution
//!
//! Configuration file resolution follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`MOODMIX_CONFIG`)
//! 3. Platform config directory (`<config_dir>/moodmix/config.toml`)
//! 4. Compiled defaults (fallback)
//!
//! A missing file at the platform location is not an error: the engine starts
//! with compiled defaults and says so once logging is up. An explicitly named file that
//! does not exist is a configuration error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the TOML config file
pub const CONFIG_ENV_VAR: &str = "MOODMIX_CONFIG";

/// Environment variable naming the dataset CSV
pub const DATASET_ENV_VAR: &str = "MOODMIX_DATASET";

/// Root of the TOML configuration file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Path to the tabular track dataset (CSV)
    pub dataset_path: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub schema: SchemaConfig,
    pub cleaning: CleaningConfig,
    pub clustering: ClusteringConfig,
    pub search: SearchConfig,
    pub enrichment: EnrichmentConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// One numeric feature column with optional plausibility bounds
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FeatureColumnConfig {
    pub name: String,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl FeatureColumnConfig {
    /// Column with the built-in bounds for well-known audio features
    pub fn named(name: &str) -> Self {
        let (min, max) = known_bounds(name);
        Self {
            name: name.to_string(),
            min,
            max,
        }
    }
}

/// Audio feature columns of the reference dataset, in vector order
pub const DEFAULT_FEATURES: [&str; 12] = [
    "danceability",
    "energy",
    "key",
    "loudness",
    "mode",
    "speechiness",
    "acousticness",
    "instrumentalness",
    "liveness",
    "valence",
    "tempo",
    "duration_ms",
];

/// Declared plausibility bounds for the reference audio features
///
/// Unknown columns are unbounded.
pub fn known_bounds(name: &str) -> (Option<f64>, Option<f64>) {
    match name {
        "danceability" | "energy" | "speechiness" | "acousticness" | "instrumentalness"
        | "liveness" | "valence" | "mode" => (Some(0.0), Some(1.0)),
        "key" => (Some(-1.0), Some(11.0)),
        "loudness" => (Some(-60.0), Some(10.0)),
        "tempo" => (Some(0.0), Some(300.0)),
        "duration_ms" => (Some(0.0), None),
        _ => (None, None),
    }
}

/// Feature schema section
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchemaConfig {
    pub features: Vec<FeatureColumnConfig>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self::from_names(&DEFAULT_FEATURES)
    }
}

impl SchemaConfig {
    pub fn from_names(names: &[&str]) -> Self {
        Self {
            features: names.iter().map(|n| FeatureColumnConfig::named(n)).collect(),
        }
    }
}

/// Dataset cleaning policy
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CleaningConfig {
    /// Rows with a larger fraction of missing features are dropped.
    /// `0.0` drops any row with a missing feature.
    pub max_missing_fraction: f64,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            max_missing_fraction: 0.0,
        }
    }
}

/// K-means cluster assignment parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Number of clusters
    pub k: usize,
    /// Seed for k-means++ initialization
    pub seed: u64,
    /// Hard cap on Lloyd iterations
    pub max_iterations: usize,
    /// Subsample size for the silhouette estimate in cluster reports
    pub silhouette_sample: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            k: 150,
            seed: 42,
            max_iterations: 300,
            silhouette_sample: 2000,
        }
    }
}

/// Query defaults
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: usize,
    pub default_top_n: usize,
    /// Minimum normalized Levenshtein similarity for the fuzzy title
    /// fallback. `None` disables the fallback.
    pub fuzzy_cutoff: Option<f64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            default_top_n: 10,
            fuzzy_cutoff: Some(0.8),
        }
    }
}

/// External metadata lookups
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// When false, results carry placeholder metadata and no network
    /// calls are made
    pub enabled: bool,
    pub provider_base_url: String,
    pub provider_timeout_ms: u64,
    /// Minimum spacing between provider requests
    pub provider_rate_limit_ms: u64,
    pub video_base_url: String,
    pub video_timeout_ms: u64,
    pub cache_capacity: u64,
    pub cache_ttl_secs: u64,
    pub placeholder_artwork: String,
    /// Artwork size token substituted for the provider's `100x100bb`
    pub artwork_size: String,
    pub user_agent: String,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider_base_url: "https://itunes.apple.com/search".to_string(),
            provider_timeout_ms: 5_000,
            provider_rate_limit_ms: 50,
            video_base_url: "https://www.youtube.com/results".to_string(),
            video_timeout_ms: 10_000,
            cache_capacity: 10_000,
            cache_ttl_secs: 86_400,
            placeholder_artwork: "https://example.com/default_artwork.png".to_string(),
            artwork_size: "300x300bb".to_string(),
            user_agent: concat!("moodmix/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.schema.features.is_empty() {
            return Err(Error::Config("schema.features must not be empty".to_string()));
        }
        for (i, column) in self.schema.features.iter().enumerate() {
            if column.name.trim().is_empty() {
                return Err(Error::Config(format!("schema.features[{}] has an empty name", i)));
            }
            if self.schema.features[..i].iter().any(|c| c.name == column.name) {
                return Err(Error::Config(format!(
                    "schema.features lists '{}' more than once",
                    column.name
                )));
            }
            if let (Some(min), Some(max)) = (column.min, column.max) {
                if !(min <= max) {
                    return Err(Error::Config(format!(
                        "schema feature '{}' has min {} greater than max {}",
                        column.name, min, max
                    )));
                }
            }
        }

        let fraction = self.cleaning.max_missing_fraction;
        if !(0.0..=1.0).contains(&fraction) {
            return Err(Error::Config(format!(
                "cleaning.max_missing_fraction must be within [0, 1], got {}",
                fraction
            )));
        }

        if self.clustering.k == 0 {
            return Err(Error::Config("clustering.k must be at least 1".to_string()));
        }
        if self.clustering.max_iterations == 0 {
            return Err(Error::Config(
                "clustering.max_iterations must be at least 1".to_string(),
            ));
        }

        if self.search.default_limit == 0 || self.search.default_top_n == 0 {
            return Err(Error::Config(
                "search.default_limit and search.default_top_n must be at least 1".to_string(),
            ));
        }
        if let Some(cutoff) = self.search.fuzzy_cutoff {
            if !(0.0..=1.0).contains(&cutoff) {
                return Err(Error::Config(format!(
                    "search.fuzzy_cutoff must be within [0, 1], got {}",
                    cutoff
                )));
            }
        }

        let e = &self.enrichment;
        if e.provider_timeout_ms == 0 || e.video_timeout_ms == 0 {
            return Err(Error::Config(
                "enrichment timeouts must be greater than zero".to_string(),
            ));
        }
        if e.cache_capacity == 0 || e.cache_ttl_secs == 0 {
            return Err(Error::Config(
                "enrichment cache must have a non-zero capacity and TTL".to_string(),
            ));
        }

        Ok(())
    }
}

/// Platform location of the config file (`<config_dir>/moodmix/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("moodmix").join("config.toml"))
}

/// Where the effective configuration comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    CommandLine(PathBuf),
    Environment(PathBuf),
    Platform(PathBuf),
    /// No file found; `searched` is the platform path when one is known
    Defaults { searched: Option<PathBuf> },
}

impl ConfigSource {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigSource::CommandLine(p) | ConfigSource::Environment(p) | ConfigSource::Platform(p) => {
                Some(p)
            }
            ConfigSource::Defaults { .. } => None,
        }
    }

    pub fn load(&self) -> Result<TomlConfig> {
        match self.path() {
            Some(path) => load_config_file(path),
            None => Ok(TomlConfig::default()),
        }
    }

    /// Log the outcome; call once a subscriber is installed
    pub fn log(&self) {
        match self {
            ConfigSource::CommandLine(p) => info!("Configuration from --config {}", p.display()),
            ConfigSource::Environment(p) => {
                info!("Configuration from {} {}", CONFIG_ENV_VAR, p.display())
            }
            ConfigSource::Platform(p) => info!("Configuration from {}", p.display()),
            ConfigSource::Defaults { searched: Some(p) } => {
                info!("No config file at {}, using compiled defaults", p.display())
            }
            ConfigSource::Defaults { searched: None } => {
                warn!("Could not determine config directory, using compiled defaults")
            }
        }
    }
}

/// Pick the config file following the documented priority order
pub fn locate_config(cli_arg: Option<&Path>) -> ConfigSource {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return ConfigSource::CommandLine(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return ConfigSource::Environment(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    match default_config_path() {
        Some(path) if path.exists() => ConfigSource::Platform(path),
        // Priority 4: Compiled defaults
        searched => ConfigSource::Defaults { searched },
    }
}

/// Load configuration following the documented priority order
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    locate_config(cli_arg).load()
}

/// Read and validate one TOML config file
pub fn load_config_file(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Read config {} failed: {}", path.display(), e))
    })?;
    TomlConfig::from_toml_str(&content)
}

/// Resolve the dataset path: CLI → `MOODMIX_DATASET` → TOML `dataset_path`
pub fn resolve_dataset_path(cli_arg: Option<&Path>, config: &TomlConfig) -> Result<PathBuf> {
    if let Some(path) = cli_arg {
        return Ok(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(DATASET_ENV_VAR) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    config.dataset_path.clone().ok_or_else(|| {
        Error::Config(format!(
            "Dataset path not configured. Use one of:\n\
             1. Command line: --dataset /path/to/tracks.csv\n\
             2. Environment: {}=/path/to/tracks.csv\n\
             3. TOML config: dataset_path = \"/path/to/tracks.csv\"",
            DATASET_ENV_VAR
        ))
    })
}

/// Write configuration atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, target: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut temp = target.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    std::fs::write(&temp, content)?;
    std::fs::rename(&temp, target)?;
    Ok(())
}
