//! Configuration management.
//!
//! Configuration is layered: built-in defaults, then the TOML config file,
//! then `MANGA_GRAPH_*` environment variables.

mod normalization;

pub use normalization::{
    DEFAULT_MIDDLE_DOT_MAX_PART_CHARS, DEFAULT_ORGANIZATION_TOKENS, NormalizationConfig,
};

use crate::storage::RetryConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration for manga-graph.
#[derive(Debug, Clone)]
pub struct MangaGraphConfig {
    /// Path to the data directory.
    pub data_dir: PathBuf,
    /// Path to the `SQLite` graph database. Defaults to `<data_dir>/graph.db`.
    pub db_path: Option<PathBuf>,
    /// Name normalization settings.
    pub normalization: NormalizationConfig,
    /// Search limits.
    pub search: SearchConfig,
    /// Ingestion settings.
    pub ingest: IngestConfig,
    /// Logging and metrics settings.
    pub observability: ObservabilitySettings,
}

/// Search limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchConfig {
    /// Maximum nodes matched directly by the search term.
    pub max_seed_nodes: usize,
    /// Maximum relationships collected during expansion.
    pub max_relationships: usize,
    /// Expansion depth used when the caller does not pass one.
    pub default_depth: u32,
    /// Maximum entries in a series listing or related-works list.
    pub result_limit: usize,
    /// Publication years two works may differ by and still count as
    /// running in the same magazine period.
    pub related_year_range: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_seed_nodes: 10,
            max_relationships: 50,
            default_depth: 2,
            result_limit: 20,
            related_year_range: 2,
        }
    }
}

/// Ingestion settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    /// Worker threads for batch ingestion.
    pub workers: usize,
    /// Retry policy for conflicting writes.
    pub retry: RetryConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            retry: RetryConfig::default(),
        }
    }
}

/// Logging and metrics settings from the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ObservabilitySettings {
    /// Log filter directive, e.g. `info` or `manga_graph=debug`.
    pub log_level: Option<String>,
    /// `json` or `pretty`.
    pub log_format: Option<String>,
    /// Optional log file path.
    pub log_file: Option<String>,
    /// Whether to record metrics.
    pub metrics_enabled: Option<bool>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Database path.
    pub db_path: Option<String>,
    /// Normalization section.
    pub normalization: Option<ConfigFileNormalization>,
    /// Search section.
    pub search: Option<ConfigFileSearch>,
    /// Ingest section.
    pub ingest: Option<ConfigFileIngest>,
    /// Observability section.
    pub observability: Option<ObservabilitySettings>,
}

/// Normalization section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileNormalization {
    /// Organization tokens; replaces the built-in table.
    pub organization_tokens: Option<Vec<String>>,
    /// Middle-dot split toggle.
    pub split_on_middle_dot: Option<bool>,
    /// Middle-dot part length limit.
    pub middle_dot_max_part_chars: Option<usize>,
}

/// Search section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileSearch {
    /// Seed node cap.
    pub max_seed_nodes: Option<usize>,
    /// Relationship cap.
    pub max_relationships: Option<usize>,
    /// Default depth.
    pub default_depth: Option<u32>,
    /// Listing cap.
    pub result_limit: Option<usize>,
    /// Magazine period window in years.
    pub related_year_range: Option<u32>,
}

/// Ingest section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileIngest {
    /// Worker threads.
    pub workers: Option<usize>,
    /// Retry attempts after the first.
    pub max_retries: Option<u32>,
    /// Base backoff delay in milliseconds.
    pub retry_base_delay_ms: Option<u64>,
}

impl Default for MangaGraphConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".manga-graph"),
            db_path: None,
            normalization: NormalizationConfig::default(),
            search: SearchConfig::default(),
            ingest: IngestConfig::default(),
            observability: ObservabilitySettings::default(),
        }
    }
}

impl MangaGraphConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> crate::Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| crate::Error::OperationFailed {
                operation: "read_config_file".to_string(),
                cause: format!("{}: {e}", path.display()),
            })?;

        Self::from_toml_str(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid configuration TOML.
    pub fn from_toml_str(contents: &str) -> crate::Result<Self> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| crate::Error::OperationFailed {
                operation: "parse_config_file".to_string(),
                cause: e.to_string(),
            })?;

        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the platform config dir (`~/.config/manga-graph/config.toml` on
    /// Linux). Returns defaults if no file is found or it fails to parse.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let path = base_dirs
            .config_dir()
            .join("manga-graph")
            .join("config.toml");
        if path.exists() {
            match Self::load_from_file(&path) {
                Ok(config) => return config,
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Ignoring config file"),
            }
        }

        Self::default()
    }

    /// Converts a `ConfigFile` to `MangaGraphConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(data_dir) = file.data_dir {
            config.data_dir = PathBuf::from(data_dir);
        }
        config.db_path = file.db_path.map(PathBuf::from);

        if let Some(normalization) = file.normalization {
            if let Some(tokens) = normalization.organization_tokens {
                config.normalization.organization_tokens = tokens;
            }
            if let Some(v) = normalization.split_on_middle_dot {
                config.normalization.split_on_middle_dot = v;
            }
            if let Some(v) = normalization.middle_dot_max_part_chars {
                config.normalization.middle_dot_max_part_chars = v;
            }
        }
        if let Some(search) = file.search {
            if let Some(v) = search.max_seed_nodes {
                config.search.max_seed_nodes = v;
            }
            if let Some(v) = search.max_relationships {
                config.search.max_relationships = v;
            }
            if let Some(v) = search.default_depth {
                config.search.default_depth = v;
            }
            if let Some(v) = search.result_limit {
                config.search.result_limit = v;
            }
            if let Some(v) = search.related_year_range {
                config.search.related_year_range = v;
            }
        }
        if let Some(ingest) = file.ingest {
            if let Some(v) = ingest.workers {
                config.ingest.workers = v.max(1);
            }
            if let Some(v) = ingest.max_retries {
                config.ingest.retry.max_retries = v;
            }
            if let Some(v) = ingest.retry_base_delay_ms {
                config.ingest.retry.base_delay_ms = v;
            }
        }
        if let Some(observability) = file.observability {
            config.observability = observability;
        }

        config
    }

    /// Applies `MANGA_GRAPH_*` environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("MANGA_GRAPH_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("MANGA_GRAPH_DB_PATH") {
            self.db_path = Some(PathBuf::from(v));
        }
        if let Some(v) = parse_env::<usize>("MANGA_GRAPH_SEARCH_MAX_SEEDS") {
            self.search.max_seed_nodes = v;
        }
        if let Some(v) = parse_env::<usize>("MANGA_GRAPH_SEARCH_MAX_RELATIONSHIPS") {
            self.search.max_relationships = v;
        }
        if let Some(v) = parse_env::<u32>("MANGA_GRAPH_SEARCH_DEPTH") {
            self.search.default_depth = v;
        }
        if let Some(v) = parse_env::<usize>("MANGA_GRAPH_SEARCH_RESULT_LIMIT") {
            self.search.result_limit = v;
        }
        if let Some(v) = parse_env::<u32>("MANGA_GRAPH_SEARCH_RELATED_YEARS") {
            self.search.related_year_range = v;
        }
        if let Some(v) = parse_env::<usize>("MANGA_GRAPH_INGEST_WORKERS") {
            self.ingest.workers = v.max(1);
        }
        self.ingest.retry = self.ingest.retry.with_env_overrides();
        self.normalization = self.normalization.with_env_overrides();
        self
    }

    /// Returns the database path, defaulting into the data directory.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("graph.db"))
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }

    /// Sets the database path.
    #[must_use]
    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = Some(path.into());
        self
    }

    /// Sets the normalization configuration.
    #[must_use]
    pub fn with_normalization(mut self, normalization: NormalizationConfig) -> Self {
        self.normalization = normalization;
        self
    }

    /// Sets the search configuration.
    #[must_use]
    pub const fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }
}

/// Parses a numeric environment variable, ignoring unparseable values.
fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Parses a boolean environment variable (`1/0`, `true/false`, `yes/no`, `on/off`).
pub(crate) fn parse_bool_env(key: &str) -> Option<bool> {
    let value = std::env::var(key).ok()?;
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
