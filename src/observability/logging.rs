//! Structured logging configuration.

use crate::config::ObservabilitySettings;
use std::path::PathBuf;

/// Default filter when neither the config nor the environment sets one.
const DEFAULT_FILTER: &str = "warn,manga_graph=info";

/// Filter used with `--verbose`.
const VERBOSE_FILTER: &str = "info,manga_graph=debug";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Human-readable output.
    #[default]
    Pretty,
}

impl LogFormat {
    /// Parses a format name; unknown names fall back to pretty.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// `EnvFilter` directive string.
    pub filter: String,
    /// Optional file to append logs to instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: DEFAULT_FILTER.to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Builds logging configuration from config settings with env overrides.
    ///
    /// Precedence: `MANGA_GRAPH_LOG*` env, then `--verbose`, then the file.
    #[must_use]
    pub fn from_settings(settings: Option<&ObservabilitySettings>, verbose: bool) -> Self {
        let mut config = Self::default();

        if let Some(settings) = settings {
            if let Some(level) = &settings.log_level {
                config.filter.clone_from(level);
            }
            if let Some(format) = &settings.log_format {
                config.format = LogFormat::parse(format);
            }
            config.file = settings.log_file.as_ref().map(PathBuf::from);
        }

        if verbose {
            config.filter = VERBOSE_FILTER.to_string();
        }

        if let Ok(filter) = std::env::var("MANGA_GRAPH_LOG") {
            if !filter.trim().is_empty() {
                config.filter = filter;
            }
        }
        if let Ok(format) = std::env::var("MANGA_GRAPH_LOG_FORMAT") {
            config.format = LogFormat::parse(&format);
        }
        if let Ok(file) = std::env::var("MANGA_GRAPH_LOG_FILE") {
            config.file = (!file.trim().is_empty()).then(|| PathBuf::from(file));
        }

        config
    }
}
