//! Prometheus metrics.
//!
//! Counters are recorded with the `metrics` facade throughout the crate; this
//! module installs the Prometheus recorder so a CLI run can render them.

use crate::config::ObservabilitySettings;
use crate::{Error, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Metrics configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsConfig {
    /// Whether metrics are recorded.
    pub enabled: bool,
}

impl MetricsConfig {
    /// Builds metrics configuration from config settings with env overrides.
    #[must_use]
    pub fn from_settings(settings: Option<&ObservabilitySettings>) -> Self {
        let mut config = Self {
            enabled: settings
                .and_then(|s| s.metrics_enabled)
                .unwrap_or(false),
        };
        if let Some(enabled) = crate::config::parse_bool_env("MANGA_GRAPH_METRICS_ENABLED") {
            config.enabled = enabled;
        }
        config
    }
}

/// Handle to the installed recorder.
#[derive(Debug, Clone)]
pub struct MetricsHandle {
    prometheus: PrometheusHandle,
}

impl MetricsHandle {
    /// Renders all recorded metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.prometheus.render()
    }
}

/// Installs the Prometheus recorder if metrics are enabled.
///
/// # Errors
///
/// Returns an error if a global recorder is already installed.
pub fn install_prometheus(config: &MetricsConfig) -> Result<Option<MetricsHandle>> {
    if !config.enabled {
        return Ok(None);
    }

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::OperationFailed {
            operation: "metrics_recorder_install".to_string(),
            cause: e.to_string(),
        })?;

    Ok(Some(MetricsHandle { prometheus }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_installs_nothing() {
        let handle = install_prometheus(&MetricsConfig { enabled: false }).unwrap();
        assert!(handle.is_none());
    }

    #[test]
    fn test_settings_enable_metrics() {
        let settings = ObservabilitySettings {
            metrics_enabled: Some(true),
            ..Default::default()
        };
        if std::env::var("MANGA_GRAPH_METRICS_ENABLED").is_err() {
            assert!(MetricsConfig::from_settings(Some(&settings)).enabled);
        }
    }
}
