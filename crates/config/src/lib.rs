//! Configuration management for metricflow

use chrono::Weekday;
use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use metricflow_types::MetricConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricflowConfig {
    /// Engine settings shared by every metric run
    #[serde(default)]
    pub engine: EngineConfig,

    /// Logging settings
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Metric definitions
    #[serde(default)]
    pub metrics: Vec<MetricConfig>,
}

impl MetricflowConfig {
    /// Load configuration from file and environment
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(path) = config_path {
            figment = figment.merge(Yaml::file(path));
        }

        // Environment overrides, e.g. METRICFLOW_ENGINE__TIMEZONE=Europe/Berlin
        figment = figment.merge(Env::prefixed("METRICFLOW_").split("__"));

        figment.extract().map_err(|e| ConfigError::LoadError(e.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        self.observability.validate()?;

        for metric in &self.metrics {
            if metric.name.is_empty() {
                return Err(ConfigError::ValidationError("Metric name required".to_string()));
            }
            if metric.calculators.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "Metric {} declares no calculators",
                    metric.name
                )));
            }
        }

        Ok(())
    }

    /// Find a metric definition by name
    pub fn metric(&self, name: &str) -> Option<&MetricConfig> {
        self.metrics.iter().find(|m| m.name == name)
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// IANA timezone used for calendar bucketing
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// First day of the week for weekly buckets
    #[serde(default = "default_week_start")]
    pub week_start: String,

    /// Upper bound on concurrently computed buckets
    #[serde(default = "default_max_parallelism")]
    pub max_parallelism: usize,

    /// Loader timeout in milliseconds
    #[serde(default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_week_start() -> String {
    "monday".to_string()
}

fn default_max_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_load_timeout_ms() -> u64 {
    30_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            week_start: default_week_start(),
            max_parallelism: default_max_parallelism(),
            load_timeout_ms: default_load_timeout_ms(),
        }
    }
}

impl EngineConfig {
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    pub fn with_week_start(mut self, week_start: impl Into<String>) -> Self {
        self.week_start = week_start.into();
        self
    }

    pub fn with_max_parallelism(mut self, max_parallelism: usize) -> Self {
        self.max_parallelism = max_parallelism;
        self
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Parsed first day of the week
    pub fn week_start_day(&self) -> Result<Weekday> {
        self.week_start.parse::<Weekday>().map_err(|_| {
            ConfigError::ValidationError(format!("Invalid week start: {}", self.week_start))
        })
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    /// Validate engine configuration
    pub fn validate(&self) -> Result<()> {
        self.week_start_day()?;

        if self.max_parallelism == 0 {
            return Err(ConfigError::ValidationError(
                "max_parallelism must be greater than 0".to_string(),
            ));
        }

        if self.load_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "load_timeout_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level or filter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable structured JSON logging
    #[serde(default)]
    pub json_logging: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: false,
        }
    }
}

impl ObservabilityConfig {
    pub fn validate(&self) -> Result<()> {
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::ValidationError("log_level must not be empty".to_string()));
        }
        Ok(())
    }
}
