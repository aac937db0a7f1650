//! Configuration management for the prediction service

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Environment variable overriding the configuration file location
pub const CONFIG_PATH_ENV: &str = "PREDICTION_SERVICE_CONFIG";

/// Prefix for environment overrides, e.g. `PREDICTION_SERVICE__NATS__URL`
const ENV_PREFIX: &str = "PREDICTION_SERVICE";

/// Kind of deployed model, which fixes the response shape
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Class indices, optionally mapped to labels
    #[default]
    Classifier,
    /// Single scalar value with a version tag
    Regressor,
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub nats: NatsConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    #[serde(default = "default_nats_url")]
    pub url: String,
    /// Subject for prediction requests
    #[serde(default = "default_predict_subject")]
    pub predict_subject: String,
    /// Subject for health checks
    #[serde(default = "default_health_subject")]
    pub health_subject: String,
    /// Queue group shared by service replicas
    #[serde(default)]
    pub queue_group: Option<String>,
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_predict_subject() -> String {
    "inference.predict".to_string()
}

fn default_health_subject() -> String {
    "inference.health".to_string()
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: default_nats_url(),
            predict_subject: default_predict_subject(),
            health_subject: default_health_subject(),
            queue_group: None,
        }
    }
}

/// Model configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Path to the ONNX model file
    #[serde(default = "default_model_path")]
    pub path: String,
    /// Classifier or regressor
    #[serde(default)]
    pub kind: ModelKind,
    /// Version tag attached to regression responses
    #[serde(default = "default_model_version")]
    pub version: String,
    /// Label for each class index; empty disables label mapping
    #[serde(default = "default_labels")]
    pub labels: Vec<String>,
    /// Expected feature count, when known ahead of time
    #[serde(default)]
    pub n_features: Option<usize>,
    /// Output to read, overriding the kind-based choice
    #[serde(default)]
    pub output_name: Option<String>,
    /// Number of threads for ONNX inference (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
    /// Retry loading on requests while no model is loaded
    #[serde(default = "default_load_on_demand")]
    pub load_on_demand: bool,
}

fn default_model_path() -> String {
    "models/model.onnx".to_string()
}

fn default_model_version() -> String {
    "v1".to_string()
}

fn default_labels() -> Vec<String> {
    ["setosa", "versicolor", "virginica"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_onnx_threads() -> usize {
    1
}

fn default_load_on_demand() -> bool {
    true
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
            kind: ModelKind::Classifier,
            version: default_model_version(),
            labels: default_labels(),
            n_features: None,
            output_name: None,
            onnx_threads: default_onnx_threads(),
            load_on_demand: default_load_on_demand(),
        }
    }
}

/// Request handling configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Maximum number of requests handled concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Seconds between metrics summaries
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_secs: u64,
}

fn default_workers() -> usize {
    4
}

fn default_metrics_interval() -> u64 {
    30
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            metrics_interval_secs: default_metrics_interval(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default file (or `PREDICTION_SERVICE_CONFIG`)
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(path)
    }

    /// Load configuration from a specific path, with environment overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.service.workers == 0 {
            bail!("service.workers must be at least 1");
        }
        if self.model.n_features == Some(0) {
            bail!("model.n_features must be positive when set");
        }
        if let Some(idx) = self.model.labels.iter().position(|l| l.trim().is_empty()) {
            bail!("model.labels[{}] is empty", idx);
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nats: NatsConfig::default(),
            model: ModelConfig::default(),
            service: ServiceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
