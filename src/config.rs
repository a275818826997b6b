//! Configuration management for the churn prediction service

use crate::types::{Industry, RiskLevelThresholds};
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default configuration file, overridable with `CHURN_CONFIG`
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub artifacts: ArtifactsConfig,
    pub storage: StorageConfig,
    pub scoring: ScoringConfig,
    pub training: TrainingConfig,
    pub generator: GeneratorConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// CORS origins; empty allows any origin
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            allowed_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Location of the fitted scaler and model files
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    pub dir: PathBuf,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("models"),
        }
    }
}

/// Location of aggregated feature tables and identity mappings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

/// Risk tier classification
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub risk_levels: RiskLevelThresholds,
}

/// Offline trainer settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// L2 regularisation strength of the logistic regression
    pub l2_penalty: f64,
    /// Optimizer iteration cap
    pub max_iterations: u64,
    pub gradient_tolerance: f64,
    /// Share of customers held out for evaluation
    pub test_fraction: f64,
    pub seed: u64,
    pub outlier_columns: OutlierColumns,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            l2_penalty: 1.0,
            max_iterations: 200,
            gradient_tolerance: 1e-4,
            test_fraction: 0.2,
            seed: 42,
            outlier_columns: OutlierColumns::default(),
        }
    }
}

/// Columns the outlier normalizer is fitted on, per industry
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutlierColumns {
    pub telecom: Vec<String>,
    pub insurance: Vec<String>,
}

impl OutlierColumns {
    pub fn for_industry(&self, industry: Industry) -> &[String] {
        match industry {
            Industry::Telecom => &self.telecom,
            Industry::Insurance => &self.insurance,
        }
    }
}

impl Default for OutlierColumns {
    fn default() -> Self {
        Self {
            telecom: Industry::Telecom
                .feature_order()
                .iter()
                .map(|s| s.to_string())
                .collect(),
            insurance: ["customer_age", "vehicle_value", "avg_claim_processing"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Synthetic dataset settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub customers: usize,
    pub seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            customers: 6000,
            seed: 42,
        }
    }
}

/// Periodic metrics summary
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Seconds between summaries; 0 disables the reporter
    pub report_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 60,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `CHURN_CONFIG` or the default path
    pub fn load() -> Result<Self> {
        let path = std::env::var("CHURN_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(path)
    }

    /// Load configuration from a specific path.
    ///
    /// A missing file falls back to defaults; `CHURN__SECTION__KEY`
    /// environment variables override both.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix("CHURN")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.allowed_origins"),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.scoring
            .risk_levels
            .validate()
            .context("Invalid scoring.risk_levels")?;

        if !(0.0..1.0).contains(&self.training.test_fraction) || self.training.test_fraction == 0.0 {
            anyhow::bail!(
                "training.test_fraction must be in (0, 1), got {}",
                self.training.test_fraction
            );
        }
        if self.training.max_iterations == 0 || self.training.gradient_tolerance <= 0.0 {
            anyhow::bail!("training.max_iterations and training.gradient_tolerance must be positive");
        }
        if self.training.l2_penalty < 0.0 {
            anyhow::bail!("training.l2_penalty must not be negative");
        }
        for industry in Industry::ALL {
            for column in self.training.outlier_columns.for_industry(industry) {
                if !industry.feature_order().contains(&column.as_str()) {
                    anyhow::bail!("unknown outlier column '{}' for {}", column, industry);
                }
            }
        }
        Ok(())
    }
}
