// ⚙️ Configuration - explicit values built once at startup
// Binaries read an optional JSON file, apply CLI/env overrides, then hand
// these structs to the components that need them.

use crate::temporal::DEFAULT_HORIZON_DAYS;
use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Settings for the HTTP prediction server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub model_path: PathBuf,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            bind_addr: "0.0.0.0:8000".to_string(),
            model_path: PathBuf::from("models/model.json"),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

/// Settings for the offline feature pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Length of the label window before the latest transaction
    pub horizon_days: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            horizon_days: DEFAULT_HORIZON_DAYS,
        }
    }
}

/// Top-level config file layout; every section is optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.pipeline.horizon_days > 0,
            "pipeline.horizon_days must be positive, got {}",
            self.pipeline.horizon_days
        );
        ensure!(!self.service.bind_addr.is_empty(), "service.bind_addr must not be empty");
        Ok(())
    }
}
