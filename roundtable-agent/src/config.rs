// ABOUTME: Configuration file support for roundtable-agent.
// ABOUTME: Loads backend config from TOML with a [backend] section.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub backend: BackendConfig,
}

/// Backend configuration with type discriminator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    /// Backend type: "echo", "mock", etc.
    #[serde(rename = "type", default = "default_backend_type")]
    pub backend_type: String,

    /// Remaining fields passed to backend factory
    #[serde(flatten)]
    pub config: toml::Table,
}

fn default_backend_type() -> String {
    "echo".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            backend_type: default_backend_type(),
            config: toml::Table::new(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config TOML")
    }
}

impl BackendConfig {
    /// Get backend type name
    pub fn backend_type(&self) -> &str {
        &self.backend_type
    }

    /// Convert config table to serde_json::Value for registry
    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or_else(|_| serde_json::json!({}))
    }
}
