//! Configuration loading

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::ValueEnum;
use cltopo_core::RegistryOptions;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub registry: RegistryOptions,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Which compute runtime the registry talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Topology described by a TOML fixture file
    Fixture,
    /// System OpenCL runtime (needs the `opencl` feature)
    Opencl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend")]
    pub kind: BackendKind,
    /// Fixture file used by the `fixture` backend
    #[serde(default = "default_fixture_path")]
    pub fixture: PathBuf,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: default_backend(),
            fixture: default_fixture_path(),
        }
    }
}

fn default_backend() -> BackendKind {
    if cfg!(feature = "opencl") {
        BackendKind::Opencl
    } else {
        BackendKind::Fixture
    }
}

fn default_fixture_path() -> PathBuf {
    PathBuf::from("./cltopo-fixture.toml")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Save default configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(&Config::default())?;
    std::fs::write(path, content)?;
    Ok(())
}
