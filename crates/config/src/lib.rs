//! Top-level configuration: `Config { network, processing, store }`, loaded
//! from and saved to a single TOML file, following the nested-struct /
//! `camino` UTF-8 path pattern the network layer's own config already uses.

pub mod dirs;

use camino::{Utf8Path, Utf8PathBuf};
use eyre::{Result as EyreResult, WrapErr};
use serde::{Deserialize, Serialize};
use taskmesh_network::NetworkConfig;
use taskmesh_processing::ProcessingConfig;
use taskmesh_store::config::StoreConfig;

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    pub store: StoreConfig,
}

impl Config {
    #[must_use]
    pub const fn new(network: NetworkConfig, processing: ProcessingConfig, store: StoreConfig) -> Self {
        Self {
            network,
            processing,
            store,
        }
    }

    #[must_use]
    pub fn exists(dir: &Utf8Path) -> bool {
        dir.join(CONFIG_FILE).is_file()
    }

    pub fn load(dir: &Utf8Path) -> EyreResult<Self> {
        let path = dir.join(CONFIG_FILE);
        let content = std::fs::read_to_string(&path).wrap_err_with(|| format!("failed to read configuration from {path:?}"))?;
        toml::from_str(&content).map_err(Into::into)
    }

    pub fn save(&self, dir: &Utf8Path) -> EyreResult<()> {
        let path = dir.join(CONFIG_FILE);
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content).wrap_err_with(|| format!("failed to write configuration to {path:?}"))?;
        Ok(())
    }

    /// Writes the file only if its serialized form differs from what is
    /// already on disk; returns whether a write occurred.
    pub fn save_if_changed(&self, dir: &Utf8Path) -> EyreResult<bool> {
        let path = dir.join(CONFIG_FILE);
        let new_content = toml::to_string_pretty(self)?;

        let changed = match std::fs::read_to_string(&path) {
            Ok(existing) => existing != new_content,
            Err(_) => true,
        };

        if changed {
            std::fs::write(&path, new_content).wrap_err_with(|| format!("failed to write configuration to {path:?}"))?;
        }

        Ok(changed)
    }
}

#[must_use]
pub fn default_store_path(dir: &Utf8Path) -> Utf8PathBuf {
    dir.join("data")
}
