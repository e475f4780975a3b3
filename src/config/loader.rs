//! Loads a `Config` from a TOML file, environment variables, and an
//! optional `.env` file, in that precedence order. Grounded on
//! `src/config/loader.rs`'s `ConfigLoader` (wrapping the `config` crate
//! plus `dotenv`) and `src/config/builder.rs`'s `load_from_file` style.

use config::{Config as RawConfig, Environment, File};
use log::info;

use super::Config;
use crate::error::EngineError;

pub struct ConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            builder: RawConfig::builder(),
        }
    }

    pub fn with_file(mut self, path: &str) -> Self {
        self.builder = self.builder.add_source(File::with_name(path).required(false));
        self
    }

    /// Reads `GRID_*` environment variables, e.g. `GRID_NUM_GRIDS=7`.
    pub fn with_environment(mut self) -> Self {
        self.builder = self
            .builder
            .add_source(Environment::with_prefix("GRID").separator("_"));
        self
    }

    pub fn with_env_file(self, path: &str) -> Self {
        match dotenv::from_filename(path) {
            Ok(_) => info!("loaded env file {}", path),
            Err(err) => info!("no env file at {} ({})", path, err),
        }
        self
    }

    pub fn build(self) -> crate::error::Result<Config> {
        let raw = self
            .builder
            .build()
            .map_err(|e| EngineError::Config(e.to_string()))?;
        let config: Config = raw
            .try_deserialize()
            .map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate_ranges()?;
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
