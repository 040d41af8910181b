//! Runtime configuration
//!
//! Settings come from TOML layers merged in order, later layers winning key
//! by key: `config/main/settings.toml`, `config/local/settings.toml`, then
//! every `*.toml` of an optional extra directory in file-name order. Missing
//! layers are skipped.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{BenchError, Result};

pub const MAIN_SETTINGS: &str = "config/main/settings.toml";
pub const LOCAL_SETTINGS: &str = "config/local/settings.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub dispatcher: DispatcherConfig,
    pub logging: LoggingConfig,
    pub mysql: MySqlConfig,
    pub postgres: PostgresConfig,
    pub duckdb: DuckDbConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Size of the worker pool shared by all backends
    pub workers: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { workers: 5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MySqlConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub pool_size: usize,
}

impl Default for MySqlConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: String::new(),
            database: "tpch".to_string(),
            pool_size: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub pool_size: usize,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            database: "tpch".to_string(),
            pool_size: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DuckDbConfig {
    pub enabled: bool,
    pub path: PathBuf,
}

impl Default for DuckDbConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: PathBuf::from("tpch.duckdb"),
        }
    }
}

impl Config {
    /// Load a single TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(contents).map_err(|e| BenchError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Merge `layers` in order; files that do not exist are skipped
    pub fn load_layered(layers: &[PathBuf]) -> Result<Self> {
        let mut merged = toml::Value::Table(toml::map::Map::new());
        for path in layers {
            if !path.is_file() {
                tracing::debug!("Config layer {:?} not found, skipping", path);
                continue;
            }
            let contents = std::fs::read_to_string(path)?;
            let layer: toml::Value = toml::from_str(&contents)
                .map_err(|e| BenchError::Config(format!("{}: {}", path.display(), e)))?;
            tracing::debug!("Merging config layer {:?}", path);
            merge(&mut merged, layer);
        }

        let config: Config = merged
            .try_into()
            .map_err(|e: toml::de::Error| BenchError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Standard layer list rooted at `base`, plus the `*.toml` files of `extra_dir`
    pub fn layer_paths(base: &Path, extra_dir: Option<&Path>) -> Result<Vec<PathBuf>> {
        let mut layers = vec![base.join(MAIN_SETTINGS), base.join(LOCAL_SETTINGS)];
        if let Some(dir) = extra_dir.filter(|d| d.is_dir()) {
            let mut extra: Vec<PathBuf> = std::fs::read_dir(dir)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().map_or(false, |ext| ext == "toml"))
                .collect();
            extra.sort();
            layers.extend(extra);
        }
        Ok(layers)
    }

    pub fn discover(base: &Path, extra_dir: Option<&Path>) -> Result<Self> {
        Self::load_layered(&Self::layer_paths(base, extra_dir)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dispatcher.workers == 0 {
            return Err(BenchError::Config("dispatcher.workers must be at least 1".into()));
        }
        if self.mysql.pool_size == 0 || self.postgres.pool_size == 0 {
            return Err(BenchError::Config("pool_size must be at least 1".into()));
        }
        Ok(())
    }
}

/// Deep-merge `overlay` into `base`; tables merge per key, anything else is replaced
fn merge(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
