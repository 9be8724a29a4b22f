//! Daemon configuration
//!
//! Layers, lowest first: built-in defaults, optional TOML file (`DATAJOB_CONFIG`),
//! then `DATAJOB_*` environment variables.

use anyhow::{Context, Result};
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const ENV_PREFIX: &str = "DATAJOB";
const CONFIG_PATH_VAR: &str = "DATAJOB_CONFIG";

#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    pub db_path: String,
    pub storage_root: String,
    pub public_base_url: String,
    pub rpc_host: String,
    pub rpc_port: u16,
    pub default_password: String,
    pub task_timeout_secs: u64,
    pub queue_capacity: usize,
    pub retention_days: i64,
    pub maintenance_interval_hours: u64,
    pub max_db_size_mb: f64,
    pub rate_limit_burst: u32,
    pub rate_limit_rate: u32,
    pub log_format: String,
    pub log_dir: Option<String>,
}

impl DaemonConfig {
    /// Load from the file named by `DATAJOB_CONFIG` (if any) and the environment
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_PATH_VAR).ok();
        let builder = Self::defaults()?;
        let builder = match &file {
            Some(path) => builder.add_source(File::new(path, FileFormat::Toml).required(true)),
            None => builder.add_source(File::new("datajob", FileFormat::Toml).required(false)),
        };

        builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    fn defaults() -> Result<ConfigBuilder<config::builder::DefaultState>> {
        Ok(Config::builder()
            .set_default("db_path", "~/.datajob/jobs.db")?
            .set_default("storage_root", "~/.datajob/storage")?
            .set_default("public_base_url", "http://127.0.0.1:9600")?
            .set_default("rpc_host", "127.0.0.1")?
            .set_default("rpc_port", 9600)?
            .set_default("default_password", "password")?
            .set_default("task_timeout_secs", 1800)?
            .set_default("queue_capacity", 256)?
            .set_default("retention_days", 30)?
            .set_default("maintenance_interval_hours", 24)?
            .set_default("max_db_size_mb", 500.0)?
            .set_default("rate_limit_burst", 20)?
            .set_default("rate_limit_rate", 5)?
            .set_default("log_format", "pretty")?)
    }

    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.db_path).into_owned())
    }

    pub fn database_url(&self) -> String {
        format!("sqlite://{}", self.db_path().display())
    }

    pub fn storage_root(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.storage_root).into_owned())
    }

    pub fn log_dir(&self) -> Option<PathBuf> {
        self.log_dir
            .as_deref()
            .map(|dir| PathBuf::from(shellexpand::tilde(dir).into_owned()))
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }
}
