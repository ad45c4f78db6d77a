use figment::{Figment, providers::{Format, Toml, Env}};
use serde::Deserialize;
use std::time::Duration;
use tasksync_core::sync::SyncConfig;

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// Where to mirror today's list for the home-screen widget. Off when unset.
    #[serde(default)]
    pub widget_path: Option<String>,
    /// Fallback filter when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Longest a command waits for the startup preload before fetching on its own
    #[serde(default = "default_preload_wait_ms")]
    pub preload_wait_ms: u64,
}

fn default_database_path() -> String {
    "tasksync.db".to_string()
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_preload_wait_ms() -> u64 {
    3_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            widget_path: None,
            log_level: default_log_level(),
            preload_wait_ms: default_preload_wait_ms(),
        }
    }
}

impl Config {
    pub fn new() -> Result<Self, figment::Error> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file("tasksync.toml"))
                .merge(Env::prefixed("TASKSYNC_")),
        )
    }

    pub fn from_figment(figment: Figment) -> Result<Self, figment::Error> {
        figment.extract()
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            preload_wait: Duration::from_millis(self.preload_wait_ms),
            ..Default::default()
        }
    }
}
