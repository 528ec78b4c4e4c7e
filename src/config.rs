//! Application-level configuration loading.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::registry::RegistryLocking;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "CHESS_RELAY_CONFIG_PATH";
const DEFAULT_WRITE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_OUTBOUND_BUFFER: usize = 32;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    write_timeout: Duration,
    outbound_buffer: usize,
    registry: RegistryLocking,
    color_seed: Option<u64>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json_str(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        write_timeout_ms = app_config.write_timeout.as_millis() as u64,
                        outbound_buffer = app_config.outbound_buffer,
                        registry = ?app_config.registry,
                        seeded = app_config.color_seed.is_some(),
                        "loaded config"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a JSON configuration document. Missing keys take their defaults.
    pub fn from_json_str(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }

    /// Deadline for queueing and writing a single outbound frame.
    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Capacity of each connection's outbound queue.
    pub fn outbound_buffer(&self) -> usize {
        self.outbound_buffer
    }

    /// Locking strategy of the session registry.
    pub fn registry_locking(&self) -> RegistryLocking {
        self.registry
    }

    /// Seed for creator color assignment, if deterministic colors are wanted.
    pub fn color_seed(&self) -> Option<u64> {
        self.color_seed
    }

    /// Override the color seed.
    pub fn with_color_seed(mut self, seed: u64) -> Self {
        self.color_seed = Some(seed);
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    write_timeout_ms: u64,
    outbound_buffer: usize,
    registry: RegistryLocking,
    color_seed: Option<u64>,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            registry: RegistryLocking::default(),
            color_seed: None,
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            write_timeout: Duration::from_millis(value.write_timeout_ms.max(1)),
            // mpsc channels require a non-zero capacity
            outbound_buffer: value.outbound_buffer.max(1),
            registry: value.registry,
            color_seed: value.color_seed,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
