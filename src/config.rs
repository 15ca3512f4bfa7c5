//! Dialect configuration
//!
//! [`DialectConfig::load`] reads the `[oceanbase]` section of
//! `config/config.toml`, overridden by `LIFEGUARD__OCEANBASE__*` environment
//! variables. Every field has a default, so a missing file or section is fine.

use crate::migration::lock::{LockOptions, DEFAULT_ATTEMPT_TIMEOUT_SECS, DEFAULT_LOCK_PREFIX};
use crate::migration::state_table::{DEFAULT_BASELINE_DESCRIPTION, DEFAULT_BASELINE_VERSION, DEFAULT_TABLE};
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
const SECTION: &str = "oceanbase";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DialectConfig {
    /// Named locks are called `<lock_prefix>-<discriminator>`
    pub lock_prefix: String,
    /// Server-side wait per `GET_LOCK` attempt
    pub lock_attempt_timeout_secs: u32,
    /// Client-side pause between attempts
    pub lock_poll_interval_ms: u64,
    pub table: String,
    /// Schema holding the history table; the connection's current schema when unset
    pub schema: Option<String>,
    pub baseline_version: String,
    pub baseline_description: String,
    /// Recorded as `installed_by`; the session user when unset
    pub installed_by: Option<String>,
    pub tablespace: Option<String>,
    /// Force `CREATE TABLE ... AS SELECT` on or off for the baseline row
    pub atomic_baseline_insert: Option<bool>,
}

impl Default for DialectConfig {
    fn default() -> Self {
        Self {
            lock_prefix: DEFAULT_LOCK_PREFIX.to_string(),
            lock_attempt_timeout_secs: DEFAULT_ATTEMPT_TIMEOUT_SECS,
            lock_poll_interval_ms: 100,
            table: DEFAULT_TABLE.to_string(),
            schema: None,
            baseline_version: DEFAULT_BASELINE_VERSION.to_string(),
            baseline_description: DEFAULT_BASELINE_DESCRIPTION.to_string(),
            installed_by: None,
            tablespace: None,
            atomic_baseline_insert: None,
        }
    }
}

impl DialectConfig {
    /// Load from `config/config.toml`, falling back to env vars.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from the TOML file at `path` (optional) and the environment
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let settings = match Self::builder(Some(path)).build() {
            Ok(cfg) => cfg,
            Err(err) => {
                // An unreadable file should not stop env-only deployments
                if path.exists() {
                    log::warn!(
                        "Failed to load config file {}, falling back to env. Error: {}",
                        path.display(),
                        err
                    );
                }
                Self::builder(None).build().map_err(|env_err| {
                    ConfigError::Message(format!(
                        "Failed to load configuration from file and env: {}, then env-only error: {}",
                        err, env_err
                    ))
                })?
            }
        };

        match settings.get::<DialectConfig>(SECTION) {
            Ok(config) => Ok(config),
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(ConfigError::Message(format!(
                "OceanBase configuration could not be loaded from file or environment: {}",
                e
            ))),
        }
    }

    fn builder(path: Option<&Path>) -> config::ConfigBuilder<config::builder::DefaultState> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }
        builder.add_source(Environment::with_prefix("LIFEGUARD").separator("__"))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.lock_poll_interval_ms)
    }

    pub fn lock_options(&self) -> LockOptions {
        LockOptions {
            prefix: self.lock_prefix.clone(),
            attempt_timeout_secs: self.lock_attempt_timeout_secs,
            poll_interval: self.poll_interval(),
        }
    }
}
