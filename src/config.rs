// Configuration Management

use crate::error::{BeaconError, BeaconResult};
use crate::fetch::{FetchOptions, RetryPolicy};
use config::{Config as RawConfig, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration, assembled from `config/default.toml`, an
/// optional explicit file and `BEACON__`-prefixed environment variables
/// (e.g. `BEACON__SERVER__API_PORT=8080`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub fetch: FetchConfig,
    pub logging: LoggingConfig,
}

/// Bind addresses and the subscription port range
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub api_port: u16,
    pub subscription_port_base: u16,
    pub subscription_port_limit: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            api_port: 5000,
            subscription_port_base: 5100,
            subscription_port_limit: 6000,
        }
    }
}

/// Candle and fetch-set persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx-style URL, e.g. `sqlite://beacon.db`
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://beacon.db".to_string(),
        }
    }
}

/// Fetch scheduler tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Start the persisted fetch set on boot
    pub autostart: bool,
    /// RFC 3339 instant where historical backfill begins
    pub backfill_epoch: String,
    /// Fraction of the timeframe to sleep between live polls
    pub poll_factor: f64,
    /// Pause between retries of a failed exchange call
    pub retry_backoff_ms: u64,
    /// Total attempts per exchange call; absent means retry forever
    pub retry_max_attempts: Option<u32>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            autostart: true,
            backfill_epoch: "2017-01-01T00:00:00Z".to_string(),
            poll_factor: 0.9,
            retry_backoff_ms: 1_000,
            retry_max_attempts: None,
        }
    }
}

impl FetchConfig {
    /// Resolve into the runtime options handed to the scheduler
    pub fn options(&self) -> BeaconResult<FetchOptions> {
        let epoch = chrono::DateTime::parse_from_rfc3339(&self.backfill_epoch)
            .map_err(|e| {
                BeaconError::configuration(format!(
                    "invalid fetch.backfill_epoch '{}': {e}",
                    self.backfill_epoch
                ))
            })?
            .timestamp_millis();

        let backoff = Duration::from_millis(self.retry_backoff_ms);
        let retry = match self.retry_max_attempts {
            Some(max) => RetryPolicy::bounded(max, backoff),
            None => RetryPolicy::unbounded(backoff),
        };

        Ok(FetchOptions {
            backfill_epoch_ms: epoch,
            poll_factor: self.poll_factor,
            retry,
        })
    }
}

/// Log level and output format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error; also accepts env-filter directives
    pub level: String,
    /// pretty, compact or json
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load and validate configuration.
    ///
    /// Layering, weakest first: `config/default.toml` (optional), the
    /// explicit file when given, then environment variables.
    pub fn load(explicit_file: Option<&Path>) -> BeaconResult<Self> {
        let mut builder =
            RawConfig::builder().add_source(File::with_name("config/default").required(false));

        if let Some(path) = explicit_file {
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(Environment::with_prefix("BEACON").separator("__"));

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BeaconResult<()> {
        if self.server.subscription_port_base > self.server.subscription_port_limit {
            return Err(BeaconError::configuration(format!(
                "subscription port range is inverted: {}..={}",
                self.server.subscription_port_base, self.server.subscription_port_limit
            )));
        }
        if !(self.fetch.poll_factor > 0.0 && self.fetch.poll_factor <= 1.0) {
            return Err(BeaconError::configuration(format!(
                "fetch.poll_factor must be within (0, 1], got {}",
                self.fetch.poll_factor
            )));
        }
        match self.logging.format.as_str() {
            "pretty" | "compact" | "json" => {}
            other => {
                return Err(BeaconError::configuration(format!(
                    "unknown logging.format '{other}', expected pretty, compact or json"
                )));
            }
        }
        // Fail on an unparseable epoch at load time, not at first fetch.
        self.fetch.options().map(|_| ())
    }
}
