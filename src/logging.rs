// Structured Logging Setup

use crate::config::LoggingConfig;
use crate::error::{BeaconError, BeaconResult};
use tracing_subscriber::EnvFilter;

/// Initialise the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set. Call once from the
/// binary; a second call fails.
pub fn init_logging(config: &LoggingConfig) -> BeaconResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| {
            BeaconError::configuration(format!("invalid log level '{}': {e}", config.level))
        })?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let initialised = match config.format.as_str() {
        "json" => builder.json().try_init(),
        "compact" => builder.compact().try_init(),
        _ => builder.try_init(),
    };

    initialised
        .map_err(|e| BeaconError::configuration(format!("logging initialisation failed: {e}")))
}
