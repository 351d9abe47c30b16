// Error Handling
// "Storms are expected on this coast - name them before they arrive"

use thiserror::Error;

/// Error types for the market data stream server
#[derive(Error, Debug)]
pub enum BeaconError {
    // Exchange errors
    #[error("Transient exchange error ({exchange}): {message}")]
    ExchangeTransient { exchange: String, message: String },

    #[error("Unknown exchange: {exchange}")]
    UnknownExchange { exchange: String },

    // Stream identifier errors
    #[error("Unknown resource kind: {resource}")]
    UnknownResource { resource: String },

    #[error("Invalid stream identifier: {message}")]
    InvalidStreamId { message: String },

    // Indicator errors
    #[error("Insufficient history: needed {needed} samples, found {available}")]
    InsufficientHistory { needed: usize, available: usize },

    // Storage errors
    #[error("Store operation failed: {message}")]
    Store { message: String },

    #[error("Data not available")]
    DataNotAvailable,

    // Transport errors
    #[error("Transport error: {message}")]
    Transport { message: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Invalid timeframe: {value}")]
    InvalidTimeframe { value: String },

    #[error("Data serialization failed: {message}")]
    DataSerialization { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl BeaconError {
    /// Create a transient exchange error
    pub fn exchange_transient<E: Into<String>, M: Into<String>>(exchange: E, message: M) -> Self {
        Self::ExchangeTransient {
            exchange: exchange.into(),
            message: message.into(),
        }
    }

    /// Create an unknown exchange error
    pub fn unknown_exchange<S: Into<String>>(exchange: S) -> Self {
        Self::UnknownExchange {
            exchange: exchange.into(),
        }
    }

    /// Create an unknown resource error
    pub fn unknown_resource<S: Into<String>>(resource: S) -> Self {
        Self::UnknownResource {
            resource: resource.into(),
        }
    }

    /// Create an invalid stream identifier error
    pub fn invalid_stream_id<S: Into<String>>(message: S) -> Self {
        Self::InvalidStreamId {
            message: message.into(),
        }
    }

    /// Create an insufficient history error
    pub fn insufficient_history(needed: usize, available: usize) -> Self {
        Self::InsufficientHistory { needed, available }
    }

    /// Create a store error
    pub fn store<S: Into<String>>(message: S) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an invalid timeframe error
    pub fn invalid_timeframe<S: Into<String>>(value: S) -> Self {
        Self::InvalidTimeframe {
            value: value.into(),
        }
    }

    /// Create a data serialization error
    pub fn data_serialization<S: Into<String>>(message: S) -> Self {
        Self::DataSerialization {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Error category for logs and metrics
    pub fn category(&self) -> &'static str {
        match self {
            Self::ExchangeTransient { .. } | Self::UnknownExchange { .. } => "exchange",
            Self::UnknownResource { .. }
            | Self::InvalidStreamId { .. }
            | Self::InvalidTimeframe { .. } => "stream_id",
            Self::InsufficientHistory { .. } => "indicator",
            Self::Store { .. } | Self::DataNotAvailable => "store",
            Self::Transport { .. } => "transport",
            Self::Configuration { .. } => "configuration",
            Self::DataSerialization { .. } | Self::Internal { .. } => "general",
        }
    }

    /// Whether the retry policy may re-attempt the failed operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ExchangeTransient { .. })
    }
}

impl From<std::io::Error> for BeaconError {
    fn from(error: std::io::Error) -> Self {
        BeaconError::transport(error.to_string())
    }
}

impl From<serde_json::Error> for BeaconError {
    fn from(error: serde_json::Error) -> Self {
        BeaconError::data_serialization(error.to_string())
    }
}

impl From<sqlx::Error> for BeaconError {
    fn from(error: sqlx::Error) -> Self {
        BeaconError::store(error.to_string())
    }
}

impl From<config::ConfigError> for BeaconError {
    fn from(error: config::ConfigError) -> Self {
        BeaconError::configuration(error.to_string())
    }
}

/// Result type alias for convenience
pub type BeaconResult<T> = Result<T, BeaconError>;
