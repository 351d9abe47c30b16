// Beacon - Market Data Stream Server
// "A light on the coast, repeating what it sees to every ship watching"

pub mod api;
pub mod config;
pub mod error;
pub mod exchange;
pub mod fetch;
pub mod indicators;
pub mod logging;
pub mod service;
pub mod store;
pub mod stream_id;
pub mod streams;
pub mod timeframe;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{BeaconError, BeaconResult};
pub use service::DataService;
pub use stream_id::{ResourceKind, StreamId, StreamRequest};
pub use timeframe::Timeframe;
pub use types::{Candle, DataPoint, OhlcvBar};
