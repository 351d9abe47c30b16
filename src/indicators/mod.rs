// Indicator Engine
// "Pure arithmetic, fed one tick at a time"

pub mod ema;
pub mod macd;

pub use ema::{ema_history, ema_seed, ema_seed_lenient, ema_tick, EmaAccumulator};
pub use macd::{macd_history, MacdAccumulator, MacdPoint};
