// MACD - Moving Average Convergence/Divergence

use crate::error::BeaconResult;
use crate::indicators::ema::{ema_history, EmaAccumulator};

/// One MACD tick: the fast/slow EMA difference plus momentum flags
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdPoint {
    pub macd: f64,
    pub ema_fast: f64,
    pub ema_slow: f64,
    /// The sign of the MACD flipped since the previous tick
    pub cross: bool,
    /// The MACD is above zero
    pub rising: bool,
}

/// Two EMA accumulators sharing one input stream.
///
/// `cross` compares against the MACD of the seeded state on the first tick,
/// so a sign flip between warm-up history and the first live value is
/// detected like any other.
#[derive(Debug, Clone)]
pub struct MacdAccumulator {
    fast: EmaAccumulator,
    slow: EmaAccumulator,
    previous_macd: f64,
}

impl MacdAccumulator {
    /// Seed both EMAs from trailing raw history.
    ///
    /// `history` must hold at least `slow_window` samples (the fast EMA seeds
    /// from the trailing `fast_window` of the same slice); fails with
    /// `InsufficientHistory` otherwise.
    pub fn seed(fast_window: usize, slow_window: usize, history: &[f64]) -> BeaconResult<Self> {
        let slow = EmaAccumulator::seed(slow_window, history)?;
        let fast = EmaAccumulator::seed(fast_window, history)?;
        let previous_macd = fast.value() - slow.value();
        Ok(Self {
            fast,
            slow,
            previous_macd,
        })
    }

    /// Advance both EMAs by one incoming value
    pub fn tick(&mut self, incoming: f64) -> MacdPoint {
        let ema_fast = self.fast.tick(incoming);
        let ema_slow = self.slow.tick(incoming);
        let macd = ema_fast - ema_slow;

        let cross = (self.previous_macd > 0.0) != (macd > 0.0);
        let rising = macd > 0.0;
        self.previous_macd = macd;

        MacdPoint {
            macd,
            ema_fast,
            ema_slow,
            cross,
            rising,
        }
    }

    /// The MACD value of the current state
    pub fn macd(&self) -> f64 {
        self.fast.value() - self.slow.value()
    }
}

/// MACD over a complete series, for historical range queries.
///
/// Both EMAs start at the first value of the series, so the MACD warms up
/// from zero over the first bars; `cross` on index 0 is defined as false.
pub fn macd_history(fast_window: usize, slow_window: usize, values: &[f64]) -> Vec<MacdPoint> {
    let fast = ema_history(fast_window, values);
    let slow = ema_history(slow_window, values);

    let mut points = Vec::with_capacity(values.len());
    let mut previous_macd = 0.0;
    for (index, (ema_fast, ema_slow)) in fast.into_iter().zip(slow).enumerate() {
        let macd = ema_fast - ema_slow;
        points.push(MacdPoint {
            macd,
            ema_fast,
            ema_slow,
            cross: index > 0 && (previous_macd > 0.0) != (macd > 0.0),
            rising: macd > 0.0,
        });
        previous_macd = macd;
    }
    points
}
