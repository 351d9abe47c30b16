// Exponential Moving Average

use crate::error::{BeaconError, BeaconResult};

/// Advance an EMA by one tick.
///
/// `new = (incoming - previous) * 2/(window + 1) + previous`. This is the
/// O(1) live-path form; folded over a series it produces bit-identical values
/// to the full-history computation in [`ema_history`]. NaN and infinity
/// propagate untouched.
pub fn ema_tick(window: usize, incoming: f64, previous: f64) -> f64 {
    let most_recent_weight = 2.0 / (window as f64 + 1.0);
    (incoming - previous) * most_recent_weight + previous
}

/// EMA over a complete series.
///
/// The first output equals the first input; each following output applies the
/// tick recurrence. Output length equals input length.
pub fn ema_history(window: usize, values: &[f64]) -> Vec<f64> {
    let mut ema = Vec::with_capacity(values.len());
    if let Some(&first) = values.first() {
        ema.push(first);
        for &value in &values[1..] {
            let previous = *ema.last().expect("seeded above");
            ema.push(ema_tick(window, value, previous));
        }
    }
    ema
}

/// Seed an EMA from the most recent `window` raw values.
///
/// Fails with `InsufficientHistory` when fewer than `window` samples are
/// available. When given more, only the trailing `window` samples are used.
pub fn ema_seed(window: usize, history: &[f64]) -> BeaconResult<f64> {
    if history.len() < window {
        return Err(BeaconError::insufficient_history(window, history.len()));
    }
    let tail = &history[history.len() - window..];
    Ok(*ema_history(window, tail)
        .last()
        .expect("window is at least 1"))
}

/// Seed an EMA from whatever history is available.
///
/// The fallback form of [`ema_seed`]: accepts any non-empty history, using
/// all of it when shorter than the window.
pub fn ema_seed_lenient(window: usize, history: &[f64]) -> BeaconResult<f64> {
    if history.is_empty() {
        return Err(BeaconError::insufficient_history(window.max(1), 0));
    }
    let start = history.len().saturating_sub(window);
    Ok(*ema_history(window, &history[start..])
        .last()
        .expect("history is non-empty"))
}

/// A running EMA: window size plus current value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmaAccumulator {
    window: usize,
    value: f64,
}

impl EmaAccumulator {
    /// Seed an accumulator from trailing raw history
    pub fn seed(window: usize, history: &[f64]) -> BeaconResult<Self> {
        Ok(Self {
            window,
            value: ema_seed(window, history)?,
        })
    }

    /// Advance by one incoming value and return the new EMA
    pub fn tick(&mut self, incoming: f64) -> f64 {
        self.value = ema_tick(self.window, incoming, self.value);
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn window(&self) -> usize {
        self.window
    }
}
