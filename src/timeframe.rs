// Timeframe Parsing and Arithmetic

use crate::error::{BeaconError, BeaconResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const MILLIS_PER_SECOND: i64 = 1_000;
const MILLIS_PER_MINUTE: i64 = 60 * MILLIS_PER_SECOND;
const MILLIS_PER_HOUR: i64 = 60 * MILLIS_PER_MINUTE;
const MILLIS_PER_DAY: i64 = 24 * MILLIS_PER_HOUR;
const MILLIS_PER_WEEK: i64 = 7 * MILLIS_PER_DAY;
// Calendar months are irregular; the 30-day convention matches how the
// exchanges label their "1M" bars.
const MILLIS_PER_MONTH: i64 = 30 * MILLIS_PER_DAY;

/// A candle bar duration such as "1m", "15m" or "4h".
///
/// Parsed once at the edge; everything downstream works with the validated
/// value and its exact millisecond duration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timeframe {
    repr: String,
    millis: i64,
}

impl Timeframe {
    /// Parse a timeframe string. Valid units: s, m, h, d, w, M.
    pub fn parse(value: &str) -> BeaconResult<Self> {
        let trimmed = value.trim();
        if trimmed.len() < 2 {
            return Err(BeaconError::invalid_timeframe(value));
        }

        let (count_str, unit) = trimmed.split_at(trimmed.len() - 1);
        let count: i64 = count_str
            .parse()
            .map_err(|_| BeaconError::invalid_timeframe(value))?;
        if count <= 0 {
            return Err(BeaconError::invalid_timeframe(value));
        }

        let unit_millis = match unit {
            "s" => MILLIS_PER_SECOND,
            "m" => MILLIS_PER_MINUTE,
            "h" => MILLIS_PER_HOUR,
            "d" => MILLIS_PER_DAY,
            "w" => MILLIS_PER_WEEK,
            "M" => MILLIS_PER_MONTH,
            _ => return Err(BeaconError::invalid_timeframe(value)),
        };

        Ok(Self {
            repr: trimmed.to_string(),
            millis: count * unit_millis,
        })
    }

    /// Exact bar duration in milliseconds
    pub fn as_millis(&self) -> i64 {
        self.millis
    }

    /// Bar duration as a std `Duration`
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.millis as u64)
    }

    /// The original string form ("1m", "4h", ...)
    pub fn as_str(&self) -> &str {
        &self.repr
    }

    /// Truncate a millisecond timestamp down to the nearest bar boundary.
    ///
    /// Range queries clip their bounds with this; truncation (rather than
    /// rounding) keeps the clipped bound deterministic and never pulls in a
    /// bar the caller did not ask for.
    pub fn align_down(&self, timestamp_ms: i64) -> i64 {
        timestamp_ms - timestamp_ms.rem_euclid(self.millis)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repr)
    }
}

impl FromStr for Timeframe {
    type Err = BeaconError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Timeframe {
    type Error = BeaconError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Timeframe> for String {
    fn from(timeframe: Timeframe) -> Self {
        timeframe.repr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_timeframes() {
        assert_eq!(Timeframe::parse("30s").unwrap().as_millis(), 30_000);
        assert_eq!(Timeframe::parse("1m").unwrap().as_millis(), 60_000);
        assert_eq!(Timeframe::parse("15m").unwrap().as_millis(), 900_000);
        assert_eq!(Timeframe::parse("1h").unwrap().as_millis(), 3_600_000);
        assert_eq!(Timeframe::parse("4h").unwrap().as_millis(), 14_400_000);
        assert_eq!(Timeframe::parse("1d").unwrap().as_millis(), 86_400_000);
        assert_eq!(Timeframe::parse("1w").unwrap().as_millis(), 604_800_000);
        assert_eq!(Timeframe::parse("1M").unwrap().as_millis(), 2_592_000_000);
    }

    #[test]
    fn rejects_malformed_input() {
        for bad in ["", "m", "0m", "-5m", "1x", "onem", "1.5h"] {
            assert!(
                Timeframe::parse(bad).is_err(),
                "expected parse failure for {bad:?}"
            );
        }
    }

    #[test]
    fn display_round_trips() {
        let timeframe = Timeframe::parse("15m").unwrap();
        assert_eq!(timeframe.to_string(), "15m");
        assert_eq!(
            Timeframe::parse(&timeframe.to_string()).unwrap(),
            timeframe
        );
    }

    #[test]
    fn align_down_truncates_to_bar_boundary() {
        let timeframe = Timeframe::parse("1m").unwrap();
        assert_eq!(timeframe.align_down(0), 0);
        assert_eq!(timeframe.align_down(59_999), 0);
        assert_eq!(timeframe.align_down(60_000), 60_000);
        assert_eq!(timeframe.align_down(125_000), 120_000);
    }

    #[test]
    fn serde_round_trips_through_string() {
        let timeframe: Timeframe = serde_json::from_str("\"5m\"").unwrap();
        assert_eq!(timeframe.as_millis(), 300_000);
        assert_eq!(serde_json::to_string(&timeframe).unwrap(), "\"5m\"");
        assert!(serde_json::from_str::<Timeframe>("\"5y\"").is_err());
    }
}
