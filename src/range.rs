//! Lookback windows and their sampling periods.
//!
//! Each symbolic token maps to how far back observations are requested and
//! how coarsely they are aggregated. Shorter windows sample finely, multi-day
//! windows sample coarsely so the sample count stays small.

use serde::Serialize;
use std::time::Duration;

use crate::error::{ForecastError, ForecastResult};

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Period used by [`sample_period_for`] when the token is unknown
pub const DEFAULT_SAMPLE_PERIOD: Duration = Duration::from_secs(MINUTE);

/// (token, lookback seconds, sample period seconds), shortest window first
const RANGE_TABLE: &[(&str, u64, u64)] = &[
    ("1h", HOUR, MINUTE),
    ("6h", 6 * HOUR, 5 * MINUTE),
    ("12h", 12 * HOUR, 10 * MINUTE),
    ("24h", DAY, 30 * MINUTE),
    ("7d", 7 * DAY, HOUR),
    ("30d", 30 * DAY, 6 * HOUR),
];

/// A resolved lookback window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRangeSpec {
    pub token: &'static str,
    pub lookback: Duration,
    pub sample_period: Duration,
}

impl TimeRangeSpec {
    /// Number of aggregated samples a full window yields
    pub fn expected_samples(&self) -> u64 {
        self.lookback.as_secs() / self.sample_period.as_secs().max(1)
    }

    /// Period in whole seconds, as monitoring backends expect it
    pub fn period_seconds(&self) -> u32 {
        self.sample_period.as_secs() as u32
    }
}

/// All recognized tokens, shortest window first
pub fn supported_tokens() -> impl Iterator<Item = &'static str> {
    RANGE_TABLE.iter().map(|(token, _, _)| *token)
}

/// Resolve a range token into its window; unknown tokens are rejected
pub fn resolve(token: &str) -> ForecastResult<TimeRangeSpec> {
    RANGE_TABLE
        .iter()
        .find(|(candidate, _, _)| *candidate == token)
        .map(|(name, lookback, period)| TimeRangeSpec {
            token: *name,
            lookback: Duration::from_secs(*lookback),
            sample_period: Duration::from_secs(*period),
        })
        .ok_or_else(|| {
            ForecastError::validation(format!("Invalid time range provided: '{}'", token))
        })
}

/// Sampling period for a token.
///
/// Unlike [`resolve`], an unknown token does not fail here: it falls back to
/// the finest granularity.
pub fn sample_period_for(token: &str) -> Duration {
    RANGE_TABLE
        .iter()
        .find(|(candidate, _, _)| *candidate == token)
        .map(|(_, _, period)| Duration::from_secs(*period))
        .unwrap_or(DEFAULT_SAMPLE_PERIOD)
}
