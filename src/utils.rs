//! Utility functions for common operations

use crate::types::{DataPoint, MetricValue, Timestamp};

/// Build a series from `(timestamp, value)` pairs
pub fn data_points(pairs: &[(Timestamp, MetricValue)]) -> Vec<DataPoint> {
    pairs
        .iter()
        .map(|&(timestamp, value)| DataPoint { timestamp, value })
        .collect()
}

/// Split a series into parallel value and timestamp vectors
pub fn split_series(points: &[DataPoint]) -> (Vec<MetricValue>, Vec<Timestamp>) {
    points.iter().map(|p| (p.value, p.timestamp)).unzip()
}

/// Get current Unix timestamp in milliseconds
pub fn current_timestamp_millis() -> Timestamp {
    chrono::Utc::now().timestamp_millis()
}
