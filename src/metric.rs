//! Static per-metric policy: the unit hint sent to the backend and the value
//! constraints applied to forecasts.

use serde::{Deserialize, Serialize};

use crate::types::MetricValue;

/// Unit hint attached to a statistics request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricUnit {
    Percent,
    Bytes,
    Count,
    /// The unit is unknown or unspecified
    None,
}

impl MetricUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Percent => "Percent",
            Self::Bytes => "Bytes",
            Self::Count => "Count",
            Self::None => "None",
        }
    }
}

const METRIC_UNITS: &[(&str, MetricUnit)] = &[
    ("CPUUtilization", MetricUnit::Percent),
    ("NetworkIn", MetricUnit::Bytes),
    ("NetworkOut", MetricUnit::Bytes),
    ("DiskReadOps", MetricUnit::Count),
    ("DiskWriteOps", MetricUnit::Count),
    ("DiskReadBytes", MetricUnit::Bytes),
    ("DiskWriteBytes", MetricUnit::Bytes),
    ("MemoryUtilization", MetricUnit::Percent),
    ("StatusCheckFailed", MetricUnit::Count),
];

/// Unit for a metric name; metrics outside the table are [`MetricUnit::None`]
pub fn unit_for(metric_name: &str) -> MetricUnit {
    METRIC_UNITS
        .iter()
        .find(|(name, _)| *name == metric_name)
        .map(|(_, unit)| *unit)
        .unwrap_or(MetricUnit::None)
}

/// Bounds a forecast value must respect
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueConstraint {
    pub min: Option<MetricValue>,
    pub max: Option<MetricValue>,
}

impl ValueConstraint {
    pub const UNBOUNDED: Self = Self { min: None, max: None };
    pub const NON_NEGATIVE: Self = Self {
        min: Some(0.0),
        max: None,
    };
    pub const PERCENTAGE: Self = Self {
        min: Some(0.0),
        max: Some(100.0),
    };

    pub fn apply(&self, value: MetricValue) -> MetricValue {
        let floored = match self.min {
            Some(min) => value.max(min),
            None => value,
        };
        match self.max {
            Some(max) => floored.min(max),
            None => floored,
        }
    }
}

/// Rates, counts and byte totals cannot go negative; percentages stay in [0, 100]
pub fn constraint_for(metric_name: &str) -> ValueConstraint {
    match unit_for(metric_name) {
        MetricUnit::Percent => ValueConstraint::PERCENTAGE,
        MetricUnit::Bytes | MetricUnit::Count => ValueConstraint::NON_NEGATIVE,
        MetricUnit::None => ValueConstraint::UNBOUNDED,
    }
}
