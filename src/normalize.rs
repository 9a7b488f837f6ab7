//! Min-max scaling of a value sequence into `[0, 1]`.

use serde::{Deserialize, Serialize};

use crate::types::MetricValue;

/// Target every value maps to when the series is constant
pub const DEGENERATE_TARGET: f64 = 0.5;

/// Per-request scaling bounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizationContext {
    pub min: MetricValue,
    pub max: MetricValue,
}

impl NormalizationContext {
    pub fn range(&self) -> f64 {
        self.max - self.min
    }

    /// A constant or singleton series has no spread to scale by
    pub fn is_degenerate(&self) -> bool {
        self.range() <= 0.0
    }

    pub fn scale(&self, value: MetricValue) -> f64 {
        if self.is_degenerate() {
            DEGENERATE_TARGET
        } else {
            (value - self.min) / self.range()
        }
    }

    /// Inverse of [`Self::scale`]. A degenerate context maps back to its constant.
    pub fn denormalize(&self, normalized: f64) -> MetricValue {
        if self.is_degenerate() {
            self.min
        } else {
            normalized * self.range() + self.min
        }
    }
}

/// Scale `values` into `[0, 1]`, returning the context needed to invert it
pub fn normalize(values: &[MetricValue]) -> (Vec<f64>, NormalizationContext) {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });

    let context = if values.is_empty() {
        NormalizationContext { min: 0.0, max: 0.0 }
    } else {
        NormalizationContext { min, max }
    };

    let normalized = values.iter().map(|&v| context.scale(v)).collect();
    (normalized, context)
}

/// Free-function form of [`NormalizationContext::denormalize`]
pub fn denormalize(normalized: f64, context: &NormalizationContext) -> MetricValue {
    context.denormalize(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_on_spread_series() {
        let values = vec![3.5, 10.0, -2.0, 7.25, 0.0];
        let (normalized, ctx) = normalize(&values);
        assert_eq!(ctx.min, -2.0);
        assert_eq!(ctx.max, 10.0);
        for (original, scaled) in values.iter().zip(&normalized) {
            assert!((0.0..=1.0).contains(scaled));
            assert!((denormalize(*scaled, &ctx) - original).abs() < 1e-9);
        }
    }

    #[test]
    fn test_constant_series_maps_to_midpoint() {
        let (normalized, ctx) = normalize(&[42.0, 42.0, 42.0]);
        assert!(ctx.is_degenerate());
        assert!(normalized.iter().all(|v| *v == DEGENERATE_TARGET));
        assert_eq!(ctx.denormalize(0.73), 42.0);
    }

    #[test]
    fn test_singleton_and_empty() {
        let (normalized, ctx) = normalize(&[7.0]);
        assert_eq!(normalized, vec![0.5]);
        assert_eq!(ctx.denormalize(0.5), 7.0);

        let (normalized, ctx) = normalize(&[]);
        assert!(normalized.is_empty());
        assert!(ctx.is_degenerate());
    }
}
