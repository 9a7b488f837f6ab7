//! # Predictive Module
//!
//! Turns an observed series into a short-horizon forecast by training a fresh
//! [`Network`] on it.
//!
//! ## Pipeline
//!
//! 1. **Normalize** the values into `[0, 1]` (constant series map to 0.5)
//! 2. **Train** on `(i / n, normalized value)` pairs; a constant series skips
//!    training and repeats its value
//! 3. **Infer** positions `(n - 1 + step) / n` for `step` in `1..=horizon`
//! 4. **Denormalize** and clamp to the metric's valid range
//! 5. **Stamp** each point by extending the observed cadence
//!
//! ## Usage
//!
//! ```rust
//! use beacon::{ForecastConfig, Forecaster};
//!
//! let forecaster = Forecaster::new(&ForecastConfig::builder().seed(42).build());
//! let values = [20.0, 22.5, 25.0, 27.5];
//! let timestamps = [0, 60_000, 120_000, 180_000];
//!
//! let forecast = forecaster.forecast(&values, &timestamps, "CPUUtilization");
//! assert_eq!(forecast.len(), 5);
//! assert!(forecast.iter().all(|p| (0.0..=100.0).contains(&p.value)));
//! ```

use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{ForecastError, ForecastResult};
use crate::metric::constraint_for;
use crate::model::{FitHooks, Network, TrainingConfig, TrainingSummary};
use crate::normalize::normalize;
use crate::types::{ForecastConfig, ForecastPoint, MetricValue, SeriesPoint, Timestamp};

/// Result of a forecasting attempt
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastOutcome {
    pub points: Vec<ForecastPoint>,
    /// Present when a model was actually trained
    pub training: Option<TrainingSummary>,
}

/// Trains a disposable model per call and extrapolates the series
#[derive(Debug, Clone)]
pub struct Forecaster {
    horizon: usize,
    min_points: usize,
    default_interval_ms: i64,
    training: TrainingConfig,
}

impl Forecaster {
    pub fn new(config: &ForecastConfig) -> Self {
        Self {
            horizon: config.horizon,
            min_points: config.min_points,
            default_interval_ms: config.default_interval_ms,
            training: config.training.clone(),
        }
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn min_points(&self) -> usize {
        self.min_points
    }

    /// Forecast the next points; any failure yields an empty sequence
    pub fn forecast(
        &self,
        values: &[MetricValue],
        timestamps: &[Timestamp],
        metric_name: &str,
    ) -> Vec<ForecastPoint> {
        match self.try_forecast(values, timestamps, metric_name, &FitHooks::default()) {
            Ok(outcome) => outcome.points,
            Err(e) => {
                warn!("Forecast prediction error: {}", e);
                Vec::new()
            }
        }
    }

    /// Forecast with progress hooks, surfacing training errors to the caller.
    ///
    /// Series shorter than `min_points` carry no usable trend and produce an
    /// empty outcome rather than an error.
    pub fn try_forecast(
        &self,
        values: &[MetricValue],
        timestamps: &[Timestamp],
        metric_name: &str,
        hooks: &FitHooks,
    ) -> ForecastResult<ForecastOutcome> {
        if values.len() != timestamps.len() {
            return Err(ForecastError::training(format!(
                "{} values but {} timestamps",
                values.len(),
                timestamps.len()
            )));
        }
        let n = values.len();
        if n < self.min_points.max(1) {
            return Ok(ForecastOutcome::default());
        }

        let (normalized, context) = normalize(values);
        let constraint = constraint_for(metric_name);
        let interval = mean_interval(timestamps, self.default_interval_ms);
        let last = timestamps[n - 1];
        let stamp = |step: usize| last + interval * step as i64;

        if context.is_degenerate() {
            debug!("Constant series, repeating {} without training", context.min);
            let points = (1..=self.horizon)
                .map(|step| SeriesPoint::prediction(stamp(step), constraint.apply(context.min)))
                .collect();
            return Ok(ForecastOutcome {
                points,
                training: None,
            });
        }

        let samples: Vec<(f64, f64)> = normalized
            .iter()
            .enumerate()
            .map(|(i, y)| (i as f64 / n as f64, *y))
            .collect();

        info!("Training new forecast model on {} points", n);
        let started = Instant::now();
        let mut rng = self.training.rng();
        let mut network = Network::new(&self.training.hidden_layers, &mut rng)?;
        let summary = network.fit(&samples, &self.training, &mut rng, hooks)?;
        info!(
            "Model training completed in {:.2}ms (loss {:.4})",
            started.elapsed().as_secs_f64() * 1000.0,
            summary.final_loss
        );

        let positions: Vec<f64> = (1..=self.horizon)
            .map(|step| (n - 1 + step) as f64 / n as f64)
            .collect();
        let points = network
            .predict(&positions)?
            .into_iter()
            .zip(1..=self.horizon)
            .map(|(y, step)| {
                SeriesPoint::prediction(stamp(step), constraint.apply(context.denormalize(y)))
            })
            .collect::<Vec<_>>();

        info!("Generated {} predictions for {}", points.len(), metric_name);
        Ok(ForecastOutcome {
            points,
            training: Some(summary),
        })
    }
}

/// Mean spacing of a sorted timestamp series in whole milliseconds.
///
/// Falls back to `default_ms` with fewer than two samples, or when the
/// samples share a timestamp so the mean would not advance.
pub fn mean_interval(timestamps: &[Timestamp], default_ms: i64) -> i64 {
    match (timestamps.first(), timestamps.last()) {
        (Some(first), Some(last)) if timestamps.len() >= 2 => {
            let mean = (last - first) as f64 / (timestamps.len() - 1) as f64;
            let rounded = mean.round() as i64;
            if rounded > 0 {
                rounded
            } else {
                default_ms
            }
        }
        _ => default_ms,
    }
}
