//! Prometheus instrumentation for the forecast pipeline.

use async_trait::async_trait;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::time::Duration;

use crate::callbacks::{CallbackContext, ForecastObserver};
use crate::error::{ForecastError, ForecastResult};
use crate::model::TrainingSummary;
use crate::types::MetricResponse;

/// Observer that records request outcomes and training cost
#[derive(Clone)]
pub struct PrometheusObserver {
    requests: IntCounterVec,
    training_seconds: Histogram,
    forecasts_skipped: IntCounter,
}

impl PrometheusObserver {
    /// Create the collectors and register them on `registry`
    pub fn new(registry: &Registry) -> ForecastResult<Self> {
        let requests = IntCounterVec::new(
            Opts::new("beacon_requests_total", "Forecast requests by outcome"),
            &["outcome"],
        )
        .map_err(registration_error)?;
        let training_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "beacon_training_duration_seconds",
                "Wall time spent training a forecast model",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )
        .map_err(registration_error)?;
        let forecasts_skipped = IntCounter::new(
            "beacon_forecasts_skipped_total",
            "Requests answered without a forecast",
        )
        .map_err(registration_error)?;

        registry
            .register(Box::new(requests.clone()))
            .map_err(registration_error)?;
        registry
            .register(Box::new(training_seconds.clone()))
            .map_err(registration_error)?;
        registry
            .register(Box::new(forecasts_skipped.clone()))
            .map_err(registration_error)?;

        Ok(Self {
            requests,
            training_seconds,
            forecasts_skipped,
        })
    }
}

fn registration_error(error: prometheus::Error) -> ForecastError {
    ForecastError::config(format!("Failed to register metrics: {}", error))
}

fn outcome_label(error: &ForecastError) -> &'static str {
    match error {
        ForecastError::Validation { .. } => "validation_error",
        ForecastError::Config { .. } => "config_error",
        ForecastError::Retrieval { .. } => "retrieval_error",
        _ => "internal_error",
    }
}

#[async_trait]
impl ForecastObserver for PrometheusObserver {
    async fn on_request_completed(
        &self,
        _response: &MetricResponse,
        _elapsed: Duration,
        _context: &CallbackContext,
    ) -> ForecastResult<()> {
        self.requests.with_label_values(&["success"]).inc();
        Ok(())
    }

    async fn on_request_failed(
        &self,
        error: &ForecastError,
        _context: &CallbackContext,
    ) -> ForecastResult<()> {
        self.requests.with_label_values(&[outcome_label(error)]).inc();
        Ok(())
    }

    async fn on_training_completed(
        &self,
        _summary: &TrainingSummary,
        elapsed: Duration,
        _context: &CallbackContext,
    ) -> ForecastResult<()> {
        self.training_seconds.observe(elapsed.as_secs_f64());
        Ok(())
    }

    async fn on_forecast_skipped(
        &self,
        _reason: &str,
        _context: &CallbackContext,
    ) -> ForecastResult<()> {
        self.forecasts_skipped.inc();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn context() -> CallbackContext {
        CallbackContext {
            timestamp: 0,
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_counts_outcomes() {
        let registry = Registry::new();
        let observer = PrometheusObserver::new(&registry).unwrap();

        observer
            .on_request_failed(&ForecastError::validation("missing"), &context())
            .await
            .unwrap();
        observer
            .on_request_failed(&ForecastError::retrieval("down"), &context())
            .await
            .unwrap();
        observer.on_forecast_skipped("too few points", &context()).await.unwrap();

        assert_eq!(
            observer.requests.with_label_values(&["validation_error"]).get(),
            1
        );
        assert_eq!(
            observer.requests.with_label_values(&["retrieval_error"]).get(),
            1
        );
        assert_eq!(observer.forecasts_skipped.get(), 1);
        assert_eq!(registry.gather().len(), 3);
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        PrometheusObserver::new(&registry).unwrap();
        let err = PrometheusObserver::new(&registry).unwrap_err();
        assert!(matches!(err, ForecastError::Config { .. }));
    }
}
