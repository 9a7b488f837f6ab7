// src/callbacks.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ForecastError, ForecastResult};
use crate::model::{EpochStats, TrainingSummary};
use crate::types::{MetricResponse, Timestamp};

/// Per-epoch progress hook invoked from the training worker
pub type EpochCallback = Arc<dyn Fn(&EpochStats) + Send + Sync>;

/// Context provided to callbacks with additional information
#[derive(Debug, Clone)]
pub struct CallbackContext {
    /// When the request entered the engine (Unix millis)
    pub timestamp: Timestamp,
    /// Echoed request fields and other details from the engine
    pub metadata: HashMap<String, String>,
}

/// A dimension filter, e.g. `InstanceId = i-0abc`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

/// Query-by-statistics request sent to the monitoring backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatisticsRequest {
    /// Locality the backend should be queried in; carried out of band
    #[serde(skip)]
    pub region: String,
    pub namespace: String,
    pub metric_name: String,
    pub dimensions: Vec<Dimension>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Aggregation granularity in seconds
    pub period: u32,
    pub statistics: Vec<String>,
    pub unit: String,
}

/// One aggregated record as returned by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatisticsDatapoint {
    pub timestamp: DateTime<Utc>,
    pub average: f64,
    #[serde(default)]
    pub unit: Option<String>,
}

/// Trait for retrieving aggregated observations
///
/// Implement this to connect the engine to a monitoring system. The only
/// contract required is "average value per period for a metric, resource and
/// time window"; ordering of the returned records is not relied upon.
#[async_trait]
pub trait StatisticsBackend: Send + Sync {
    /// Fetch averaged datapoints
    ///
    /// # Returns
    /// * `Ok(points)` - Possibly empty set of datapoints
    /// * `Err(error)` - The call failed; surfaced as a retrieval error
    async fn get_statistics(
        &self,
        request: &StatisticsRequest,
    ) -> ForecastResult<Vec<StatisticsDatapoint>>;

    /// Check credentials and settings before any network call is made
    ///
    /// Return a [`ForecastError::Config`] when the backend cannot be used.
    fn ensure_configured(&self) -> ForecastResult<()> {
        Ok(())
    }
}

/// Trait for receiving pipeline events
///
/// Useful for logging, metrics, or auditing. Every method defaults to a no-op.
#[async_trait]
pub trait ForecastObserver: Send + Sync {
    /// Called when a request produced a response
    async fn on_request_completed(
        &self,
        _response: &MetricResponse,
        _elapsed: Duration,
        _context: &CallbackContext,
    ) -> ForecastResult<()> {
        Ok(())
    }

    /// Called when a request was aborted with an error
    async fn on_request_failed(
        &self,
        _error: &ForecastError,
        _context: &CallbackContext,
    ) -> ForecastResult<()> {
        Ok(())
    }

    /// Called after a model finished training
    async fn on_training_completed(
        &self,
        _summary: &TrainingSummary,
        _elapsed: Duration,
        _context: &CallbackContext,
    ) -> ForecastResult<()> {
        Ok(())
    }

    /// Called when no forecast was produced (too few points, training failure)
    async fn on_forecast_skipped(
        &self,
        _reason: &str,
        _context: &CallbackContext,
    ) -> ForecastResult<()> {
        Ok(())
    }
}

/// Combine all callbacks into a single struct for easier management
#[derive(Clone)]
pub struct ForecastCallbacks {
    pub backend: Arc<dyn StatisticsBackend>,
    pub observers: Vec<Arc<dyn ForecastObserver>>,
    pub on_epoch_end: Option<EpochCallback>,
}

impl ForecastCallbacks {
    pub fn new(backend: Arc<dyn StatisticsBackend>) -> Self {
        Self {
            backend,
            observers: Vec::new(),
            on_epoch_end: None,
        }
    }

    /// Add an observer to receive pipeline events
    pub fn add_observer(mut self, observer: Arc<dyn ForecastObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Add multiple observers at once
    pub fn add_observers(mut self, observers: Vec<Arc<dyn ForecastObserver>>) -> Self {
        self.observers.extend(observers);
        self
    }

    /// Report loss after every training epoch
    pub fn on_epoch_end(mut self, callback: EpochCallback) -> Self {
        self.on_epoch_end = Some(callback);
        self
    }
}
