// src/types.rs

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ForecastError, ForecastResult};
use crate::model::TrainingConfig;

/// Identifier of the monitored entity (e.g. "i-0abc123def4567890")
pub type ResourceId = String;

/// A metric value (CPU %, bytes, operation count, etc.)
pub type MetricValue = f64;

/// Unix timestamp in milliseconds
pub type Timestamp = i64;

/// Inbound request as received from the transport layer.
///
/// Every field is optional on the wire so that a missing field surfaces as a
/// validation error rather than a deserialization failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRequest {
    #[serde(default, alias = "instanceId")]
    pub resource_id: Option<String>,
    #[serde(default, alias = "region")]
    pub scope: Option<String>,
    #[serde(default, alias = "metric")]
    pub metric_name: Option<String>,
    #[serde(default, alias = "timeRange")]
    pub range_token: Option<String>,
}

impl MetricRequest {
    pub fn new(resource_id: &str, scope: &str, metric_name: &str, range_token: &str) -> Self {
        Self {
            resource_id: Some(resource_id.to_string()),
            scope: Some(scope.to_string()),
            metric_name: Some(metric_name.to_string()),
            range_token: Some(range_token.to_string()),
        }
    }

    /// Check that all four fields are present and non-empty
    pub fn into_query(self) -> ForecastResult<MetricQuery> {
        fn present(field: Option<String>) -> Option<String> {
            field.filter(|value| !value.trim().is_empty())
        }

        match (
            present(self.resource_id),
            present(self.scope),
            present(self.metric_name),
            present(self.range_token),
        ) {
            (Some(resource_id), Some(scope), Some(metric_name), Some(range_token)) => {
                Ok(MetricQuery {
                    resource_id,
                    scope,
                    metric_name,
                    range_token,
                })
            }
            _ => Err(ForecastError::validation(
                "Missing required parameters: resourceId, scope, metricName, rangeToken",
            )),
        }
    }
}

/// A validated query: every field is guaranteed to be present
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricQuery {
    pub resource_id: ResourceId,
    /// Locality of the resource, e.g. an AWS region
    pub scope: String,
    pub metric_name: String,
    pub range_token: String,
}

/// One aggregated observation from the monitoring backend
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp: Timestamp,
    pub value: MetricValue,
}

/// Whether a point was observed or forecast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointKind {
    Actual,
    Prediction,
}

/// A point in the response stream
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: Timestamp,
    pub value: MetricValue,
    pub kind: PointKind,
}

/// Forecast points are series points tagged [`PointKind::Prediction`]
pub type ForecastPoint = SeriesPoint;

impl SeriesPoint {
    pub fn actual(point: &DataPoint) -> Self {
        Self {
            timestamp: point.timestamp,
            value: point.value,
            kind: PointKind::Actual,
        }
    }

    pub fn prediction(timestamp: Timestamp, value: MetricValue) -> Self {
        Self {
            timestamp,
            value,
            kind: PointKind::Prediction,
        }
    }
}

/// Response payload: echoed query parameters plus both halves of the series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricResponse {
    pub resource_id: ResourceId,
    pub metric_name: String,
    pub range_token: String,
    pub series: Vec<SeriesPoint>,
    pub forecast: Vec<ForecastPoint>,
}

/// Main configuration for the forecast engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Number of future points to produce
    pub horizon: usize,
    /// Minimum observations before a forecast is attempted
    pub min_points: usize,
    /// Spacing used for synthesized timestamps when the cadence is unknown
    pub default_interval_ms: i64,
    /// Backend namespace the metrics live in
    pub namespace: String,
    /// Dimension the resource id is matched against
    pub dimension_name: String,
    /// Upper bound on the backend call
    pub fetch_timeout_seconds: u64,
    /// Upper bound on training plus inference
    pub training_timeout_seconds: u64,
    /// How many models may train at the same time
    pub max_concurrent_trainings: usize,
    /// Network shape and optimizer settings
    pub training: TrainingConfig,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon: 5,
            min_points: 3,
            default_interval_ms: 60_000,
            namespace: "AWS/EC2".to_string(),
            dimension_name: "InstanceId".to_string(),
            fetch_timeout_seconds: 15,
            training_timeout_seconds: 30,
            max_concurrent_trainings: 4,
            training: TrainingConfig::default(),
        }
    }
}

impl ForecastConfig {
    pub fn builder() -> ForecastConfigBuilder {
        ForecastConfigBuilder::new()
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }

    pub fn training_timeout(&self) -> Duration {
        Duration::from_secs(self.training_timeout_seconds)
    }

    /// Parse a configuration from TOML; absent keys keep their defaults
    #[cfg(feature = "config-toml")]
    pub fn from_toml_str(source: &str) -> ForecastResult<Self> {
        toml::from_str(source).map_err(|e| ForecastError::config(format!("Invalid TOML: {}", e)))
    }

    #[cfg(feature = "config-toml")]
    pub fn from_toml_file<P: AsRef<std::path::Path>>(path: P) -> ForecastResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}

/// Builder for creating forecast configurations easily
#[derive(Debug)]
pub struct ForecastConfigBuilder {
    config: ForecastConfig,
}

impl Default for ForecastConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ForecastConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ForecastConfig::default(),
        }
    }

    pub fn horizon(mut self, points: usize) -> Self {
        self.config.horizon = points;
        self
    }

    pub fn min_points(mut self, points: usize) -> Self {
        self.config.min_points = points;
        self
    }

    pub fn default_interval_ms(mut self, millis: i64) -> Self {
        self.config.default_interval_ms = millis;
        self
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.config.namespace = namespace.to_string();
        self
    }

    pub fn dimension_name(mut self, name: &str) -> Self {
        self.config.dimension_name = name.to_string();
        self
    }

    pub fn fetch_timeout(mut self, seconds: u64) -> Self {
        self.config.fetch_timeout_seconds = seconds;
        self
    }

    pub fn training_timeout(mut self, seconds: u64) -> Self {
        self.config.training_timeout_seconds = seconds;
        self
    }

    pub fn max_concurrent_trainings(mut self, workers: usize) -> Self {
        self.config.max_concurrent_trainings = workers.max(1);
        self
    }

    pub fn training(mut self, training: TrainingConfig) -> Self {
        self.config.training = training;
        self
    }

    /// Fix the weight-initialization and shuffling seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.training.seed = Some(seed);
        self
    }

    pub fn build(self) -> ForecastConfig {
        self.config
    }
}
