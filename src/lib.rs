//! # Beacon - Metric Retrieval & Short-Horizon Forecasting
//!
//! Beacon answers one question per request: *what has this metric done over
//! the chosen window, and what will it do next?* It fetches averaged
//! observations for a resource from a monitoring backend, trains a small
//! neural regressor on them, and returns the observed series together with
//! the next few predicted points.
//!
//! ## 🎯 Core Philosophy
//!
//! - **Stateless**: every request trains a disposable model; nothing is cached
//!   or shared between requests
//! - **Degrade, don't fail**: a failed training run still returns the observed
//!   series, just without a forecast
//! - **Backend-agnostic**: anything that can answer "average over period" can
//!   implement [`StatisticsBackend`]
//!
//! ## 📊 Architecture Overview
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │                            ForecastEngine                             │
//! ├──────────────┬──────────────┬──────────────┬──────────────┬───────────┤
//! │ TimeRange    │ Metrics      │ Normalizer   │ Forecaster   │ Response  │
//! │ Resolver     │ Fetcher      │              │              │ Assembler │
//! │              │              │ • min/max    │ • 12-8-1 MLP │           │
//! │ • token →    │ • Average    │ • constant → │ • Adam, MSE  │ • Actual  │
//! │   window     │   per period │   0.5        │ • 5 steps    │ • Predict │
//! └──────────────┴──────┬───────┴──────────────┴──────┬───────┴───────────┘
//!                       │                             │
//!             ┌─────────▼─────────┐         ┌─────────▼─────────┐
//!             │ StatisticsBackend │         │  blocking pool    │
//!             │  (HTTP, custom)   │         │  + timeout        │
//!             └───────────────────┘         └───────────────────┘
//! ```
//!
//! ## 🚀 Usage
//!
//! ```rust,no_run
//! use beacon::{
//!     ForecastCallbacks, ForecastConfig, ForecastEngine, HttpBackendConfig,
//!     HttpStatisticsBackend, MetricRequest,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> beacon::ForecastResult<()> {
//!     let backend = HttpStatisticsBackend::from_env(HttpBackendConfig {
//!         endpoint: "https://metrics.{region}.internal.example".to_string(),
//!         ..HttpBackendConfig::default()
//!     })?;
//!     let engine = ForecastEngine::new(
//!         ForecastConfig::default(),
//!         ForecastCallbacks::new(Arc::new(backend)),
//!     );
//!
//!     let response = engine
//!         .handle(MetricRequest::new("i-0abc123", "us-east-1", "CPUUtilization", "1h"))
//!         .await?;
//!
//!     println!("{} observed, {} predicted", response.series.len(), response.forecast.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `http-backend` (default): [`HttpStatisticsBackend`] built on `reqwest`,
//!   with HMAC-signed requests
//! - `prometheus-metrics`: [`PrometheusObserver`] request and training metrics
//! - `config-toml`: load [`ForecastConfig`] from TOML

pub mod error;
pub mod utils;
pub mod types;
pub mod range;
pub mod metric;
pub mod normalize;
pub mod model;
pub mod predictive;
pub mod fetch;
pub mod backend;
pub mod engine;
pub mod callbacks;
#[cfg(feature = "prometheus-metrics")]
pub mod metrics;

// Re-export common types for convenience
pub use types::{
    DataPoint, ForecastConfig, ForecastConfigBuilder, ForecastPoint, MetricQuery,
    MetricRequest, MetricResponse, MetricValue, PointKind, ResourceId, SeriesPoint, Timestamp,
};

pub use error::{ErrorBody, ForecastError, ForecastResult};

pub use callbacks::{
    CallbackContext, Dimension, EpochCallback, ForecastCallbacks, ForecastObserver,
    StatisticsBackend, StatisticsDatapoint, StatisticsRequest,
};

pub use range::{resolve, sample_period_for, TimeRangeSpec};
pub use metric::{constraint_for, unit_for, MetricUnit, ValueConstraint};
pub use normalize::{denormalize, normalize, NormalizationContext};
pub use model::{EpochStats, FitHooks, Network, TrainingConfig, TrainingSummary};
pub use predictive::{ForecastOutcome, Forecaster};
pub use fetch::MetricsFetcher;
pub use backend::BackendCredentials;
pub use engine::{assemble_response, ForecastEngine};

#[cfg(feature = "http-backend")]
pub use backend::{sign_request, HttpBackendConfig, HttpStatisticsBackend};

#[cfg(feature = "prometheus-metrics")]
pub use metrics::PrometheusObserver;
