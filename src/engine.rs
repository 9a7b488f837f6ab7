// src/engine.rs

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::callbacks::{CallbackContext, ForecastCallbacks};
use crate::error::{ForecastError, ForecastResult};
use crate::fetch::MetricsFetcher;
use crate::model::FitHooks;
use crate::predictive::{ForecastOutcome, Forecaster};
use crate::range;
use crate::types::{
    DataPoint, ForecastConfig, ForecastPoint, MetricQuery, MetricRequest, MetricResponse,
    SeriesPoint,
};
use crate::utils::{current_timestamp_millis, split_series};

/// Serves forecast requests.
///
/// The engine only holds immutable configuration and shared collaborators;
/// every call to [`ForecastEngine::handle`] runs its own pipeline and keeps
/// nothing afterwards. Model training runs on tokio's blocking pool, with at
/// most `max_concurrent_trainings` models in flight.
pub struct ForecastEngine {
    config: Arc<ForecastConfig>,
    callbacks: ForecastCallbacks,
    fetcher: MetricsFetcher,
    forecaster: Arc<Forecaster>,
    training_slots: Arc<Semaphore>,
}

impl ForecastEngine {
    pub fn new(config: ForecastConfig, callbacks: ForecastCallbacks) -> Self {
        let fetcher = MetricsFetcher::new(callbacks.backend.clone(), &config);
        let forecaster = Arc::new(Forecaster::new(&config));
        let training_slots = Arc::new(Semaphore::new(config.max_concurrent_trainings.max(1)));

        Self {
            config: Arc::new(config),
            callbacks,
            fetcher,
            forecaster,
            training_slots,
        }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Run the retrieval-and-forecast pipeline for one request
    pub async fn handle(&self, request: MetricRequest) -> ForecastResult<MetricResponse> {
        let started = Instant::now();
        let context = request_context(&request);

        match self.run(request, &context).await {
            Ok(response) => {
                let elapsed = started.elapsed();
                info!(
                    "Request processing time: {:.2}ms",
                    elapsed.as_secs_f64() * 1000.0
                );
                for observer in &self.callbacks.observers {
                    if let Err(e) = observer.on_request_completed(&response, elapsed, &context).await {
                        warn!("Observer error on request completed: {}", e);
                    }
                }
                Ok(response)
            }
            Err(e) => {
                if e.is_client_error() {
                    warn!("Rejected request: {}", e);
                } else {
                    error!("Error fetching metrics: {}", e);
                }
                for observer in &self.callbacks.observers {
                    if let Err(err) = observer.on_request_failed(&e, &context).await {
                        warn!("Observer error on request failed: {}", err);
                    }
                }
                Err(e)
            }
        }
    }

    /// Like [`Self::handle`], but shaped for a transport layer: a status code
    /// and the JSON body to send.
    pub async fn respond(&self, request: MetricRequest) -> (u16, serde_json::Value) {
        let outcome = self.handle(request).await.and_then(|response| {
            serde_json::to_value(response).map_err(ForecastError::from)
        });
        match outcome {
            Ok(body) => (200, body),
            Err(e) => {
                let body = serde_json::to_value(e.to_error_body())
                    .unwrap_or(serde_json::Value::Null);
                (e.status_code(), body)
            }
        }
    }

    async fn run(
        &self,
        request: MetricRequest,
        context: &CallbackContext,
    ) -> ForecastResult<MetricResponse> {
        let query = request.into_query()?;
        let window = range::resolve(&query.range_token)?;

        let observations = self.fetcher.fetch(&query, &window).await?;
        if observations.is_empty() {
            self.skip_forecast("no datapoints returned", context).await;
            return Ok(assemble_response(&query, &observations, Vec::new()));
        }

        let forecast = if observations.len() < self.forecaster.min_points() {
            self.skip_forecast("not enough datapoints to forecast", context)
                .await;
            Vec::new()
        } else {
            self.forecast_isolated(&observations, &query.metric_name, context)
                .await
        };

        Ok(assemble_response(&query, &observations, forecast))
    }

    /// Train and predict off the async executor; any failure means no forecast
    async fn forecast_isolated(
        &self,
        observations: &[DataPoint],
        metric_name: &str,
        context: &CallbackContext,
    ) -> Vec<ForecastPoint> {
        match self.train_and_predict(observations, metric_name).await {
            Ok((outcome, elapsed)) => {
                if let Some(summary) = &outcome.training {
                    for observer in &self.callbacks.observers {
                        if let Err(e) = observer.on_training_completed(summary, elapsed, context).await {
                            warn!("Observer error on training completed: {}", e);
                        }
                    }
                }
                outcome.points
            }
            Err(e) => {
                warn!("Forecast prediction error: {}", e);
                self.skip_forecast(&e.to_string(), context).await;
                Vec::new()
            }
        }
    }

    async fn train_and_predict(
        &self,
        observations: &[DataPoint],
        metric_name: &str,
    ) -> ForecastResult<(ForecastOutcome, Duration)> {
        let (values, timestamps) = split_series(observations);
        let metric_name = metric_name.to_string();
        let forecaster = self.forecaster.clone();
        let slots = self.training_slots.clone();

        let cancel = Arc::new(AtomicBool::new(false));
        let hooks = FitHooks {
            on_epoch_end: self.callbacks.on_epoch_end.clone(),
            cancel: Some(cancel.clone()),
        };

        let deadline = self.config.training_timeout();
        let started = Instant::now();
        let work = async move {
            let permit = slots.acquire_owned().await?;
            debug!("Training slot acquired");
            let outcome: ForecastResult<ForecastOutcome> = tokio::task::spawn_blocking(move || {
                // Held until training ends, even if the caller stopped waiting
                let _permit = permit;
                forecaster.try_forecast(&values, &timestamps, &metric_name, &hooks)
            })
            .await?;
            outcome
        };

        match tokio::time::timeout(deadline, work).await {
            Ok(outcome) => outcome.map(|o| (o, started.elapsed())),
            Err(_) => {
                cancel.store(true, Ordering::Relaxed);
                Err(ForecastError::training(format!(
                    "Training did not finish within {:?}",
                    deadline
                )))
            }
        }
    }

    async fn skip_forecast(&self, reason: &str, context: &CallbackContext) {
        debug!("Forecast skipped: {}", reason);
        for observer in &self.callbacks.observers {
            if let Err(e) = observer.on_forecast_skipped(reason, context).await {
                warn!("Observer error on forecast skipped: {}", e);
            }
        }
    }
}

/// Merge observations and forecast into the response payload
pub fn assemble_response(
    query: &MetricQuery,
    observations: &[DataPoint],
    forecast: Vec<ForecastPoint>,
) -> MetricResponse {
    MetricResponse {
        resource_id: query.resource_id.clone(),
        metric_name: query.metric_name.clone(),
        range_token: query.range_token.clone(),
        series: observations.iter().map(SeriesPoint::actual).collect(),
        forecast,
    }
}

fn request_context(request: &MetricRequest) -> CallbackContext {
    let mut metadata = HashMap::new();
    let fields = [
        ("resource_id", &request.resource_id),
        ("scope", &request.scope),
        ("metric_name", &request.metric_name),
        ("range_token", &request.range_token),
    ];
    for (key, value) in fields {
        if let Some(value) = value {
            metadata.insert(key.to_string(), value.clone());
        }
    }

    CallbackContext {
        timestamp: current_timestamp_millis(),
        metadata,
    }
}
