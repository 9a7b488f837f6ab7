//! Retrieval of aggregated observations from the monitoring backend.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::callbacks::{Dimension, StatisticsBackend, StatisticsRequest};
use crate::error::{ForecastError, ForecastResult};
use crate::metric::unit_for;
use crate::range::TimeRangeSpec;
use crate::types::{DataPoint, ForecastConfig, MetricQuery};

/// The only statistic the pipeline asks for
pub const AVERAGE_STATISTIC: &str = "Average";

/// Turns a validated query and window into an ordered series
pub struct MetricsFetcher {
    backend: Arc<dyn StatisticsBackend>,
    namespace: String,
    dimension_name: String,
    timeout: Duration,
}

impl MetricsFetcher {
    pub fn new(backend: Arc<dyn StatisticsBackend>, config: &ForecastConfig) -> Self {
        Self {
            backend,
            namespace: config.namespace.clone(),
            dimension_name: config.dimension_name.clone(),
            timeout: config.fetch_timeout(),
        }
    }

    /// Override the deadline applied to the backend call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the backend request for a window ending at `end`
    pub fn build_request(
        &self,
        query: &MetricQuery,
        range: &TimeRangeSpec,
        end: DateTime<Utc>,
    ) -> StatisticsRequest {
        let start = end - ChronoDuration::seconds(range.lookback.as_secs() as i64);

        StatisticsRequest {
            region: query.scope.clone(),
            namespace: self.namespace.clone(),
            metric_name: query.metric_name.clone(),
            dimensions: vec![Dimension {
                name: self.dimension_name.clone(),
                value: query.resource_id.clone(),
            }],
            start_time: start,
            end_time: end,
            period: range.period_seconds(),
            statistics: vec![AVERAGE_STATISTIC.to_string()],
            unit: unit_for(&query.metric_name).as_str().to_string(),
        }
    }

    /// Fetch observations from `now - lookback` to `now`, sorted by timestamp.
    ///
    /// An empty result is not an error. Credentials are checked before the
    /// backend is contacted.
    pub async fn fetch(
        &self,
        query: &MetricQuery,
        range: &TimeRangeSpec,
    ) -> ForecastResult<Vec<DataPoint>> {
        self.backend.ensure_configured()?;

        let request = self.build_request(query, range, Utc::now());
        info!("Start time: {}", request.start_time.to_rfc3339());
        info!("End time: {}", request.end_time.to_rfc3339());

        let records = match tokio::time::timeout(self.timeout, self.backend.get_statistics(&request)).await {
            Ok(Ok(records)) => records,
            Ok(Err(e @ ForecastError::Config { .. })) | Ok(Err(e @ ForecastError::Retrieval { .. })) => {
                return Err(e)
            }
            Ok(Err(e)) => return Err(ForecastError::retrieval(e.to_string())),
            Err(_) => {
                return Err(ForecastError::retrieval(format!(
                    "Backend did not answer within {:?}",
                    self.timeout
                )))
            }
        };

        let mut points: Vec<DataPoint> = records
            .into_iter()
            .map(|record| DataPoint {
                timestamp: record.timestamp.timestamp_millis(),
                value: record.average,
            })
            .collect();
        points.sort_by_key(|p| p.timestamp);

        info!("{} datapoints received for {}", points.len(), query.metric_name);
        debug!("Period {}s, unit {}", request.period, request.unit);
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::StatisticsDatapoint;
    use crate::range::resolve;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;

    struct RecordingBackend {
        records: Vec<StatisticsDatapoint>,
        requests: Mutex<Vec<StatisticsRequest>>,
        configured: bool,
        delay: Option<Duration>,
    }

    impl RecordingBackend {
        fn with_records(records: Vec<StatisticsDatapoint>) -> Self {
            Self {
                records,
                requests: Mutex::new(Vec::new()),
                configured: true,
                delay: None,
            }
        }
    }

    #[async_trait]
    impl StatisticsBackend for RecordingBackend {
        async fn get_statistics(
            &self,
            request: &StatisticsRequest,
        ) -> ForecastResult<Vec<StatisticsDatapoint>> {
            self.requests.lock().unwrap().push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.records.clone())
        }

        fn ensure_configured(&self) -> ForecastResult<()> {
            if self.configured {
                Ok(())
            } else {
                Err(ForecastError::config("AWS credentials not configured"))
            }
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl StatisticsBackend for FailingBackend {
        async fn get_statistics(
            &self,
            _request: &StatisticsRequest,
        ) -> ForecastResult<Vec<StatisticsDatapoint>> {
            Err(ForecastError::unexpected("connection reset"))
        }
    }

    fn query(metric: &str) -> MetricQuery {
        MetricQuery {
            resource_id: "i-0123456789".to_string(),
            scope: "eu-west-1".to_string(),
            metric_name: metric.to_string(),
            range_token: "1h".to_string(),
        }
    }

    fn record(secs: i64, average: f64) -> StatisticsDatapoint {
        StatisticsDatapoint {
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            average,
            unit: None,
        }
    }

    #[test]
    fn test_build_request() {
        let fetcher = MetricsFetcher::new(
            Arc::new(RecordingBackend::with_records(vec![])),
            &ForecastConfig::default(),
        );
        let range = resolve("6h").unwrap();
        let end = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let request = fetcher.build_request(&query("NetworkIn"), &range, end);

        assert_eq!(request.region, "eu-west-1");
        assert_eq!(request.namespace, "AWS/EC2");
        assert_eq!(request.dimensions[0].name, "InstanceId");
        assert_eq!(request.dimensions[0].value, "i-0123456789");
        assert_eq!(request.period, 300);
        assert_eq!(request.statistics, vec!["Average".to_string()]);
        assert_eq!(request.unit, "Bytes");
        assert_eq!((request.end_time - request.start_time).num_hours(), 6);
    }

    #[test]
    fn test_unknown_metric_gets_unspecified_unit() {
        let fetcher = MetricsFetcher::new(
            Arc::new(RecordingBackend::with_records(vec![])),
            &ForecastConfig::default(),
        );
        let request = fetcher.build_request(&query("QueueDepth"), &resolve("1h").unwrap(), Utc::now());
        assert_eq!(request.unit, "None");
    }

    #[tokio::test]
    async fn test_fetch_sorts_by_timestamp() {
        let backend = Arc::new(RecordingBackend::with_records(vec![
            record(300, 3.0),
            record(100, 1.0),
            record(200, 2.0),
        ]));
        let fetcher = MetricsFetcher::new(backend.clone(), &ForecastConfig::default());
        let points = fetcher
            .fetch(&query("CPUUtilization"), &resolve("1h").unwrap())
            .await
            .unwrap();

        let timestamps: Vec<_> = points.iter().map(|p| p.timestamp).collect();
        assert_eq!(timestamps, vec![100_000, 200_000, 300_000]);
        assert_eq!(points[2].value, 3.0);
        assert_eq!(backend.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_result_is_ok() {
        let fetcher = MetricsFetcher::new(
            Arc::new(RecordingBackend::with_records(vec![])),
            &ForecastConfig::default(),
        );
        let points = fetcher
            .fetch(&query("CPUUtilization"), &resolve("1h").unwrap())
            .await
            .unwrap();
        assert!(points.is_empty());
    }

    #[tokio::test]
    async fn test_missing_credentials_skip_the_call() {
        let backend = Arc::new(RecordingBackend {
            configured: false,
            ..RecordingBackend::with_records(vec![record(1, 1.0)])
        });
        let fetcher = MetricsFetcher::new(backend.clone(), &ForecastConfig::default());
        let err = fetcher
            .fetch(&query("CPUUtilization"), &resolve("1h").unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, ForecastError::Config { .. }));
        assert!(backend.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_is_retrieval_error() {
        let fetcher = MetricsFetcher::new(Arc::new(FailingBackend), &ForecastConfig::default());
        let err = fetcher
            .fetch(&query("CPUUtilization"), &resolve("1h").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ForecastError::Retrieval { .. }));
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let backend = Arc::new(RecordingBackend {
            delay: Some(Duration::from_secs(5)),
            ..RecordingBackend::with_records(vec![])
        });
        let fetcher = MetricsFetcher::new(backend, &ForecastConfig::default())
            .with_timeout(Duration::from_millis(20));
        let err = fetcher
            .fetch(&query("CPUUtilization"), &resolve("1h").unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, ForecastError::Retrieval { .. }));
        assert_eq!(err.status_code(), 502);
    }
}
