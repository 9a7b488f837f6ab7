//! Monitoring backend access: credentials and the HTTP statistics client.
//!
//! The HTTP backend posts a [`StatisticsRequest`] as JSON to
//! `{endpoint}/statistics` and expects
//! `{ "Datapoints": [{ "Timestamp": ..., "Average": ... }] }` back. The
//! endpoint may contain a `{region}` placeholder that is filled from the
//! request scope.
//!
//! Requests are signed, never authenticated with the secret itself: the
//! access key id travels in `X-Access-Key`, and `X-Signature` carries
//! `hex(HMAC-SHA256(secret, timestamp + method + path + body))` for the
//! millisecond timestamp sent in `X-Timestamp`.

use std::fmt;

use crate::error::{ForecastError, ForecastResult};

#[cfg(feature = "http-backend")]
use crate::callbacks::{StatisticsBackend, StatisticsDatapoint, StatisticsRequest};
#[cfg(feature = "http-backend")]
use async_trait::async_trait;
#[cfg(feature = "http-backend")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "http-backend")]
use tracing::debug;
#[cfg(feature = "http-backend")]
use crate::utils::current_timestamp_millis;
#[cfg(feature = "http-backend")]
use hmac::{Hmac, Mac};
#[cfg(feature = "http-backend")]
use sha2::Sha256;

#[cfg(feature = "http-backend")]
type HmacSha256 = Hmac<Sha256>;

#[cfg(feature = "http-backend")]
const STATISTICS_PATH: &str = "/statistics";

pub const ACCESS_KEY_VAR: &str = "AWS_ACCESS_KEY_ID";
pub const SECRET_KEY_VAR: &str = "AWS_SECRET_ACCESS_KEY";
pub const SESSION_TOKEN_VAR: &str = "AWS_SESSION_TOKEN";

/// Credentials presented to the monitoring backend
#[derive(Clone, PartialEq, Eq)]
pub struct BackendCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for BackendCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl BackendCredentials {
    pub fn new(access_key_id: &str, secret_access_key: &str) -> Self {
        Self {
            access_key_id: access_key_id.to_string(),
            secret_access_key: secret_access_key.to_string(),
            session_token: None,
        }
    }

    /// Read credentials from the process environment
    pub fn from_env() -> ForecastResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read credentials through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> ForecastResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        match (read(ACCESS_KEY_VAR), read(SECRET_KEY_VAR)) {
            (Some(access_key_id), Some(secret_access_key)) => Ok(Self {
                access_key_id,
                secret_access_key,
                session_token: read(SESSION_TOKEN_VAR),
            }),
            _ => Err(ForecastError::config("AWS credentials not configured")),
        }
    }
}

/// Settings for [`HttpStatisticsBackend`]
#[cfg(feature = "http-backend")]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpBackendConfig {
    /// Base URL, optionally containing `{region}`; required
    pub endpoint: String,
    /// Per-request timeout applied by the HTTP client
    pub timeout_seconds: u64,
}

#[cfg(feature = "http-backend")]
impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            timeout_seconds: 10,
        }
    }
}

#[cfg(feature = "http-backend")]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StatisticsResponse {
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    datapoints: Vec<StatisticsDatapoint>,
}

/// Statistics backend reached over HTTP with basic-auth credentials
#[cfg(feature = "http-backend")]
#[derive(Debug)]
pub struct HttpStatisticsBackend {
    client: reqwest::Client,
    config: HttpBackendConfig,
    credentials: Option<BackendCredentials>,
}

#[cfg(feature = "http-backend")]
impl HttpStatisticsBackend {
    /// Create a backend; `None` credentials are reported on first use
    pub fn new(
        config: HttpBackendConfig,
        credentials: Option<BackendCredentials>,
    ) -> ForecastResult<Self> {
        if config.endpoint.trim().is_empty() {
            return Err(ForecastError::config("Monitoring endpoint not configured"));
        }
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ForecastError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            credentials,
        })
    }

    /// Create a backend with credentials taken from the environment
    pub fn from_env(config: HttpBackendConfig) -> ForecastResult<Self> {
        Self::new(config, BackendCredentials::from_env().ok())
    }

    /// Full URL of the statistics call for a region
    pub fn endpoint_for(&self, region: &str) -> String {
        format!(
            "{}{}",
            self.config.endpoint.replace("{region}", region).trim_end_matches('/'),
            STATISTICS_PATH
        )
    }

    fn credentials(&self) -> ForecastResult<&BackendCredentials> {
        self.credentials
            .as_ref()
            .ok_or_else(|| ForecastError::config("AWS credentials not configured"))
    }
}

/// Hex HMAC-SHA256 over `timestamp + method + path + body`
#[cfg(feature = "http-backend")]
pub fn sign_request(
    secret: &str,
    timestamp: i64,
    method: &str,
    path: &str,
    body: &str,
) -> ForecastResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ForecastError::config(format!("Unusable signing key: {}", e)))?;
    mac.update(format!("{}{}{}{}", timestamp, method, path, body).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(feature = "http-backend")]
#[async_trait]
impl StatisticsBackend for HttpStatisticsBackend {
    async fn get_statistics(
        &self,
        request: &StatisticsRequest,
    ) -> ForecastResult<Vec<StatisticsDatapoint>> {
        let credentials = self.credentials()?;
        let url = self.endpoint_for(&request.region);
        debug!("Requesting {} statistics from {}", request.metric_name, url);

        let body = serde_json::to_string(request)?;
        let timestamp = current_timestamp_millis();
        let signature = sign_request(
            &credentials.secret_access_key,
            timestamp,
            "POST",
            STATISTICS_PATH,
            &body,
        )?;

        let mut call = self
            .client
            .post(&url)
            .header("X-Access-Key", &credentials.access_key_id)
            .header("X-Timestamp", timestamp.to_string())
            .header("X-Signature", signature)
            .header("Content-Type", "application/json")
            .body(body);
        if let Some(token) = &credentials.session_token {
            call = call.header("X-Session-Token", token);
        }

        let response = call.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ForecastError::retrieval(format!(
                "Backend returned {}: {}",
                status, body
            )));
        }

        let parsed: StatisticsResponse = response.json().await?;
        debug!(
            "Backend answered with {} datapoints (label {:?})",
            parsed.datapoints.len(),
            parsed.label
        );
        Ok(parsed.datapoints)
    }

    fn ensure_configured(&self) -> ForecastResult<()> {
        self.credentials().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_credentials_from_lookup() {
        let creds = BackendCredentials::from_lookup(lookup(&[
            (ACCESS_KEY_VAR, "AKIA123"),
            (SECRET_KEY_VAR, "s3cr3t"),
        ]))
        .unwrap();
        assert_eq!(creds.access_key_id, "AKIA123");
        assert_eq!(creds.session_token, None);
        assert!(!format!("{:?}", creds).contains("s3cr3t"));
    }

    #[test]
    fn test_missing_or_blank_credentials() {
        let err = BackendCredentials::from_lookup(lookup(&[(ACCESS_KEY_VAR, "AKIA123")])).unwrap_err();
        assert!(matches!(err, ForecastError::Config { .. }));
        assert_eq!(err.status_code(), 500);

        let blank = BackendCredentials::from_lookup(lookup(&[
            (ACCESS_KEY_VAR, "AKIA123"),
            (SECRET_KEY_VAR, "  "),
        ]));
        assert!(blank.is_err());
    }

    #[cfg(feature = "http-backend")]
    mod http {
        use super::*;
        use crate::callbacks::Dimension;
        use chrono::{TimeZone, Utc};
        use serde_json::json;
        use wiremock::matchers::{header, header_exists, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        fn request() -> StatisticsRequest {
            StatisticsRequest {
                region: "us-east-1".to_string(),
                namespace: "AWS/EC2".to_string(),
                metric_name: "CPUUtilization".to_string(),
                dimensions: vec![Dimension {
                    name: "InstanceId".to_string(),
                    value: "i-42".to_string(),
                }],
                start_time: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
                end_time: Utc.timestamp_opt(1_700_003_600, 0).unwrap(),
                period: 60,
                statistics: vec!["Average".to_string()],
                unit: "Percent".to_string(),
            }
        }

        fn backend(uri: &str, credentials: Option<BackendCredentials>) -> HttpStatisticsBackend {
            let config = HttpBackendConfig {
                endpoint: uri.to_string(),
                timeout_seconds: 5,
            };
            HttpStatisticsBackend::new(config, credentials).unwrap()
        }

        const SECRET: &str = "wJalrXUtnFEMI/SECRET";

        #[test]
        fn test_endpoint_is_required() {
            let err = HttpStatisticsBackend::new(HttpBackendConfig::default(), None).unwrap_err();
            assert!(matches!(err, ForecastError::Config { .. }));
        }

        #[test]
        fn test_request_signature() {
            let signature = sign_request(
                SECRET,
                1_700_000_000_000,
                "POST",
                "/statistics",
                r#"{"MetricName":"CPUUtilization"}"#,
            )
            .unwrap();
            assert_eq!(
                signature,
                "9269bb07e5420cf089e95d1f9f2596dae3c5d5f5a00ddd91c940682dab25d681"
            );
            assert!(!signature.contains(SECRET));
        }

        #[tokio::test]
        async fn test_secret_never_leaves_the_process() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(header("x-access-key", "AKIAEXAMPLE"))
                .and(header("x-session-token", "session-1"))
                .and(header_exists("x-timestamp"))
                .and(header_exists("x-signature"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Datapoints": [] })))
                .expect(1)
                .mount(&server)
                .await;

            let credentials = BackendCredentials {
                access_key_id: "AKIAEXAMPLE".to_string(),
                secret_access_key: SECRET.to_string(),
                session_token: Some("session-1".to_string()),
            };
            let b = backend(&server.uri(), Some(credentials));
            assert!(b.get_statistics(&request()).await.unwrap().is_empty());

            let received = server.received_requests().await.unwrap();
            let headers = format!("{:?}", received[0].headers).to_lowercase();
            assert!(!headers.contains(&SECRET.to_lowercase()));
            assert!(!headers.contains("authorization"));
            assert!(!String::from_utf8_lossy(&received[0].body).contains(SECRET));
        }

        #[test]
        fn test_endpoint_region_substitution() {
            let b = backend("https://monitoring.{region}.example.com/", None);
            assert_eq!(
                b.endpoint_for("ap-south-1"),
                "https://monitoring.ap-south-1.example.com/statistics"
            );
        }

        #[tokio::test]
        async fn test_fetches_datapoints() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/statistics"))
                .and(header("x-access-key", "AKIA"))
                .and(header_exists("x-signature"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "Label": "CPUUtilization",
                    "Datapoints": [
                        { "Timestamp": "2023-11-14T22:14:00Z", "Average": 12.5, "Unit": "Percent" },
                        { "Timestamp": "2023-11-14T22:13:00Z", "Average": 10.0 }
                    ]
                })))
                .expect(1)
                .mount(&server)
                .await;

            let b = backend(&server.uri(), Some(BackendCredentials::new("AKIA", "secret")));
            let points = b.get_statistics(&request()).await.unwrap();
            assert_eq!(points.len(), 2);
            assert_eq!(points[0].average, 12.5);
            assert_eq!(points[1].unit, None);

            let received = server.received_requests().await.unwrap();
            let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
            assert_eq!(body["MetricName"], "CPUUtilization");
            assert_eq!(body["Period"], 60);
            assert_eq!(body["Statistics"][0], "Average");
            assert_eq!(body["Dimensions"][0]["Value"], "i-42");
            assert!(body.get("Region").is_none());
        }

        #[tokio::test]
        async fn test_error_status_is_retrieval_error() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(503).set_body_string("throttled"))
                .mount(&server)
                .await;

            let b = backend(&server.uri(), Some(BackendCredentials::new("AKIA", "secret")));
            let err = b.get_statistics(&request()).await.unwrap_err();
            assert!(matches!(err, ForecastError::Retrieval { .. }));
            assert!(err.to_string().contains("throttled"));
        }

        #[tokio::test]
        async fn test_malformed_body_is_retrieval_error() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
                .mount(&server)
                .await;

            let b = backend(&server.uri(), Some(BackendCredentials::new("AKIA", "secret")));
            let err = b.get_statistics(&request()).await.unwrap_err();
            assert!(matches!(err, ForecastError::Retrieval { .. }));
        }

        #[tokio::test]
        async fn test_missing_credentials_never_call_out() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(200))
                .expect(0)
                .mount(&server)
                .await;

            let b = backend(&server.uri(), None);
            assert!(matches!(
                b.ensure_configured(),
                Err(ForecastError::Config { .. })
            ));
            let err = b.get_statistics(&request()).await.unwrap_err();
            assert!(matches!(err, ForecastError::Config { .. }));
        }
    }
}
