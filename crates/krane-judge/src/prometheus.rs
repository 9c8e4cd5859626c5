//! Prometheus HTTP API client.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::backend::{Matrix, MetricsBackend, QueryRange, Sample, Series};
use crate::error::{JudgeError, JudgeResult};

/// Per-request timeout; a slow backend is retried on the next poll.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// `MetricsBackend` over `GET /api/v1/query_range`.
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    base_url: String,
    http: reqwest::Client,
}

impl PrometheusClient {
    pub fn new(base_url: &str) -> JudgeResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| JudgeError::Backend(format!("building http client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl MetricsBackend for PrometheusClient {
    async fn range_query(&self, expr: &str, range: &QueryRange) -> JudgeResult<Matrix> {
        let url = format!("{}/api/v1/query_range", self.base_url);
        debug!(%url, expr, "range query");

        let response = self
            .http
            .get(&url)
            .query(&[
                ("query", expr.to_string()),
                ("start", unix_seconds(range.start)),
                ("end", unix_seconds(range.end)),
                ("step", format!("{}s", range.step.as_secs_f64())),
            ])
            .send()
            .await
            .map_err(|e| JudgeError::Backend(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| JudgeError::Backend(e.to_string()))?;

        // Prometheus answers 4xx/5xx with an error payload; prefer its message.
        match parse_matrix(&body) {
            Err(JudgeError::Decode(_)) if !status.is_success() => {
                Err(JudgeError::Backend(format!("{url} returned {status}")))
            }
            other => other,
        }
    }
}

fn unix_seconds(t: SystemTime) -> String {
    let secs = t
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    format!("{secs:.3}")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: Option<ApiData>,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiData {
    result_type: String,
    #[serde(default)]
    result: Vec<RawSeries>,
}

#[derive(Debug, Deserialize)]
struct RawSeries {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    #[serde(default)]
    values: Vec<(f64, String)>,
}

/// Decode a `query_range` response body into a matrix.
pub fn parse_matrix(body: &str) -> JudgeResult<Matrix> {
    let response: ApiResponse =
        serde_json::from_str(body).map_err(|e| JudgeError::Decode(e.to_string()))?;

    if response.status != "success" {
        return Err(JudgeError::Backend(format!(
            "{}: {}",
            response.error_type.as_deref().unwrap_or("error"),
            response.error.as_deref().unwrap_or("no message"),
        )));
    }

    let data = response
        .data
        .ok_or_else(|| JudgeError::Decode("success response without data".into()))?;
    if data.result_type != "matrix" {
        return Err(JudgeError::Decode(format!(
            "expected matrix result, got {}",
            data.result_type
        )));
    }

    data.result
        .into_iter()
        .map(|raw| {
            let samples = raw
                .values
                .into_iter()
                .map(|(timestamp, value)| {
                    value
                        .parse::<f64>()
                        .map(|v| Sample::new(timestamp, v))
                        .map_err(|_| JudgeError::Decode(format!("bad sample value {value:?}")))
                })
                .collect::<JudgeResult<Vec<_>>>()?;
            Ok(Series {
                labels: raw.metric,
                samples,
            })
        })
        .collect()
}
