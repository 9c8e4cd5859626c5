//! The judge loop: poll the metrics backend until a metric fails or the
//! time boundary elapses.

use std::time::{Duration, SystemTime};

use krane_core::{DiffMetric, ThresholdMetric, env, parse_boundary, parse_duration};
use serde::de::DeserializeOwned;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::backend::{MetricsBackend, QueryRange};
use crate::error::{JudgeError, JudgeResult};
use crate::query::{diff_query, threshold_query};
use crate::tracker::{Violation, scan_matrix};

/// Interval between two evaluations of every metric.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(20);
/// Resolution of range queries.
pub const DEFAULT_STEP: Duration = Duration::from_secs(5);
/// Sleep before the first query while the sidecar proxy starts.
pub const DEFAULT_WARMUP: Duration = Duration::from_secs(10);

/// Everything the judge reads from its task environment.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeSettings {
    pub target: String,
    pub prometheus: String,
    pub canary: String,
    pub baseline: String,
    pub namespace: String,
    pub diff_metrics: Vec<DiffMetric>,
    pub threshold_metrics: Vec<ThresholdMetric>,
    /// `None` judges until a metric fails.
    pub time_boundary: Option<Duration>,
    pub poll_interval: Duration,
    pub step: Duration,
    pub warmup: Duration,
}

impl JudgeSettings {
    pub fn from_env() -> JudgeResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> JudgeResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| JudgeError::InvalidEnv(format!("{key} is not set")))
        };

        let warmup = match lookup(env::WARMUP) {
            Some(raw) => parse_duration(&raw).ok_or_else(|| {
                JudgeError::InvalidEnv(format!("{}: invalid duration {raw:?}", env::WARMUP))
            })?,
            None => DEFAULT_WARMUP,
        };

        let boundary = lookup(env::BOUNDARY_TIME);
        if let Some(raw) = boundary.as_deref() {
            if parse_duration(raw).is_none() {
                return Err(JudgeError::InvalidEnv(format!(
                    "{}: invalid duration {raw:?}",
                    env::BOUNDARY_TIME
                )));
            }
        }

        Ok(Self {
            target: required(env::TARGET)?,
            prometheus: required(env::PROMETHEUS)?,
            canary: required(env::CANARY)?,
            baseline: required(env::BASELINE)?,
            namespace: lookup(env::NAMESPACE).unwrap_or_else(|| "default".to_string()),
            diff_metrics: metric_list(env::DIFF_METRICS, lookup(env::DIFF_METRICS))?,
            threshold_metrics: metric_list(
                env::THRESHOLD_METRICS,
                lookup(env::THRESHOLD_METRICS),
            )?,
            time_boundary: parse_boundary(boundary.as_deref()),
            poll_interval: DEFAULT_POLL_INTERVAL,
            step: DEFAULT_STEP,
            warmup,
        })
    }
}

fn metric_list<T: DeserializeOwned>(key: &str, raw: Option<String>) -> JudgeResult<Vec<T>> {
    match raw {
        Some(raw) if !raw.trim().is_empty() => serde_json::from_str(&raw)
            .map_err(|e| JudgeError::InvalidEnv(format!("{key}: {e}"))),
        _ => Ok(Vec::new()),
    }
}

/// A metric whose series stayed above its margin for too long.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFailure {
    pub metric: String,
    pub query: String,
    pub margin: f64,
    pub violation: Violation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Pass,
    Fail(MetricFailure),
}

impl Verdict {
    /// Process exit code for this verdict.
    pub fn exit_code(&self) -> u8 {
        match self {
            Verdict::Pass => 0,
            Verdict::Fail(_) => 1,
        }
    }
}

/// One rendered query with its violation margin.
#[derive(Debug, Clone)]
struct Check {
    metric: String,
    query: String,
    margin: f64,
}

pub struct Judge<B: MetricsBackend> {
    backend: B,
    settings: JudgeSettings,
    checks: Vec<Check>,
}

impl<B: MetricsBackend> Judge<B> {
    pub fn new(backend: B, settings: JudgeSettings) -> Self {
        let diff = settings.diff_metrics.iter().map(|m| Check {
            metric: m.metric_name.clone(),
            query: diff_query(
                &m.metric_name,
                &m.container_label,
                &settings.canary,
                &settings.baseline,
            ),
            margin: m.margin_value,
        });
        let threshold = settings.threshold_metrics.iter().map(|m| Check {
            metric: m.metric_name.clone(),
            query: threshold_query(&m.metric_name, &m.container_label, &settings.canary),
            margin: m.value,
        });
        let checks = diff.chain(threshold).collect();

        Self {
            backend,
            settings,
            checks,
        }
    }

    pub fn settings(&self) -> &JudgeSettings {
        &self.settings
    }

    /// Rendered queries, diff metrics first.
    pub fn queries(&self) -> impl Iterator<Item = &str> {
        self.checks.iter().map(|c| c.query.as_str())
    }

    /// Evaluate every metric once over `range`.
    ///
    /// A failed metric is returned as soon as it is found. Backend errors
    /// do not stop the remaining metrics; the last one is returned after
    /// all of them were tried.
    pub async fn evaluate(&self, range: &QueryRange) -> JudgeResult<()> {
        let mut backend_error = None;

        for check in &self.checks {
            let matrix = match self.backend.range_query(&check.query, range).await {
                Ok(matrix) => matrix,
                Err(e) => {
                    warn!(metric = %check.metric, error = %e, "range query failed");
                    backend_error = Some(e);
                    continue;
                }
            };

            debug!(metric = %check.metric, series = matrix.len(), "evaluating metric");
            if let Some(violation) = scan_matrix(&matrix, check.margin) {
                return Err(JudgeError::MetricFailed(Box::new(MetricFailure {
                    metric: check.metric.clone(),
                    query: check.query.clone(),
                    margin: check.margin,
                    violation,
                })));
            }
        }

        match backend_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Poll until a metric fails or the time boundary elapses.
    pub async fn run(&self) -> Verdict {
        if !self.settings.warmup.is_zero() {
            info!(warmup = ?self.settings.warmup, "waiting for sidecar warm-up");
            sleep(self.settings.warmup).await;
        }

        let started = Instant::now();
        let start = SystemTime::now();
        info!(
            release = %self.settings.target,
            canary = %self.settings.canary,
            baseline = %self.settings.baseline,
            metrics = self.checks.len(),
            boundary = ?self.settings.time_boundary,
            "judging started"
        );

        let mut polls: u64 = 0;
        loop {
            polls += 1;
            let range = QueryRange {
                start,
                end: SystemTime::now(),
                step: self.settings.step,
            };

            match self.evaluate(&range).await {
                Ok(()) => debug!(poll = polls, "all metrics within margin"),
                Err(JudgeError::MetricFailed(failure)) => {
                    warn!(
                        metric = %failure.metric,
                        series = %failure.violation.series,
                        consecutive = failure.violation.consecutive,
                        "metric failed"
                    );
                    return Verdict::Fail(*failure);
                }
                Err(e) => warn!(poll = polls, error = %e, "evaluation incomplete, retrying next poll"),
            }

            if let Some(boundary) = self.settings.time_boundary {
                if started.elapsed() >= boundary {
                    info!(polls, elapsed = ?started.elapsed(), "time boundary reached, judge passed");
                    return Verdict::Pass;
                }
            }

            sleep(self.settings.poll_interval).await;
        }
    }
}
