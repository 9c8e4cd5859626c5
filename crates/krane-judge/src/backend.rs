//! Metrics backend abstraction.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use crate::error::JudgeResult;

/// One `(timestamp, value)` point. Timestamps are unix seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: f64,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: f64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// A labelled series of samples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    pub labels: BTreeMap<String, String>,
    pub samples: Vec<Sample>,
}

impl Series {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self {
            labels: BTreeMap::new(),
            samples,
        }
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.labels.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{k}=\"{v}\"")?;
        }
        f.write_str("}")
    }
}

/// Result of a range query: one entry per returned series.
pub type Matrix = Vec<Series>;

/// Time window and resolution of a range query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryRange {
    pub start: SystemTime,
    pub end: SystemTime,
    pub step: Duration,
}

/// A time-series store that can answer range queries.
#[async_trait]
pub trait MetricsBackend: Send + Sync {
    async fn range_query(&self, expr: &str, range: &QueryRange) -> JudgeResult<Matrix>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_display_lists_labels() {
        let s = Series::new(Vec::new())
            .with_label("container_name", "app")
            .with_label("name", "api-canary-1");
        assert_eq!(s.to_string(), r#"{container_name="app",name="api-canary-1"}"#);
        assert_eq!(Series::default().to_string(), "{}");
    }
}
