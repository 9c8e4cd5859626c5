//! Consecutive-violation tracking.
//!
//! A single noisy sample above the margin is tolerated; a sustained run
//! of violations fails the metric.

use tracing::{debug, warn};

use crate::backend::{Matrix, Sample};

/// Violating samples in a row tolerated before a metric fails.
pub const MAX_CONSECUTIVE_VIOLATIONS: u32 = 10;

/// Tracks consecutive margin violations for one series.
#[derive(Debug, Clone)]
pub struct ViolationTracker {
    margin: f64,
    limit: u32,
    consecutive: u32,
}

impl ViolationTracker {
    pub fn new(margin: f64) -> Self {
        Self::with_limit(margin, MAX_CONSECUTIVE_VIOLATIONS)
    }

    pub fn with_limit(margin: f64, limit: u32) -> Self {
        Self {
            margin,
            limit,
            consecutive: 0,
        }
    }

    /// Record one sample value. Returns true once the run of violations
    /// exceeds the limit.
    pub fn record(&mut self, value: f64) -> bool {
        if value > self.margin {
            self.consecutive += 1;
        } else {
            self.consecutive = 0;
        }
        self.consecutive > self.limit
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}

/// Where and how a series failed.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    /// Label set of the failing series.
    pub series: String,
    /// Sample at which the limit was exceeded.
    pub sample: Sample,
    pub consecutive: u32,
}

/// Walk every series of `matrix` in timestamp order with a fresh tracker
/// per series. Returns the first series that exceeds the limit.
pub fn scan_matrix(matrix: &Matrix, margin: f64) -> Option<Violation> {
    for series in matrix {
        if series.samples.is_empty() {
            continue;
        }

        let mut samples = series.samples.clone();
        samples.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

        let mut tracker = ViolationTracker::new(margin);
        for sample in samples {
            if tracker.record(sample.value) {
                warn!(
                    series = %series,
                    timestamp = sample.timestamp,
                    value = sample.value,
                    margin,
                    "sustained metric violation"
                );
                return Some(Violation {
                    series: series.to_string(),
                    sample,
                    consecutive: tracker.consecutive(),
                });
            }
        }
        debug!(series = %series, trailing = tracker.consecutive(), "series within margin");
    }
    None
}
