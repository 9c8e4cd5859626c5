//! Pass/fail verdicts from metrics-backend time series.
//!
//! The judge compares canary and baseline series for each configured
//! metric and fails a release when a signal stays above its margin for
//! too many consecutive samples.
//!
//! # Algorithm
//!
//! ```text
//! every poll interval (20s):
//!     for each diff metric:
//!         expr   = metric{canary} - on(container) metric{baseline}
//!         matrix = range_query(expr, judge_start, now, step = 5s)
//!         for each series, samples in timestamp order:
//!             counter = value > margin ? counter + 1 : 0
//!             counter > 10  →  metric failed (terminal)
//!     elapsed >= time boundary  →  pass
//! ```
//!
//! Backend errors are transient: they are logged and the next poll
//! tries again. Only a sustained violation produces a failing verdict.

pub mod backend;
pub mod error;
pub mod judge;
pub mod prometheus;
pub mod query;
pub mod tracker;

pub use backend::{Matrix, MetricsBackend, QueryRange, Sample, Series};
pub use error::{JudgeError, JudgeResult};
pub use judge::{Judge, JudgeSettings, MetricFailure, Verdict};
pub use prometheus::PrometheusClient;
pub use tracker::{Violation, ViolationTracker};
