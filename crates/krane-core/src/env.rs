//! Environment contract between the controller and its ephemeral tasks.
//!
//! The controller writes these variables into task containers; the
//! load-test and judge processes read them back.

/// Logical target of the release; canary services share the release name.
pub const TARGET: &str = "KRANE_TARGET";
/// Base URL of the metrics backend.
pub const PROMETHEUS: &str = "KRANE_PROMETHEUS";
/// Canary workload name, matched as a series label pattern.
pub const CANARY: &str = "KRANE_CANARY";
/// Baseline workload name, matched as a series label pattern.
pub const BASELINE: &str = "KRANE_BASELINE";
pub const NAMESPACE: &str = "KRANE_NAMESPACE";
/// JSON-encoded list of diff metrics.
pub const DIFF_METRICS: &str = "KRANE_DIFF_METRICS";
/// JSON-encoded list of threshold metrics.
pub const THRESHOLD_METRICS: &str = "KRANE_THRESHOLD_METRICS";
/// Duration after which the task stops; "0" or absent means unbounded.
pub const BOUNDARY_TIME: &str = "KRANE_BOUNDARY_TIME";
/// Number of requests after which the load test stops; 0 means unbounded.
pub const BOUNDARY_REQUESTS: &str = "KRANE_BOUNDARY_REQUESTS";
/// Sleep before the first judge query, waiting out the sidecar.
pub const WARMUP: &str = "KRANE_WARMUP";
/// Fixed delay between load-test requests.
pub const REQUEST_DELAY: &str = "KRANE_REQUEST_DELAY";
/// Consecutive request failures tolerated by the load test.
pub const MAX_RETRIES: &str = "KRANE_MAX_RETRIES";

/// Container name of the load-test task.
pub const LOAD_TEST_CONTAINER: &str = "testjob";
/// Container name of the judge task.
pub const JUDGE_CONTAINER: &str = "judge";
