//! Judge error types.

use thiserror::Error;

use crate::judge::MetricFailure;

pub type JudgeResult<T> = Result<T, JudgeError>;

#[derive(Debug, Error)]
pub enum JudgeError {
    /// The backend could not answer; retried on the next poll.
    #[error("metrics backend error: {0}")]
    Backend(String),

    /// The backend answered with something other than a range matrix.
    #[error("unexpected backend response: {0}")]
    Decode(String),

    /// A metric violated its margin for too long. Terminal.
    #[error("metric {} failed: {} consecutive samples above {} in {}", .0.metric, .0.violation.consecutive, .0.margin, .0.violation.series)]
    MetricFailed(Box<MetricFailure>),

    #[error("invalid judge environment: {0}")]
    InvalidEnv(String),
}

impl JudgeError {
    pub fn is_metric_failure(&self) -> bool {
        matches!(self, JudgeError::MetricFailed(_))
    }
}
