use thiserror::Error;

pub type LoadTestResult<T> = Result<T, LoadTestError>;

#[derive(Debug, Error)]
pub enum LoadTestError {
    #[error("connection to {address} failed: {reason}")]
    Connect { address: String, reason: String },

    #[error("request failed: {0}")]
    Request(String),

    #[error("target answered {0}")]
    Status(u16),

    #[error("request timed out")]
    Timeout,

    #[error("giving up after {attempts} consecutive failures, last: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("invalid load-test environment: {0}")]
    InvalidEnv(String),
}
