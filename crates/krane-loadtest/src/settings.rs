//! Load-test configuration read from the task environment.

use std::time::Duration;

use krane_core::{env, parse_boundary, parse_duration};

use crate::error::{LoadTestError, LoadTestResult};

/// Requests sent when neither boundary is configured.
pub const DEFAULT_REQUEST_LIMIT: u64 = 1000;
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_RETRIES: u32 = 10;
/// Pause after a failed request before trying again.
pub const RETRY_PAUSE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub struct LoadTestSettings {
    /// `host[:port]` of the release service.
    pub target: String,
    pub request_boundary: Option<u64>,
    pub time_boundary: Option<Duration>,
    pub request_delay: Duration,
    /// Consecutive failures tolerated before giving up.
    pub max_retries: u32,
    pub retry_pause: Duration,
}

impl LoadTestSettings {
    pub fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            request_boundary: None,
            time_boundary: None,
            request_delay: DEFAULT_REQUEST_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_pause: RETRY_PAUSE,
        }
    }

    pub fn from_env() -> LoadTestResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> LoadTestResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let target = lookup(env::TARGET)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| LoadTestError::InvalidEnv(format!("{} is not set", env::TARGET)))?;

        let request_boundary = match lookup(env::BOUNDARY_REQUESTS) {
            Some(raw) if !raw.trim().is_empty() => {
                let n: u64 = raw.trim().parse().map_err(|_| {
                    LoadTestError::InvalidEnv(format!(
                        "{}: not a number: {raw:?}",
                        env::BOUNDARY_REQUESTS
                    ))
                })?;
                Some(n).filter(|n| *n > 0)
            }
            _ => None,
        };

        let time_raw = lookup(env::BOUNDARY_TIME);
        if let Some(raw) = time_raw.as_deref() {
            if !raw.trim().is_empty() && parse_duration(raw).is_none() {
                return Err(LoadTestError::InvalidEnv(format!(
                    "{}: invalid duration {raw:?}",
                    env::BOUNDARY_TIME
                )));
            }
        }

        let request_delay = match lookup(env::REQUEST_DELAY) {
            Some(raw) => parse_duration(&raw).ok_or_else(|| {
                LoadTestError::InvalidEnv(format!("{}: invalid duration {raw:?}", env::REQUEST_DELAY))
            })?,
            None => DEFAULT_REQUEST_DELAY,
        };

        let max_retries = match lookup(env::MAX_RETRIES) {
            Some(raw) => raw.trim().parse().map_err(|_| {
                LoadTestError::InvalidEnv(format!("{}: not a number: {raw:?}", env::MAX_RETRIES))
            })?,
            None => DEFAULT_MAX_RETRIES,
        };

        Ok(Self {
            target,
            request_boundary,
            time_boundary: parse_boundary(time_raw.as_deref()),
            request_delay,
            max_retries,
            retry_pause: RETRY_PAUSE,
        })
    }

    /// Request cap actually enforced. Falls back to
    /// [`DEFAULT_REQUEST_LIMIT`] so an unbounded task still terminates.
    pub fn request_limit(&self) -> Option<u64> {
        match (self.request_boundary, self.time_boundary) {
            (None, None) => Some(DEFAULT_REQUEST_LIMIT),
            (limit, _) => limit,
        }
    }
}
