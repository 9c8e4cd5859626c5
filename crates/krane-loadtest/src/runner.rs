//! The request loop.

use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::error::{LoadTestError, LoadTestResult};
use crate::sender::RequestSender;
use crate::settings::LoadTestSettings;

/// Outcome of a completed load test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    /// Successful requests.
    pub requests: u64,
    /// Failed requests, tolerated ones included.
    pub failures: u64,
    pub elapsed: Duration,
}

pub struct LoadTest<S: RequestSender> {
    sender: S,
    settings: LoadTestSettings,
}

impl<S: RequestSender> LoadTest<S> {
    pub fn new(sender: S, settings: LoadTestSettings) -> Self {
        Self { sender, settings }
    }

    /// Send requests until a boundary is reached.
    ///
    /// Fails once more than `max_retries` requests in a row have failed.
    pub async fn run(&self) -> LoadTestResult<Summary> {
        let started = Instant::now();
        let limit = self.settings.request_limit();
        let mut requests: u64 = 0;
        let mut failures: u64 = 0;
        let mut streak: u32 = 0;

        info!(
            target_host = %self.settings.target,
            limit = ?limit,
            boundary = ?self.settings.time_boundary,
            delay = ?self.settings.request_delay,
            "load test started"
        );

        loop {
            if limit.is_some_and(|limit| requests >= limit) {
                debug!(requests, "request boundary reached");
                break;
            }
            if self
                .settings
                .time_boundary
                .is_some_and(|boundary| started.elapsed() >= boundary)
            {
                debug!(requests, "time boundary reached");
                break;
            }

            match self.sender.send().await {
                Ok(()) => {
                    requests += 1;
                    if streak > 0 {
                        info!(after = streak, "target reachable");
                    }
                    streak = 0;
                    sleep(self.settings.request_delay).await;
                }
                Err(e) => {
                    failures += 1;
                    streak += 1;
                    if streak > self.settings.max_retries {
                        return Err(LoadTestError::RetriesExhausted {
                            attempts: streak,
                            last: e.to_string(),
                        });
                    }
                    warn!(
                        error = %e,
                        streak,
                        max_retries = self.settings.max_retries,
                        "request failed, retrying"
                    );
                    sleep(self.settings.retry_pause).await;
                }
            }
        }

        let summary = Summary {
            requests,
            failures,
            elapsed: started.elapsed(),
        };
        info!(
            requests = summary.requests,
            failures = summary.failures,
            elapsed = ?summary.elapsed,
            "load test finished"
        );
        Ok(summary)
    }
}
