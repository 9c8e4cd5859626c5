//! krane-loadtest: the load-test task process.
//!
//! Exit codes: 0 when a boundary was reached, 1 when the target stayed
//! unreachable past the retry budget, 2 on a malformed environment.

use std::process::ExitCode;

use krane_loadtest::{HyperSender, LoadTest, LoadTestSettings};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,krane_loadtest=debug")),
        )
        .init();

    let settings = match LoadTestSettings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "cannot start load test");
            return ExitCode::from(2);
        }
    };

    let sender = HyperSender::new(&settings.target);
    match LoadTest::new(sender, settings).run().await {
        Ok(summary) => {
            info!(requests = summary.requests, "load test complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "load test aborted");
            ExitCode::FAILURE
        }
    }
}
