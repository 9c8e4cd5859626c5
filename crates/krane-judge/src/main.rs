//! krane-judge: the judge task process.
//!
//! Reads its configuration from the task environment written by the
//! controller and exits with the verdict:
//!
//! ```text
//! 0  every metric stayed within margin until the time boundary
//! 1  a metric failed
//! 2  the environment is missing or malformed
//! ```

use std::process::ExitCode;

use krane_judge::{Judge, JudgeSettings, PrometheusClient};
use tracing::{error, info};

const EXIT_INVALID_ENV: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,krane_judge=debug")),
        )
        .init();

    let settings = match JudgeSettings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "cannot start judge");
            return ExitCode::from(EXIT_INVALID_ENV);
        }
    };

    let backend = match PrometheusClient::new(&settings.prometheus) {
        Ok(backend) => backend,
        Err(e) => {
            error!(error = %e, "cannot build metrics client");
            return ExitCode::from(EXIT_INVALID_ENV);
        }
    };

    info!(
        prometheus = %settings.prometheus,
        namespace = %settings.namespace,
        "judge starting"
    );
    let judge = Judge::new(backend, settings);
    let verdict = judge.run().await;
    info!(?verdict, "judge finished");

    ExitCode::from(verdict.exit_code())
}
