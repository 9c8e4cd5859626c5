//! Load generation for the testing phase.
//!
//! The load-test task sends a fixed observation request to the release
//! target in a loop until a request or time boundary is reached:
//!
//! ```text
//! LoadTest::run
//!   ├── stop when requests >= boundary or elapsed >= boundary
//!   ├── sender.send()
//!   │     ok   → reset failure streak, sleep request delay
//!   │     err  → streak += 1, abort when streak > max retries,
//!   │            otherwise sleep retry pause
//!   └── Summary { requests, failures, elapsed }
//! ```
//!
//! Connection failures right after start are expected while the sidecar
//! proxy warms up, hence the tolerated failure streak.

pub mod error;
pub mod runner;
pub mod sender;
pub mod settings;

pub use error::{LoadTestError, LoadTestResult};
pub use runner::{LoadTest, Summary};
pub use sender::{HyperSender, RequestSender};
pub use settings::LoadTestSettings;
