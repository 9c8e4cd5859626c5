//! Resource types shared by every Krane crate.
//!
//! Release and Policy objects are the only durable state of a rollout.
//! Workloads, tasks and routing rules are the cluster-side objects the
//! engine reads and mutates while a release progresses.

pub mod config;
pub mod duration;
pub mod env;
pub mod meta;
pub mod types;

pub use config::KraneConfig;
pub use duration::{parse_boundary, parse_duration};
pub use meta::{Kind, ObjectMeta, Resource};
pub use types::*;
