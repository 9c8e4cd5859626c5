//! krane-state: the cluster store collaborator for Krane.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for releases, policies, workloads, tasks and routing rules.
//!
//! # Architecture
//!
//! Every kind lives in its own table keyed by `{namespace}/{name}` with
//! JSON-serialized values. Each stored object carries a `resource_version`;
//! updates are conditional on the caller's version and fail with
//! [`StateError::Conflict`] when the object was modified concurrently.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across tasks and threads.

pub mod error;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use store::{ObjectStore, StateStore};
