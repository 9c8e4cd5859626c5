//! krane-rollout: the canary release engine.
//!
//! Drives each release through a fixed sequence of stages by running
//! idempotent sub-reconcilers against the object store and then
//! evaluating the phase machine once per pass.
//!
//! # Architecture
//!
//! ```text
//! Controller::run()
//!   ├── resync tick  → every non-terminal release due
//!   ├── Trigger      → one release due now
//!   └── due release  → spawn_blocking(reconcile)
//!
//! reconcile(ctx, ns, name)
//!   ├── init        Initializing: canary + baseline workloads available
//!   ├── jobs        Testing: load-test task; Testing/Canary: judge task
//!   ├── traffic     Canary: 90/10 split in the routing rule
//!   ├── reporting   Reporting
//!   ├── cleanup     Cleanup: delete tasks + canary, restore routing
//!   └── phase       evaluate → Advance | Halted | Rollback | Terminal
//! ```

pub mod cleanup;
pub mod context;
pub mod controller;
pub mod error;
pub mod init;
pub mod jobs;
pub mod phase;
pub mod reconcile;
pub mod registry;
pub mod reporting;
pub mod tasks;
pub mod traffic;

pub use context::{Action, Context, ControllerSettings};
pub use controller::{Controller, ReleaseKey, Trigger};
pub use error::{ErrorClass, ReconcileError, ReconcileResult};
pub use phase::Transition;
pub use reconcile::reconcile;
pub use registry::{TaskObservation, TaskRegistry};
pub use tasks::JobKind;
pub use traffic::{RestoreOutcome, ShiftOutcome};
