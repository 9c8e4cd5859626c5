//! Explicit reconcile context handed to every sub-reconciler.

use std::time::Duration;

use krane_core::config::DEFAULT_PROMETHEUS;
use krane_core::{KraneConfig, Release};
use krane_state::ObjectStore;
use tracing::debug;

use crate::error::ReconcileResult;
use crate::registry::TaskRegistry;

/// Engine knobs derived from `krane.toml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Delay before a non-terminal release is reconciled again.
    pub requeue_after: Duration,
    /// Interval between full relists of releases.
    pub resync_interval: Duration,
    /// Distinct releases reconciled in parallel.
    pub max_concurrent: usize,
    /// Metrics backend address written into judge tasks.
    pub prometheus: String,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            requeue_after: Duration::from_secs(5),
            resync_interval: Duration::from_secs(5),
            max_concurrent: 8,
            prometheus: DEFAULT_PROMETHEUS.to_string(),
        }
    }
}

impl ControllerSettings {
    pub fn from_config(config: &KraneConfig) -> Self {
        Self {
            requeue_after: config.controller.requeue_after(),
            resync_interval: config.controller.resync_interval(),
            max_concurrent: config.controller.max_concurrent.max(1),
            prometheus: config.judge.prometheus.clone(),
        }
    }
}

/// Store handle, settings and task registry shared by all reconcile passes.
pub struct Context<S: ObjectStore> {
    store: S,
    settings: ControllerSettings,
    tasks: TaskRegistry,
}

impl<S: ObjectStore> Context<S> {
    pub fn new(store: S, settings: ControllerSettings) -> Self {
        Self {
            store,
            settings,
            tasks: TaskRegistry::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    /// Persist the release status and refresh `release` from the reply,
    /// so the next write carries the new resource version.
    pub fn write_status(&self, release: &mut Release) -> ReconcileResult<()> {
        *release = self.store.update_status(&*release)?;
        debug!(
            release = %release.metadata.key(),
            version = release.metadata.resource_version,
            "release status written"
        );
        Ok(())
    }
}

/// What the dispatcher should do after a reconcile pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Action {
    pub requeue_after: Option<Duration>,
}

impl Action {
    /// Nothing left to do until the release changes.
    pub fn done() -> Self {
        Self {
            requeue_after: None,
        }
    }

    pub fn requeue(after: Duration) -> Self {
        Self {
            requeue_after: Some(after),
        }
    }
}
