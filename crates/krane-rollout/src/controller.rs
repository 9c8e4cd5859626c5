//! Dispatcher: decides when each release is reconciled.
//!
//! Releases become due on a periodic relist, on an explicit [`Trigger`],
//! or when a previous pass asked to be requeued. Due releases run on the
//! blocking pool, bounded by `max_concurrent`, and a release is never
//! reconciled twice at the same time.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use krane_core::Release;
use krane_state::ObjectStore;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, MissedTickBehavior, interval, sleep_until};
use tracing::{debug, error, info, warn};

use crate::context::{Action, Context, ControllerSettings};
use crate::error::{ErrorClass, ReconcileError, ReconcileResult};
use crate::reconcile::reconcile;

/// Namespace and name of a release.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReleaseKey {
    pub namespace: String,
    pub name: String,
}

impl ReleaseKey {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl std::fmt::Display for ReleaseKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Requests an immediate reconcile of a release. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Trigger {
    tx: mpsc::UnboundedSender<ReleaseKey>,
}

impl Trigger {
    /// A trigger not connected to any controller.
    pub fn detached() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self { tx }
    }

    pub fn fire(&self, namespace: &str, name: &str) {
        if self.tx.send(ReleaseKey::new(namespace, name)).is_err() {
            debug!(%namespace, %name, "controller not running, trigger dropped");
        }
    }
}

type PassOutcome = (ReleaseKey, Result<ReconcileResult<Action>, JoinError>);

pub struct Controller<S: ObjectStore + Clone + 'static> {
    ctx: Arc<Context<S>>,
    trigger: Trigger,
    triggers: mpsc::UnboundedReceiver<ReleaseKey>,
}

impl<S: ObjectStore + Clone + 'static> Controller<S> {
    pub fn new(store: S, settings: ControllerSettings) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            ctx: Arc::new(Context::new(store, settings)),
            trigger: Trigger { tx },
            triggers: rx,
        }
    }

    pub fn trigger(&self) -> Trigger {
        self.trigger.clone()
    }

    pub fn context(&self) -> Arc<Context<S>> {
        self.ctx.clone()
    }

    /// Run until `shutdown` flips, then wait for in-flight passes.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let settings = self.ctx.settings().clone();
        info!(
            resync_secs = settings.resync_interval.as_secs(),
            requeue_secs = settings.requeue_after.as_secs(),
            max_concurrent = settings.max_concurrent,
            "release controller started"
        );

        let mut due: HashMap<ReleaseKey, Instant> = HashMap::new();
        let mut in_flight: HashSet<ReleaseKey> = HashSet::new();
        let mut passes: JoinSet<PassOutcome> = JoinSet::new();
        let mut resync = interval(settings.resync_interval);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            self.dispatch(&mut due, &mut in_flight, &mut passes);
            // At capacity only a finished pass can make room.
            let saturated = in_flight.len() >= settings.max_concurrent.max(1);
            let next_due = due
                .iter()
                .filter(|(key, _)| !saturated && !in_flight.contains(*key))
                .map(|(_, at)| *at)
                .min();

            tokio::select! {
                _ = shutdown.changed() => {
                    info!("release controller shutting down");
                    break;
                }
                _ = resync.tick() => {
                    self.resync(&mut due, &in_flight).await;
                }
                Some(key) = self.triggers.recv() => {
                    debug!(release = %key, "reconcile triggered");
                    due.insert(key, Instant::now());
                }
                Some(joined) = passes.join_next(), if !passes.is_empty() => {
                    match joined {
                        Ok((key, outcome)) => {
                            in_flight.remove(&key);
                            self.finish(key, outcome, &mut due);
                        }
                        Err(e) => error!(error = %e, "reconcile task panicked"),
                    }
                }
                _ = sleep_until(next_due.unwrap_or_else(Instant::now)), if next_due.is_some() => {}
            }
        }

        while let Some(joined) = passes.join_next().await {
            if let Ok((key, outcome)) = joined {
                self.finish(key, outcome, &mut due);
            }
        }
        info!("release controller stopped");
    }

    /// Start every due release that is not already running.
    fn dispatch(
        &self,
        due: &mut HashMap<ReleaseKey, Instant>,
        in_flight: &mut HashSet<ReleaseKey>,
        passes: &mut JoinSet<PassOutcome>,
    ) {
        let now = Instant::now();
        let max = self.ctx.settings().max_concurrent.max(1);
        let mut ready: Vec<(ReleaseKey, Instant)> = due
            .iter()
            .filter(|(key, at)| **at <= now && !in_flight.contains(*key))
            .map(|(key, at)| (key.clone(), *at))
            .collect();
        ready.sort_by_key(|(_, at)| *at);

        for (key, _) in ready {
            if in_flight.len() >= max {
                break;
            }
            due.remove(&key);
            in_flight.insert(key.clone());

            let ctx = self.ctx.clone();
            passes.spawn(async move {
                let (ns, name) = (key.namespace.clone(), key.name.clone());
                let outcome =
                    tokio::task::spawn_blocking(move || reconcile(&ctx, &ns, &name)).await;
                (key, outcome)
            });
        }
    }

    /// Schedule the follow-up of a finished pass.
    fn finish(
        &self,
        key: ReleaseKey,
        outcome: Result<ReconcileResult<Action>, JoinError>,
        due: &mut HashMap<ReleaseKey, Instant>,
    ) {
        let requeue = self.ctx.settings().requeue_after;
        let after = match outcome {
            Ok(Ok(action)) => action.requeue_after,
            Ok(Err(e)) => {
                log_failure(&key, &e);
                Some(requeue)
            }
            Err(e) => {
                error!(release = %key, error = %e, "reconcile pass aborted");
                Some(requeue)
            }
        };

        if let Some(after) = after {
            let at = Instant::now() + after;
            // A trigger received during the pass keeps its earlier deadline.
            due.entry(key)
                .and_modify(|existing| *existing = (*existing).min(at))
                .or_insert(at);
        }
    }

    /// Mark every non-terminal release due.
    async fn resync(&self, due: &mut HashMap<ReleaseKey, Instant>, in_flight: &HashSet<ReleaseKey>) {
        let ctx = self.ctx.clone();
        let listed = tokio::task::spawn_blocking(move || ctx.store().list::<Release>(None)).await;
        let releases = match listed {
            Ok(Ok(releases)) => releases,
            Ok(Err(e)) => {
                warn!(error = %e, "listing releases failed");
                return;
            }
            Err(e) => {
                error!(error = %e, "release listing aborted");
                return;
            }
        };

        let now = Instant::now();
        let mut queued = 0usize;
        for release in releases.iter().filter(|r| !r.is_terminal()) {
            let key = ReleaseKey::new(&release.metadata.namespace, &release.metadata.name);
            if in_flight.contains(&key) || due.contains_key(&key) {
                continue;
            }
            due.insert(key, now);
            queued += 1;
        }
        debug!(total = releases.len(), queued, "releases resynced");
    }
}

fn log_failure(key: &ReleaseKey, e: &ReconcileError) {
    match e.class() {
        ErrorClass::Transient => debug!(release = %key, error = %e, "transient reconcile error, retrying"),
        ErrorClass::Configuration => warn!(release = %key, error = %e, "release waiting on configuration"),
        ErrorClass::Internal => error!(release = %key, error = %e, "reconcile failed"),
    }
}
