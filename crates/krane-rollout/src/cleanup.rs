//! Cleanup: delete the release's ephemeral resources and undo its split.

use krane_core::{PhaseState, Policy, Progress, Release, Resource, Task, Workload};
use krane_state::ObjectStore;
use tracing::{debug, info};

use crate::context::Context;
use crate::error::ReconcileResult;
use crate::tasks::task_names;
use crate::traffic::restore_routing;

/// Delete an object, treating an already missing one as deleted.
fn delete_if_present<S: ObjectStore, R: Resource>(
    ctx: &Context<S>,
    namespace: &str,
    name: &str,
) -> ReconcileResult<bool> {
    match ctx.store().delete::<R>(namespace, name) {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e.into()),
    }
}

pub fn reconcile_cleanup<S: ObjectStore>(
    ctx: &Context<S>,
    release: &mut Release,
    policy: &Policy,
) -> ReconcileResult<()> {
    if release.status.progress != Some(Progress::Cleanup) {
        return Ok(());
    }
    if release.status.phases.cleanup.is(PhaseState::Success) {
        return Ok(());
    }

    let ns = release.metadata.namespace.clone();
    let tasks = task_names(release);
    for task in &tasks {
        if delete_if_present::<S, Task>(ctx, &ns, task)? {
            debug!(release = %release.metadata.name, %task, "task deleted");
        }
    }
    let canary = release.spec.deployments.canary.clone();
    if delete_if_present::<S, Workload>(ctx, &ns, &canary)? {
        debug!(release = %release.metadata.name, workload = %canary, "canary workload deleted");
    }

    let restored = restore_routing(ctx, release, policy)?;
    ctx.tasks().forget(&ns, &tasks);

    release
        .status
        .phases
        .cleanup
        .set(PhaseState::Success, "release cleaned up");
    ctx.write_status(release)?;
    info!(release = %release.metadata.name, ?restored, "cleanup complete");
    Ok(())
}
