//! One reconcile pass over a release.

use krane_core::{Policy, Progress, Release};
use krane_state::ObjectStore;
use tracing::{debug, info};

use crate::cleanup::reconcile_cleanup;
use crate::context::{Action, Context};
use crate::error::{ReconcileError, ReconcileResult};
use crate::init::reconcile_initialization;
use crate::jobs::reconcile_job;
use crate::phase::{self, Transition};
use crate::reporting::reconcile_reporting;
use crate::tasks::JobKind;
use crate::traffic::reconcile_canary;

/// Stages whose sub-reconcilers read the release's policy.
fn needs_policy(progress: Progress) -> bool {
    matches!(
        progress,
        Progress::Testing | Progress::Canary | Progress::Cleanup
    )
}

fn load_policy<S: ObjectStore>(ctx: &Context<S>, release: &Release) -> ReconcileResult<Policy> {
    ctx.store()
        .find::<Policy>(&release.metadata.namespace, &release.spec.policy)?
        .ok_or_else(|| ReconcileError::MissingPolicy(release.spec.policy.clone()))
}

/// Reconcile the named release once.
///
/// Runs the sub-reconcilers of the current stage in phase order, then
/// evaluates the phase machine once. Each status write carries the
/// resource version of the last read, so a concurrent writer surfaces as
/// a transient conflict and the pass is retried.
pub fn reconcile<S: ObjectStore>(
    ctx: &Context<S>,
    namespace: &str,
    name: &str,
) -> ReconcileResult<Action> {
    let Some(mut release) = ctx.store().find::<Release>(namespace, name)? else {
        debug!(%namespace, %name, "release not found, forgetting");
        return Ok(Action::done());
    };
    if release.is_terminal() {
        return Ok(Action::done());
    }

    if phase::initialize(&mut release.status) {
        info!(release = %name, "release initializing");
        ctx.write_status(&mut release)?;
    }
    let progress = release.status.progress.unwrap_or(Progress::Initializing);
    debug!(release = %name, %progress, "reconciling release");

    let policy = if needs_policy(progress) {
        Some(load_policy(ctx, &release)?)
    } else {
        None
    };

    reconcile_initialization(ctx, &mut release)?;
    if let Some(policy) = &policy {
        reconcile_job(ctx, &mut release, policy, JobKind::LoadTest)?;
        reconcile_job(ctx, &mut release, policy, JobKind::Judge)?;
        reconcile_canary(ctx, &mut release, policy)?;
    }
    reconcile_reporting(ctx, &mut release)?;
    if let Some(policy) = &policy {
        reconcile_cleanup(ctx, &mut release, policy)?;
    }

    let on_failure = policy
        .as_ref()
        .map(|p| p.spec.on_failure)
        .unwrap_or_default();
    let transition = phase::evaluate(&release.status, on_failure);
    if let Transition::Halted(failed) = transition {
        debug!(release = %name, phase = %failed, "release halted on failure");
    }
    if phase::apply(&mut release.status, transition) {
        ctx.write_status(&mut release)?;
    }

    if release.is_terminal() {
        info!(release = %name, "release finished");
        Ok(Action::done())
    } else {
        Ok(Action::requeue(ctx.settings().requeue_after))
    }
}
