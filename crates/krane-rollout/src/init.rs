//! Initialization: wait for the canary and baseline workloads.

use krane_core::{PhaseState, Progress, Release, Workload};
use krane_state::ObjectStore;
use tracing::debug;

use crate::context::Context;
use crate::error::ReconcileResult;

/// Mark initialization `Success` once both workloads have an available
/// replica. Read errors propagate and leave the status untouched.
pub fn reconcile_initialization<S: ObjectStore>(
    ctx: &Context<S>,
    release: &mut Release,
) -> ReconcileResult<()> {
    if release.status.progress != Some(Progress::Initializing) {
        return Ok(());
    }
    if release.status.phases.initialization.is(PhaseState::Success) {
        return Ok(());
    }

    let ns = release.metadata.namespace.clone();
    let deployments = &release.spec.deployments;
    let canary: Workload = ctx.store().get(&ns, &deployments.canary)?;
    let baseline: Workload = ctx.store().get(&ns, &deployments.baseline)?;

    let (state, message) = if canary.is_available() && baseline.is_available() {
        (PhaseState::Success, "canary and baseline available".to_string())
    } else {
        debug!(
            release = %release.metadata.name,
            canary = canary.status.available_replicas,
            baseline = baseline.status.available_replicas,
            "workloads not ready"
        );
        (
            PhaseState::InProgress,
            format!(
                "waiting for workloads (canary {}, baseline {} available)",
                canary.status.available_replicas, baseline.status.available_replicas
            ),
        )
    };

    if release.status.phases.initialization.set(state, message) {
        ctx.write_status(release)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use krane_core::{Deployments, ReleaseSpec};
    use krane_state::StateStore;

    use super::*;
    use crate::context::ControllerSettings;

    fn setup() -> (Context<StateStore>, Release) {
        let store = StateStore::open_in_memory().unwrap();
        let mut release = Release::new(
            "default",
            "r",
            ReleaseSpec {
                policy: "p".into(),
                deployments: Deployments {
                    canary: "c".into(),
                    baseline: "b".into(),
                    base: "api".into(),
                },
            },
        );
        release.status.progress = Some(Progress::Initializing);
        let release = store.create(&release).unwrap();
        (Context::new(store, ControllerSettings::default()), release)
    }

    fn workload(ctx: &Context<StateStore>, name: &str, available: u32) {
        let created = ctx.store().create(&Workload::new("default", name, 1)).unwrap();
        let mut ready = created.clone();
        ready.status.available_replicas = available;
        ctx.store().update_status(&ready).unwrap();
    }

    #[test]
    fn succeeds_when_both_available() {
        let (ctx, mut release) = setup();
        workload(&ctx, "c", 1);
        workload(&ctx, "b", 1);

        reconcile_initialization(&ctx, &mut release).unwrap();
        assert!(release.status.phases.initialization.is(PhaseState::Success));
        assert_eq!(release.metadata.resource_version, 2);
    }

    #[test]
    fn waits_for_baseline() {
        let (ctx, mut release) = setup();
        workload(&ctx, "c", 2);
        workload(&ctx, "b", 0);

        reconcile_initialization(&ctx, &mut release).unwrap();
        let phase = &release.status.phases.initialization;
        assert!(phase.is(PhaseState::InProgress));
        assert!(phase.message.contains("baseline 0"));

        // Unchanged readiness writes nothing.
        let version = release.metadata.resource_version;
        reconcile_initialization(&ctx, &mut release).unwrap();
        assert_eq!(release.metadata.resource_version, version);
    }

    #[test]
    fn missing_workload_is_surfaced() {
        let (ctx, mut release) = setup();
        workload(&ctx, "c", 1);

        let err = reconcile_initialization(&ctx, &mut release).unwrap_err();
        assert!(err.is_transient());
        assert!(release.status.phases.initialization.is(PhaseState::Queued));
    }
}
