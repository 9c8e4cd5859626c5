//! Job orchestration: create each ephemeral task once, then mirror its
//! container state into the release's phase status.

use krane_core::{ContainerState, PhaseState, Policy, Progress, Release, Task};
use krane_state::ObjectStore;
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::error::ReconcileResult;
use crate::registry::TaskObservation;
use crate::tasks::JobKind;

/// Whether `kind` runs during the release's current stage.
pub fn is_active(kind: JobKind, progress: Option<Progress>) -> bool {
    match kind {
        JobKind::LoadTest => progress == Some(Progress::Testing),
        JobKind::Judge => matches!(progress, Some(Progress::Testing | Progress::Canary)),
    }
}

/// Reduce a task's reported state to an observation.
pub fn observe(task: &Task, container: &str) -> TaskObservation {
    match task.container_state(container) {
        Some(ContainerState::Running { .. }) => TaskObservation::Running,
        Some(ContainerState::Terminated { exit_code }) => TaskObservation::Exited(*exit_code),
        Some(ContainerState::Waiting { .. }) | None => TaskObservation::Pending,
    }
}

/// Phase status implied by an observation.
pub fn phase_state(observation: TaskObservation) -> (PhaseState, String) {
    match observation {
        TaskObservation::Created | TaskObservation::Pending => {
            (PhaseState::InProgress, "task pending".to_string())
        }
        TaskObservation::Running => (PhaseState::InProgress, "task running".to_string()),
        TaskObservation::Exited(0) => (
            PhaseState::Success,
            "task finished successfully".to_string(),
        ),
        TaskObservation::Exited(code) => {
            (PhaseState::Failure, format!("task exited with code {code}"))
        }
        TaskObservation::Vanished => (
            PhaseState::Failure,
            "task vanished before finishing".to_string(),
        ),
    }
}

/// Create-if-absent, then observe. At most one task per kind per release.
pub fn reconcile_job<S: ObjectStore>(
    ctx: &Context<S>,
    release: &mut Release,
    policy: &Policy,
    kind: JobKind,
) -> ReconcileResult<()> {
    if !is_active(kind, release.status.progress) {
        return Ok(());
    }

    let phase = kind.phase();
    let current = release.status.phases.get(phase);
    if current.is(PhaseState::Success) || current.is(PhaseState::Failure) {
        return Ok(());
    }

    let ns = release.metadata.namespace.clone();
    let name = kind.task_name(release);
    let recorded = current.task_name.as_deref() == Some(name.as_str());

    let Some(task) = ctx.store().find::<Task>(&ns, &name)? else {
        if recorded || ctx.tasks().is_known(&ns, &name) {
            warn!(release = %release.metadata.name, task = %name, "task vanished");
            ctx.tasks().observe(&ns, &name, TaskObservation::Vanished);
            let (state, message) = phase_state(TaskObservation::Vanished);
            if release.status.phases.get_mut(phase).set(state, message) {
                ctx.write_status(release)?;
            }
            return Ok(());
        }

        let task = kind.build(release, policy, &ctx.settings().prometheus)?;
        ctx.store().create(&task)?;
        ctx.tasks().observe(&ns, &name, TaskObservation::Created);
        info!(release = %release.metadata.name, task = %name, %phase, "task created");

        let (state, message) = phase_state(TaskObservation::Created);
        let status = release.status.phases.get_mut(phase);
        status.task_name = Some(name);
        status.set(state, message);
        return ctx.write_status(release);
    };

    let observation = observe(&task, kind.container());
    let previous = ctx.tasks().observe(&ns, &name, observation);
    if previous != Some(observation) {
        debug!(task = %name, ?previous, current = ?observation, "task state changed");
    }

    let (state, message) = phase_state(observation);
    let status = release.status.phases.get_mut(phase);
    let mut changed = status.set(state, message);
    if !recorded {
        status.task_name = Some(name);
        changed = true;
    }
    if changed {
        ctx.write_status(release)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use krane_core::*;
    use krane_state::StateStore;

    use super::*;
    use crate::context::ControllerSettings;

    fn policy() -> Policy {
        Policy::new(
            "default",
            "p",
            PolicySpec {
                base: "api".into(),
                baseline_mode: BaselineMode::Old,
                service: "api".into(),
                routing_rule: "api".into(),
                on_failure: FailurePolicy::Halt,
                load_test: LoadTestSpec {
                    image: "loadtest".into(),
                    cmd: vec![],
                    request_boundary: Some(10),
                    time_boundary: None,
                },
                judge: JudgeSpec {
                    image: "judge".into(),
                    cmd: vec![],
                    diff_metrics: vec![],
                    threshold_metrics: vec![],
                    time_boundary: Some("1m".into()),
                },
            },
        )
    }

    fn setup(progress: Progress) -> (Context<StateStore>, Release) {
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
        release.status.progress = Some(progress);
        let release = store.create(&release).unwrap();
        (Context::new(store, ControllerSettings::default()), release)
    }

    fn report(ctx: &Context<StateStore>, name: &str, state: ContainerState, container: &str) {
        let mut task: Task = ctx.store().get("default", name).unwrap();
        task.status.containers = vec![ContainerStatus {
            name: container.to_string(),
            state,
        }];
        ctx.store().update_status(&task).unwrap();
    }

    #[test]
    fn activity_windows() {
        assert!(is_active(JobKind::LoadTest, Some(Progress::Testing)));
        assert!(!is_active(JobKind::LoadTest, Some(Progress::Canary)));
        assert!(is_active(JobKind::Judge, Some(Progress::Canary)));
        assert!(!is_active(JobKind::Judge, Some(Progress::Reporting)));
        assert!(!is_active(JobKind::Judge, None));
    }

    #[test]
    fn creates_task_once() {
        let (ctx, mut release) = setup(Progress::Testing);
        let policy = policy();

        reconcile_job(&ctx, &mut release, &policy, JobKind::LoadTest).unwrap();
        let testing = &release.status.phases.testing;
        assert!(testing.is(PhaseState::InProgress));
        assert_eq!(testing.task_name.as_deref(), Some("r-testjob"));
        assert_eq!(testing.message, "task pending");
        assert_eq!(
            ctx.tasks().get("default", "r-testjob"),
            Some(TaskObservation::Created)
        );

        // Still pending: nothing to write.
        let version = release.metadata.resource_version;
        reconcile_job(&ctx, &mut release, &policy, JobKind::LoadTest).unwrap();
        reconcile_job(&ctx, &mut release, &policy, JobKind::LoadTest).unwrap();
        assert_eq!(release.metadata.resource_version, version);
        assert_eq!(
            ctx.tasks().get("default", "r-testjob"),
            Some(TaskObservation::Pending)
        );
        assert_eq!(ctx.store().list::<Task>(None).unwrap().len(), 1);
    }

    #[test]
    fn maps_container_states() {
        let (ctx, mut release) = setup(Progress::Testing);
        let policy = policy();
        reconcile_job(&ctx, &mut release, &policy, JobKind::Judge).unwrap();

        report(&ctx, "r-judge", ContainerState::Running { started_at: 1 }, "judge");
        reconcile_job(&ctx, &mut release, &policy, JobKind::Judge).unwrap();
        assert!(release.status.phases.judging.is(PhaseState::InProgress));
        assert_eq!(release.status.phases.judging.message, "task running");

        report(&ctx, "r-judge", ContainerState::Terminated { exit_code: 1 }, "judge");
        reconcile_job(&ctx, &mut release, &policy, JobKind::Judge).unwrap();
        assert!(release.status.phases.judging.is(PhaseState::Failure));
        assert_eq!(
            ctx.tasks().get("default", "r-judge"),
            Some(TaskObservation::Exited(1))
        );
    }

    #[test]
    fn zero_exit_is_success() {
        let (ctx, mut release) = setup(Progress::Testing);
        let policy = policy();
        reconcile_job(&ctx, &mut release, &policy, JobKind::LoadTest).unwrap();
        report(&ctx, "r-testjob", ContainerState::Terminated { exit_code: 0 }, "testjob");

        reconcile_job(&ctx, &mut release, &policy, JobKind::LoadTest).unwrap();
        assert!(release.status.phases.testing.is(PhaseState::Success));
    }

    #[test]
    fn sidecar_state_is_ignored() {
        let (ctx, mut release) = setup(Progress::Testing);
        let policy = policy();
        reconcile_job(&ctx, &mut release, &policy, JobKind::LoadTest).unwrap();
        report(&ctx, "r-testjob", ContainerState::Terminated { exit_code: 0 }, "proxy");

        reconcile_job(&ctx, &mut release, &policy, JobKind::LoadTest).unwrap();
        assert!(release.status.phases.testing.is(PhaseState::InProgress));
        assert_eq!(release.status.phases.testing.message, "task pending");
    }

    #[test]
    fn vanished_task_is_not_recreated() {
        let (ctx, mut release) = setup(Progress::Testing);
        let policy = policy();
        reconcile_job(&ctx, &mut release, &policy, JobKind::LoadTest).unwrap();
        ctx.store().delete::<Task>("default", "r-testjob").unwrap();

        reconcile_job(&ctx, &mut release, &policy, JobKind::LoadTest).unwrap();
        assert!(release.status.phases.testing.is(PhaseState::Failure));
        assert!(ctx.store().list::<Task>(None).unwrap().is_empty());
        assert_eq!(
            ctx.tasks().get("default", "r-testjob"),
            Some(TaskObservation::Vanished)
        );
    }

    #[test]
    fn vanished_is_detected_from_status_after_restart() {
        let (ctx, mut release) = setup(Progress::Testing);
        let policy = policy();
        reconcile_job(&ctx, &mut release, &policy, JobKind::LoadTest).unwrap();
        ctx.store().delete::<Task>("default", "r-testjob").unwrap();

        // Fresh context: the registry is empty, the release status remembers.
        let store = ctx.store().clone();
        let restarted = Context::new(store, ControllerSettings::default());
        reconcile_job(&restarted, &mut release, &policy, JobKind::LoadTest).unwrap();
        assert!(release.status.phases.testing.is(PhaseState::Failure));
    }

    #[test]
    fn inactive_stage_is_skipped() {
        let (ctx, mut release) = setup(Progress::Canary);
        reconcile_job(&ctx, &mut release, &policy(), JobKind::LoadTest).unwrap();
        assert!(ctx.store().list::<Task>(None).unwrap().is_empty());
        assert_eq!(release.metadata.resource_version, 1);
    }
}
