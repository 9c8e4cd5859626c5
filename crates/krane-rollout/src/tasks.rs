//! Deterministic names and specs of the ephemeral load-test and judge tasks.

use std::collections::BTreeMap;

use krane_core::{
    ContainerSpec, ObjectMeta, Phase, Policy, Release, RestartPolicy, Task, TaskSpec, env,
};

use crate::error::{ReconcileError, ReconcileResult};

/// Label naming the release that owns a task.
pub const RELEASE_LABEL: &str = "krane.io/release";

/// The two kinds of ephemeral task a release runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    LoadTest,
    Judge,
}

impl JobKind {
    pub const ALL: [JobKind; 2] = [JobKind::LoadTest, JobKind::Judge];

    /// Name suffix and container name.
    pub fn container(&self) -> &'static str {
        match self {
            JobKind::LoadTest => env::LOAD_TEST_CONTAINER,
            JobKind::Judge => env::JUDGE_CONTAINER,
        }
    }

    /// Phase record the task's state is written to.
    pub fn phase(&self) -> Phase {
        match self {
            JobKind::LoadTest => Phase::Testing,
            JobKind::Judge => Phase::Judging,
        }
    }

    /// `{release}-testjob` or `{release}-judge`.
    pub fn task_name(&self, release: &Release) -> String {
        format!("{}-{}", release.metadata.name, self.container())
    }

    /// Build the task spec from the release and its policy.
    pub fn build(&self, release: &Release, policy: &Policy, prometheus: &str) -> ReconcileResult<Task> {
        match self {
            JobKind::LoadTest => Ok(load_test_task(release, policy)),
            JobKind::Judge => judge_task(release, policy, prometheus),
        }
    }
}

/// Names of every task a release may own.
pub fn task_names(release: &Release) -> Vec<String> {
    JobKind::ALL.iter().map(|k| k.task_name(release)).collect()
}

fn task(release: &Release, kind: JobKind, container: ContainerSpec) -> Task {
    let name = kind.task_name(release);
    let mut metadata = ObjectMeta::new(&release.metadata.namespace, &name);
    metadata.labels.insert("app".to_string(), name.clone());
    metadata.labels.insert("version".to_string(), "stable".to_string());
    metadata
        .labels
        .insert(RELEASE_LABEL.to_string(), release.metadata.name.clone());

    Task {
        metadata,
        spec: TaskSpec {
            containers: vec![container],
            restart_policy: RestartPolicy::Never,
        },
        status: Default::default(),
    }
}

/// Load-test task: the release name doubles as the canary service host.
pub fn load_test_task(release: &Release, policy: &Policy) -> Task {
    let spec = &policy.spec.load_test;
    let mut vars = BTreeMap::new();
    vars.insert(env::TARGET.to_string(), release.metadata.name.clone());
    if let Some(requests) = spec.request_boundary {
        vars.insert(env::BOUNDARY_REQUESTS.to_string(), requests.to_string());
    }
    if let Some(time) = spec.time_boundary.as_ref().filter(|t| !t.is_empty()) {
        vars.insert(env::BOUNDARY_TIME.to_string(), time.clone());
    }

    task(
        release,
        JobKind::LoadTest,
        ContainerSpec {
            name: env::LOAD_TEST_CONTAINER.to_string(),
            image: spec.image.clone(),
            command: spec.cmd.clone(),
            env: vars,
        },
    )
}

/// Judge task with the metric lists encoded as JSON.
pub fn judge_task(release: &Release, policy: &Policy, prometheus: &str) -> ReconcileResult<Task> {
    let spec = &policy.spec.judge;
    let deployments = &release.spec.deployments;

    let mut vars = BTreeMap::new();
    vars.insert(env::TARGET.to_string(), release.metadata.name.clone());
    vars.insert(env::PROMETHEUS.to_string(), prometheus.to_string());
    vars.insert(env::CANARY.to_string(), deployments.canary.clone());
    vars.insert(env::BASELINE.to_string(), deployments.baseline.clone());
    vars.insert(env::NAMESPACE.to_string(), release.metadata.namespace.clone());
    if let Some(time) = spec.time_boundary.as_ref().filter(|t| !t.is_empty()) {
        vars.insert(env::BOUNDARY_TIME.to_string(), time.clone());
    }
    if !spec.diff_metrics.is_empty() {
        let json = serde_json::to_string(&spec.diff_metrics)
            .map_err(|e| ReconcileError::Encode(e.to_string()))?;
        vars.insert(env::DIFF_METRICS.to_string(), json);
    }
    if !spec.threshold_metrics.is_empty() {
        let json = serde_json::to_string(&spec.threshold_metrics)
            .map_err(|e| ReconcileError::Encode(e.to_string()))?;
        vars.insert(env::THRESHOLD_METRICS.to_string(), json);
    }

    Ok(task(
        release,
        JobKind::Judge,
        ContainerSpec {
            name: env::JUDGE_CONTAINER.to_string(),
            image: spec.image.clone(),
            command: spec.cmd.clone(),
            env: vars,
        },
    ))
}
