//! Resource types for releases, policies and the cluster objects they drive.
//!
//! Field names serialize in camelCase so stored objects read like the
//! custom resources they model.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::meta::{Kind, ObjectMeta, impl_resource};

// ── Release ───────────────────────────────────────────────────────

/// One in-flight canary rollout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub metadata: ObjectMeta,
    pub spec: ReleaseSpec,
    #[serde(default)]
    pub status: ReleaseStatus,
}

impl_resource!(Release, Kind::Release, status);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseSpec {
    /// Name of the Policy governing this release.
    #[serde(rename = "policyRef")]
    pub policy: String,
    pub deployments: Deployments,
}

/// The three workloads involved in a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployments {
    pub canary: String,
    pub baseline: String,
    #[serde(default)]
    pub base: String,
}

/// Ordered stages of a release. Ordering follows declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Progress {
    Initializing,
    Testing,
    Canary,
    Reporting,
    Cleanup,
}

impl Progress {
    /// The stage after this one, or `None` for `Cleanup`.
    pub fn next(self) -> Option<Progress> {
        match self {
            Progress::Initializing => Some(Progress::Testing),
            Progress::Testing => Some(Progress::Canary),
            Progress::Canary => Some(Progress::Reporting),
            Progress::Reporting => Some(Progress::Cleanup),
            Progress::Cleanup => None,
        }
    }

    /// The phase record that gates leaving this stage.
    pub fn phase(self) -> Phase {
        match self {
            Progress::Initializing => Phase::Initialization,
            Progress::Testing => Phase::Testing,
            Progress::Canary => Phase::Canary,
            Progress::Reporting => Phase::Reporting,
            Progress::Cleanup => Phase::Cleanup,
        }
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Progress::Initializing => "initializing",
            Progress::Testing => "testing",
            Progress::Canary => "canary",
            Progress::Reporting => "reporting",
            Progress::Cleanup => "cleanup",
        };
        f.write_str(s)
    }
}

/// Names of the per-phase status records on a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Initialization,
    Testing,
    Canary,
    Judging,
    Reporting,
    Cleanup,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Initialization => "initialization",
            Phase::Testing => "testing",
            Phase::Canary => "canary",
            Phase::Judging => "judging",
            Phase::Reporting => "reporting",
            Phase::Cleanup => "cleanup",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhaseState {
    #[default]
    Queued,
    InProgress,
    Success,
    Failure,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseStatus {
    #[serde(default)]
    pub status: PhaseState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl PhaseStatus {
    pub fn is(&self, state: PhaseState) -> bool {
        self.status == state
    }

    /// Set state and message. Returns true if anything changed.
    pub fn set(&mut self, state: PhaseState, message: impl Into<String>) -> bool {
        let message = message.into();
        if self.status == state && self.message == message {
            return false;
        }
        self.status = state;
        self.message = message;
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phases {
    #[serde(default)]
    pub initialization: PhaseStatus,
    #[serde(default)]
    pub testing: PhaseStatus,
    #[serde(default)]
    pub canary: PhaseStatus,
    #[serde(default)]
    pub judging: PhaseStatus,
    #[serde(default)]
    pub reporting: PhaseStatus,
    #[serde(default)]
    pub cleanup: PhaseStatus,
}

impl Phases {
    pub fn get(&self, phase: Phase) -> &PhaseStatus {
        match phase {
            Phase::Initialization => &self.initialization,
            Phase::Testing => &self.testing,
            Phase::Canary => &self.canary,
            Phase::Judging => &self.judging,
            Phase::Reporting => &self.reporting,
            Phase::Cleanup => &self.cleanup,
        }
    }

    pub fn get_mut(&mut self, phase: Phase) -> &mut PhaseStatus {
        match phase {
            Phase::Initialization => &mut self.initialization,
            Phase::Testing => &mut self.testing,
            Phase::Canary => &mut self.canary,
            Phase::Judging => &mut self.judging,
            Phase::Reporting => &mut self.reporting,
            Phase::Cleanup => &mut self.cleanup,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    #[serde(default)]
    pub phases: Phases,
}

impl Release {
    pub fn new(namespace: &str, name: &str, spec: ReleaseSpec) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec,
            status: ReleaseStatus::default(),
        }
    }

    /// A release is finished once cleanup has succeeded.
    pub fn is_terminal(&self) -> bool {
        self.status.progress == Some(Progress::Cleanup)
            && self.status.phases.cleanup.is(PhaseState::Success)
    }
}

// ── Policy ────────────────────────────────────────────────────────

/// Template governing how releases of a workload are tested and judged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub metadata: ObjectMeta,
    pub spec: PolicySpec,
}

impl_resource!(Policy, Kind::Policy);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySpec {
    /// Workload cloned for the baseline.
    pub base: String,
    #[serde(default)]
    pub baseline_mode: BaselineMode,
    /// Logical service name; the routing destination the canary splits from.
    pub service: String,
    #[serde(rename = "routingRuleRef")]
    pub routing_rule: String,
    #[serde(default)]
    pub on_failure: FailurePolicy,
    #[serde(rename = "loadTestSpec")]
    pub load_test: LoadTestSpec,
    #[serde(rename = "judgeSpec")]
    pub judge: JudgeSpec,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaselineMode {
    /// Clone the canary spec, substituting the base workload's containers.
    #[default]
    #[serde(rename = "NEW")]
    New,
    /// Clone the base workload verbatim.
    #[serde(rename = "OLD")]
    Old,
}

/// What the engine does when a phase records `Failure`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Stop advancing and wait for an operator.
    #[default]
    Halt,
    /// Jump to `Cleanup`, undoing the traffic split.
    Rollback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadTestSpec {
    pub image: String,
    #[serde(default)]
    pub cmd: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_boundary: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_boundary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeSpec {
    pub image: String,
    #[serde(default)]
    pub cmd: Vec<String>,
    #[serde(default)]
    pub diff_metrics: Vec<DiffMetric>,
    #[serde(default)]
    pub threshold_metrics: Vec<ThresholdMetric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_boundary: Option<String>,
}

/// A differential canary-vs-baseline comparison with a violation margin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffMetric {
    #[serde(rename = "metric")]
    pub metric_name: String,
    #[serde(rename = "container")]
    pub container_label: String,
    #[serde(rename = "diff")]
    pub margin_value: f64,
}

/// An absolute ceiling on a canary-only signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdMetric {
    #[serde(rename = "metric")]
    pub metric_name: String,
    #[serde(rename = "container")]
    pub container_label: String,
    pub value: f64,
}

impl Policy {
    pub fn new(namespace: &str, name: &str, spec: PolicySpec) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec,
        }
    }
}

// ── Workload ──────────────────────────────────────────────────────

/// A long-running replicated workload (canary, baseline or base).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workload {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: WorkloadSpec,
    #[serde(default)]
    pub status: WorkloadStatus,
}

impl_resource!(Workload, Kind::Workload, status);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    #[serde(default)]
    pub replicas: u32,
    #[serde(default)]
    pub containers: Vec<ContainerSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadStatus {
    #[serde(default)]
    pub available_replicas: u32,
}

impl Workload {
    pub fn new(namespace: &str, name: &str, replicas: u32) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec: WorkloadSpec {
                replicas,
                containers: Vec::new(),
            },
            status: WorkloadStatus::default(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.status.available_replicas > 0
    }
}

// ── Task ──────────────────────────────────────────────────────────

/// An ephemeral run-to-completion unit (load test or judge).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub metadata: ObjectMeta,
    pub spec: TaskSpec,
    #[serde(default)]
    pub status: TaskStatus,
}

impl_resource!(Task, Kind::Task, status);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    pub containers: Vec<ContainerSpec>,
    #[serde(default)]
    pub restart_policy: RestartPolicy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestartPolicy {
    #[default]
    Never,
    OnFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    #[serde(default)]
    pub containers: Vec<ContainerStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub name: String,
    pub state: ContainerState,
}

/// Runtime state of one container, as reported by the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "camelCase")]
pub enum ContainerState {
    Waiting {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Running { started_at: u64 },
    #[serde(rename_all = "camelCase")]
    Terminated { exit_code: i32 },
}

impl Task {
    pub fn new(namespace: &str, name: &str, spec: TaskSpec) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec,
            status: TaskStatus::default(),
        }
    }

    /// State of the named container, if the cluster has reported one.
    pub fn container_state(&self, container: &str) -> Option<&ContainerState> {
        self.status
            .containers
            .iter()
            .find(|c| c.name == container)
            .map(|c| &c.state)
    }
}

// ── RoutingRule ───────────────────────────────────────────────────

/// Ordered match blocks of weighted destinations controlling live traffic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub metadata: ObjectMeta,
    pub spec: RoutingRuleSpec,
}

impl_resource!(RoutingRule, Kind::RoutingRule);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRuleSpec {
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub http: Vec<MatchBlock>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "match", skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<RouteMatch>,
    #[serde(default)]
    pub route: Vec<WeightedDestination>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteMatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedDestination {
    #[serde(rename = "targetName")]
    pub target: String,
    /// Zero means unset.
    #[serde(default)]
    pub weight: u32,
}

impl WeightedDestination {
    pub fn new(target: &str, weight: u32) -> Self {
        Self {
            target: target.to_string(),
            weight,
        }
    }
}

impl MatchBlock {
    pub fn position(&self, target: &str) -> Option<usize> {
        self.route.iter().position(|d| d.target == target)
    }

    pub fn total_weight(&self) -> u32 {
        self.route.iter().map(|d| d.weight).sum()
    }
}

impl RoutingRule {
    pub fn new(namespace: &str, name: &str, http: Vec<MatchBlock>) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec: RoutingRuleSpec {
                hosts: Vec::new(),
                http,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::Resource;

    #[test]
    fn progress_order_is_monotonic() {
        let mut p = Progress::Initializing;
        let mut seen = vec![p];
        while let Some(next) = p.next() {
            assert!(next > p);
            p = next;
            seen.push(p);
        }
        assert_eq!(seen.len(), 5);
        assert_eq!(p, Progress::Cleanup);
    }

    #[test]
    fn phase_status_set_reports_change() {
        let mut s = PhaseStatus::default();
        assert!(s.is(PhaseState::Queued));
        assert!(s.set(PhaseState::InProgress, "running"));
        assert!(!s.set(PhaseState::InProgress, "running"));
        assert!(s.set(PhaseState::InProgress, "still running"));
    }

    #[test]
    fn release_deserializes_from_resource_json() {
        let json = r#"{
            "metadata": {"name": "release-x", "namespace": "shop"},
            "spec": {
                "policyRef": "checkout-policy",
                "deployments": {"canary": "c", "baseline": "b", "base": "checkout"}
            },
            "status": {"progress": "canary", "phases": {"canary": {"status": "InProgress"}}}
        }"#;
        let release: Release = serde_json::from_str(json).unwrap();
        assert_eq!(release.spec.policy, "checkout-policy");
        assert_eq!(release.status.progress, Some(Progress::Canary));
        assert!(release.status.phases.canary.is(PhaseState::InProgress));
        assert!(release.status.phases.cleanup.is(PhaseState::Queued));
        assert!(!release.is_terminal());
    }

    #[test]
    fn diff_metric_uses_short_wire_names() {
        let m: DiffMetric =
            serde_json::from_str(r#"{"metric":"cpu","container":"app","diff":0.5}"#).unwrap();
        assert_eq!(m.metric_name, "cpu");
        assert_eq!(m.container_label, "app");
        assert_eq!(m.margin_value, 0.5);
    }

    #[test]
    fn container_state_is_tagged() {
        let status: ContainerStatus = serde_json::from_str(
            r#"{"name":"judge","state":{"phase":"terminated","exitCode":1}}"#,
        )
        .unwrap();
        assert_eq!(status.state, ContainerState::Terminated { exit_code: 1 });
    }

    #[test]
    fn copy_status_only_touches_status() {
        let mut a = Workload::new("default", "a", 3);
        let mut b = Workload::new("default", "a", 1);
        b.status.available_replicas = 2;
        a.copy_status_from(&b);
        assert_eq!(a.spec.replicas, 3);
        assert_eq!(a.status.available_replicas, 2);
    }

    #[test]
    fn routing_rule_uses_target_name() {
        let rule: RoutingRule = serde_json::from_str(
            r#"{"metadata":{"name":"vs"},"spec":{"http":[{"route":[{"targetName":"svc"}]}]}}"#,
        )
        .unwrap();
        assert_eq!(rule.spec.http[0].route[0], WeightedDestination::new("svc", 0));
        assert_eq!(rule.spec.http[0].position("svc"), Some(0));
        assert_eq!(rule.spec.http[0].total_weight(), 0);
    }
}
