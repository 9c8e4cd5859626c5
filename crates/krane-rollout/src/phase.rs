//! The release phase state machine.
//!
//! ```text
//! Initializing ──► Testing ──► Canary ──► Reporting ──► Cleanup
//!      │              │           │            │
//!  initialization  testing     canary      reporting      (terminal once
//!    == Success   == Success  == Success   == Success      cleanup succeeds)
//! ```
//!
//! A `Failure` in the active phase, or in `judging` while the judge is
//! still relevant, halts the machine. With `FailurePolicy::Rollback` the
//! machine instead jumps forward to `Cleanup`, so progress never
//! regresses.

use krane_core::{FailurePolicy, Phase, PhaseState, PhaseStatus, Progress, ReleaseStatus};
use tracing::{info, warn};

/// Outcome of evaluating the machine once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The active phase has not finished yet.
    Stay,
    /// A phase failed and the policy says to wait for an operator.
    Halted(Phase),
    /// Move to the next stage.
    Advance(Progress),
    /// A phase failed and the policy says to undo the release.
    Rollback(Phase),
    /// Cleanup is the last stage.
    Terminal,
}

/// Set `progress` to `Initializing` if unset. Returns true if changed.
pub fn initialize(status: &mut ReleaseStatus) -> bool {
    if status.progress.is_some() {
        return false;
    }
    status.progress = Some(Progress::Initializing);
    true
}

/// The phase whose failure stops the release, if any.
pub fn failed_phase(status: &ReleaseStatus) -> Option<Phase> {
    let progress = status.progress?;
    if progress == Progress::Cleanup {
        return None;
    }
    let active = progress.phase();
    if status.phases.get(active).is(PhaseState::Failure) {
        return Some(active);
    }
    let judging_relevant = matches!(progress, Progress::Testing | Progress::Canary);
    if judging_relevant && status.phases.judging.is(PhaseState::Failure) {
        return Some(Phase::Judging);
    }
    None
}

/// Compute the transition for the current status.
pub fn evaluate(status: &ReleaseStatus, on_failure: FailurePolicy) -> Transition {
    let Some(progress) = status.progress else {
        return Transition::Advance(Progress::Initializing);
    };

    if let Some(phase) = failed_phase(status) {
        return match on_failure {
            FailurePolicy::Halt => Transition::Halted(phase),
            FailurePolicy::Rollback => Transition::Rollback(phase),
        };
    }

    let Some(next) = progress.next() else {
        return Transition::Terminal;
    };
    if status.phases.get(progress.phase()).is(PhaseState::Success) {
        Transition::Advance(next)
    } else {
        Transition::Stay
    }
}

/// Apply a transition to `status`. Returns true if the status changed.
pub fn apply(status: &mut ReleaseStatus, transition: Transition) -> bool {
    match transition {
        Transition::Stay | Transition::Terminal | Transition::Halted(_) => false,
        Transition::Advance(next) => {
            if status.progress.is_some_and(|current| next <= current) {
                return false;
            }
            info!(from = ?status.progress, to = %next, "advancing release");
            status.progress = Some(next);
            *status.phases.get_mut(next.phase()) = PhaseStatus::default();
            true
        }
        Transition::Rollback(failed) => {
            if status.progress == Some(Progress::Cleanup) {
                return false;
            }
            warn!(from = ?status.progress, phase = %failed, "rolling back release");
            status.progress = Some(Progress::Cleanup);
            status.phases.cleanup = PhaseStatus {
                message: format!("rolling back after {failed} failure"),
                ..PhaseStatus::default()
            };
            true
        }
    }
}
