//! Reporting: record the outcome of a release that passed its canary stage.

use krane_core::{PhaseState, Progress, Release};
use krane_state::ObjectStore;
use tracing::info;

use crate::context::Context;
use crate::error::ReconcileResult;

pub fn reconcile_reporting<S: ObjectStore>(
    ctx: &Context<S>,
    release: &mut Release,
) -> ReconcileResult<()> {
    if release.status.progress != Some(Progress::Reporting) {
        return Ok(());
    }
    if release.status.phases.reporting.is(PhaseState::Success) {
        return Ok(());
    }

    release
        .status
        .phases
        .reporting
        .set(PhaseState::Success, "Reported");
    ctx.write_status(release)?;
    info!(release = %release.metadata.name, "release reported");
    Ok(())
}
