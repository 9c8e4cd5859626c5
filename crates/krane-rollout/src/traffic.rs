//! Traffic shifting over a routing rule's weighted destinations.
//!
//! The shift moves [`STEP`] percent of a match block's traffic from the
//! base destination (the policy's service) to a destination named after
//! the release. Cleanup folds it back. Both operate on the rule spec in
//! memory; the caller persists the result in one update.

use krane_core::{
    MatchBlock, PhaseState, Policy, Progress, Release, RoutingRule, RoutingRuleSpec,
    WeightedDestination,
};
use krane_state::ObjectStore;
use tracing::{debug, info};

use crate::context::Context;
use crate::error::{ReconcileError, ReconcileResult};

/// Weight moved to the canary destination.
pub const STEP: u32 = 10;
/// Implicit weight of a single unweighted destination.
pub const FULL_WEIGHT: u32 = 100;
/// Annotation recording which release seeded an unweighted base destination.
pub const SEEDED_BY: &str = "krane.io/seeded-by";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOutcome {
    /// No match block routes to the service yet.
    Pending,
    /// The canary destination is already present.
    AlreadyApplied,
    /// The split was added to match block `block`.
    Shifted { block: usize, seeded: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// No canary destination left; nothing to undo.
    Absent,
    /// The canary weight was folded back into the base destination.
    Restored { block: usize },
}

/// Index of the first match block with a destination targeting `target`.
fn find_block(spec: &RoutingRuleSpec, target: &str) -> Option<usize> {
    spec.http.iter().position(|b| b.position(target).is_some())
}

fn ambiguous(rule: &str, service: &str, reason: String) -> ReconcileError {
    ReconcileError::AmbiguousWeights {
        rule: rule.to_string(),
        service: service.to_string(),
        reason,
    }
}

/// Introduce the canary split into `spec`.
///
/// A base weight of zero is only accepted when the base is the sole
/// destination of its block (implicitly 100); it is seeded to 90/10.
pub fn shift(
    rule: &str,
    spec: &mut RoutingRuleSpec,
    service: &str,
    canary: &str,
) -> ReconcileResult<ShiftOutcome> {
    let Some(block_idx) = find_block(spec, service) else {
        return Ok(ShiftOutcome::Pending);
    };
    let block: &mut MatchBlock = &mut spec.http[block_idx];
    if block.position(canary).is_some() {
        return Ok(ShiftOutcome::AlreadyApplied);
    }

    let Some(base_idx) = block.position(service) else {
        return Ok(ShiftOutcome::Pending);
    };
    let base_weight = block.route[base_idx].weight;
    let seeded = base_weight == 0;

    let effective = if seeded {
        if block.route.len() != 1 {
            return Err(ambiguous(
                rule,
                service,
                format!(
                    "unweighted base alongside {} other destinations",
                    block.route.len() - 1
                ),
            ));
        }
        FULL_WEIGHT
    } else {
        base_weight
    };

    if effective < STEP {
        return Err(ambiguous(
            rule,
            service,
            format!("base weight {effective} below step {STEP}"),
        ));
    }

    block.route[base_idx].weight = effective - STEP;
    block.route.push(WeightedDestination::new(canary, STEP));
    Ok(ShiftOutcome::Shifted {
        block: block_idx,
        seeded,
    })
}

/// Remove the canary destination from `spec`, returning its weight to the
/// base destination. With `unseed` the base goes back to unweighted, but
/// only when it is the last destination left in the block.
pub fn restore(
    rule: &str,
    spec: &mut RoutingRuleSpec,
    service: &str,
    canary: &str,
    unseed: bool,
) -> ReconcileResult<RestoreOutcome> {
    let Some(block_idx) = find_block(spec, canary) else {
        return Ok(RestoreOutcome::Absent);
    };
    let block = &mut spec.http[block_idx];
    let Some(base_idx) = block.position(service) else {
        return Err(ReconcileError::MalformedRoute {
            rule: rule.to_string(),
            reason: format!("destination {canary} present without base destination {service}"),
        });
    };

    let Some(canary_idx) = block.position(canary) else {
        return Ok(RestoreOutcome::Absent);
    };
    let canary_weight = block.route.remove(canary_idx).weight;
    // Removing the canary may shift the base index.
    let base_idx = if canary_idx < base_idx {
        base_idx - 1
    } else {
        base_idx
    };
    block.route[base_idx].weight = if unseed && block.route.len() == 1 {
        0
    } else {
        block.route[base_idx].weight + canary_weight
    };
    Ok(RestoreOutcome::Restored { block: block_idx })
}

/// Traffic shifter for the `Canary` stage.
///
/// Marks the phase `InProgress` on entry, applies the split once, and
/// marks `Success` when the split is found in place.
pub fn reconcile_canary<S: ObjectStore>(
    ctx: &Context<S>,
    release: &mut Release,
    policy: &Policy,
) -> ReconcileResult<()> {
    if release.status.progress != Some(Progress::Canary) {
        return Ok(());
    }
    let phase = &release.status.phases.canary;
    if phase.is(PhaseState::Success) || phase.is(PhaseState::Failure) {
        return Ok(());
    }
    if phase.is(PhaseState::Queued) {
        release
            .status
            .phases
            .canary
            .set(PhaseState::InProgress, "shifting traffic");
        ctx.write_status(release)?;
    }

    let ns = release.metadata.namespace.clone();
    let rule_name = &policy.spec.routing_rule;
    let service = &policy.spec.service;
    let rule = ctx
        .store()
        .find::<RoutingRule>(&ns, rule_name)?
        .ok_or_else(|| ReconcileError::MissingRoutingRule(rule_name.clone()))?;

    let mut next = rule.clone();
    let canary = release.metadata.name.clone();
    match shift(rule_name, &mut next.spec, service, &canary)? {
        ShiftOutcome::Pending => {
            debug!(release = %canary, rule = %rule_name, %service, "no route to service yet");
            let message = format!("waiting for a route to {service} in {rule_name}");
            if release
                .status
                .phases
                .canary
                .set(PhaseState::InProgress, message)
            {
                ctx.write_status(release)?;
            }
        }
        ShiftOutcome::AlreadyApplied => {
            release.status.phases.canary.set(
                PhaseState::Success,
                format!("{STEP}% of {service} traffic routed to {canary}"),
            );
            ctx.write_status(release)?;
        }
        ShiftOutcome::Shifted { block, seeded } => {
            if seeded {
                next.metadata
                    .annotations
                    .insert(SEEDED_BY.to_string(), canary.clone());
            }
            let total_before = rule.spec.http[block].total_weight();
            let total_after = next.spec.http[block].total_weight();
            ctx.store().update(&next)?;
            info!(
                release = %canary,
                rule = %rule_name,
                block,
                seeded,
                total_before,
                total_after,
                "traffic shifted to canary"
            );
        }
    }
    Ok(())
}

/// Undo the release's split in its routing rule. A missing rule or an
/// already removed destination is not an error.
pub fn restore_routing<S: ObjectStore>(
    ctx: &Context<S>,
    release: &Release,
    policy: &Policy,
) -> ReconcileResult<RestoreOutcome> {
    let ns = &release.metadata.namespace;
    let rule_name = &policy.spec.routing_rule;
    let Some(rule) = ctx.store().find::<RoutingRule>(ns, rule_name)? else {
        debug!(release = %release.metadata.name, rule = %rule_name, "routing rule gone, nothing to restore");
        return Ok(RestoreOutcome::Absent);
    };

    let canary = &release.metadata.name;
    let unseed = rule.metadata.annotations.get(SEEDED_BY) == Some(canary);
    let mut next = rule.clone();
    let outcome = restore(rule_name, &mut next.spec, &policy.spec.service, canary, unseed)?;
    if unseed {
        next.metadata.annotations.remove(SEEDED_BY);
    }
    if outcome != RestoreOutcome::Absent || unseed {
        ctx.store().update(&next)?;
        info!(release = %canary, rule = %rule_name, unseed, "traffic split removed");
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(route: &[(&str, u32)]) -> RoutingRuleSpec {
        RoutingRuleSpec {
            hosts: vec!["api".into()],
            http: vec![MatchBlock {
                route: route
                    .iter()
                    .map(|(t, w)| WeightedDestination::new(t, *w))
                    .collect(),
                ..Default::default()
            }],
        }
    }

    fn weights(spec: &RoutingRuleSpec, block: usize) -> Vec<(String, u32)> {
        spec.http[block]
            .route
            .iter()
            .map(|d| (d.target.clone(), d.weight))
            .collect()
    }

    #[test]
    fn seeds_unweighted_single_destination() {
        let mut s = spec(&[("svc", 0)]);
        let outcome = shift("vs", &mut s, "svc", "release-x").unwrap();
        assert_eq!(
            outcome,
            ShiftOutcome::Shifted {
                block: 0,
                seeded: true
            }
        );
        assert_eq!(
            weights(&s, 0),
            vec![("svc".into(), 90), ("release-x".into(), 10)]
        );

        // Second application is a no-op.
        let before = s.clone();
        assert_eq!(
            shift("vs", &mut s, "svc", "release-x").unwrap(),
            ShiftOutcome::AlreadyApplied
        );
        assert_eq!(s, before);
    }

    #[test]
    fn conserves_weight() {
        let mut s = spec(&[("svc", 70), ("legacy", 30)]);
        let before = s.http[0].total_weight();
        shift("vs", &mut s, "svc", "r").unwrap();
        assert_eq!(s.http[0].total_weight(), before);
        assert_eq!(
            weights(&s, 0),
            vec![("svc".into(), 60), ("legacy".into(), 30), ("r".into(), 10)]
        );
    }

    #[test]
    fn missing_base_is_pending() {
        let mut s = spec(&[("other", 100)]);
        assert_eq!(
            shift("vs", &mut s, "svc", "r").unwrap(),
            ShiftOutcome::Pending
        );
        assert_eq!(s, spec(&[("other", 100)]));
    }

    #[test]
    fn locates_base_in_later_block() {
        let mut s = spec(&[("other", 100)]);
        s.http.push(MatchBlock {
            name: Some("api".into()),
            route: vec![WeightedDestination::new("svc", 100)],
            ..Default::default()
        });
        assert_eq!(
            shift("vs", &mut s, "svc", "r").unwrap(),
            ShiftOutcome::Shifted {
                block: 1,
                seeded: false
            }
        );
        assert_eq!(weights(&s, 0), vec![("other".into(), 100)]);
        assert_eq!(weights(&s, 1), vec![("svc".into(), 90), ("r".into(), 10)]);
    }

    #[test]
    fn rejects_ambiguous_weights() {
        let mut s = spec(&[("svc", 0), ("legacy", 50)]);
        let err = shift("vs", &mut s, "svc", "r").unwrap_err();
        assert!(matches!(err, ReconcileError::AmbiguousWeights { .. }));

        let mut s = spec(&[("svc", 5), ("legacy", 95)]);
        let err = shift("vs", &mut s, "svc", "r").unwrap_err();
        assert!(err.to_string().contains("below step"));
        assert_eq!(s, spec(&[("svc", 5), ("legacy", 95)]));
    }

    #[test]
    fn restore_reverses_shift() {
        let original = spec(&[("legacy", 20), ("svc", 80)]);
        let mut s = original.clone();
        shift("vs", &mut s, "svc", "r").unwrap();
        let outcome = restore("vs", &mut s, "svc", "r", false).unwrap();
        assert_eq!(outcome, RestoreOutcome::Restored { block: 0 });
        assert_eq!(s, original);

        // Already restored.
        assert_eq!(
            restore("vs", &mut s, "svc", "r", false).unwrap(),
            RestoreOutcome::Absent
        );
        assert_eq!(s, original);
    }

    #[test]
    fn restore_unseeds() {
        let original = spec(&[("svc", 0)]);
        let mut s = original.clone();
        shift("vs", &mut s, "svc", "r").unwrap();
        restore("vs", &mut s, "svc", "r", true).unwrap();
        assert_eq!(s, original);
    }

    #[test]
    fn unseed_keeps_weight_while_other_canaries_remain() {
        let mut s = spec(&[("svc", 0)]);
        shift("vs", &mut s, "svc", "a").unwrap();
        shift("vs", &mut s, "svc", "b").unwrap();
        assert_eq!(
            weights(&s, 0),
            vec![("svc".into(), 80), ("a".into(), 10), ("b".into(), 10)]
        );

        restore("vs", &mut s, "svc", "a", true).unwrap();
        assert_eq!(weights(&s, 0), vec![("svc".into(), 90), ("b".into(), 10)]);
        assert_eq!(s.http[0].total_weight(), 100);
    }

    #[test]
    fn restore_handles_canary_before_base() {
        let mut s = spec(&[("r", 10), ("svc", 90)]);
        restore("vs", &mut s, "svc", "r", false).unwrap();
        assert_eq!(weights(&s, 0), vec![("svc".into(), 100)]);
    }

    #[test]
    fn restore_without_base_is_malformed() {
        let mut s = spec(&[("r", 10), ("legacy", 90)]);
        let err = restore("vs", &mut s, "svc", "r", false).unwrap_err();
        assert!(matches!(err, ReconcileError::MalformedRoute { .. }));
    }
}
