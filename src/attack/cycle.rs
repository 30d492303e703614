use super::data::*;
use super::estimate::*;
use crate::constants::*;

/// Multiplier that brings the target back to max money after a hack that
/// took `hack_fraction` of its current money.
pub fn growth_multiplier(state: &TargetState, hack_fraction: f64) -> f64 {
    if state.max_money.is_nan() || state.max_money <= 0.0 {
        return 1.0;
    }

    let remaining = state.money.max(0.0) * (1.0 - hack_fraction.clamp(0.0, 1.0));

    (state.max_money / remaining.max(1.0)).max(1.0)
}

/// Chains hack -> weaken -> grow -> weaken into one cycle for `target`.
///
/// The grow stage is sized from the money the hack threads actually take, not
/// from the nominal `money_fraction`. Each weaken removes exactly the security
/// added by the stage before it.
pub fn build_cycle(estimator: &ActionEstimator, target: &str, state: &TargetState, actor: &ActorProfile, money_fraction: f64) -> CyclePlan {
    let hack = estimator.estimate(ActionRequest::Hack { money_fraction }, target, actor);

    let weaken_hack = estimator.estimate(
        ActionRequest::Weaken {
            security: hack.security_delta,
        },
        target,
        actor,
    );

    let multiplier = growth_multiplier(state, hack.money_fraction.unwrap_or(0.0));

    let (grow, weaken_grow) = if multiplier > 1.0 + MONEY_EPSILON {
        let grow = estimator.estimate(ActionRequest::Grow { multiplier }, target, actor);

        let weaken_grow = estimator.estimate(
            ActionRequest::Weaken {
                security: grow.security_delta,
            },
            target,
            actor,
        );

        (grow, Some(weaken_grow))
    } else {
        (estimator.estimate(ActionRequest::Grow { multiplier: 1.0 }, target, actor), None)
    };

    let mut cycle = CyclePlan {
        hack,
        weaken_hack,
        grow,
        weaken_grow,
        total_duration_ms: 0.0,
        total_memory_gb: 0.0,
    };

    cycle.total_duration_ms = cycle.stages().map(|(_, plan)| plan.duration_ms).fold(0.0, f64::max);
    cycle.total_memory_gb = cycle.stages().map(|(_, plan)| plan.memory_gb).sum();

    cycle
}
