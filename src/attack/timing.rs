use super::data::*;
use crate::constants::BATCH_STAGES;

/// Fixed overhead added to every launch interval: one process launch per stage.
pub fn stage_overhead_ms(actor: &ActorProfile) -> f64 {
    actor.launch_overhead_ms.max(0.0) * BATCH_STAGES as f64
}

/// How many cycles can overlap, and how far apart to launch them.
///
/// Never plans fewer than one batch. When even a single cycle does not fit in
/// memory the launcher clips its threads at dispatch.
pub fn plan_timing(cycle: &CyclePlan, actor: &ActorProfile, min_pause_ms: f64) -> TimingPlan {
    let min_pause_ms = min_pause_ms.max(1.0);

    let timing_constrained_max = (cycle.total_duration_ms / min_pause_ms).floor() as u32;

    let memory_constrained_max = if cycle.total_memory_gb > 0.0 {
        (actor.memory_gb / cycle.total_memory_gb).floor() as u32
    } else {
        u32::MAX
    };

    let simultaneous_batches = timing_constrained_max.min(memory_constrained_max).max(1);

    let spacing_ms = (cycle.total_duration_ms / simultaneous_batches as f64).ceil();

    TimingPlan {
        simultaneous_batches,
        pause_between_launches_ms: spacing_ms.max(min_pause_ms) + stage_overhead_ms(actor),
        memory_constrained_max,
        timing_constrained_max,
    }
}
