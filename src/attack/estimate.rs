use super::data::*;
use crate::constants::*;
use crate::host::AttackHost;

/// The effect an action is sized for.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ActionRequest {
    Hack { money_fraction: f64 },
    Grow { multiplier: f64 },
    Weaken { security: f64 },
}

impl ActionRequest {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionRequest::Hack { .. } => ActionKind::Hack,
            ActionRequest::Grow { .. } => ActionKind::Grow,
            ActionRequest::Weaken { .. } => ActionKind::Weaken,
        }
    }
}

pub fn core_bonus(cores: u32) -> f64 {
    1.0 + (cores.max(1) - 1) as f64 / CORE_BONUS_DIVISOR
}

pub fn weaken_per_thread(cores: u32) -> f64 {
    WEAKEN_SECURITY_PER_THREAD * core_bonus(cores)
}

/// Threads needed to remove `security`, padded by the weaken safety factor.
pub fn weaken_threads(security: f64, cores: u32) -> u32 {
    if !security.is_finite() || security <= 0.0 {
        return 0;
    }

    (security * WEAKEN_SAFETY_FACTOR / weaken_per_thread(cores)).ceil() as u32
}

/// Threads needed so that `growth_per_thread ^ threads >= multiplier`, plus a
/// fixed margin for the game's own rounding.
pub fn grow_threads(multiplier: f64, growth_per_thread: f64) -> u32 {
    if !multiplier.is_finite() || multiplier <= 1.0 || !growth_per_thread.is_finite() || growth_per_thread <= 1.0 {
        return 0;
    }

    let threads = (multiplier.ln() / growth_per_thread.ln()).ceil() as u32;

    threads.saturating_add(GROW_SAFETY_THREADS)
}

/// Floored so the hack never takes more than asked for.
pub fn hack_threads(money_fraction: f64, hack_percent_per_thread: f64) -> u32 {
    if !money_fraction.is_finite() || money_fraction <= 0.0 || !hack_percent_per_thread.is_finite() || hack_percent_per_thread <= 0.0 {
        return 0;
    }

    (money_fraction.min(1.0) / hack_percent_per_thread).floor() as u32
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

pub struct ActionEstimator<'a> {
    host: &'a dyn AttackHost,
}

impl<'a> ActionEstimator<'a> {
    pub fn new(host: &'a dyn AttackHost) -> ActionEstimator<'a> {
        ActionEstimator { host }
    }

    pub fn estimate(&self, request: ActionRequest, target: &str, actor: &ActorProfile) -> ActionPlan {
        let kind = request.kind();

        let duration_ms = sanitize(self.host.action_duration(kind, target, actor));
        let memory_per_thread_gb = sanitize(self.host.memory_per_thread(kind));

        let mut plan = ActionPlan::empty(kind, duration_ms, memory_per_thread_gb);

        match request {
            ActionRequest::Hack { money_fraction } => {
                let per_thread = sanitize(self.host.hack_percent_per_thread(target, actor));
                let threads = hack_threads(money_fraction, per_thread);

                plan.threads = threads;
                plan.security_delta = threads as f64 * HACK_SECURITY_PER_THREAD;
                plan.money_fraction = Some((threads as f64 * per_thread).min(1.0));
            }
            ActionRequest::Grow { multiplier } => {
                let per_thread = self.host.grow_factor_per_thread(target, actor);
                let threads = grow_threads(multiplier, per_thread);

                plan.threads = threads;
                plan.security_delta = threads as f64 * GROW_SECURITY_PER_THREAD;
            }
            ActionRequest::Weaken { security } => {
                let threads = weaken_threads(security, actor.cores);

                plan.threads = threads;
                if threads > 0 {
                    plan.security_delta = -security;
                }
            }
        }

        plan.memory_gb = plan.threads as f64 * memory_per_thread_gb;

        plan
    }
}
