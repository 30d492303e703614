use super::cycle::growth_multiplier;
use super::data::*;
use super::error::AttackError;
use super::estimate::*;
use super::events::AttackEvent;
use super::launch::{BatchLauncher, BatchRegistry};
use crate::host::*;
use log::*;
use screeps_machine::*;

#[derive(Clone, Debug)]
pub struct PrimingContext {
    pub target: String,
    pub passes: u32,
    pub max_passes: u32,
    pub grew: bool,
    /// Earliest time the last dispatched action can have finished.
    pub ready_at_ms: f64,
}

pub struct PrimingTickContext<'a> {
    pub host: &'a mut dyn AttackHost,
    pub actor: &'a ActorProfile,
    pub launcher: &'a BatchLauncher,
    /// Shared with the batches so worker ids never repeat across restarts.
    pub registry: &'a mut BatchRegistry,
    pub events: &'a mut Vec<AttackEvent>,
}

machine!(
    #[derive(Clone, Debug)]
    enum PrimingState {
        ReduceSecurity {
            pending: Vec<ProcessId>
        },
        GrowMoney {
            pending: Vec<ProcessId>
        },
        ReduceSecurityAgain {
            pending: Vec<ProcessId>
        },
        Done
    }

    impl {
        * => fn status_description(&self) -> String {
            std::any::type_name::<Self>().rsplit("::").next().unwrap_or_default().to_string()
        }

        _ => fn tick(&mut self, context: &mut PrimingContext, tick_context: &mut PrimingTickContext) -> Result<Option<PrimingState>, AttackError>;
    }
);

impl ReduceSecurity {
    fn tick(&mut self, context: &mut PrimingContext, tick_context: &mut PrimingTickContext) -> Result<Option<PrimingState>, AttackError> {
        tick_priming_action(
            &mut self.pending,
            context,
            tick_context,
            TargetState::at_min_security,
            |state| ActionRequest::Weaken {
                security: state.security - state.min_security,
            },
            |state, _| {
                if state.at_max_money() {
                    PrimingState::done()
                } else {
                    PrimingState::grow_money(Vec::new())
                }
            },
        )
    }
}

impl GrowMoney {
    fn tick(&mut self, context: &mut PrimingContext, tick_context: &mut PrimingTickContext) -> Result<Option<PrimingState>, AttackError> {
        tick_priming_action(
            &mut self.pending,
            context,
            tick_context,
            TargetState::at_max_money,
            |state| ActionRequest::Grow {
                multiplier: growth_multiplier(state, 0.0),
            },
            |_, context| {
                if context.grew {
                    PrimingState::reduce_security_again(Vec::new())
                } else {
                    PrimingState::done()
                }
            },
        )
    }
}

impl ReduceSecurityAgain {
    fn tick(&mut self, context: &mut PrimingContext, tick_context: &mut PrimingTickContext) -> Result<Option<PrimingState>, AttackError> {
        tick_priming_action(
            &mut self.pending,
            context,
            tick_context,
            TargetState::at_min_security,
            |state| ActionRequest::Weaken {
                security: state.security - state.min_security,
            },
            |_, _| PrimingState::done(),
        )
    }
}

impl Done {
    fn tick(&mut self, _context: &mut PrimingContext, _tick_context: &mut PrimingTickContext) -> Result<Option<PrimingState>, AttackError> {
        Ok(None)
    }
}

/// One step of an active priming state: wait for the last dispatch, then
/// either move on or dispatch a single action sized to fix the whole gap.
fn tick_priming_action<R, N>(
    pending: &mut Vec<ProcessId>,
    context: &mut PrimingContext,
    tick_context: &mut PrimingTickContext,
    satisfied: fn(&TargetState) -> bool,
    request: R,
    next_state: N,
) -> Result<Option<PrimingState>, AttackError>
where
    R: FnOnce(&TargetState) -> ActionRequest,
    N: FnOnce(&TargetState, &PrimingContext) -> PrimingState,
{
    let host = &mut *tick_context.host;

    pending.retain(|pid| host.is_running(*pid));

    if !pending.is_empty() {
        return Ok(None);
    }

    let state = TargetState::read(host, &context.target).ok_or_else(|| AttackError::NoValidTarget(context.target.clone()))?;

    if satisfied(&state) {
        return Ok(Some(next_state(&state, context)));
    }

    if context.passes >= context.max_passes {
        return Err(AttackError::PrimingNonConvergence {
            target: context.target.clone(),
            passes: context.passes,
        });
    }

    let plan = ActionEstimator::new(host).estimate(request(&state), &context.target, tick_context.actor);

    let wanted = plan.dispatch_threads();
    let affordable = if plan.memory_per_thread_gb > 0.0 {
        (tick_context.actor.free_memory(host) / plan.memory_per_thread_gb).floor() as u32
    } else {
        wanted
    };

    if affordable == 0 {
        debug!("No free memory to prime {}, waiting", context.target);
        return Ok(None);
    }

    let threads = wanted.min(affordable);

    if threads < wanted {
        let available_gb = tick_context.actor.free_memory(host);

        debug!(
            "Priming {:?} on {} clipped from {} to {} threads",
            plan.kind, context.target, wanted, threads
        );

        tick_context.events.push(AttackEvent::InsufficientMemory {
            id: None,
            requested_gb: wanted as f64 * plan.memory_per_thread_gb,
            available_gb,
        });
    }

    let now = host.now_ms();
    let args = vec![
        context.target.clone(),
        format!("{:.0}", now + plan.duration_ms),
        format!("{:.0}", plan.duration_ms),
        format!("prime-{}", tick_context.registry.next_id().0),
    ];

    context.passes += 1;

    match host.launch(tick_context.launcher.script(plan.kind), &tick_context.actor.host, threads, &args) {
        Ok(pid) => {
            debug!("Priming {} with {:?} x{} ({})", context.target, plan.kind, threads, pid);

            if plan.kind == ActionKind::Grow {
                context.grew = true;
            }

            pending.push(pid);
            context.ready_at_ms = now + plan.duration_ms;

            tick_context.events.push(AttackEvent::PrimingDispatched { kind: plan.kind, threads });
        }
        Err(err) => {
            debug!("Priming launch on {} rejected: {}", context.target, err);

            tick_context.events.push(AttackEvent::LaunchRejected {
                id: None,
                stage: None,
                reason: err.to_string(),
            });
        }
    }

    Ok(None)
}

/// Brings a target to min security and max money before batching starts.
#[derive(Clone, Debug)]
pub struct PrimingSequencer {
    context: PrimingContext,
    state: PrimingState,
}

impl PrimingSequencer {
    pub fn new(target: &str, max_passes: u32) -> PrimingSequencer {
        PrimingSequencer {
            context: PrimingContext {
                target: target.to_string(),
                passes: 0,
                max_passes,
                grew: false,
                ready_at_ms: 0.0,
            },
            state: PrimingState::reduce_security(Vec::new()),
        }
    }

    pub fn tick(
        &mut self,
        host: &mut dyn AttackHost,
        actor: &ActorProfile,
        launcher: &BatchLauncher,
        registry: &mut BatchRegistry,
        events: &mut Vec<AttackEvent>,
    ) -> Result<(), AttackError> {
        let mut tick_context = PrimingTickContext {
            host,
            actor,
            launcher,
            registry,
            events,
        };

        crate::machine_tick::run_state_machine_result(&mut self.state, "PrimingSequencer", |state| {
            state.tick(&mut self.context, &mut tick_context)
        })
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, PrimingState::Done(_))
    }

    pub fn passes(&self) -> u32 {
        self.context.passes
    }

    pub fn ready_at_ms(&self) -> f64 {
        self.context.ready_at_ms
    }

    pub fn status_description(&self) -> String {
        self.state.status_description()
    }

    pub fn pending(&self) -> &[ProcessId] {
        match &self.state {
            PrimingState::ReduceSecurity(state) => &state.pending,
            PrimingState::GrowMoney(state) => &state.pending,
            PrimingState::ReduceSecurityAgain(state) => &state.pending,
            PrimingState::Done(_) => &[],
        }
    }

    /// Kills the outstanding priming action, if any. Returns how many were
    /// still running.
    pub fn cancel(&mut self, host: &mut dyn AttackHost) -> usize {
        let pending = match &mut self.state {
            PrimingState::ReduceSecurity(state) => &mut state.pending,
            PrimingState::GrowMoney(state) => &mut state.pending,
            PrimingState::ReduceSecurityAgain(state) => &mut state.pending,
            PrimingState::Done(_) => return 0,
        };

        pending.drain(..).filter(|pid| host.kill(*pid)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AttackConfig;
    use crate::sim::*;

    fn actor() -> ActorProfile {
        ActorProfile {
            host: "home".to_string(),
            memory_gb: 1024.0,
            cores: 1,
            launch_overhead_ms: 5.0,
            stage_buffer_ms: 100.0,
        }
    }

    fn run_to_done(host: &mut SimHost, sequencer: &mut PrimingSequencer, events: &mut Vec<AttackEvent>) {
        let launcher = BatchLauncher::new(&AttackConfig::default());
        let mut registry = BatchRegistry::new();

        for _ in 0..1_000 {
            sequencer.tick(host, &actor(), &launcher, &mut registry, events).unwrap();

            if sequencer.is_done() {
                return;
            }

            host.advance(1_000.0);
        }

        panic!("priming did not finish: {}", sequencer.status_description());
    }

    #[test]
    fn primed_target_skips_straight_to_done() {
        let mut host = SimHost::with_target("n00dles", SimServer::default());
        let mut sequencer = PrimingSequencer::new("n00dles", 10);
        let mut events = Vec::new();

        sequencer
            .tick(
                &mut host,
                &actor(),
                &BatchLauncher::new(&AttackConfig::default()),
                &mut BatchRegistry::new(),
                &mut events,
            )
            .unwrap();

        assert!(sequencer.is_done());
        assert_eq!(sequencer.passes(), 0);
        assert!(host.launches().is_empty());
        assert!(events.is_empty());
    }

    #[test]
    fn weakens_grows_then_weakens_again() {
        let mut host = SimHost::with_target(
            "n00dles",
            SimServer {
                security: 20.0,
                money: 100_000.0,
                ..SimServer::default()
            },
        );
        let mut sequencer = PrimingSequencer::new("n00dles", 10);
        let mut events = Vec::new();

        run_to_done(&mut host, &mut sequencer, &mut events);

        let kinds = events
            .iter()
            .filter_map(|event| match event {
                AttackEvent::PrimingDispatched { kind, .. } => Some(*kind),
                _ => None,
            })
            .collect::<Vec<_>>();

        assert_eq!(kinds, vec![ActionKind::Weaken, ActionKind::Grow, ActionKind::Weaken]);

        let state = TargetState::read(&host, "n00dles").unwrap();
        assert!(state.is_primed());
    }

    #[test]
    fn security_only_skips_growth() {
        let mut host = SimHost::with_target(
            "n00dles",
            SimServer {
                security: 8.0,
                ..SimServer::default()
            },
        );
        let mut sequencer = PrimingSequencer::new("n00dles", 10);
        let mut events = Vec::new();

        run_to_done(&mut host, &mut sequencer, &mut events);

        assert_eq!(sequencer.passes(), 1);
        assert!(host.launches().iter().all(|launch| launch.script == "/batch/weaken.js"));
    }

    #[test]
    fn clips_oversized_action_to_free_memory() {
        let mut host = SimHost::with_target(
            "n00dles",
            SimServer {
                security: 100.0,
                ..SimServer::default()
            },
        );
        let mut sequencer = PrimingSequencer::new("n00dles", 10);
        let mut events = Vec::new();

        sequencer
            .tick(
                &mut host,
                &actor(),
                &BatchLauncher::new(&AttackConfig::default()),
                &mut BatchRegistry::new(),
                &mut events,
            )
            .unwrap();

        // 95 security wants 2280 weaken threads; 1024GB holds 585.
        assert_eq!(host.launches().len(), 1);
        assert_eq!(host.launches()[0].threads, 585);
        assert_eq!(sequencer.pending().len(), 1);
        assert!(events.contains(&AttackEvent::InsufficientMemory {
            id: None,
            requested_gb: 2280.0 * 1.75,
            available_gb: 1024.0,
        }));
    }

    #[test]
    fn worker_ids_come_from_the_shared_registry() {
        let mut host = SimHost::with_target(
            "n00dles",
            SimServer {
                security: 20.0,
                ..SimServer::default()
            },
        );
        let launcher = BatchLauncher::new(&AttackConfig::default());
        let mut registry = BatchRegistry::new();
        let mut events = Vec::new();

        for _ in 0..2 {
            let mut sequencer = PrimingSequencer::new("n00dles", 10);

            sequencer.tick(&mut host, &actor(), &launcher, &mut registry, &mut events).unwrap();
            sequencer.cancel(&mut host);
        }

        let ids = host.launches().iter().map(|launch| launch.args[3].clone()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["prime-0", "prime-1"]);
    }

    #[test]
    fn gives_up_after_pass_cap() {
        let mut host = SimHost::with_target(
            "n00dles",
            SimServer {
                security: 20.0,
                ..SimServer::default()
            },
        );
        host.reject_launches = true;

        let launcher = BatchLauncher::new(&AttackConfig::default());
        let mut registry = BatchRegistry::new();
        let mut sequencer = PrimingSequencer::new("n00dles", 3);
        let mut events = Vec::new();

        for _ in 0..3 {
            sequencer.tick(&mut host, &actor(), &launcher, &mut registry, &mut events).unwrap();
        }

        assert_eq!(
            sequencer.tick(&mut host, &actor(), &launcher, &mut registry, &mut events),
            Err(AttackError::PrimingNonConvergence {
                target: "n00dles".to_string(),
                passes: 3
            })
        );
    }

    #[test]
    fn cancel_kills_pending_action() {
        let mut host = SimHost::with_target(
            "n00dles",
            SimServer {
                security: 20.0,
                ..SimServer::default()
            },
        );
        let mut sequencer = PrimingSequencer::new("n00dles", 10);
        let mut events = Vec::new();

        sequencer
            .tick(
                &mut host,
                &actor(),
                &BatchLauncher::new(&AttackConfig::default()),
                &mut BatchRegistry::new(),
                &mut events,
            )
            .unwrap();

        assert_eq!(sequencer.cancel(&mut host), 1);
        assert_eq!(host.running_count(), 0);
        assert!(sequencer.pending().is_empty());
    }
}
