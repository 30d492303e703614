use super::cycle::build_cycle;
use super::data::*;
use super::drift::*;
use super::error::AttackError;
use super::estimate::ActionEstimator;
use super::events::*;
use super::launch::*;
use super::priming::PrimingSequencer;
use super::timing::plan_timing;
use crate::config::AttackConfig;
use crate::host::*;
use crate::ports;
use log::*;
use screeps_machine::*;
use std::collections::HashSet;
use std::convert::Infallible;

pub struct SupervisorContext {
    target: String,
    config: AttackConfig,
    actor: ActorProfile,
    launcher: BatchLauncher,
    registry: BatchRegistry,
    drift: DriftMonitor,
    /// Targets already swept for leftover workers.
    swept: HashSet<String>,
    timing: Option<TimingPlan>,
    last_state: Option<TargetState>,
    events: Vec<AttackEvent>,
    sleep_ms: f64,
    batches_launched: u64,
    batches_retired: u64,
    rebalances: u32,
}

impl SupervisorContext {
    fn read_target(&mut self, host: &dyn AttackHost) -> Result<TargetState, AttackError> {
        let state = TargetState::read(host, &self.target)
            .filter(|state| state.max_money > 0.0)
            .ok_or_else(|| AttackError::NoValidTarget(self.target.clone()))?;

        self.last_state = Some(state);

        Ok(state)
    }

    /// Kills leftover workers aimed at the current target by an earlier
    /// instance. Runs once per target.
    fn sweep_stale_workers(&mut self, host: &mut dyn AttackHost) {
        if !self.swept.insert(self.target.clone()) {
            return;
        }

        let scripts = self.config.scripts.all();

        let stale = host
            .running_processes(&self.actor.host)
            .into_iter()
            .filter(|process| scripts.contains(&process.script.as_str()))
            .filter(|process| process.args.first() == Some(&self.target))
            .map(|process| process.pid)
            .collect::<Vec<_>>();

        let count = stale.into_iter().filter(|pid| host.kill(*pid)).count();

        if count > 0 {
            info!("Killed {} stale workers targeting {}", count, self.target);

            self.events.push(AttackEvent::StaleWorkersKilled { count });
        }
    }
}

pub struct SupervisorTickContext<'a> {
    pub host: &'a mut dyn AttackHost,
}

machine!(
    #[derive(Clone, Debug)]
    enum SupervisorState {
        Startup,
        Priming {
            sequencer: PrimingSequencer
        },
        SteadyState {
            timing: TimingPlan,
            baseline: Baseline,
            next_launch_ms: f64
        },
        Rebalancing {
            reason: RebalanceReason
        }
    }

    impl {
        * => fn status_description(&self) -> String {
            std::any::type_name::<Self>().rsplit("::").next().unwrap_or_default().to_string()
        }

        _ => fn tick(&mut self, context: &mut SupervisorContext, tick_context: &mut SupervisorTickContext) -> Result<Option<SupervisorState>, AttackError>;
    }
);

impl SupervisorState {
    pub fn phase(&self) -> AttackPhase {
        match self {
            SupervisorState::Startup(_) => AttackPhase::Startup,
            SupervisorState::Priming(_) => AttackPhase::Priming,
            SupervisorState::SteadyState(_) => AttackPhase::SteadyState,
            SupervisorState::Rebalancing(_) => AttackPhase::Rebalancing,
        }
    }
}

impl Startup {
    fn tick(&mut self, context: &mut SupervisorContext, tick_context: &mut SupervisorTickContext) -> Result<Option<SupervisorState>, AttackError> {
        let host = &mut *tick_context.host;

        context.actor = ActorProfile::read(host, &context.config)?;
        context.read_target(host)?;

        context.sweep_stale_workers(host);

        context.registry.cancel_all(host);
        context.drift.reset();
        context.timing = None;

        info!("Priming {} from {}", context.target, context.actor.host);

        Ok(Some(SupervisorState::priming(PrimingSequencer::new(
            &context.target,
            context.config.max_priming_passes,
        ))))
    }
}

impl Priming {
    fn tick(&mut self, context: &mut SupervisorContext, tick_context: &mut SupervisorTickContext) -> Result<Option<SupervisorState>, AttackError> {
        let host = &mut *tick_context.host;

        self.sequencer
            .tick(host, &context.actor, &context.launcher, &mut context.registry, &mut context.events)?;

        let now = host.now_ms();

        if !self.sequencer.is_done() {
            context.sleep_ms = (self.sequencer.ready_at_ms() - now).max(context.config.poll_interval_ms);

            return Ok(None);
        }

        let state = context.read_target(host)?;

        context.events.push(AttackEvent::Primed {
            target: context.target.clone(),
        });

        let cycle = build_cycle(
            &ActionEstimator::new(host),
            &context.target,
            &state.primed(),
            &context.actor,
            context.config.money_fraction,
        );

        let timing = plan_timing(&cycle, &context.actor, context.config.min_pause_ms);

        info!(
            "Primed {}: {} simultaneous batches every {:.0}ms (memory max {}, timing max {})",
            context.target,
            timing.simultaneous_batches,
            timing.pause_between_launches_ms,
            timing.memory_constrained_max,
            timing.timing_constrained_max
        );

        context.timing = Some(timing);
        context.events.push(AttackEvent::TimingPlanned { timing });

        Ok(Some(SupervisorState::steady_state(
            timing,
            Baseline::capture(&state, context.actor.memory_gb),
            now,
        )))
    }
}

impl SteadyState {
    fn tick(&mut self, context: &mut SupervisorContext, tick_context: &mut SupervisorTickContext) -> Result<Option<SupervisorState>, AttackError> {
        let host = &mut *tick_context.host;

        context.batches_retired += context.registry.retire(host, &mut context.events) as u64;

        let state = context.read_target(host)?;
        let actor_memory_gb = ActorProfile::read(host, &context.config)?.memory_gb;

        let was_unbalanced = context.drift.flags().unbalanced();

        if let Some(reason) = context.drift.observe(&state, &self.baseline, actor_memory_gb) {
            return Ok(Some(SupervisorState::rebalancing(reason)));
        }

        let flags = context.drift.flags();

        if flags.unbalanced() {
            if !was_unbalanced {
                debug!("{} looks unbalanced: {:?}", context.target, flags);
            }

            context.events.push(AttackEvent::DriftObserved {
                flags,
                consecutive: context.drift.consecutive(),
            });
        }

        let now = host.now_ms();

        if context.registry.in_flight() >= self.timing.simultaneous_batches as usize {
            context.sleep_ms = context.config.poll_interval_ms;

            return Ok(None);
        }

        if now < self.next_launch_ms {
            context.sleep_ms = self.next_launch_ms - now;

            return Ok(None);
        }

        let cycle = build_cycle(
            &ActionEstimator::new(host),
            &context.target,
            &state.primed(),
            &context.actor,
            context.config.money_fraction,
        );

        let id = context.registry.next_id();
        let handle = context
            .launcher
            .launch(host, &context.target, &context.actor, &cycle, id, &mut context.events);

        debug!("Launched batch {} against {} ({} stages)", id, context.target, handle.dispatched.len());

        context.registry.track(handle);
        context.batches_launched += 1;

        self.next_launch_ms = now + self.timing.pause_between_launches_ms;
        context.sleep_ms = self.timing.pause_between_launches_ms;

        Ok(None)
    }
}

impl Rebalancing {
    fn tick(&mut self, context: &mut SupervisorContext, tick_context: &mut SupervisorTickContext) -> Result<Option<SupervisorState>, AttackError> {
        let cancelled = context.registry.cancel_all(tick_context.host);

        if self.reason.is_notable() {
            warn!("Rebalancing {}: {:?}, cancelled {} processes", context.target, self.reason, cancelled);
        } else {
            info!("Rebalancing {}: {:?}, cancelled {} processes", context.target, self.reason, cancelled);
        }

        context.rebalances += 1;
        context.drift.reset();
        context.events.push(AttackEvent::Rebalance {
            reason: self.reason.clone(),
            cancelled,
        });

        Ok(Some(SupervisorState::startup()))
    }
}

/// Long-running controller for one target.
///
/// Each [`tick`](AttackSupervisor::tick) does all planning synchronously and
/// returns how long the caller should sleep before the next one.
pub struct AttackSupervisor {
    context: SupervisorContext,
    state: SupervisorState,
}

impl AttackSupervisor {
    pub fn new(host: &dyn AttackHost, target: &str, config: AttackConfig) -> Result<AttackSupervisor, AttackError> {
        if target.is_empty() {
            return Err(AttackError::MissingArgument("target"));
        }

        config.validate()?;

        let actor = ActorProfile::read(host, &config)?;

        TargetState::read(host, target)
            .filter(|state| state.max_money > 0.0)
            .ok_or_else(|| AttackError::NoValidTarget(target.to_string()))?;

        Ok(AttackSupervisor {
            context: SupervisorContext {
                target: target.to_string(),
                launcher: BatchLauncher::new(&config),
                registry: BatchRegistry::new(),
                drift: DriftMonitor::new(config.unbalanced_check_threshold),
                swept: HashSet::new(),
                timing: None,
                last_state: None,
                events: Vec::new(),
                sleep_ms: config.poll_interval_ms,
                batches_launched: 0,
                batches_retired: 0,
                rebalances: 0,
                actor,
                config,
            },
            state: SupervisorState::startup(),
        })
    }

    pub fn tick(&mut self, host: &mut dyn AttackHost) -> Result<f64, AttackError> {
        if let Some(control) = ports::poll_control(host, self.context.config.control_port) {
            self.apply_control(host, control);
        }

        self.context.sleep_ms = self.context.config.poll_interval_ms;

        {
            let mut tick_context = SupervisorTickContext { host: &mut *host };

            crate::machine_tick::run_state_machine_result(&mut self.state, "AttackSupervisor", |state| {
                state.tick(&mut self.context, &mut tick_context)
            })?;
        }

        let status = self.status(host.now_ms());

        if let Err(err) = ports::publish_status(host, self.context.config.status_port, &status) {
            warn!("Failed to publish status for {}: {}", self.context.target, err);
        }

        Ok(self.context.sleep_ms.max(1.0))
    }

    /// Ticks until `duration_ms` of host time has passed.
    pub fn run_for(&mut self, host: &mut dyn AttackHost, duration_ms: f64) -> Result<(), AttackError> {
        let end_ms = host.now_ms() + duration_ms;

        while host.now_ms() < end_ms {
            let sleep_ms = self.tick(host)?;
            let remaining_ms = end_ms - host.now_ms();

            host.sleep(sleep_ms.min(remaining_ms).max(0.0));
        }

        Ok(())
    }

    fn apply_control(&mut self, host: &mut dyn AttackHost, control: AttackControl) {
        let reason = match control {
            AttackControl::ChangeTarget { target } => {
                if target == self.context.target {
                    return;
                }

                if TargetState::read(host, &target).filter(|state| state.max_money > 0.0).is_none() {
                    warn!("Ignoring change to invalid target {}", target);
                    return;
                }

                let from = std::mem::replace(&mut self.context.target, target.clone());

                RebalanceReason::TargetChanged { from, to: target }
            }
            AttackControl::SetMoneyFraction { fraction } => {
                if fraction.is_nan() || fraction <= 0.0 || fraction >= 1.0 {
                    warn!("Ignoring money fraction {} outside (0, 1)", fraction);
                    return;
                }

                self.context.config.money_fraction = fraction;

                RebalanceReason::MoneyFractionChanged { fraction }
            }
            AttackControl::Rebalance => RebalanceReason::Requested,
        };

        if let SupervisorState::Priming(priming) = &mut self.state {
            let cancelled = priming.sequencer.cancel(host);

            if cancelled > 0 {
                debug!("Cancelled {} priming processes", cancelled);
            }
        }

        self.state = SupervisorState::rebalancing(reason);
    }

    pub fn target(&self) -> &str {
        &self.context.target
    }

    pub fn config(&self) -> &AttackConfig {
        &self.context.config
    }

    pub fn phase(&self) -> AttackPhase {
        self.state.phase()
    }

    pub fn status_description(&self) -> String {
        match &self.state {
            SupervisorState::Priming(priming) => format!("Priming {} ({})", self.context.target, priming.sequencer.status_description()),
            state => format!("{} {}", state.status_description(), self.context.target),
        }
    }

    pub fn timing(&self) -> Option<TimingPlan> {
        self.context.timing
    }

    pub fn in_flight(&self) -> &[BatchHandle] {
        self.context.registry.batches()
    }

    pub fn drain_events(&mut self) -> Vec<AttackEvent> {
        std::mem::take(&mut self.context.events)
    }

    pub fn status(&self, now_ms: f64) -> StatusSnapshot {
        let drift = self.context.drift.flags();

        StatusSnapshot {
            target: self.context.target.clone(),
            phase: self.phase(),
            timing: self.context.timing,
            in_flight: self.context.registry.in_flight(),
            target_state: self.context.last_state,
            drift,
            unbalanced: drift.unbalanced(),
            batches_launched: self.context.batches_launched,
            batches_retired: self.context.batches_retired,
            rebalances: self.context.rebalances,
            updated_ms: now_ms,
        }
    }
}

/// Runs a supervisor for `target` until a fatal error.
pub fn start(host: &mut dyn AttackHost, target: &str, config: AttackConfig) -> Result<Infallible, AttackError> {
    let mut supervisor = AttackSupervisor::new(host, target, config)?;

    loop {
        let sleep_ms = supervisor.tick(host)?;

        for event in supervisor.drain_events() {
            trace!("{:?}", event);
        }

        host.sleep(sleep_ms);
    }
}
