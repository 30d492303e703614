use super::error::AttackError;
use crate::config::AttackConfig;
use crate::constants::*;
use crate::host::*;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Hack,
    Grow,
    Weaken,
}

/// Position of an action inside a batch. Completion order follows declaration order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BatchStage {
    Hack,
    WeakenHack,
    Grow,
    WeakenGrow,
}

impl BatchStage {
    pub const ALL: [BatchStage; BATCH_STAGES] = [BatchStage::Hack, BatchStage::WeakenHack, BatchStage::Grow, BatchStage::WeakenGrow];

    pub fn index(self) -> usize {
        match self {
            BatchStage::Hack => 0,
            BatchStage::WeakenHack => 1,
            BatchStage::Grow => 2,
            BatchStage::WeakenGrow => 3,
        }
    }

    pub fn kind(self) -> ActionKind {
        match self {
            BatchStage::Hack => ActionKind::Hack,
            BatchStage::Grow => ActionKind::Grow,
            BatchStage::WeakenHack | BatchStage::WeakenGrow => ActionKind::Weaken,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BatchStage::Hack => "h",
            BatchStage::WeakenHack => "w1",
            BatchStage::Grow => "g",
            BatchStage::WeakenGrow => "w2",
        }
    }
}

/// Resources of the host the workers run on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActorProfile {
    pub host: String,
    /// Usable memory, after the configured reservation.
    pub memory_gb: f64,
    pub cores: u32,
    pub launch_overhead_ms: f64,
    /// Gap between the planned completions of consecutive stages.
    pub stage_buffer_ms: f64,
}

impl ActorProfile {
    pub fn read(host: &dyn AttackHost, config: &AttackConfig) -> Result<ActorProfile, AttackError> {
        let max_memory = host.max_memory(&config.host).ok_or_else(|| AttackError::UnknownHost(config.host.clone()))?;

        Ok(ActorProfile {
            host: config.host.clone(),
            memory_gb: (max_memory - config.reserved_memory_gb).max(0.0),
            cores: host.cores(&config.host).max(1),
            launch_overhead_ms: config.launch_overhead_ms,
            stage_buffer_ms: config.stage_buffer_ms,
        })
    }

    /// Memory not currently claimed by running processes.
    pub fn free_memory(&self, host: &dyn AttackHost) -> f64 {
        (self.memory_gb - host.used_memory(&self.host)).max(0.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetState {
    pub security: f64,
    pub min_security: f64,
    pub money: f64,
    pub max_money: f64,
}

impl TargetState {
    pub fn read(host: &dyn AttackHost, target: &str) -> Option<TargetState> {
        Some(TargetState {
            security: host.current_security(target)?,
            min_security: host.min_security(target)?,
            money: host.current_money(target)?,
            max_money: host.max_money(target)?,
        })
    }

    pub fn at_min_security(&self) -> bool {
        self.security <= self.min_security + SECURITY_EPSILON
    }

    pub fn at_max_money(&self) -> bool {
        self.money >= self.max_money - MONEY_EPSILON
    }

    pub fn is_primed(&self) -> bool {
        self.at_min_security() && self.at_max_money()
    }

    /// The state every batch is planned to land against.
    pub fn primed(&self) -> TargetState {
        TargetState {
            security: self.min_security,
            money: self.max_money,
            ..*self
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    pub kind: ActionKind,
    pub threads: u32,
    pub duration_ms: f64,
    pub memory_gb: f64,
    pub memory_per_thread_gb: f64,
    /// Security change applied to the target. Negative for weaken.
    pub security_delta: f64,
    /// Share of current money removed, hack only.
    pub money_fraction: Option<f64>,
}

impl ActionPlan {
    pub fn empty(kind: ActionKind, duration_ms: f64, memory_per_thread_gb: f64) -> ActionPlan {
        ActionPlan {
            kind,
            threads: 0,
            duration_ms,
            memory_gb: 0.0,
            memory_per_thread_gb,
            security_delta: 0.0,
            money_fraction: if kind == ActionKind::Hack { Some(0.0) } else { None },
        }
    }

    /// Threads to launch with; a dispatched action always runs.
    pub fn dispatch_threads(&self) -> u32 {
        self.threads.max(1)
    }
}

/// One hack -> weaken -> grow -> weaken cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CyclePlan {
    pub hack: ActionPlan,
    pub weaken_hack: ActionPlan,
    pub grow: ActionPlan,
    /// Absent when the cycle needs no growth.
    pub weaken_grow: Option<ActionPlan>,
    pub total_duration_ms: f64,
    pub total_memory_gb: f64,
}

impl CyclePlan {
    /// Plan for `stage` if it is dispatched. Grow and its weaken are both
    /// skipped when no growth is needed.
    pub fn stage(&self, stage: BatchStage) -> Option<&ActionPlan> {
        match stage {
            BatchStage::Hack => Some(&self.hack),
            BatchStage::WeakenHack => Some(&self.weaken_hack),
            BatchStage::Grow => self.weaken_grow.as_ref().map(|_| &self.grow),
            BatchStage::WeakenGrow => self.weaken_grow.as_ref(),
        }
    }

    /// Stages that get dispatched, in completion order.
    pub fn stages(&self) -> impl Iterator<Item = (BatchStage, &ActionPlan)> + '_ {
        BatchStage::ALL.iter().filter_map(move |stage| self.stage(*stage).map(|plan| (*stage, plan)))
    }

    pub fn needs_growth(&self) -> bool {
        self.weaken_grow.is_some()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimingPlan {
    pub simultaneous_batches: u32,
    pub pause_between_launches_ms: f64,
    pub memory_constrained_max: u32,
    pub timing_constrained_max: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BatchId(pub u32);

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DispatchedAction {
    pub stage: BatchStage,
    pub pid: ProcessId,
    pub threads: u32,
    pub completion_ms: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchHandle {
    pub id: BatchId,
    pub launched_at_ms: f64,
    pub batch_end_ms: f64,
    /// Planned completion per stage, indexed by `BatchStage::index`. Skipped
    /// stages keep their slot.
    pub completion_ms: [f64; BATCH_STAGES],
    pub dispatched: Vec<DispatchedAction>,
    pub expires_at_ms: f64,
}

impl BatchHandle {
    pub fn pids(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.dispatched.iter().map(|action| action.pid)
    }

    pub fn is_dispatched(&self, stage: BatchStage) -> bool {
        self.dispatched.iter().any(|action| action.stage == stage)
    }
}
