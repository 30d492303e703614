use super::data::*;
use super::drift::DriftFlags;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttackPhase {
    Startup,
    Priming,
    SteadyState,
    Rebalancing,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RebalanceReason {
    Unbalanced { checks: u32 },
    BaselineChanged { max_money: f64, min_security: f64 },
    MemoryChanged { from_gb: f64, to_gb: f64 },
    TargetChanged { from: String, to: String },
    MoneyFractionChanged { fraction: f64 },
    Requested,
}

impl RebalanceReason {
    /// Whether the operator should hear about it, not just the log.
    pub fn is_notable(&self) -> bool {
        matches!(self, RebalanceReason::Unbalanced { .. } | RebalanceReason::BaselineChanged { .. })
    }
}

/// Everything the supervisor reports while it runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AttackEvent {
    StaleWorkersKilled { count: usize },
    PrimingDispatched { kind: ActionKind, threads: u32 },
    Primed { target: String },
    TimingPlanned { timing: TimingPlan },
    BatchLaunched { id: BatchId, stages: usize },
    BatchRetired { id: BatchId, expired: bool },
    InsufficientMemory { id: Option<BatchId>, requested_gb: f64, available_gb: f64 },
    LaunchRejected { id: Option<BatchId>, stage: Option<BatchStage>, reason: String },
    DriftObserved { flags: DriftFlags, consecutive: u32 },
    Rebalance { reason: RebalanceReason, cancelled: usize },
}

/// Read-only view published for dashboards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub target: String,
    pub phase: AttackPhase,
    pub timing: Option<TimingPlan>,
    pub in_flight: usize,
    pub target_state: Option<TargetState>,
    pub drift: DriftFlags,
    pub unbalanced: bool,
    pub batches_launched: u64,
    pub batches_retired: u64,
    pub rebalances: u32,
    pub updated_ms: f64,
}

/// Messages the supervisor accepts on its control port.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackControl {
    ChangeTarget { target: String },
    SetMoneyFraction { fraction: f64 },
    Rebalance,
}
