use super::data::*;
use super::events::RebalanceReason;
use crate::constants::*;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct DriftFlags: u8 {
        const LOW_MONEY = 1u8 << 0;
        const HIGH_SECURITY = 1u8 << 1;
        const BASELINE_CHANGED = 1u8 << 2;
        const MEMORY_CHANGED = 1u8 << 3;
    }
}

impl DriftFlags {
    pub fn unbalanced(self) -> bool {
        self.intersects(DriftFlags::LOW_MONEY | DriftFlags::HIGH_SECURITY)
    }
}

/// What steady state was planned against.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub max_money: f64,
    pub min_security: f64,
    pub actor_memory_gb: f64,
}

impl Baseline {
    pub fn capture(state: &TargetState, actor_memory_gb: f64) -> Baseline {
        Baseline {
            max_money: state.max_money,
            min_security: state.min_security,
            actor_memory_gb,
        }
    }
}

/// Debounces unbalance over consecutive checks; baseline and memory changes
/// trigger immediately.
#[derive(Clone, Debug)]
pub struct DriftMonitor {
    threshold: u32,
    consecutive: u32,
    flags: DriftFlags,
}

impl DriftMonitor {
    pub fn new(threshold: u32) -> DriftMonitor {
        DriftMonitor {
            threshold,
            consecutive: 0,
            flags: DriftFlags::empty(),
        }
    }

    pub fn flags(&self) -> DriftFlags {
        self.flags
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
        self.flags = DriftFlags::empty();
    }

    pub fn classify(state: &TargetState, baseline: &Baseline, actor_memory_gb: f64) -> DriftFlags {
        let mut flags = DriftFlags::empty();

        if state.money < state.max_money * LOW_MONEY_RATIO {
            flags |= DriftFlags::LOW_MONEY;
        }

        if state.security > baseline.min_security * HIGH_SECURITY_RATIO {
            flags |= DriftFlags::HIGH_SECURITY;
        }

        if state.max_money != baseline.max_money || state.min_security != baseline.min_security {
            flags |= DriftFlags::BASELINE_CHANGED;
        }

        if actor_memory_gb != baseline.actor_memory_gb {
            flags |= DriftFlags::MEMORY_CHANGED;
        }

        flags
    }

    pub fn observe(&mut self, state: &TargetState, baseline: &Baseline, actor_memory_gb: f64) -> Option<RebalanceReason> {
        self.flags = DriftMonitor::classify(state, baseline, actor_memory_gb);

        if self.flags.contains(DriftFlags::BASELINE_CHANGED) {
            return Some(RebalanceReason::BaselineChanged {
                max_money: state.max_money,
                min_security: state.min_security,
            });
        }

        if self.flags.contains(DriftFlags::MEMORY_CHANGED) {
            return Some(RebalanceReason::MemoryChanged {
                from_gb: baseline.actor_memory_gb,
                to_gb: actor_memory_gb,
            });
        }

        if self.flags.unbalanced() {
            self.consecutive += 1;
        } else {
            self.consecutive = 0;
        }

        if self.consecutive > self.threshold {
            Some(RebalanceReason::Unbalanced { checks: self.consecutive })
        } else {
            None
        }
    }
}
