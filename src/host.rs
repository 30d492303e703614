//! The capability interface the scheduler drives.
//!
//! Everything the core knows about the game arrives through [`AttackHost`]:
//! target stats, the formula oracle, process control, the clock and the
//! single-slot ports used for status and control messages.

use crate::attack::data::{ActionKind, ActorProfile};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessId(pub u64);

impl std::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pid {}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: ProcessId,
    pub script: String,
    pub threads: u32,
    pub args: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Error)]
pub enum LaunchError {
    #[error("not enough memory on {host}: need {required:.2} GB, {available:.2} GB free")]
    InsufficientMemory { host: String, required: f64, available: f64 },
    #[error("unknown host {0}")]
    UnknownHost(String),
    #[error("unknown script {0}")]
    UnknownScript(String),
    #[error("invalid thread count {0}")]
    InvalidThreads(u32),
}

pub trait AttackHost {
    /// Wall clock in milliseconds.
    fn now_ms(&self) -> f64;

    fn sleep(&mut self, ms: f64);

    fn current_security(&self, target: &str) -> Option<f64>;

    fn min_security(&self, target: &str) -> Option<f64>;

    fn current_money(&self, target: &str) -> Option<f64>;

    fn max_money(&self, target: &str) -> Option<f64>;

    /// Time one action of `kind` would take if started now.
    fn action_duration(&self, kind: ActionKind, target: &str, actor: &ActorProfile) -> f64;

    /// Fraction of current money one hack thread steals.
    fn hack_percent_per_thread(&self, target: &str, actor: &ActorProfile) -> f64;

    /// Money multiplier contributed by one grow thread.
    fn grow_factor_per_thread(&self, target: &str, actor: &ActorProfile) -> f64;

    fn memory_per_thread(&self, kind: ActionKind) -> f64;

    fn max_memory(&self, host: &str) -> Option<f64>;

    fn used_memory(&self, host: &str) -> f64;

    fn cores(&self, host: &str) -> u32;

    fn launch(&mut self, script: &str, host: &str, threads: u32, args: &[String]) -> Result<ProcessId, LaunchError>;

    fn running_processes(&self, host: &str) -> Vec<ProcessInfo>;

    fn is_running(&self, pid: ProcessId) -> bool;

    fn kill(&mut self, pid: ProcessId) -> bool;

    /// Overwrites the single slot of `port`.
    fn write_port(&mut self, port: u32, data: String);

    fn peek_port(&self, port: u32) -> Option<String>;

    /// Reads and clears the slot of `port`.
    fn take_port(&mut self, port: u32) -> Option<String>;
}
