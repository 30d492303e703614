use thiserror::Error;

/// Conditions that stop a supervisor instance.
///
/// Everything recoverable (memory clipping, rejected launches, drift) is
/// reported as an [`AttackEvent`](super::events::AttackEvent) instead and
/// handled by rebalancing.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum AttackError {
    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),
    #[error("no valid target: {0}")]
    NoValidTarget(String),
    #[error("unknown host: {0}")]
    UnknownHost(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("priming {target} did not converge after {passes} passes")]
    PrimingNonConvergence { target: String, passes: u32 },
}
