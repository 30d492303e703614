//! Fixed game constants used by the estimator and the drift monitor.

/// Security removed by one weaken thread on a single-core host.
pub const WEAKEN_SECURITY_PER_THREAD: f64 = 0.05;

/// Security added by one hack thread.
pub const HACK_SECURITY_PER_THREAD: f64 = 0.002;

/// Security added by one grow thread.
pub const GROW_SECURITY_PER_THREAD: f64 = 0.004;

/// Each additional core adds 1/16th of the base weaken/grow effect.
pub const CORE_BONUS_DIVISOR: f64 = 16.0;

/// Weaken threads are sized for this much more security than requested.
pub const WEAKEN_SAFETY_FACTOR: f64 = 1.2;

/// Extra grow threads added on top of the closed-form count.
pub const GROW_SAFETY_THREADS: u32 = 2;

/// Money below this fraction of max money counts towards unbalance.
pub const LOW_MONEY_RATIO: f64 = 0.25;

/// Security above this multiple of min security counts towards unbalance.
pub const HIGH_SECURITY_RATIO: f64 = 2.0;

/// Number of stages in one batch.
pub const BATCH_STAGES: usize = 4;

/// Slack when comparing security against its minimum.
pub const SECURITY_EPSILON: f64 = 1e-6;

/// Slack when comparing money against its maximum.
pub const MONEY_EPSILON: f64 = 1e-6;
