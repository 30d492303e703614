#![recursion_limit = "256"]
#![warn(clippy::all)]

pub mod attack;
pub mod config;
pub mod constants;
pub mod host;
pub mod logging;
pub mod machine_tick;
pub mod ports;
pub mod serialize;
pub mod sim;

pub use attack::{start, AttackError, AttackSupervisor};
pub use config::{AttackConfig, TimingPreset};
pub use host::AttackHost;
