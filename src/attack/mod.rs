pub mod cycle;
pub mod data;
pub mod drift;
pub mod error;
pub mod estimate;
pub mod events;
pub mod launch;
pub mod priming;
pub mod supervisor;
pub mod timing;

pub use self::data::*;
pub use self::error::AttackError;
pub use self::events::*;
pub use self::supervisor::{start, AttackSupervisor};
