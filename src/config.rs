//! Supervisor configuration.
//!
//! Every field has a default, so a config file only needs to name what it
//! changes. The timing constants that differed between the historical
//! controller generations are grouped as [`TimingPreset`]s.

use crate::attack::error::AttackError;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerScripts {
    pub hack: String,
    pub grow: String,
    pub weaken: String,
}

impl Default for WorkerScripts {
    fn default() -> WorkerScripts {
        WorkerScripts {
            hack: "/batch/hack.js".to_string(),
            grow: "/batch/grow.js".to_string(),
            weaken: "/batch/weaken.js".to_string(),
        }
    }
}

impl WorkerScripts {
    pub fn all(&self) -> [&str; 3] {
        [&self.hack, &self.grow, &self.weaken]
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingPreset {
    /// Wide stagger, tolerant of slow hosts.
    Legacy,
    Standard,
    /// Narrow stagger for hosts with reliable timers.
    Tight,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttackConfig {
    /// Host the workers are launched from.
    pub host: String,
    /// Nominal share of max money taken by each batch's hack stage.
    pub money_fraction: f64,
    /// Memory on the host left untouched for other scripts.
    pub reserved_memory_gb: f64,
    pub preset: Option<TimingPreset>,
    /// Gap between the planned completions of consecutive batch stages.
    pub stage_buffer_ms: f64,
    /// Lower bound on the spacing between two batch launches.
    pub min_pause_ms: f64,
    pub launch_overhead_ms: f64,
    /// How long past its last deadline an unfinished batch is still tracked.
    pub batch_grace_ms: f64,
    pub unbalanced_check_threshold: u32,
    pub max_priming_passes: u32,
    pub poll_interval_ms: f64,
    pub status_port: u32,
    pub control_port: u32,
    pub scripts: WorkerScripts,
}

impl Default for AttackConfig {
    fn default() -> AttackConfig {
        AttackConfig {
            host: "home".to_string(),
            money_fraction: 0.5,
            reserved_memory_gb: 0.0,
            preset: None,
            stage_buffer_ms: 100.0,
            min_pause_ms: 400.0,
            launch_overhead_ms: 5.0,
            batch_grace_ms: 1_000.0,
            unbalanced_check_threshold: 5,
            max_priming_passes: 100,
            poll_interval_ms: 200.0,
            status_port: 1,
            control_port: 2,
            scripts: WorkerScripts::default(),
        }
    }
}

impl AttackConfig {
    pub fn from_json(data: &str) -> Result<AttackConfig, String> {
        let config: AttackConfig = serde_json::from_str(data).map_err(|err| format!("Failed to parse attack config: {}", err))?;

        Ok(match config.preset {
            Some(preset) => config.with_preset(preset),
            None => config,
        })
    }

    pub fn with_preset(mut self, preset: TimingPreset) -> AttackConfig {
        let (stage_buffer_ms, launch_overhead_ms) = match preset {
            TimingPreset::Legacy => (200.0, 10.0),
            TimingPreset::Standard => (100.0, 5.0),
            TimingPreset::Tight => (40.0, 2.0),
        };

        self.preset = Some(preset);
        self.stage_buffer_ms = stage_buffer_ms;
        self.launch_overhead_ms = launch_overhead_ms;
        self.min_pause_ms = stage_buffer_ms * crate::constants::BATCH_STAGES as f64;

        self
    }

    pub fn validate(&self) -> Result<(), AttackError> {
        if self.host.is_empty() {
            return Err(AttackError::MissingArgument("host"));
        }

        if self.money_fraction.is_nan() || self.money_fraction <= 0.0 || self.money_fraction >= 1.0 {
            return Err(AttackError::InvalidConfig(format!(
                "money_fraction must be within (0, 1), got {}",
                self.money_fraction
            )));
        }

        if self.stage_buffer_ms.is_nan() || self.stage_buffer_ms <= 0.0 || self.min_pause_ms.is_nan() || self.min_pause_ms <= 0.0 {
            return Err(AttackError::InvalidConfig("stage_buffer_ms and min_pause_ms must be positive".to_string()));
        }

        if self.min_pause_ms < self.stage_buffer_ms * crate::constants::BATCH_STAGES as f64 {
            log::warn!(
                "min_pause_ms {} is shorter than the stagger span of one batch ({}), batches may interleave",
                self.min_pause_ms,
                self.stage_buffer_ms * crate::constants::BATCH_STAGES as f64
            );
        }

        if self.max_priming_passes == 0 {
            return Err(AttackError::InvalidConfig("max_priming_passes must be at least 1".to_string()));
        }

        Ok(())
    }
}
