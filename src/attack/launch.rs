use super::data::*;
use super::events::AttackEvent;
use crate::config::{AttackConfig, WorkerScripts};
use crate::constants::BATCH_STAGES;
use crate::host::*;
use itertools::*;
use log::*;

/// Absolute completion time of every stage of a batch ending at `batch_end_ms`.
pub fn stagger_deadlines(batch_end_ms: f64, stage_buffer_ms: f64) -> [f64; BATCH_STAGES] {
    let buffer = stage_buffer_ms.max(1.0);

    let mut deadlines = [0.0; BATCH_STAGES];

    for stage in BatchStage::ALL.iter() {
        deadlines[stage.index()] = batch_end_ms + stage.index() as f64 * buffer;
    }

    deadlines
}

/// Worker arguments: target, completion deadline, estimated duration, action id.
pub fn worker_args(target: &str, deadline_ms: f64, duration_ms: f64, id: BatchId, stage: BatchStage) -> Vec<String> {
    vec![
        target.to_string(),
        format!("{:.0}", deadline_ms),
        format!("{:.0}", duration_ms),
        format!("{}-{}", id, stage.label()),
    ]
}

/// Scales `threads` by `scale`, never below one.
pub fn clip_threads(threads: u32, scale: f64) -> u32 {
    if scale >= 1.0 {
        threads
    } else {
        ((threads as f64 * scale.max(0.0)).floor() as u32).max(1)
    }
}

pub struct BatchLauncher {
    scripts: WorkerScripts,
    grace_ms: f64,
}

impl BatchLauncher {
    pub fn new(config: &AttackConfig) -> BatchLauncher {
        BatchLauncher {
            scripts: config.scripts.clone(),
            grace_ms: config.batch_grace_ms.max(0.0),
        }
    }

    pub fn script(&self, kind: ActionKind) -> &str {
        match kind {
            ActionKind::Hack => &self.scripts.hack,
            ActionKind::Grow => &self.scripts.grow,
            ActionKind::Weaken => &self.scripts.weaken,
        }
    }

    /// Dispatches every stage of `cycle` so they complete in stage order.
    ///
    /// Rejected stages are recorded and skipped. The returned handle only
    /// tracks the processes that actually started.
    pub fn launch(
        &self,
        host: &mut dyn AttackHost,
        target: &str,
        actor: &ActorProfile,
        cycle: &CyclePlan,
        id: BatchId,
        events: &mut Vec<AttackEvent>,
    ) -> BatchHandle {
        let now = host.now_ms();
        let batch_end_ms = now + cycle.total_duration_ms;
        let completion_ms = stagger_deadlines(batch_end_ms, actor.stage_buffer_ms);

        let required_gb: f64 = cycle
            .stages()
            .map(|(_, plan)| plan.dispatch_threads() as f64 * plan.memory_per_thread_gb)
            .sum();
        let available_gb = actor.free_memory(host);

        let scale = if required_gb > available_gb && required_gb > 0.0 {
            debug!(
                "Batch {} needs {:.2}GB but only {:.2}GB is free, clipping threads",
                id, required_gb, available_gb
            );

            events.push(AttackEvent::InsufficientMemory {
                id: Some(id),
                requested_gb: required_gb,
                available_gb,
            });

            available_gb / required_gb
        } else {
            1.0
        };

        let mut dispatched = Vec::with_capacity(BATCH_STAGES);

        for (stage, plan) in cycle.stages() {
            let threads = clip_threads(plan.dispatch_threads(), scale);
            let deadline_ms = completion_ms[stage.index()];
            let args = worker_args(target, deadline_ms, plan.duration_ms, id, stage);

            match host.launch(self.script(plan.kind), &actor.host, threads, &args) {
                Ok(pid) => dispatched.push(DispatchedAction {
                    stage,
                    pid,
                    threads,
                    completion_ms: deadline_ms,
                }),
                Err(err) => {
                    debug!("Batch {} stage {} did not run: {}", id, stage.label(), err);

                    events.push(AttackEvent::LaunchRejected {
                        id: Some(id),
                        stage: Some(stage),
                        reason: err.to_string(),
                    });
                }
            }
        }

        let last_deadline_ms = dispatched.iter().map(|action| action.completion_ms).fold(batch_end_ms, f64::max);

        events.push(AttackEvent::BatchLaunched {
            id,
            stages: dispatched.len(),
        });

        BatchHandle {
            id,
            launched_at_ms: now,
            batch_end_ms,
            completion_ms,
            dispatched,
            expires_at_ms: last_deadline_ms + self.grace_ms,
        }
    }
}

/// Batches in flight for one supervisor instance.
#[derive(Default)]
pub struct BatchRegistry {
    next_id: u32,
    batches: Vec<BatchHandle>,
}

impl BatchRegistry {
    pub fn new() -> BatchRegistry {
        BatchRegistry::default()
    }

    pub fn next_id(&mut self) -> BatchId {
        let id = BatchId(self.next_id);

        self.next_id = self.next_id.wrapping_add(1);

        id
    }

    pub fn track(&mut self, handle: BatchHandle) {
        self.batches.push(handle);
    }

    pub fn in_flight(&self) -> usize {
        self.batches.len()
    }

    pub fn batches(&self) -> &[BatchHandle] {
        &self.batches
    }

    /// Forgets batches whose processes all exited or whose expiry passed.
    /// Returns how many were retired.
    pub fn retire(&mut self, host: &dyn AttackHost, events: &mut Vec<AttackEvent>) -> usize {
        let now = host.now_ms();
        let before = self.batches.len();

        self.batches.retain(|batch| {
            let running = batch.pids().filter(|pid| host.is_running(*pid)).collect_vec();

            if running.is_empty() {
                events.push(AttackEvent::BatchRetired {
                    id: batch.id,
                    expired: false,
                });

                false
            } else if now > batch.expires_at_ms {
                debug!(
                    "Batch {} expired with {} still running: {}",
                    batch.id,
                    running.len(),
                    running.iter().join(", ")
                );

                events.push(AttackEvent::BatchRetired {
                    id: batch.id,
                    expired: true,
                });

                false
            } else {
                true
            }
        });

        before - self.batches.len()
    }

    /// Kills every tracked process. Returns how many were still running.
    pub fn cancel_all(&mut self, host: &mut dyn AttackHost) -> usize {
        let killed = self
            .batches
            .drain(..)
            .flat_map(|batch| batch.dispatched.into_iter())
            .filter(|action| host.kill(action.pid))
            .count();

        if killed > 0 {
            debug!("Cancelled {} in-flight batch processes", killed);
        }

        killed
    }
}
