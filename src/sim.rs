//! Deterministic in-process host.
//!
//! Workers honour the deadline convention of the batch launcher: a worker
//! sleeps `(deadline - now) - estimated_duration` before starting its action,
//! and the action lands after the duration the host computes at launch time.
//! Durations scale with the target's security the way the game's do.

use crate::attack::data::{ActionKind, ActorProfile};
use crate::attack::estimate::core_bonus;
use crate::config::WorkerScripts;
use crate::constants::*;
use crate::host::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimServer {
    pub security: f64,
    pub min_security: f64,
    pub money: f64,
    pub max_money: f64,
    pub hack_percent: f64,
    pub grow_factor: f64,
    /// Action durations at min security.
    pub hack_ms: f64,
    pub grow_ms: f64,
    pub weaken_ms: f64,
}

impl Default for SimServer {
    fn default() -> SimServer {
        SimServer {
            security: 5.0,
            min_security: 5.0,
            money: 1_000_000.0,
            max_money: 1_000_000.0,
            hack_percent: 0.002,
            grow_factor: 1.004,
            hack_ms: 10_000.0,
            grow_ms: 32_000.0,
            weaken_ms: 40_000.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimActor {
    pub max_memory: f64,
    pub cores: u32,
}

impl Default for SimActor {
    fn default() -> SimActor {
        SimActor {
            max_memory: 1024.0,
            cores: 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompletedAction {
    pub pid: ProcessId,
    pub kind: ActionKind,
    pub target: String,
    pub threads: u32,
    pub finish_ms: f64,
    pub id: Option<String>,
}

#[derive(Clone, Debug)]
struct SimProcess {
    info: ProcessInfo,
    host: String,
    kind: ActionKind,
    target: String,
    finish_ms: f64,
}

pub struct SimHost {
    now_ms: f64,
    servers: HashMap<String, SimServer>,
    actors: HashMap<String, SimActor>,
    scripts: HashMap<String, ActionKind>,
    processes: Vec<SimProcess>,
    next_pid: u64,
    ports: HashMap<u32, String>,
    launches: Vec<ProcessInfo>,
    completed: Vec<CompletedAction>,
    pub reject_launches: bool,
}

impl Default for SimHost {
    fn default() -> SimHost {
        SimHost::new()
    }
}

impl SimHost {
    pub fn new() -> SimHost {
        let mut host = SimHost {
            now_ms: 0.0,
            servers: HashMap::new(),
            actors: HashMap::new(),
            scripts: HashMap::new(),
            processes: Vec::new(),
            next_pid: 1,
            ports: HashMap::new(),
            launches: Vec::new(),
            completed: Vec::new(),
            reject_launches: false,
        };

        host.add_actor("home", SimActor::default());
        host.register_scripts(&WorkerScripts::default());

        host
    }

    pub fn with_target(name: &str, server: SimServer) -> SimHost {
        let mut host = SimHost::new();

        host.add_server(name, server);

        host
    }

    pub fn add_server(&mut self, name: &str, server: SimServer) {
        self.servers.insert(name.to_string(), server);
    }

    pub fn add_actor(&mut self, name: &str, actor: SimActor) {
        self.actors.insert(name.to_string(), actor);
    }

    pub fn register_scripts(&mut self, scripts: &WorkerScripts) {
        self.scripts.insert(scripts.hack.clone(), ActionKind::Hack);
        self.scripts.insert(scripts.grow.clone(), ActionKind::Grow);
        self.scripts.insert(scripts.weaken.clone(), ActionKind::Weaken);
    }

    pub fn server(&self, name: &str) -> Option<&SimServer> {
        self.servers.get(name)
    }

    pub fn server_mut(&mut self, name: &str) -> Option<&mut SimServer> {
        self.servers.get_mut(name)
    }

    pub fn actor_mut(&mut self, name: &str) -> Option<&mut SimActor> {
        self.actors.get_mut(name)
    }

    /// Every launch accepted so far, oldest first.
    pub fn launches(&self) -> &[ProcessInfo] {
        &self.launches
    }

    /// Every action that landed so far, in landing order.
    pub fn completed(&self) -> &[CompletedAction] {
        &self.completed
    }

    pub fn running_count(&self) -> usize {
        self.processes.len()
    }

    /// Moves the clock forward, landing every action that finishes on the way.
    pub fn advance(&mut self, ms: f64) {
        let until = self.now_ms + ms.max(0.0);

        loop {
            let next = self
                .processes
                .iter()
                .enumerate()
                .filter(|(_, process)| process.finish_ms <= until)
                .min_by(|(_, a), (_, b)| a.finish_ms.partial_cmp(&b.finish_ms).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(index, _)| index);

            let index = match next {
                Some(index) => index,
                None => break,
            };

            let process = self.processes.remove(index);

            self.now_ms = self.now_ms.max(process.finish_ms);

            self.land(process);
        }

        self.now_ms = until;
    }

    fn land(&mut self, process: SimProcess) {
        let cores = self.actors.get(&process.host).map(|actor| actor.cores).unwrap_or(1);
        let threads = process.info.threads;

        if let Some(server) = self.servers.get_mut(&process.target) {
            match process.kind {
                ActionKind::Hack => {
                    let fraction = (server.hack_percent * threads as f64).min(1.0);
                    server.money -= server.money * fraction;
                    server.security += HACK_SECURITY_PER_THREAD * threads as f64;
                }
                ActionKind::Grow => {
                    let grown = (server.money + threads as f64) * server.grow_factor.powi(threads as i32);
                    server.money = grown.min(server.max_money);
                    server.security += GROW_SECURITY_PER_THREAD * threads as f64;
                }
                ActionKind::Weaken => {
                    let removed = WEAKEN_SECURITY_PER_THREAD * core_bonus(cores) * threads as f64;
                    server.security = (server.security - removed).max(server.min_security);
                }
            }
        }

        self.completed.push(CompletedAction {
            pid: process.info.pid,
            kind: process.kind,
            target: process.target,
            threads,
            finish_ms: process.finish_ms,
            id: process.info.args.get(3).cloned(),
        });
    }

    fn duration(server: &SimServer, kind: ActionKind) -> f64 {
        let base = match kind {
            ActionKind::Hack => server.hack_ms,
            ActionKind::Grow => server.grow_ms,
            ActionKind::Weaken => server.weaken_ms,
        };

        let difficulty = if server.min_security > 0.0 {
            (server.security / server.min_security).max(1.0)
        } else {
            1.0
        };

        base * difficulty
    }
}

impl AttackHost for SimHost {
    fn now_ms(&self) -> f64 {
        self.now_ms
    }

    fn sleep(&mut self, ms: f64) {
        self.advance(ms);
    }

    fn current_security(&self, target: &str) -> Option<f64> {
        self.servers.get(target).map(|server| server.security)
    }

    fn min_security(&self, target: &str) -> Option<f64> {
        self.servers.get(target).map(|server| server.min_security)
    }

    fn current_money(&self, target: &str) -> Option<f64> {
        self.servers.get(target).map(|server| server.money)
    }

    fn max_money(&self, target: &str) -> Option<f64> {
        self.servers.get(target).map(|server| server.max_money)
    }

    fn action_duration(&self, kind: ActionKind, target: &str, _actor: &ActorProfile) -> f64 {
        self.servers.get(target).map(|server| SimHost::duration(server, kind)).unwrap_or(0.0)
    }

    fn hack_percent_per_thread(&self, target: &str, _actor: &ActorProfile) -> f64 {
        self.servers.get(target).map(|server| server.hack_percent).unwrap_or(0.0)
    }

    fn grow_factor_per_thread(&self, target: &str, _actor: &ActorProfile) -> f64 {
        self.servers.get(target).map(|server| server.grow_factor).unwrap_or(1.0)
    }

    fn memory_per_thread(&self, kind: ActionKind) -> f64 {
        match kind {
            ActionKind::Hack => 1.7,
            ActionKind::Grow | ActionKind::Weaken => 1.75,
        }
    }

    fn max_memory(&self, host: &str) -> Option<f64> {
        self.actors.get(host).map(|actor| actor.max_memory)
    }

    fn used_memory(&self, host: &str) -> f64 {
        self.processes
            .iter()
            .filter(|process| process.host == host)
            .map(|process| process.info.threads as f64 * self.memory_per_thread(process.kind))
            .sum()
    }

    fn cores(&self, host: &str) -> u32 {
        self.actors.get(host).map(|actor| actor.cores).unwrap_or(1)
    }

    fn launch(&mut self, script: &str, host: &str, threads: u32, args: &[String]) -> Result<ProcessId, LaunchError> {
        let kind = *self.scripts.get(script).ok_or_else(|| LaunchError::UnknownScript(script.to_string()))?;
        let actor = self.actors.get(host).ok_or_else(|| LaunchError::UnknownHost(host.to_string()))?;

        if threads == 0 {
            return Err(LaunchError::InvalidThreads(threads));
        }

        let required = threads as f64 * self.memory_per_thread(kind);
        let available = actor.max_memory - self.used_memory(host);

        if self.reject_launches || required > available + 1e-9 {
            return Err(LaunchError::InsufficientMemory {
                host: host.to_string(),
                required,
                available,
            });
        }

        let target = args.first().cloned().unwrap_or_default();
        let deadline = args.get(1).and_then(|arg| arg.parse::<f64>().ok()).unwrap_or(0.0);
        let estimate = args.get(2).and_then(|arg| arg.parse::<f64>().ok()).unwrap_or(0.0);

        let delay = if deadline > 0.0 { ((deadline - self.now_ms) - estimate).max(0.0) } else { 0.0 };
        let duration = self.servers.get(&target).map(|server| SimHost::duration(server, kind)).unwrap_or(0.0);

        let pid = ProcessId(self.next_pid);
        self.next_pid += 1;

        let info = ProcessInfo {
            pid,
            script: script.to_string(),
            threads,
            args: args.to_vec(),
        };

        self.launches.push(info.clone());

        self.processes.push(SimProcess {
            info,
            host: host.to_string(),
            kind,
            target,
            finish_ms: self.now_ms + delay + duration,
        });

        Ok(pid)
    }

    fn running_processes(&self, host: &str) -> Vec<ProcessInfo> {
        self.processes
            .iter()
            .filter(|process| process.host == host)
            .map(|process| process.info.clone())
            .collect()
    }

    fn is_running(&self, pid: ProcessId) -> bool {
        self.processes.iter().any(|process| process.info.pid == pid)
    }

    fn kill(&mut self, pid: ProcessId) -> bool {
        let before = self.processes.len();

        self.processes.retain(|process| process.info.pid != pid);

        self.processes.len() != before
    }

    fn write_port(&mut self, port: u32, data: String) {
        self.ports.insert(port, data);
    }

    fn peek_port(&self, port: u32) -> Option<String> {
        self.ports.get(&port).cloned()
    }

    fn take_port(&mut self, port: u32) -> Option<String> {
        self.ports.remove(&port)
    }
}
