use clap::Parser;
use ibex_batch::attack::*;
use ibex_batch::config::AttackConfig;
use ibex_batch::logging;
use ibex_batch::ports;
use ibex_batch::sim::*;
use log::*;
use serde::*;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "ibex-batch-sim")]
#[command(about = "Runs a batch attack against a simulated host")]
struct Cli {
    /// Scenario file (JSON)
    scenario: PathBuf,

    /// Simulated time to run, overrides the scenario
    #[arg(long)]
    duration_ms: Option<f64>,

    /// Print every event as it is drained
    #[arg(long)]
    events: bool,

    /// Enable debug logging
    #[arg(long, short)]
    verbose: bool,
}

#[derive(Deserialize)]
struct ScheduledControl {
    at_ms: f64,
    control: AttackControl,
}

#[derive(Deserialize)]
struct Scenario {
    target: String,
    #[serde(default = "default_duration")]
    duration_ms: f64,
    #[serde(default)]
    config: AttackConfig,
    servers: HashMap<String, SimServer>,
    #[serde(default)]
    actors: HashMap<String, SimActor>,
    #[serde(default)]
    controls: Vec<ScheduledControl>,
}

fn default_duration() -> f64 {
    600_000.0
}

fn load_scenario<P>(path: P) -> Result<Scenario, String>
where
    P: AsRef<Path>,
{
    let mut file = File::open(path).map_err(|err| format!("Failed to open scenario file: {}", err))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|err| format!("Failed to read string to buffer: {}", err))?;

    let scenario: Scenario = serde_json::from_str(&contents).map_err(|err| format!("Failed to load json: {}", err))?;

    Ok(scenario)
}

fn build_host(scenario: &Scenario) -> SimHost {
    let mut host = SimHost::new();

    host.register_scripts(&scenario.config.scripts);

    for (name, server) in scenario.servers.iter() {
        host.add_server(name, server.clone());
    }

    for (name, actor) in scenario.actors.iter() {
        host.add_actor(name, actor.clone());
    }

    host
}

fn main() -> Result<(), String> {
    let cli = Cli::parse();

    logging::setup_logging(if cli.verbose { logging::Debug } else { logging::Info });

    info!("Loading scenario...");
    let mut scenario = load_scenario(&cli.scenario)?;
    info!("Finished loading scenario");

    if let Some(duration_ms) = cli.duration_ms {
        scenario.duration_ms = duration_ms;
    }

    scenario.config = match scenario.config.preset {
        Some(preset) => scenario.config.clone().with_preset(preset),
        None => scenario.config.clone(),
    };

    let mut host = build_host(&scenario);
    let mut supervisor =
        AttackSupervisor::new(&host, &scenario.target, scenario.config.clone()).map_err(|err| format!("Failed to start supervisor: {}", err))?;

    let mut controls = scenario.controls.iter().collect::<Vec<_>>();
    controls.sort_by(|a, b| a.at_ms.partial_cmp(&b.at_ms).unwrap_or(std::cmp::Ordering::Equal));

    let mut controls = controls.into_iter().peekable();
    let mut elapsed_ms = 0.0;

    while elapsed_ms < scenario.duration_ms {
        let next_stop = controls.peek().map(|scheduled| scheduled.at_ms).unwrap_or(scenario.duration_ms).min(scenario.duration_ms);

        supervisor
            .run_for(&mut host, (next_stop - elapsed_ms).max(0.0))
            .map_err(|err| format!("Supervisor stopped: {}", err))?;

        elapsed_ms = next_stop;

        while let Some(scheduled) = controls.next_if(|scheduled| scheduled.at_ms <= elapsed_ms) {
            info!("Sending control at {:.0}ms: {:?}", elapsed_ms, scheduled.control);

            ports::send_control(&mut host, scenario.config.control_port, &scheduled.control)?;
        }

        for event in supervisor.drain_events() {
            if cli.events {
                println!("{}", serde_json::to_string(&event).map_err(|err| err.to_string())?);
            }
        }
    }

    let status = ports::read_status(&host, scenario.config.status_port)?.ok_or("No status was published")?;

    println!("{}", serde_json::to_string_pretty(&status).map_err(|err| err.to_string())?);

    Ok(())
}
