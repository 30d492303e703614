use ibex_batch::attack::*;
use ibex_batch::config::AttackConfig;
use ibex_batch::host::AttackHost;
use ibex_batch::ports;
use ibex_batch::sim::*;
use std::collections::{HashMap, HashSet};

fn big_home() -> SimHost {
    let mut host = SimHost::with_target("n00dles", SimServer::default());

    host.add_actor(
        "home",
        SimActor {
            max_memory: 8192.0,
            cores: 1,
        },
    );

    host
}

fn supervise(host: &SimHost) -> AttackSupervisor {
    AttackSupervisor::new(host, "n00dles", AttackConfig::default()).unwrap()
}

fn rebalances(events: &[AttackEvent]) -> Vec<RebalanceReason> {
    events
        .iter()
        .filter_map(|event| match event {
            AttackEvent::Rebalance { reason, .. } => Some(reason.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn primed_target_goes_straight_to_batching() {
    let mut host = big_home();
    let mut supervisor = supervise(&host);

    supervisor.tick(&mut host).unwrap();

    let events = supervisor.drain_events();

    assert_eq!(supervisor.phase(), AttackPhase::SteadyState);
    assert!(!events.iter().any(|event| matches!(event, AttackEvent::PrimingDispatched { .. })));
    assert!(events.contains(&AttackEvent::Primed {
        target: "n00dles".to_string()
    }));
}

#[test]
fn sizing_follows_memory_and_duration() {
    let mut host = big_home();
    let mut supervisor = supervise(&host);

    supervisor.tick(&mut host).unwrap();

    let timing = supervisor.timing().unwrap();

    // One cycle needs 783.75GB of the 8192GB and lasts 40s at a 400ms floor.
    assert_eq!(timing.memory_constrained_max, 10);
    assert_eq!(timing.timing_constrained_max, 100);
    assert_eq!(timing.simultaneous_batches, 10);
    assert_eq!(timing.pause_between_launches_ms, 4_020.0);
}

#[test]
fn primes_a_neglected_target() {
    let mut host = SimHost::with_target(
        "n00dles",
        SimServer {
            security: 20.0,
            money: 100_000.0,
            ..SimServer::default()
        },
    );
    let mut supervisor = supervise(&host);

    supervisor.tick(&mut host).unwrap();
    assert_eq!(supervisor.phase(), AttackPhase::Priming);

    supervisor.run_for(&mut host, 400_000.0).unwrap();

    let events = supervisor.drain_events();
    let dispatched = events
        .iter()
        .filter_map(|event| match event {
            AttackEvent::PrimingDispatched { kind, .. } => Some(*kind),
            _ => None,
        })
        .collect::<Vec<_>>();

    assert_eq!(dispatched, vec![ActionKind::Weaken, ActionKind::Grow, ActionKind::Weaken]);
    assert_eq!(supervisor.phase(), AttackPhase::SteadyState);
    assert!(events.iter().any(|event| matches!(event, AttackEvent::BatchLaunched { .. })));
}

#[test]
fn steady_state_keeps_target_healthy() {
    let mut host = big_home();
    let mut supervisor = supervise(&host);

    supervisor.run_for(&mut host, 300_000.0).unwrap();

    let events = supervisor.drain_events();

    assert!(rebalances(&events).is_empty());

    let launched = events.iter().filter(|event| matches!(event, AttackEvent::BatchLaunched { .. })).count();
    let retired = events.iter().filter(|event| matches!(event, AttackEvent::BatchRetired { expired: false, .. })).count();

    assert!(launched >= 20);
    assert!(retired >= 10);
    assert!(supervisor.in_flight().len() <= 10);

    // Every batch lands hack, weaken, grow, weaken in that order. The last
    // ones may still be landing.
    const ORDER: [&str; 4] = ["h", "w1", "g", "w2"];

    let mut landed: HashMap<String, Vec<String>> = HashMap::new();

    for action in host.completed() {
        if let Some((batch, stage)) = action.id.as_deref().and_then(|id| id.split_once('-')) {
            landed.entry(batch.to_string()).or_default().push(stage.to_string());
        }
    }

    assert!(!landed.is_empty());

    for stages in landed.values() {
        assert_eq!(stages.as_slice(), &ORDER[..stages.len()]);
    }

    assert!(landed.values().filter(|stages| stages.len() == ORDER.len()).count() >= 10);

    let server = host.server("n00dles").unwrap();
    assert!(server.money >= server.max_money * 0.25);
    assert!(server.security <= server.min_security * 2.0);
}

#[test]
fn status_is_published_every_tick() {
    let mut host = big_home();
    let mut supervisor = supervise(&host);

    supervisor.tick(&mut host).unwrap();

    let status = ports::read_status(&host, 1).unwrap().unwrap();

    assert_eq!(status.target, "n00dles");
    assert_eq!(status.phase, AttackPhase::SteadyState);
    assert_eq!(status.in_flight, 1);
    assert_eq!(status.batches_launched, 1);
    assert_eq!(status.timing, supervisor.timing());
    assert!(!status.unbalanced);
}

#[test]
fn sustained_low_money_rebalances() {
    let mut host = big_home();
    let mut supervisor = supervise(&host);

    supervisor.tick(&mut host).unwrap();

    for _ in 0..10 {
        host.server_mut("n00dles").unwrap().money = 100_000.0;
        supervisor.tick(&mut host).unwrap();
        host.advance(10.0);
    }

    let reasons = rebalances(&supervisor.drain_events());

    assert_eq!(reasons.len(), 1);
    assert_eq!(reasons[0], RebalanceReason::Unbalanced { checks: 6 });
}

#[test]
fn short_dips_do_not_rebalance() {
    let mut host = big_home();
    let mut supervisor = supervise(&host);

    supervisor.tick(&mut host).unwrap();

    for round in 0..20 {
        host.server_mut("n00dles").unwrap().money = if round % 3 == 2 { 1_000_000.0 } else { 100_000.0 };
        supervisor.tick(&mut host).unwrap();
        host.advance(10.0);
    }

    assert!(rebalances(&supervisor.drain_events()).is_empty());
    assert_eq!(supervisor.phase(), AttackPhase::SteadyState);
}

#[test]
fn baseline_change_rebalances_immediately() {
    let mut host = big_home();
    let mut supervisor = supervise(&host);

    supervisor.tick(&mut host).unwrap();
    assert_eq!(supervisor.in_flight().len(), 1);

    host.server_mut("n00dles").unwrap().max_money = 2_000_000.0;
    supervisor.tick(&mut host).unwrap();

    let events = supervisor.drain_events();

    assert_eq!(
        rebalances(&events),
        vec![RebalanceReason::BaselineChanged {
            max_money: 2_000_000.0,
            min_security: 5.0
        }]
    );
    assert!(events.contains(&AttackEvent::Rebalance {
        reason: RebalanceReason::BaselineChanged {
            max_money: 2_000_000.0,
            min_security: 5.0
        },
        cancelled: 4
    }));
    assert_eq!(supervisor.phase(), AttackPhase::Priming);
}

#[test]
fn memory_upgrade_rebalances_immediately() {
    let mut host = big_home();
    let mut supervisor = supervise(&host);

    supervisor.tick(&mut host).unwrap();

    host.actor_mut("home").unwrap().max_memory = 16_384.0;
    supervisor.tick(&mut host).unwrap();

    assert_eq!(
        rebalances(&supervisor.drain_events()),
        vec![RebalanceReason::MemoryChanged {
            from_gb: 8_192.0,
            to_gb: 16_384.0
        }]
    );
}

#[test]
fn change_target_moves_the_attack() {
    let mut host = big_home();
    host.add_server(
        "joesfridge",
        SimServer {
            max_money: 2_500_000.0,
            money: 2_500_000.0,
            ..SimServer::default()
        },
    );

    let mut supervisor = supervise(&host);

    supervisor.tick(&mut host).unwrap();

    ports::send_control(
        &mut host,
        2,
        &AttackControl::ChangeTarget {
            target: "joesfridge".to_string(),
        },
    )
    .unwrap();

    supervisor.tick(&mut host).unwrap();

    assert_eq!(supervisor.target(), "joesfridge");
    assert_eq!(
        rebalances(&supervisor.drain_events()),
        vec![RebalanceReason::TargetChanged {
            from: "n00dles".to_string(),
            to: "joesfridge".to_string()
        }]
    );
    assert_eq!(supervisor.phase(), AttackPhase::SteadyState);
    assert!(host.running_processes("home").iter().all(|process| process.args[0] == "joesfridge"));
}

#[test]
fn change_target_sweeps_leftover_workers_on_new_target() {
    let mut host = big_home();
    host.add_server("joesfridge", SimServer::default());

    let stale = vec!["joesfridge".to_string(), "0".to_string(), "0".to_string(), "old".to_string()];
    host.launch("/batch/weaken.js", "home", 10, &stale).unwrap();

    let mut supervisor = supervise(&host);

    supervisor.tick(&mut host).unwrap();
    assert!(!supervisor
        .drain_events()
        .iter()
        .any(|event| matches!(event, AttackEvent::StaleWorkersKilled { .. })));

    ports::send_control(
        &mut host,
        2,
        &AttackControl::ChangeTarget {
            target: "joesfridge".to_string(),
        },
    )
    .unwrap();

    supervisor.tick(&mut host).unwrap();

    assert!(supervisor.drain_events().contains(&AttackEvent::StaleWorkersKilled { count: 1 }));
    assert!(host.running_processes("home").iter().all(|process| process.args[3] != "old"));
}

#[test]
fn rebalance_during_priming_keeps_worker_ids_unique() {
    let mut host = SimHost::with_target(
        "n00dles",
        SimServer {
            security: 20.0,
            money: 100_000.0,
            ..SimServer::default()
        },
    );
    let mut supervisor = supervise(&host);

    supervisor.tick(&mut host).unwrap();
    assert_eq!(supervisor.phase(), AttackPhase::Priming);

    ports::send_control(&mut host, 2, &AttackControl::Rebalance).unwrap();
    supervisor.tick(&mut host).unwrap();
    assert_eq!(supervisor.phase(), AttackPhase::Priming);

    supervisor.run_for(&mut host, 400_000.0).unwrap();

    let ids = host.launches().iter().map(|launch| launch.args[3].clone()).collect::<Vec<_>>();
    let unique = ids.iter().collect::<HashSet<_>>();

    assert!(ids.iter().filter(|id| id.starts_with("prime-")).count() >= 2);
    assert_eq!(unique.len(), ids.len());
}

#[test]
fn invalid_control_is_ignored() {
    let mut host = big_home();
    let mut supervisor = supervise(&host);

    supervisor.tick(&mut host).unwrap();

    ports::send_control(&mut host, 2, &AttackControl::SetMoneyFraction { fraction: 1.5 }).unwrap();
    supervisor.tick(&mut host).unwrap();

    ports::send_control(
        &mut host,
        2,
        &AttackControl::ChangeTarget {
            target: "nowhere".to_string(),
        },
    )
    .unwrap();
    supervisor.tick(&mut host).unwrap();

    assert!(rebalances(&supervisor.drain_events()).is_empty());
    assert_eq!(supervisor.config().money_fraction, 0.5);
    assert_eq!(supervisor.target(), "n00dles");
}

#[test]
fn money_fraction_control_replans() {
    let mut host = big_home();
    let mut supervisor = supervise(&host);

    supervisor.tick(&mut host).unwrap();
    let before = supervisor.timing().unwrap();

    ports::send_control(&mut host, 2, &AttackControl::SetMoneyFraction { fraction: 0.1 }).unwrap();
    supervisor.tick(&mut host).unwrap();

    assert_eq!(
        rebalances(&supervisor.drain_events()),
        vec![RebalanceReason::MoneyFractionChanged { fraction: 0.1 }]
    );
    assert_eq!(supervisor.config().money_fraction, 0.1);
    assert!(supervisor.timing().unwrap().memory_constrained_max > before.memory_constrained_max);
}

#[test]
fn priming_that_never_converges_is_fatal() {
    let mut host = SimHost::with_target(
        "n00dles",
        SimServer {
            security: 50.0,
            ..SimServer::default()
        },
    );
    host.reject_launches = true;

    let config = AttackConfig {
        max_priming_passes: 5,
        ..AttackConfig::default()
    };
    let mut supervisor = AttackSupervisor::new(&host, "n00dles", config).unwrap();

    let result = supervisor.run_for(&mut host, 60_000.0);

    assert_eq!(
        result,
        Err(AttackError::PrimingNonConvergence {
            target: "n00dles".to_string(),
            passes: 5
        })
    );
}

#[test]
fn start_returns_only_on_fatal_error() {
    let mut host = SimHost::with_target(
        "n00dles",
        SimServer {
            security: 50.0,
            ..SimServer::default()
        },
    );
    host.reject_launches = true;

    let config = AttackConfig {
        max_priming_passes: 2,
        ..AttackConfig::default()
    };

    let err = match start(&mut host, "n00dles", config) {
        Ok(never) => match never {},
        Err(err) => err,
    };

    assert!(matches!(err, AttackError::PrimingNonConvergence { .. }));
}
