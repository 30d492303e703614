use log::*;

const MAX_STATE_TRANSITIONS: u32 = 20;

/// Ticks `state` until it stops transitioning. A machine still moving after
/// `MAX_STATE_TRANSITIONS` hops is parked until the next call.
pub fn run_state_machine_result<S, E, F>(state: &mut S, label: &str, mut tick_fn: F) -> Result<(), E>
where
    F: FnMut(&mut S) -> Result<Option<S>, E>,
{
    for _ in 0..MAX_STATE_TRANSITIONS {
        match tick_fn(state)? {
            Some(next) => *state = next,
            None => return Ok(()),
        }
    }

    error!("{} is still transitioning after {} hops, resuming next tick", label, MAX_STATE_TRANSITIONS);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settles_when_tick_returns_none() {
        let mut state = 0u32;

        let result: Result<(), String> = run_state_machine_result(&mut state, "counter", |s| Ok(if *s < 3 { Some(*s + 1) } else { None }));

        assert!(result.is_ok());
        assert_eq!(state, 3);
    }

    #[test]
    fn breaks_runaway_machine() {
        let mut state = 0u32;

        let result: Result<(), String> = run_state_machine_result(&mut state, "runaway", |s| Ok(Some(*s + 1)));

        assert!(result.is_ok());
        assert_eq!(state, MAX_STATE_TRANSITIONS);
    }

    #[test]
    fn propagates_errors() {
        let mut state = 0u32;

        let result = run_state_machine_result(&mut state, "failing", |_| Err::<Option<u32>, _>("boom".to_string()));

        assert_eq!(result, Err("boom".to_string()));
    }
}
