use crate::session_store::CallSession;
use crate::state_table::Guard;

/// Check a single guard against the session
pub fn check_guard(guard: &Guard, session: &CallSession) -> bool {
    match guard {
        Guard::AwaitingEnablement => session.awaiting_enablement,
        Guard::HasConnection => session.connection.is_some(),
        Guard::HasEngineCall => session.engine_call.is_some(),
    }
}

/// All guards hold
pub fn check_guards(guards: &[Guard], session: &CallSession) -> bool {
    guards.iter().all(|guard| check_guard(guard, session))
}
