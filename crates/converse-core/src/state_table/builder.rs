use super::types::{EventType, MasterStateTable, Role, StateKey, Transition};
use crate::types::CallState;

/// Collects rows from the table modules into a [`MasterStateTable`]
pub struct StateTableBuilder {
    table: MasterStateTable,
}

impl StateTableBuilder {
    pub fn new() -> Self {
        Self {
            table: MasterStateTable::new(),
        }
    }

    pub fn add_transition(&mut self, role: Role, state: CallState, event: EventType, transition: Transition) {
        self.table.insert(StateKey { role, state, event }, transition);
    }

    /// Add a row matching the event in every non-terminal state without its own row
    pub fn add_wildcard(&mut self, role: Role, event: EventType, transition: Transition) {
        self.table.insert_wildcard(role, event, transition);
    }

    pub fn build(self) -> MasterStateTable {
        self.table
    }
}
