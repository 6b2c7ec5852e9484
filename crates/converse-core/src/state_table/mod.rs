//! The unified call state table
//!
//! Every event the bridge handles, whether it came from the SIP engine, the
//! telephony subsystem or the bridge itself, is looked up here by
//! `(role, state, event)`. A row lists guards, the adapter actions to run and
//! the next state. Rows are built in code by the modules under
//! [`tables`] and validated once when the table is first used.

pub mod types;
pub mod builder;
pub mod tables;

pub use builder::StateTableBuilder;
pub use types::*;

use lazy_static::lazy_static;
use std::sync::Arc;

lazy_static! {
    /// The master state table - single source of truth for all transitions
    pub static ref MASTER_TABLE: Arc<MasterStateTable> = Arc::new(build_master_table());
}

/// Build the complete master state table
pub fn build_master_table() -> MasterStateTable {
    let mut builder = StateTableBuilder::new();
    tables::add_engine_transitions(&mut builder);
    tables::add_telephony_transitions(&mut builder);
    tables::add_internal_transitions(&mut builder);
    let table = builder.build();

    if let Err(errors) = table.validate() {
        // The rows are compiled in; a broken table is a programming error
        panic!("Invalid call state table: {:?}", errors);
    }

    tracing::debug!("Built call state table with {} transitions", table.transition_count());
    table
}
