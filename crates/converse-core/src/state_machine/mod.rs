pub mod executor;
pub mod actions;
pub mod guards;

pub use actions::ActionError;
pub use executor::{MachineSettings, ProcessEventResult, StateMachine};
