//! Account registration lifecycle
//!
//! [`RegistrationManager`] owns the single [`Account`](crate::types::Account),
//! drives login/logout on the SIP engine and turns the engine's registration
//! events into [`RegistrationState`](crate::types::RegistrationState) changes.
//! Retrying is the engine's job; the manager only reports what happens.

pub mod manager;

pub use manager::{RegistrationManager, RegistrationView};
