pub mod engine;
pub mod telephony;
pub mod internal;

pub use engine::add_engine_transitions;
pub use internal::add_internal_transitions;
pub use telephony::add_telephony_transitions;
