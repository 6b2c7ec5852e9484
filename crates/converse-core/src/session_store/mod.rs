pub mod store;
pub mod state;

pub use state::CallSession;
pub use store::{SessionHandle, SessionStore};
