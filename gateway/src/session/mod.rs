pub mod controller;
pub mod state;

pub use controller::{SessionController, TickOutcome};
pub use state::SessionState;
