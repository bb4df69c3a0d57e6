pub mod controller;
pub mod state;
pub mod watchdog;

pub use controller::{PlaybackSessionController, SessionHandle};
pub use state::{PlaybackSession, SessionMachine, SessionSnapshot, SessionState};
