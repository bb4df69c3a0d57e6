pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod manifest;
pub mod regions;
pub mod registry;
pub mod session;

use crate::error::PlayerError;
use crate::session::SessionState;
use std::sync::Arc;

/// Events emitted by the playback session
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    LayoutsResolved {
        version: u64,
        layouts: Vec<String>,
    },
    RegionsResolved {
        version: u64,
        region_sets: usize,
    },
    LayoutActivated {
        layout: String,
    },
    SwitchStarted {
        from: Option<String>,
        to: String,
    },
    SwitchCompleted {
        layout: String,
        confirmed: bool,
    },
    Stalled {
        position: f64,
        recovery_target: f64,
    },
    StallCleared,
    ReloadRequested {
        layout: String,
    },
    ReloadCompleted {
        layout: String,
    },
    Warning(PlayerError),
    Error(PlayerError),
}

pub type EventCallback = Arc<dyn Fn(PlayerEvent) + Send + Sync>;

pub use config::{NoHitPolicy, SessionConfig};
pub use engine::{EngineError, EngineNotification, PlaybackEngine, PlaybackStatus, VariantTrack};
pub use error::Result;
pub use registry::LayoutRegistry;
pub use session::{PlaybackSessionController, SessionHandle};
