//! The seam to the external playback engine.
//! The engine is a black box: it loads a URL, exposes its variant tracks, honours variant and
//! bitrate-ladder requests and reports back through `EngineNotification`s, which its owner
//! forwards to the session with `SessionHandle::engine_notification`.

use crate::error::PlayerError;
use async_trait::async_trait;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineError {
    pub code: i64,
    pub category: String,
    pub message: String,
}

impl EngineError {
    pub fn new<C: Into<String>, M: Into<String>>(code: i64, category: C, message: M) -> Self {
        Self {
            code,
            category: category.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}] {}", self.category, self.code, self.message)
    }
}

impl From<EngineError> for PlayerError {
    fn from(e: EngineError) -> Self {
        PlayerError::EngineLoad {
            code: e.code,
            category: e.category,
            message: e.message,
        }
    }
}

/// A variant track as reported by the engine for the currently loaded presentation.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantTrack {
    pub id: u64,
    pub bandwidth: u64,
    pub width: u32,
    pub height: u32,
    pub uri: String,
    pub active: bool,
}

/// Snapshot of the engine's playhead, sampled by the stall watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlaybackStatus {
    /// Seconds.
    pub position: f64,
    pub paused: bool,
    pub buffering: bool,
    /// Unbounded (live) content.
    pub live: bool,
    /// End of the seekable range, the live edge for live content.
    pub seekable_end: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineNotification {
    Ready,
    Error { error: EngineError, fatal: bool },
    VariantChanged,
    BufferingStateChanged(bool),
}

#[async_trait]
pub trait PlaybackEngine: Send + Sync {
    async fn load(&self, url: &str, start_offset: f64) -> Result<(), EngineError>;
    async fn unload(&self);
    async fn variant_tracks(&self) -> Vec<VariantTrack>;
    async fn select_variant(&self, track_id: u64) -> Result<(), EngineError>;
    async fn set_abr_enabled(&self, enabled: bool);
    async fn status(&self) -> PlaybackStatus;
    async fn seek(&self, position: f64) -> Result<(), EngineError>;
}
