//! Tunables for a playback session.
//! Every timeout, threshold and retry count used by the controller, the watchdog and the
//! hit mapper lives here so that a single YAML/JSON document can describe a deployment.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What a pointer event that hits no region does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoHitPolicy {
    /// Do nothing.
    #[default]
    Ignore,
    /// Propose the next layout in registry order (wrapping around).
    #[serde(alias = "advance")]
    AdvanceLayout,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Appended to `base_url + layout_key` to build each layout's master URL.
    pub master_suffix: String,
    /// Ceiling on how long a switch may wait for the engine's variant-changed notification.
    pub switch_timeout_ms: u64,
    /// Interval between two playback position samples.
    pub sample_interval_ms: u64,
    /// Consecutive samples without progress before the watchdog intervenes.
    pub stall_miss_threshold: u32,
    /// How long the transient "stalled" flag stays raised after a recovery.
    pub stall_cooldown_ms: u64,
    /// Distance behind the live edge targeted when recovering live content.
    pub live_edge_offset_secs: f64,
    /// Forward nudge applied when recovering bounded content.
    pub bounded_nudge_secs: f64,
    /// Positions at or below this are not restored after a switch.
    pub min_restore_position_secs: f64,
    /// Seek recoveries without progress before escalating to a full reload.
    pub escalate_after_recoveries: u32,
    /// Cache-busted reload attempts before falling back to the plain URL.
    pub cache_bust_retries: u32,
    /// Query parameter used to defeat intermediate caches.
    pub cache_bust_param: String,
    /// Treat the largest region as a background pane that never wins a hit test.
    pub exclude_largest_region: bool,
    pub no_hit_policy: NoHitPolicy,
    /// Turn the engine's bitrate ladder off while a manual switch is pending.
    pub disable_abr_during_switch: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            master_suffix: "/master.m3u8".to_string(),
            switch_timeout_ms: 5_000,
            sample_interval_ms: 1_000,
            stall_miss_threshold: 3,
            stall_cooldown_ms: 3_000,
            live_edge_offset_secs: 3.0,
            bounded_nudge_secs: 0.5,
            min_restore_position_secs: 0.5,
            escalate_after_recoveries: 2,
            cache_bust_retries: 1,
            cache_bust_param: "_cb".to_string(),
            exclude_largest_region: true,
            no_hit_policy: NoHitPolicy::Ignore,
            disable_abr_during_switch: true,
        }
    }
}

impl SessionConfig {
    pub fn switch_timeout(&self) -> Duration {
        Duration::from_millis(self.switch_timeout_ms)
    }

    pub fn sample_interval(&self) -> Duration {
        // A zero interval would make the sampling task spin.
        Duration::from_millis(self.sample_interval_ms.max(1))
    }

    pub fn stall_cooldown(&self) -> Duration {
        Duration::from_millis(self.stall_cooldown_ms)
    }
}
