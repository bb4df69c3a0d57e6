//! The session state machine.
//!
//! `SessionMachine::handle` consumes one `Input` and returns the `Effect`s the driver has to
//! perform. It never touches the network, the engine or a clock, which keeps every
//! transition testable on its own. Results of asynchronous work come back as inputs tagged
//! with the manifest version (and switch id) they were started under; anything tagged with a
//! superseded version is dropped.

use crate::config::SessionConfig;
use crate::engine::{EngineError, EngineNotification, PlaybackStatus};
use crate::error::{PlayerError, Result};
use crate::manifest::{stream_path_of, Layout};
use crate::regions::mapper::{PointerEvent, RegionHitMapper};
use crate::regions::LayoutRegionSet;
use crate::registry::LayoutRegistry;
use crate::session::watchdog::{StallAction, StallWatchdog};
use crate::PlayerEvent;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Uninitialized,
    PlayerReady,
    ManifestLoading,
    LayoutsResolved,
    SwitchingLayout,
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::PlayerReady => "player_ready",
            SessionState::ManifestLoading => "manifest_loading",
            SessionState::LayoutsResolved => "layouts_resolved",
            SessionState::SwitchingLayout => "switching_layout",
            SessionState::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    SwitchTimeout,
    StallSample,
    StallCooldown,
}

impl TimerKind {
    pub const ALL: [TimerKind; 3] = [TimerKind::SwitchTimeout, TimerKind::StallSample, TimerKind::StallCooldown];
}

/// How the driver carried out a layout switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchMethod {
    /// The target layout's tracks were already loaded; one was selected in place.
    VariantSelected,
    /// The engine was reloaded with the target layout's master URL.
    Reloaded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Engine(EngineNotification),
    Load { url: String },
    SelectLayout { name: String },
    Pointer(PointerEvent),
    SetAbrEnabled(bool),
    ManifestResolved { version: u64, result: Result<Vec<Layout>> },
    RegionsResolved { version: u64, result: Result<Vec<LayoutRegionSet>> },
    LayoutLoaded { version: u64, layout: String, result: std::result::Result<(), EngineError> },
    SwitchDispatched {
        version: u64,
        switch_id: u64,
        captured_position: f64,
        result: std::result::Result<SwitchMethod, EngineError>,
    },
    PlaybackSample { version: u64, status: PlaybackStatus },
    ReloadCompleted { version: u64, result: std::result::Result<(), EngineError> },
    TimerFired { kind: TimerKind, tag: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    FetchManifest { version: u64, url: String },
    FetchRegions { version: u64, stream_path: String },
    LoadLayout { version: u64, layout: String, url: String, start_offset: f64 },
    /// Capture the playhead, then select a variant of `layout` or reload with its master URL.
    DispatchSwitch { version: u64, switch_id: u64, layout: Layout },
    Seek { position: f64 },
    /// Reload `url` with a cache-busting parameter, falling back to the plain URL.
    Reload { version: u64, url: String, start_offset: f64 },
    SampleStatus { version: u64 },
    SetAbrEnabled(bool),
    Unload,
    StartTimer { kind: TimerKind, after: Duration, repeat: bool, tag: u64 },
    CancelTimer(TimerKind),
    Emit(PlayerEvent),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSession {
    pub state: SessionState,
    /// Incremented once per top-level load request.
    pub manifest_version: u64,
    pub manifest_url: Option<String>,
    pub active_layout: Option<String>,
    pub switching: bool,
    pub last_position: f64,
    /// The user's bitrate-ladder setting, independent of temporary suppression during a switch.
    pub abr_enabled: bool,
}

impl Default for PlaybackSession {
    fn default() -> Self {
        Self {
            state: SessionState::Uninitialized,
            manifest_version: 0,
            manifest_url: None,
            active_layout: None,
            switching: false,
            last_position: 0.0,
            abr_enabled: true,
        }
    }
}

/// Read-only view published after every input.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub manifest_version: u64,
    pub active_layout: Option<String>,
    pub switching: bool,
    pub stalled: bool,
    pub last_position: f64,
    pub layouts: Vec<String>,
}

pub struct SessionMachine {
    config: SessionConfig,
    session: PlaybackSession,
    registry: LayoutRegistry,
    watchdog: StallWatchdog,
    mapper: RegionHitMapper,
    switch_seq: u64,
    switch_from: Option<String>,
    abr_suppressed: bool,
    // Engine operations in flight. Only one may change what the engine plays at a time.
    loading: bool,
    dispatching: bool,
    reloading: bool,
}

impl SessionMachine {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            watchdog: StallWatchdog::new(&config),
            mapper: RegionHitMapper::from_config(&config),
            config,
            session: PlaybackSession::default(),
            registry: LayoutRegistry::new(),
            switch_seq: 0,
            switch_from: None,
            abr_suppressed: false,
            loading: false,
            dispatching: false,
            reloading: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.session.state
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    pub fn registry(&self) -> &LayoutRegistry {
        &self.registry
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.session.state,
            manifest_version: self.session.manifest_version,
            active_layout: self.session.active_layout.clone(),
            switching: self.session.switching,
            stalled: self.watchdog.is_stalled(),
            last_position: self.session.last_position,
            layouts: self.registry.names(),
        }
    }

    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        let mut fx = Vec::new();
        match input {
            Input::Engine(notification) => self.on_engine(notification, &mut fx),
            Input::Load { url } => self.on_load(url, &mut fx),
            Input::SelectLayout { name } => self.on_select(name, &mut fx),
            Input::Pointer(pointer) => self.on_pointer(pointer, &mut fx),
            Input::SetAbrEnabled(enabled) => self.on_set_abr(enabled, &mut fx),
            Input::ManifestResolved { version, result } => self.on_manifest(version, result, &mut fx),
            Input::RegionsResolved { version, result } => self.on_regions(version, result, &mut fx),
            Input::LayoutLoaded { version, layout, result } => self.on_layout_loaded(version, layout, result, &mut fx),
            Input::SwitchDispatched {
                version,
                switch_id,
                captured_position,
                result,
            } => self.on_switch_dispatched(version, switch_id, captured_position, result, &mut fx),
            Input::PlaybackSample { version, status } => self.on_sample(version, status, &mut fx),
            Input::ReloadCompleted { version, result } => self.on_reload_completed(version, result, &mut fx),
            Input::TimerFired { kind, tag } => self.on_timer(kind, tag, &mut fx),
        }
        fx
    }

    /// True while a load, switch dispatch or reload may still change what the engine plays.
    pub fn engine_busy(&self) -> bool {
        self.loading || self.dispatching || self.reloading
    }

    /// Effects that release every scoped resource of the session.
    pub fn teardown(&mut self) -> Vec<Effect> {
        info!("Tearing down playback session (version {})", self.session.manifest_version);
        let mut fx = Vec::new();
        self.cancel_all_timers(&mut fx);
        self.session.switching = false;
        self.loading = false;
        self.dispatching = false;
        self.reloading = false;
        fx.push(Effect::Unload);
        fx
    }

    fn on_engine(&mut self, notification: EngineNotification, fx: &mut Vec<Effect>) {
        match notification {
            EngineNotification::Ready => {
                if self.session.state == SessionState::Uninitialized {
                    self.enter(SessionState::PlayerReady, fx);
                } else {
                    debug!("Engine ready notification in state {}, ignored", self.session.state);
                }
            }
            EngineNotification::Error { error, fatal: true } => {
                warn!("Fatal engine error {}", error);
                if self.session.switching {
                    self.session.active_layout = self.switch_from.take();
                }
                self.fail(error.into(), fx);
            }
            EngineNotification::Error { error, fatal: false } => {
                warn!("Recoverable engine error {}", error);
                fx.push(Effect::Emit(PlayerEvent::Warning(error.into())));
            }
            EngineNotification::VariantChanged => {
                if self.session.state == SessionState::SwitchingLayout {
                    self.complete_switch(true, fx);
                } else {
                    debug!("Variant changed outside of a manual switch");
                }
            }
            EngineNotification::BufferingStateChanged(buffering) => self.watchdog.on_buffering(buffering),
        }
    }

    fn on_load(&mut self, url: String, fx: &mut Vec<Effect>) {
        if self.session.state == SessionState::Uninitialized {
            warn!("Load of {} requested before the engine is ready, ignored", url);
            return;
        }

        self.session.manifest_version += 1;
        let version = self.session.manifest_version;
        info!("Loading manifest {} (version {})", url, version);

        self.cancel_all_timers(fx);
        self.restore_abr(fx);
        self.registry.clear();
        self.watchdog.reset();
        self.session.active_layout = None;
        self.session.switching = false;
        self.session.last_position = 0.0;
        self.session.manifest_url = Some(url.clone());
        self.switch_from = None;
        self.loading = false;
        self.dispatching = false;
        self.reloading = false;

        self.enter(SessionState::ManifestLoading, fx);
        fx.push(Effect::FetchRegions {
            version,
            stream_path: stream_path_of(&url),
        });
        fx.push(Effect::FetchManifest { version, url });
    }

    fn on_manifest(&mut self, version: u64, result: Result<Vec<Layout>>, fx: &mut Vec<Effect>) {
        if !self.is_current(version, "manifest") {
            return;
        }
        if self.session.state != SessionState::ManifestLoading {
            debug!("Manifest result in state {}, ignored", self.session.state);
            return;
        }

        let layouts = match result {
            Ok(layouts) if layouts.is_empty() => return self.fail(PlayerError::ManifestParseEmpty, fx),
            Ok(layouts) => layouts,
            Err(e) => return self.fail(e, fx),
        };

        self.registry.replace_layouts(layouts);
        let Some((name, url)) = self
            .registry
            .first()
            .map(|l| (l.name.clone(), l.master_url.clone()))
        else {
            return self.fail(PlayerError::ManifestParseEmpty, fx);
        };
        info!("Resolved {} layouts, starting with '{}'", self.registry.len(), name);

        self.session.active_layout = Some(name.clone());
        self.loading = true;
        self.enter(SessionState::LayoutsResolved, fx);
        fx.push(Effect::Emit(PlayerEvent::LayoutsResolved {
            version,
            layouts: self.registry.names(),
        }));
        fx.push(Effect::LoadLayout {
            version,
            layout: name,
            url,
            start_offset: 0.0,
        });
    }

    fn on_regions(&mut self, version: u64, result: Result<Vec<LayoutRegionSet>>, fx: &mut Vec<Effect>) {
        if !self.is_current(version, "region") {
            return;
        }
        match result {
            Ok(sets) => {
                debug!("Received region metadata for {} layouts", sets.len());
                let region_sets = sets.len();
                self.registry.set_regions(sets);
                fx.push(Effect::Emit(PlayerEvent::RegionsResolved { version, region_sets }));
            }
            Err(e) => {
                warn!("Region metadata unavailable: {}", e);
                // Only click-to-switch depends on regions.
                let e = if e.is_degraded_only() {
                    e
                } else {
                    PlayerError::RegionConfigFetch(e.to_string())
                };
                self.report(e, fx);
            }
        }
    }

    fn on_layout_loaded(
        &mut self,
        version: u64,
        layout: String,
        result: std::result::Result<(), EngineError>,
        fx: &mut Vec<Effect>,
    ) {
        if !self.is_current(version, "engine load") {
            return;
        }
        self.loading = false;
        if self.session.state != SessionState::LayoutsResolved
            || self.session.active_layout.as_deref() != Some(layout.as_str())
        {
            debug!("Initial load of '{}' finished after the session moved on", layout);
            return;
        }

        match result {
            Ok(()) => {
                info!("Layout '{}' loaded", layout);
                self.watchdog.reset();
                self.start_sampling(fx);
                fx.push(Effect::Emit(PlayerEvent::LayoutActivated { layout }));
            }
            Err(e) => self.fail(e.into(), fx),
        }
    }

    fn on_select(&mut self, name: String, fx: &mut Vec<Effect>) {
        match self.session.state {
            SessionState::LayoutsResolved => {}
            // Layouts survive a failed switch, so a retry does not need a full reload.
            SessionState::Error if !self.registry.is_empty() => {}
            SessionState::SwitchingLayout => {
                info!(
                    "Switch to '{}' still in flight, ignoring request for '{}'",
                    self.session.active_layout.as_deref().unwrap_or_default(),
                    name
                );
                return;
            }
            state => {
                debug!("Layout selection '{}' in state {}, ignored", name, state);
                return;
            }
        }

        if self.engine_busy() {
            info!("Engine is still loading, ignoring request for '{}'", name);
            return;
        }

        let Some(target) = self.registry.get(&name).cloned() else {
            warn!("Unknown layout '{}' requested", name);
            return;
        };
        if self.session.state == SessionState::LayoutsResolved
            && self.session.active_layout.as_deref() == Some(name.as_str())
        {
            debug!("Layout '{}' is already active", name);
            return;
        }

        self.switch_seq += 1;
        let switch_id = self.switch_seq;
        let version = self.session.manifest_version;
        let from = self.session.active_layout.replace(name.clone());
        info!("Switching layout {:?} -> '{}' (switch {})", from, name, switch_id);

        self.switch_from = from.clone();
        self.session.switching = true;
        self.dispatching = true;
        self.watchdog.reset();
        fx.push(Effect::CancelTimer(TimerKind::StallSample));
        fx.push(Effect::CancelTimer(TimerKind::StallCooldown));

        if self.config.disable_abr_during_switch && self.session.abr_enabled && !self.abr_suppressed {
            self.abr_suppressed = true;
            fx.push(Effect::SetAbrEnabled(false));
        }

        self.enter(SessionState::SwitchingLayout, fx);
        fx.push(Effect::Emit(PlayerEvent::SwitchStarted { from, to: name }));
        fx.push(Effect::DispatchSwitch {
            version,
            switch_id,
            layout: target,
        });
        fx.push(Effect::StartTimer {
            kind: TimerKind::SwitchTimeout,
            after: self.config.switch_timeout(),
            repeat: false,
            tag: switch_id,
        });
    }

    fn on_pointer(&mut self, pointer: PointerEvent, fx: &mut Vec<Effect>) {
        if self.session.state != SessionState::LayoutsResolved {
            debug!("Pointer event in state {}, ignored", self.session.state);
            return;
        }
        let Some(active) = self.session.active_layout.clone() else {
            return;
        };

        if let Some(proposal) = self.mapper.propose(&self.registry, &active, &pointer) {
            debug!("Pointer ({}, {}) proposes layout '{}'", pointer.x, pointer.y, proposal);
            self.on_select(proposal, fx);
        }
    }

    fn on_set_abr(&mut self, enabled: bool, fx: &mut Vec<Effect>) {
        self.session.abr_enabled = enabled;
        if self.abr_suppressed {
            debug!("Bitrate ladder set to {} once the pending switch completes", enabled);
            return;
        }
        fx.push(Effect::SetAbrEnabled(enabled));
    }

    fn on_switch_dispatched(
        &mut self,
        version: u64,
        switch_id: u64,
        captured_position: f64,
        result: std::result::Result<SwitchMethod, EngineError>,
        fx: &mut Vec<Effect>,
    ) {
        if !self.is_current(version, "switch") || switch_id != self.switch_seq {
            debug!("Result of superseded switch {} dropped", switch_id);
            return;
        }
        self.dispatching = false;
        if !matches!(
            self.session.state,
            SessionState::SwitchingLayout | SessionState::LayoutsResolved
        ) {
            debug!("Switch {} finished in state {}, ignored", switch_id, self.session.state);
            return;
        }

        match result {
            Ok(method) => {
                self.session.last_position = captured_position;
                if method == SwitchMethod::Reloaded && captured_position > self.config.min_restore_position_secs {
                    debug!("Restoring position {:.3}s after reload", captured_position);
                    fx.push(Effect::Seek {
                        position: captured_position,
                    });
                }
            }
            Err(e) => {
                warn!("Switch {} failed: {}", switch_id, e);
                self.session.active_layout = self.switch_from.take();
                self.fail(e.into(), fx);
            }
        }
    }

    fn complete_switch(&mut self, confirmed: bool, fx: &mut Vec<Effect>) {
        let layout = self.session.active_layout.clone().unwrap_or_default();
        self.session.switching = false;
        self.switch_from = None;
        fx.push(Effect::CancelTimer(TimerKind::SwitchTimeout));
        self.restore_abr(fx);

        self.enter(SessionState::LayoutsResolved, fx);
        self.watchdog.reset();
        self.start_sampling(fx);

        if confirmed {
            info!("Switch to '{}' confirmed by the engine", layout);
        } else {
            warn!("Switch to '{}' not confirmed, leaving switching state", layout);
            let timeout = PlayerError::SwitchTimeout {
                layout: layout.clone(),
                timeout_ms: self.config.switch_timeout_ms,
            };
            self.report(timeout, fx);
        }
        fx.push(Effect::Emit(PlayerEvent::SwitchCompleted { layout, confirmed }));
    }

    fn on_sample(&mut self, version: u64, status: PlaybackStatus, fx: &mut Vec<Effect>) {
        if !self.is_current(version, "playback sample") {
            return;
        }
        if self.session.state != SessionState::LayoutsResolved || self.engine_busy() {
            return;
        }

        self.session.last_position = status.position;
        match self.watchdog.sample(&status) {
            None => {}
            Some(StallAction::Seek { target }) => {
                fx.push(Effect::Seek { position: target });
                fx.push(Effect::Emit(PlayerEvent::Stalled {
                    position: status.position,
                    recovery_target: target,
                }));
                fx.push(Effect::StartTimer {
                    kind: TimerKind::StallCooldown,
                    after: self.config.stall_cooldown(),
                    repeat: false,
                    tag: 0,
                });
            }
            Some(StallAction::Escalate) => {
                let Some(layout) = self
                    .session
                    .active_layout
                    .as_deref()
                    .and_then(|name| self.registry.get(name))
                else {
                    return;
                };
                let (name, url) = (layout.name.clone(), layout.master_url.clone());
                self.reloading = true;
                fx.push(Effect::CancelTimer(TimerKind::StallSample));
                fx.push(Effect::Emit(PlayerEvent::ReloadRequested { layout: name }));
                fx.push(Effect::Reload {
                    version,
                    url,
                    start_offset: status.position,
                });
            }
        }
    }

    fn on_reload_completed(
        &mut self,
        version: u64,
        result: std::result::Result<(), EngineError>,
        fx: &mut Vec<Effect>,
    ) {
        if !self.is_current(version, "reload") || !self.reloading {
            return;
        }
        self.reloading = false;
        if self.session.state != SessionState::LayoutsResolved {
            return;
        }

        match result {
            Ok(()) => {
                let layout = self.session.active_layout.clone().unwrap_or_default();
                info!("Reloaded layout '{}' after stall", layout);
                self.watchdog.reset();
                self.start_sampling(fx);
                fx.push(Effect::Emit(PlayerEvent::ReloadCompleted { layout }));
            }
            Err(e) => self.fail(e.into(), fx),
        }
    }

    fn on_timer(&mut self, kind: TimerKind, tag: u64, fx: &mut Vec<Effect>) {
        match kind {
            TimerKind::SwitchTimeout => {
                if self.session.state == SessionState::SwitchingLayout && tag == self.switch_seq {
                    self.complete_switch(false, fx);
                } else {
                    debug!("Stale switch timeout {} ignored", tag);
                }
            }
            TimerKind::StallSample => {
                if self.session.state == SessionState::LayoutsResolved && !self.engine_busy() {
                    fx.push(Effect::SampleStatus {
                        version: self.session.manifest_version,
                    });
                }
            }
            TimerKind::StallCooldown => {
                self.watchdog.clear_stalled();
                fx.push(Effect::Emit(PlayerEvent::StallCleared));
            }
        }
    }

    fn fail(&mut self, error: PlayerError, fx: &mut Vec<Effect>) {
        warn!("Session error: {}", error);
        self.cancel_all_timers(fx);
        self.restore_abr(fx);
        self.session.switching = false;
        self.switch_from = None;
        self.watchdog.reset();
        self.enter(SessionState::Error, fx);
        fx.push(Effect::Emit(PlayerEvent::Error(error)));
    }

    /// Degrading errors become warnings, everything else fails the session.
    fn report(&mut self, error: PlayerError, fx: &mut Vec<Effect>) {
        if error.is_degraded_only() {
            fx.push(Effect::Emit(PlayerEvent::Warning(error)));
        } else {
            self.fail(error, fx);
        }
    }

    fn start_sampling(&self, fx: &mut Vec<Effect>) {
        fx.push(Effect::StartTimer {
            kind: TimerKind::StallSample,
            after: self.config.sample_interval(),
            repeat: true,
            tag: 0,
        });
    }

    fn restore_abr(&mut self, fx: &mut Vec<Effect>) {
        if self.abr_suppressed {
            self.abr_suppressed = false;
            fx.push(Effect::SetAbrEnabled(self.session.abr_enabled));
        }
    }

    fn cancel_all_timers(&self, fx: &mut Vec<Effect>) {
        fx.extend(TimerKind::ALL.into_iter().map(Effect::CancelTimer));
    }

    fn is_current(&self, version: u64, what: &str) -> bool {
        if version != self.session.manifest_version {
            debug!(
                "Dropping {} result for version {} (current {})",
                what, version, self.session.manifest_version
            );
            return false;
        }
        true
    }

    fn enter(&mut self, to: SessionState, fx: &mut Vec<Effect>) {
        let from = self.session.state;
        if from == to {
            return;
        }
        info!("Session state {} -> {}", from, to);
        self.session.state = to;
        fx.push(Effect::Emit(PlayerEvent::StateChanged { from, to }));
    }
}
