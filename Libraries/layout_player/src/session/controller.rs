use crate::config::SessionConfig;
use crate::engine::{EngineError, EngineNotification, PlaybackEngine};
use crate::fetch::{cache_busted, ManifestSource};
use crate::manifest::parser::parse_layouts;
use crate::manifest::{base_url_of, Layout};
use crate::regions::client::RegionSource;
use crate::regions::mapper::PointerEvent;
use crate::session::state::{Effect, Input, SessionMachine, SessionSnapshot, SwitchMethod, TimerKind};
use crate::EventCallback;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

enum Command {
    Input(Input),
    TimerFired { kind: TimerKind, generation: u64, tag: u64 },
    Shutdown,
}

struct ScopedTimer {
    generation: u64,
    token: CancellationToken,
    repeat: bool,
}

/// Drives a `SessionMachine`: all inputs are funnelled through one channel and handled in
/// order by `run`, which then executes the resulting effects.
pub struct PlaybackSessionController {
    machine: SessionMachine,
    engine: Arc<dyn PlaybackEngine>,
    manifests: Arc<dyn ManifestSource>,
    regions: Option<Arc<dyn RegionSource>>,
    callback: EventCallback,
    commands_tx: mpsc::UnboundedSender<Command>,
    commands_rx: mpsc::UnboundedReceiver<Command>,
    snapshots: watch::Sender<SessionSnapshot>,
    timers: HashMap<TimerKind, ScopedTimer>,
    timer_generation: u64,
    shutdown: CancellationToken,
}

impl PlaybackSessionController {
    pub fn new(
        config: SessionConfig,
        engine: Arc<dyn PlaybackEngine>,
        manifests: Arc<dyn ManifestSource>,
        regions: Option<Arc<dyn RegionSource>>,
        callback: EventCallback,
    ) -> (Self, SessionHandle) {
        let machine = SessionMachine::new(config);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (snapshots, snapshot_rx) = watch::channel(machine.snapshot());
        let shutdown = CancellationToken::new();

        let handle = SessionHandle {
            commands: commands_tx.clone(),
            snapshots: snapshot_rx,
            shutdown: shutdown.clone(),
        };

        let controller = Self {
            machine,
            engine,
            manifests,
            regions,
            callback,
            commands_tx,
            commands_rx,
            snapshots,
            timers: HashMap::new(),
            timer_generation: 0,
            shutdown,
        };
        (controller, handle)
    }

    #[instrument(skip_all)]
    pub async fn run(mut self) {
        info!("Playback session started");

        loop {
            let command = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                command = self.commands_rx.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };

            match command {
                Command::Input(input) => self.apply(input).await,
                Command::TimerFired { kind, generation, tag } => {
                    let Some(timer) = self.timers.get(&kind) else {
                        continue;
                    };
                    if timer.generation != generation {
                        debug!("Dropping {:?} fire from cancelled generation {}", kind, generation);
                        continue;
                    }
                    if !timer.repeat {
                        self.timers.remove(&kind);
                    }
                    self.apply(Input::TimerFired { kind, tag }).await;
                }
                Command::Shutdown => break,
            }
        }

        let effects = self.machine.teardown();
        self.execute(effects).await;
        self.shutdown.cancel();
        self.snapshots.send_replace(self.machine.snapshot());
        info!("Playback session stopped");
    }

    async fn apply(&mut self, input: Input) {
        let effects = self.machine.handle(input);
        self.execute(effects).await;
        self.snapshots.send_replace(self.machine.snapshot());
    }

    async fn execute(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::FetchManifest { version, url } => self.spawn_manifest_fetch(version, url),
                Effect::FetchRegions { version, stream_path } => self.spawn_region_fetch(version, stream_path),
                Effect::LoadLayout {
                    version,
                    layout,
                    url,
                    start_offset,
                } => {
                    let engine = self.engine.clone();
                    self.spawn_scoped(async move {
                        info!("Loading layout '{}' from {}", layout, url);
                        let result = engine.load(&url, start_offset).await;
                        Some(Input::LayoutLoaded { version, layout, result })
                    });
                }
                Effect::DispatchSwitch {
                    version,
                    switch_id,
                    layout,
                } => {
                    let engine = self.engine.clone();
                    self.spawn_scoped(async move {
                        let captured_position = engine.status().await.position;
                        let result = dispatch_switch(engine.as_ref(), &layout).await;
                        Some(Input::SwitchDispatched {
                            version,
                            switch_id,
                            captured_position,
                            result,
                        })
                    });
                }
                Effect::Reload {
                    version,
                    url,
                    start_offset,
                } => {
                    let engine = self.engine.clone();
                    let retries = self.machine.config().cache_bust_retries;
                    let param = self.machine.config().cache_bust_param.clone();
                    self.spawn_scoped(async move {
                        let result = reload(engine.as_ref(), &url, start_offset, retries, &param).await;
                        Some(Input::ReloadCompleted { version, result })
                    });
                }
                Effect::Seek { position } => {
                    if let Err(e) = self.engine.seek(position).await {
                        warn!("Seek to {:.3}s failed: {}", position, e);
                    }
                }
                Effect::SampleStatus { version } => {
                    let status = self.engine.status().await;
                    self.send(Command::Input(Input::PlaybackSample { version, status }));
                }
                Effect::SetAbrEnabled(enabled) => self.engine.set_abr_enabled(enabled).await,
                Effect::Unload => self.engine.unload().await,
                Effect::StartTimer {
                    kind,
                    after,
                    repeat,
                    tag,
                } => self.start_timer(kind, after, repeat, tag),
                Effect::CancelTimer(kind) => self.cancel_timer(kind),
                Effect::Emit(event) => (self.callback)(event),
            }
        }
    }

    fn spawn_manifest_fetch(&self, version: u64, url: String) {
        let manifests = self.manifests.clone();
        let suffix = self.machine.config().master_suffix.clone();
        self.spawn_scoped(async move {
            let result = manifests
                .fetch(&url)
                .await
                .map(|text| parse_layouts(&text, &base_url_of(&url), &suffix));
            Some(Input::ManifestResolved { version, result })
        });
    }

    fn spawn_region_fetch(&self, version: u64, stream_path: String) {
        let Some(regions) = self.regions.clone() else {
            debug!("No region service configured, click-to-switch disabled");
            return;
        };
        self.spawn_scoped(async move {
            let result = regions.fetch(&stream_path).await;
            Some(Input::RegionsResolved { version, result })
        });
    }

    /// Runs `work` until it finishes or the session shuts down, then feeds its result back.
    fn spawn_scoped<F>(&self, work: F)
    where
        F: std::future::Future<Output = Option<Input>> + Send + 'static,
    {
        let token = self.shutdown.child_token();
        let commands = self.commands_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                input = work => {
                    if let Some(input) = input {
                        let _ = commands.send(Command::Input(input));
                    }
                }
            }
        });
    }

    fn start_timer(&mut self, kind: TimerKind, after: Duration, repeat: bool, tag: u64) {
        self.cancel_timer(kind);
        self.timer_generation += 1;
        let generation = self.timer_generation;
        let token = self.shutdown.child_token();
        let commands = self.commands_tx.clone();
        let cancelled = token.clone();

        tokio::spawn(async move {
            if repeat {
                let mut ticks = interval_at(Instant::now() + after, after);
                ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = cancelled.cancelled() => break,
                        _ = ticks.tick() => {
                            if commands.send(Command::TimerFired { kind, generation, tag }).is_err() {
                                break;
                            }
                        }
                    }
                }
            } else {
                tokio::select! {
                    _ = cancelled.cancelled() => {}
                    _ = sleep(after) => {
                        let _ = commands.send(Command::TimerFired { kind, generation, tag });
                    }
                }
            }
        });

        self.timers.insert(kind, ScopedTimer {
            generation,
            token,
            repeat,
        });
    }

    fn cancel_timer(&mut self, kind: TimerKind) {
        if let Some(timer) = self.timers.remove(&kind) {
            timer.token.cancel();
        }
    }

    fn send(&self, command: Command) {
        if self.commands_tx.send(command).is_err() {
            warn!("Session channel closed");
        }
    }
}

/// Selects the best variant of `layout` when the engine already has it loaded, otherwise
/// reloads the engine with the layout's master URL.
async fn dispatch_switch(engine: &dyn PlaybackEngine, layout: &Layout) -> Result<SwitchMethod, EngineError> {
    let tracks = engine.variant_tracks().await;
    let candidate = tracks
        .iter()
        .filter(|track| layout.owns_uri(&track.uri))
        .max_by_key(|track| track.bandwidth);

    match candidate {
        Some(track) => {
            info!(
                "Selecting variant {} ({} bps) of layout '{}'",
                track.id, track.bandwidth, layout.name
            );
            engine.select_variant(track.id).await?;
            Ok(SwitchMethod::VariantSelected)
        }
        None => {
            info!("Reloading engine with {} for layout '{}'", layout.master_url, layout.name);
            engine.load(&layout.master_url, 0.0).await?;
            Ok(SwitchMethod::Reloaded)
        }
    }
}

/// Cache-busted attempts first, then the plain URL as the last resort.
async fn reload(
    engine: &dyn PlaybackEngine,
    url: &str,
    start_offset: f64,
    cache_bust_retries: u32,
    param: &str,
) -> Result<(), EngineError> {
    for attempt in 1..=cache_bust_retries {
        let busted = cache_busted(url, param);
        match engine.load(&busted, start_offset).await {
            Ok(()) => return Ok(()),
            Err(e) => warn!("Cache-busted reload {} of {} failed: {}", attempt, url, e),
        }
    }
    engine.load(url, start_offset).await
}

/// Cloneable front end of a running `PlaybackSessionController`.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<SessionSnapshot>,
    shutdown: CancellationToken,
}

impl SessionHandle {
    pub fn load<U: Into<String>>(&self, url: U) {
        self.input(Input::Load { url: url.into() });
    }

    pub fn select_layout<N: Into<String>>(&self, name: N) {
        self.input(Input::SelectLayout { name: name.into() });
    }

    pub fn pointer(&self, event: PointerEvent) {
        self.input(Input::Pointer(event));
    }

    pub fn set_abr_enabled(&self, enabled: bool) {
        self.input(Input::SetAbrEnabled(enabled));
    }

    /// Forwards a notification from the playback engine.
    pub fn engine_notification(&self, notification: EngineNotification) {
        self.input(Input::Engine(notification));
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    fn input(&self, input: Input) {
        if self.commands.send(Command::Input(input)).is_err() {
            warn!("Playback session is no longer running");
        }
    }
}
