use layout_player::engine::{EngineError, EngineNotification, PlaybackStatus};
use layout_player::error::PlayerError;
use layout_player::manifest::parser::parse_layouts;
use layout_player::manifest::Layout;
use layout_player::regions::mapper::PointerEvent;
use layout_player::regions::{LayoutRegionSet, Region};
use layout_player::session::state::{Effect, Input, SessionMachine, SessionState, SwitchMethod, TimerKind};
use layout_player::{PlayerEvent, SessionConfig};

const URL: &str = "https://cdn.example.com/live/event/master.m3u8";
const BASE: &str = "https://cdn.example.com/live/event/";

const MANIFEST: &str = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=1280x720,NAME=\"studio\"
studio/720p.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2000000,RESOLUTION=1920x1080,NAME=\"studio\"
studio/1080p.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2000000,RESOLUTION=1920x1080,NAME=\"wide\"
wide/1080p.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2000000,RESOLUTION=1920x1080,NAME=\"zoom\"
zoom/1080p.m3u8
";

fn layouts() -> Vec<Layout> {
    parse_layouts(MANIFEST, BASE, "/master.m3u8")
}

fn ready_machine() -> SessionMachine {
    let mut machine = SessionMachine::new(SessionConfig::default());
    machine.handle(Input::Engine(EngineNotification::Ready));
    machine
}

fn resolved_machine() -> SessionMachine {
    let mut machine = ready_machine();
    machine.handle(Input::Load { url: URL.into() });
    machine.handle(Input::ManifestResolved {
        version: 1,
        result: Ok(layouts()),
    });
    machine.handle(Input::LayoutLoaded {
        version: 1,
        layout: "studio".into(),
        result: Ok(()),
    });
    machine
}

fn events(effects: &[Effect]) -> Vec<&PlayerEvent> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::Emit(event) => Some(event),
            _ => None,
        })
        .collect()
}

fn dispatches(effects: &[Effect]) -> usize {
    effects
        .iter()
        .filter(|e| matches!(e, Effect::DispatchSwitch { .. }))
        .count()
}

fn frozen(position: f64) -> PlaybackStatus {
    PlaybackStatus {
        position,
        ..PlaybackStatus::default()
    }
}

fn engine_error() -> EngineError {
    EngineError::new(1002, "network", "bad http status")
}

#[test]
fn load_before_the_engine_is_ready_is_ignored() {
    let mut machine = SessionMachine::new(SessionConfig::default());
    assert!(machine.handle(Input::Load { url: URL.into() }).is_empty());
    assert_eq!(machine.state(), SessionState::Uninitialized);
    assert_eq!(machine.session().manifest_version, 0);
}

#[test]
fn load_fetches_manifest_and_regions() {
    let mut machine = ready_machine();
    let effects = machine.handle(Input::Load { url: URL.into() });

    assert_eq!(machine.state(), SessionState::ManifestLoading);
    assert!(effects.contains(&Effect::FetchManifest {
        version: 1,
        url: URL.into()
    }));
    assert!(effects.contains(&Effect::FetchRegions {
        version: 1,
        stream_path: "/live/event/".into()
    }));
}

#[test]
fn resolved_manifest_loads_the_first_layout() {
    let mut machine = ready_machine();
    machine.handle(Input::Load { url: URL.into() });
    let effects = machine.handle(Input::ManifestResolved {
        version: 1,
        result: Ok(layouts()),
    });

    assert_eq!(machine.state(), SessionState::LayoutsResolved);
    assert_eq!(machine.session().active_layout.as_deref(), Some("studio"));
    assert!(effects.contains(&Effect::LoadLayout {
        version: 1,
        layout: "studio".into(),
        url: "https://cdn.example.com/live/event/studio/master.m3u8".into(),
        start_offset: 0.0,
    }));
    assert!(events(&effects).contains(&&PlayerEvent::LayoutsResolved {
        version: 1,
        layouts: vec!["studio".into(), "wide".into(), "zoom".into()],
    }));

    let effects = machine.handle(Input::LayoutLoaded {
        version: 1,
        layout: "studio".into(),
        result: Ok(()),
    });
    assert!(effects.iter().any(|e| matches!(
        e,
        Effect::StartTimer {
            kind: TimerKind::StallSample,
            repeat: true,
            ..
        }
    )));
}

#[test]
fn manifest_without_layouts_fails_the_session() {
    let mut machine = ready_machine();
    machine.handle(Input::Load { url: URL.into() });
    let effects = machine.handle(Input::ManifestResolved {
        version: 1,
        result: Ok(parse_layouts("#EXTM3U\n#EXT-X-VERSION:3\n", BASE, "/master.m3u8")),
    });

    assert_eq!(machine.state(), SessionState::Error);
    assert!(events(&effects).contains(&&PlayerEvent::Error(PlayerError::ManifestParseEmpty)));
    assert_eq!(PlayerError::ManifestParseEmpty.to_string(), "no layouts found");
}

#[test]
fn manifest_fetch_failure_fails_the_session() {
    let mut machine = ready_machine();
    machine.handle(Input::Load { url: URL.into() });
    let error = PlayerError::manifest_fetch(URL, "404 Not Found");
    let effects = machine.handle(Input::ManifestResolved {
        version: 1,
        result: Err(error.clone()),
    });

    assert_eq!(machine.state(), SessionState::Error);
    assert!(events(&effects).contains(&&PlayerEvent::Error(error)));
}

#[test]
fn results_of_a_superseded_load_are_discarded() {
    let mut machine = ready_machine();
    machine.handle(Input::Load { url: URL.into() });
    machine.handle(Input::Load {
        url: "https://cdn.example.com/live/other/master.m3u8".into(),
    });
    assert_eq!(machine.session().manifest_version, 2);

    let effects = machine.handle(Input::ManifestResolved {
        version: 1,
        result: Ok(layouts()),
    });
    assert!(effects.is_empty());
    assert!(machine.registry().is_empty());
    assert_eq!(machine.state(), SessionState::ManifestLoading);

    machine.handle(Input::ManifestResolved {
        version: 2,
        result: Ok(layouts()),
    });
    assert_eq!(machine.state(), SessionState::LayoutsResolved);
}

#[test]
fn rapid_selections_dispatch_exactly_once() {
    let mut machine = resolved_machine();

    let first = machine.handle(Input::SelectLayout { name: "wide".into() });
    let second = machine.handle(Input::SelectLayout { name: "zoom".into() });

    assert_eq!(dispatches(&first), 1);
    assert_eq!(dispatches(&second), 0);
    assert!(first.contains(&Effect::SetAbrEnabled(false)));
    assert!(first.contains(&Effect::CancelTimer(TimerKind::StallSample)));
    assert_eq!(machine.state(), SessionState::SwitchingLayout);
    assert_eq!(machine.session().active_layout.as_deref(), Some("wide"));
    assert!(machine.session().switching);
}

#[test]
fn selecting_the_active_or_an_unknown_layout_does_nothing() {
    let mut machine = resolved_machine();
    assert!(machine.handle(Input::SelectLayout { name: "studio".into() }).is_empty());
    assert!(machine.handle(Input::SelectLayout { name: "backstage".into() }).is_empty());
    assert_eq!(machine.state(), SessionState::LayoutsResolved);
}

#[test]
fn unconfirmed_switch_leaves_switching_on_timeout() {
    let mut machine = resolved_machine();
    let effects = machine.handle(Input::SelectLayout { name: "wide".into() });
    let tag = effects
        .iter()
        .find_map(|e| match e {
            Effect::StartTimer {
                kind: TimerKind::SwitchTimeout,
                tag,
                ..
            } => Some(*tag),
            _ => None,
        })
        .unwrap();

    let effects = machine.handle(Input::TimerFired {
        kind: TimerKind::SwitchTimeout,
        tag,
    });

    assert_eq!(machine.state(), SessionState::LayoutsResolved);
    assert!(!machine.session().switching);
    assert!(effects.contains(&Effect::SetAbrEnabled(true)));
    assert!(events(&effects).contains(&&PlayerEvent::Warning(PlayerError::SwitchTimeout {
        layout: "wide".into(),
        timeout_ms: 5000,
    })));
    assert!(events(&effects).contains(&&PlayerEvent::SwitchCompleted {
        layout: "wide".into(),
        confirmed: false,
    }));
}

#[test]
fn timeout_of_an_earlier_switch_is_ignored() {
    let mut machine = resolved_machine();
    machine.handle(Input::SelectLayout { name: "wide".into() });
    machine.handle(Input::SwitchDispatched {
        version: 1,
        switch_id: 1,
        captured_position: 4.0,
        result: Ok(SwitchMethod::VariantSelected),
    });
    machine.handle(Input::Engine(EngineNotification::VariantChanged));
    machine.handle(Input::SelectLayout { name: "zoom".into() });

    let effects = machine.handle(Input::TimerFired {
        kind: TimerKind::SwitchTimeout,
        tag: 1,
    });
    assert!(effects.is_empty());
    assert_eq!(machine.state(), SessionState::SwitchingLayout);
}

#[test]
fn selection_waits_for_the_initial_load() {
    let mut machine = ready_machine();
    machine.handle(Input::Load { url: URL.into() });
    machine.handle(Input::ManifestResolved {
        version: 1,
        result: Ok(layouts()),
    });
    assert!(machine.engine_busy());
    assert!(machine.handle(Input::SelectLayout { name: "wide".into() }).is_empty());
    assert_eq!(machine.session().active_layout.as_deref(), Some("studio"));

    machine.handle(Input::LayoutLoaded {
        version: 1,
        layout: "studio".into(),
        result: Ok(()),
    });
    let effects = machine.handle(Input::SelectLayout { name: "wide".into() });
    assert_eq!(dispatches(&effects), 1);
}

#[test]
fn selection_waits_for_a_dispatch_that_outlived_its_timeout() {
    let mut machine = resolved_machine();
    machine.handle(Input::SelectLayout { name: "wide".into() });
    machine.handle(Input::TimerFired {
        kind: TimerKind::SwitchTimeout,
        tag: 1,
    });
    assert_eq!(machine.state(), SessionState::LayoutsResolved);
    assert!(machine.handle(Input::SelectLayout { name: "zoom".into() }).is_empty());

    machine.handle(Input::SwitchDispatched {
        version: 1,
        switch_id: 1,
        captured_position: 0.0,
        result: Ok(SwitchMethod::Reloaded),
    });
    assert!(!machine.engine_busy());
    let effects = machine.handle(Input::SelectLayout { name: "zoom".into() });
    assert_eq!(dispatches(&effects), 1);
}

#[test]
fn selection_during_a_stall_reload_is_ignored() {
    let mut machine = resolved_machine();
    for _ in 0..12 {
        machine.handle(Input::PlaybackSample {
            version: 1,
            status: frozen(10.0),
        });
    }
    assert!(machine.engine_busy());
    assert!(machine.handle(Input::SelectLayout { name: "wide".into() }).is_empty());
    assert_eq!(machine.session().active_layout.as_deref(), Some("studio"));

    machine.handle(Input::ReloadCompleted {
        version: 1,
        result: Ok(()),
    });
    let effects = machine.handle(Input::SelectLayout { name: "wide".into() });
    assert_eq!(dispatches(&effects), 1);
}

#[test]
fn variant_change_confirms_the_switch() {
    let mut machine = resolved_machine();
    machine.handle(Input::SelectLayout { name: "wide".into() });
    let effects = machine.handle(Input::Engine(EngineNotification::VariantChanged));

    assert_eq!(machine.state(), SessionState::LayoutsResolved);
    assert!(effects.contains(&Effect::CancelTimer(TimerKind::SwitchTimeout)));
    assert!(events(&effects).contains(&&PlayerEvent::SwitchCompleted {
        layout: "wide".into(),
        confirmed: true,
    }));
}

#[test]
fn failed_switch_keeps_layouts_and_allows_retry() {
    let mut machine = resolved_machine();
    machine.handle(Input::SelectLayout { name: "wide".into() });
    let effects = machine.handle(Input::SwitchDispatched {
        version: 1,
        switch_id: 1,
        captured_position: 12.0,
        result: Err(engine_error()),
    });

    assert_eq!(machine.state(), SessionState::Error);
    assert_eq!(machine.session().active_layout.as_deref(), Some("studio"));
    assert_eq!(machine.registry().len(), 3);
    assert!(effects.contains(&Effect::SetAbrEnabled(true)));
    assert!(events(&effects).contains(&&PlayerEvent::Error(engine_error().into())));

    let retry = machine.handle(Input::SelectLayout { name: "wide".into() });
    assert!(retry.iter().any(|e| matches!(e, Effect::DispatchSwitch { switch_id: 2, .. })));
    assert_eq!(machine.state(), SessionState::SwitchingLayout);
}

#[test]
fn reload_switch_restores_the_captured_position() {
    let mut machine = resolved_machine();
    machine.handle(Input::SelectLayout { name: "wide".into() });
    let effects = machine.handle(Input::SwitchDispatched {
        version: 1,
        switch_id: 1,
        captured_position: 12.0,
        result: Ok(SwitchMethod::Reloaded),
    });
    assert_eq!(effects, vec![Effect::Seek { position: 12.0 }]);
    assert_eq!(machine.session().last_position, 12.0);
}

#[test]
fn positions_near_the_start_and_in_place_switches_are_not_restored() {
    let mut machine = resolved_machine();
    machine.handle(Input::SelectLayout { name: "wide".into() });
    let effects = machine.handle(Input::SwitchDispatched {
        version: 1,
        switch_id: 1,
        captured_position: 0.3,
        result: Ok(SwitchMethod::Reloaded),
    });
    assert!(effects.is_empty());

    machine.handle(Input::Engine(EngineNotification::VariantChanged));
    machine.handle(Input::SelectLayout { name: "zoom".into() });
    let effects = machine.handle(Input::SwitchDispatched {
        version: 1,
        switch_id: 2,
        captured_position: 30.0,
        result: Ok(SwitchMethod::VariantSelected),
    });
    assert!(effects.is_empty());
}

#[test]
fn fatal_engine_error_stops_timers_and_a_new_load_recovers() {
    let mut machine = resolved_machine();
    let effects = machine.handle(Input::Engine(EngineNotification::Error {
        error: engine_error(),
        fatal: true,
    }));
    assert_eq!(machine.state(), SessionState::Error);
    assert!(effects.contains(&Effect::CancelTimer(TimerKind::StallSample)));

    machine.handle(Input::Load { url: URL.into() });
    machine.handle(Input::ManifestResolved {
        version: 2,
        result: Ok(layouts()),
    });
    assert_eq!(machine.state(), SessionState::LayoutsResolved);
    assert_eq!(machine.session().manifest_version, 2);
}

#[test]
fn recoverable_engine_error_is_only_a_warning() {
    let mut machine = resolved_machine();
    let effects = machine.handle(Input::Engine(EngineNotification::Error {
        error: engine_error(),
        fatal: false,
    }));
    assert_eq!(machine.state(), SessionState::LayoutsResolved);
    assert_eq!(events(&effects), vec![&PlayerEvent::Warning(engine_error().into())]);
}

#[test]
fn user_abr_setting_wins_after_a_switch() {
    let mut machine = resolved_machine();
    machine.handle(Input::SelectLayout { name: "wide".into() });
    assert!(machine.handle(Input::SetAbrEnabled(false)).is_empty());

    let effects = machine.handle(Input::Engine(EngineNotification::VariantChanged));
    assert!(effects.contains(&Effect::SetAbrEnabled(false)));
    assert!(!machine.session().abr_enabled);

    assert_eq!(
        machine.handle(Input::SetAbrEnabled(true)),
        vec![Effect::SetAbrEnabled(true)]
    );
}

#[test]
fn frozen_playhead_is_nudged_then_cooled_down() {
    let mut machine = resolved_machine();
    assert_eq!(
        machine.handle(Input::TimerFired {
            kind: TimerKind::StallSample,
            tag: 0,
        }),
        vec![Effect::SampleStatus { version: 1 }]
    );

    let mut effects = Vec::new();
    for _ in 0..4 {
        effects = machine.handle(Input::PlaybackSample {
            version: 1,
            status: frozen(10.0),
        });
    }
    assert!(effects.contains(&Effect::Seek { position: 10.5 }));
    assert!(events(&effects).contains(&&PlayerEvent::Stalled {
        position: 10.0,
        recovery_target: 10.5,
    }));
    assert!(machine.snapshot().stalled);

    let effects = machine.handle(Input::TimerFired {
        kind: TimerKind::StallCooldown,
        tag: 0,
    });
    assert_eq!(events(&effects), vec![&PlayerEvent::StallCleared]);
    assert!(!machine.snapshot().stalled);
}

#[test]
fn repeated_stalls_escalate_to_a_reload() {
    let mut machine = resolved_machine();
    let mut reloads = Vec::new();
    for _ in 0..12 {
        let effects = machine.handle(Input::PlaybackSample {
            version: 1,
            status: frozen(10.0),
        });
        reloads.extend(effects.into_iter().filter(|e| matches!(e, Effect::Reload { .. })));
    }
    assert_eq!(
        reloads,
        vec![Effect::Reload {
            version: 1,
            url: "https://cdn.example.com/live/event/studio/master.m3u8".into(),
            start_offset: 10.0,
        }]
    );

    // No sampling while the reload is outstanding.
    assert!(machine
        .handle(Input::TimerFired {
            kind: TimerKind::StallSample,
            tag: 0,
        })
        .is_empty());

    let effects = machine.handle(Input::ReloadCompleted {
        version: 1,
        result: Ok(()),
    });
    assert!(events(&effects).contains(&&PlayerEvent::ReloadCompleted {
        layout: "studio".into()
    }));
    assert!(effects.iter().any(|e| matches!(
        e,
        Effect::StartTimer {
            kind: TimerKind::StallSample,
            ..
        }
    )));
}

#[test]
fn samples_are_ignored_while_switching() {
    let mut machine = resolved_machine();
    machine.handle(Input::SelectLayout { name: "wide".into() });
    for _ in 0..10 {
        assert!(machine
            .handle(Input::PlaybackSample {
                version: 1,
                status: frozen(3.0),
            })
            .is_empty());
    }
}

#[test]
fn pointer_on_a_linked_region_switches_layout() {
    let mut machine = resolved_machine();
    let effects = machine.handle(Input::RegionsResolved {
        version: 1,
        result: Ok(vec![LayoutRegionSet {
            layout_name: "Studio".into(),
            canvas_width: 1920.0,
            canvas_height: 1080.0,
            regions: vec![Region {
                x: 0.0,
                y: 0.0,
                width: 960.0,
                height: 1080.0,
                source_type: "camera".into(),
                source_idx: 0,
                parent_layout_name: Some("wide".into()),
            }],
        }]),
    });
    assert!(events(&effects).contains(&&PlayerEvent::RegionsResolved {
        version: 1,
        region_sets: 1,
    }));

    let effects = machine.handle(Input::Pointer(PointerEvent {
        x: 100.0,
        y: 100.0,
        surface_width: 1920.0,
        surface_height: 1080.0,
    }));
    assert!(effects.iter().any(|e| matches!(
        e,
        Effect::DispatchSwitch { layout, .. } if layout.name == "wide"
    )));
}

#[test]
fn region_failure_only_warns() {
    let mut machine = resolved_machine();
    let error = PlayerError::RegionConfigFetch("503".into());
    let effects = machine.handle(Input::RegionsResolved {
        version: 1,
        result: Err(error.clone()),
    });
    assert_eq!(machine.state(), SessionState::LayoutsResolved);
    assert_eq!(events(&effects), vec![&PlayerEvent::Warning(error)]);
}

#[test]
fn any_region_source_failure_is_reported_as_a_region_warning() {
    let mut machine = resolved_machine();
    let effects = machine.handle(Input::RegionsResolved {
        version: 1,
        result: Err(PlayerError::manifest_fetch("https://regions.example.com", "502 Bad Gateway")),
    });
    assert_eq!(machine.state(), SessionState::LayoutsResolved);
    assert!(matches!(
        events(&effects).as_slice(),
        [PlayerEvent::Warning(PlayerError::RegionConfigFetch(_))]
    ));
}

#[test]
fn new_load_during_a_switch_starts_over() {
    let mut machine = resolved_machine();
    machine.handle(Input::SelectLayout { name: "wide".into() });
    let effects = machine.handle(Input::Load { url: URL.into() });

    assert_eq!(machine.state(), SessionState::ManifestLoading);
    assert_eq!(machine.session().manifest_version, 2);
    assert!(!machine.session().switching);
    assert!(machine.session().active_layout.is_none());
    assert!(machine.registry().is_empty());
    assert!(effects.contains(&Effect::SetAbrEnabled(true)));
    assert!(effects.contains(&Effect::CancelTimer(TimerKind::SwitchTimeout)));

    // The in-flight switch result belongs to the old version.
    assert!(machine
        .handle(Input::SwitchDispatched {
            version: 1,
            switch_id: 1,
            captured_position: 5.0,
            result: Ok(SwitchMethod::Reloaded),
        })
        .is_empty());
}

#[test]
fn teardown_cancels_timers_and_unloads() {
    let mut machine = resolved_machine();
    let effects = machine.teardown();
    for kind in TimerKind::ALL {
        assert!(effects.contains(&Effect::CancelTimer(kind)));
    }
    assert_eq!(effects.last(), Some(&Effect::Unload));
}
