use layout_player::{EventCallback, PlayerEvent};
use metrics::Metrics;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Updates the playback gauges for one session event.
pub fn record(metrics: &Metrics, event: &PlayerEvent) {
    match event {
        PlayerEvent::LayoutsResolved { version, layouts } => {
            metrics.set("manifest_version", *version as i64);
            metrics.set("layouts_resolved", layouts.len() as i64);
        }
        PlayerEvent::SwitchCompleted { .. } => metrics.inc("layout_switches"),
        PlayerEvent::Stalled { .. } => metrics.inc("stall_recoveries"),
        PlayerEvent::ReloadRequested { .. } => metrics.inc("stall_escalations"),
        PlayerEvent::Error(_) => metrics.inc("session_errors"),
        _ => {}
    }
}

/// Logs every session event and mirrors it into `metrics`, if any.
pub fn event_callback(metrics: Option<Metrics>) -> EventCallback {
    Arc::new(move |event: PlayerEvent| {
        match &event {
            PlayerEvent::StateChanged { from, to } => info!("Session {} -> {}", from, to),
            PlayerEvent::LayoutsResolved { layouts, .. } => info!("Layouts: {}", layouts.join(", ")),
            PlayerEvent::LayoutActivated { layout } => info!("Playing layout '{}'", layout),
            PlayerEvent::SwitchStarted { from, to } => {
                info!("Switching {} -> {}", from.as_deref().unwrap_or("-"), to)
            }
            PlayerEvent::SwitchCompleted { layout, confirmed } => {
                info!("Now showing '{}' (confirmed: {})", layout, confirmed)
            }
            PlayerEvent::Stalled { position, recovery_target } => {
                warn!("Stalled at {:.2}s, recovering at {:.2}s", position, recovery_target)
            }
            PlayerEvent::ReloadRequested { layout } => warn!("Reloading '{}'", layout),
            PlayerEvent::Warning(e) => warn!("{}", e),
            PlayerEvent::Error(e) => error!("{}", e),
            other => info!("{:?}", other),
        }
        if let Some(metrics) = &metrics {
            record(metrics, &event);
        }
    })
}
