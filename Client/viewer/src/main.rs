use layout_player::auth::TokenProvider;
use layout_player::engine::{EngineNotification, PlaybackEngine};
use layout_player::fetch::HttpManifestSource;
use layout_player::regions::client::{HttpRegionSource, RegionSource};
use layout_player::session::{SessionHandle, SessionState};
use layout_player::PlaybackSessionController;
use layout_viewer::args::{get_log_level_filter, parse_args, Args};
use layout_viewer::bridge::event_callback;
use layout_viewer::commands::Command;
use layout_viewer::config::load_session_config;
use layout_viewer::engine::HeadlessEngine;
use metrics::{start_server, MetricsBuilder};
use reqwest::Client;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, Layer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_args();

    // Build the FmtSubscriber layer
    let fmt_layer = tracing_subscriber::fmt::layer()
        .pretty()
        .compact()
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_filter(get_log_level_filter(&args));

    // Initialize console tracing if enabled
    #[cfg(feature = "console-tracing")]
    let subscriber = {
        let console_layer = console_subscriber::ConsoleLayer::builder()
            .retention(std::time::Duration::from_secs(60))
            .server_addr(([127, 0, 0, 1], 5555))
            .spawn();
        tracing_subscriber::registry().with(console_layer).with(fmt_layer)
    };

    #[cfg(not(feature = "console-tracing"))]
    let subscriber = tracing_subscriber::registry().with(fmt_layer);

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting layout viewer (headless)");
    info!("{:?}", args);

    let config = load_session_config(args.config.as_deref())?;

    let metrics = MetricsBuilder::new()
        .add_label("mode", "viewer")
        .with_playback_gauges()
        .build()?;
    metrics.install();
    let port = args.port;
    tokio::spawn(async move {
        if let Err(e) = start_server(port).await {
            error!("Metrics server stopped: {}", e);
        }
    });

    let client = Client::new();
    let engine = Arc::new(HeadlessEngine::new(client.clone()));
    let (controller, handle) = PlaybackSessionController::new(
        config,
        engine.clone() as Arc<dyn PlaybackEngine>,
        Arc::new(HttpManifestSource::new(client.clone())),
        region_source(&args, &client),
        event_callback(Some(metrics)),
    );
    let session = tokio::spawn(controller.run());

    let notifications = handle.clone();
    engine.set_notifier(Arc::new(move |n: EngineNotification| notifications.engine_notification(n)));
    handle.engine_notification(EngineNotification::Ready);
    handle.load(args.manifest_url.clone());

    if let Some(layout) = args.layout.clone() {
        let initial = handle.clone();
        tokio::spawn(async move {
            let mut snapshots = initial.subscribe();
            if snapshots
                .wait_for(|s| s.state == SessionState::LayoutsResolved)
                .await
                .is_ok()
            {
                initial.select_layout(layout);
            }
        });
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        _ = read_commands(&handle) => {}
    }

    handle.shutdown();
    session.await?;
    info!("Layout viewer stopped");
    Ok(())
}

fn region_source(args: &Args, client: &Client) -> Option<Arc<dyn RegionSource>> {
    let service = args.region_service_url.clone()?;
    let tokens = match &args.token {
        Some(token) => TokenProvider::manual(client.clone(), token.clone()),
        None => TokenProvider::new(client.clone(), args.token_url.clone(), args.api_key.clone()),
    };
    Some(Arc::new(HttpRegionSource::new(client.clone(), service, Arc::new(tokens))))
}

/// Feeds standard input lines to the session until `quit`.
async fn read_commands(handle: &SessionHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            result => {
                if let Err(e) = result {
                    warn!("Failed to read commands: {}", e);
                }
                // Without a usable stdin keep playing until interrupted.
                std::future::pending::<()>().await;
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<Command>() {
            Ok(Command::Select(name)) => handle.select_layout(name),
            Ok(Command::Click(pointer)) => handle.pointer(pointer),
            Ok(Command::Abr(enabled)) => handle.set_abr_enabled(enabled),
            Ok(Command::Load(url)) => handle.load(url),
            Ok(Command::Status) => info!("{:?}", handle.snapshot()),
            Ok(Command::Quit) => return,
            Err(e) => warn!("{}", e),
        }
    }
}
