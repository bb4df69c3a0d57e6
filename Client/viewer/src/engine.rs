//! A playback engine without a decoder.
//! It fetches the playlists it is asked to load, exposes their variants as tracks and keeps a
//! wall-clock playhead, which is enough to drive layout switching and stall recovery from a
//! terminal.

use async_trait::async_trait;
use layout_player::engine::{EngineError, EngineNotification, PlaybackEngine, PlaybackStatus, VariantTrack};
use layout_player::manifest::parser::parse_attribute_list;
use layout_player::manifest::Resolution;
use reqwest::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

pub type NotificationSink = Arc<dyn Fn(EngineNotification) + Send + Sync>;

/// What a media playlist says about the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Timeline {
    pub live: bool,
    /// Sum of the segment durations.
    pub duration: f64,
}

#[derive(Debug, Default)]
struct Playhead {
    base: f64,
    since: Option<Instant>,
    loaded_at: Option<Instant>,
    timeline: Timeline,
}

impl Playhead {
    fn position(&self) -> f64 {
        let played = self.since.map(|t| t.elapsed().as_secs_f64()).unwrap_or(0.0);
        let position = self.base + played;
        if self.timeline.live || self.timeline.duration <= 0.0 {
            position
        } else {
            position.min(self.timeline.duration)
        }
    }

    /// For live content: the window seen at load time, growing in real time.
    fn live_edge(&self) -> f64 {
        let since_load = self.loaded_at.map(|t| t.elapsed().as_secs_f64()).unwrap_or(0.0);
        self.timeline.duration + since_load
    }

    fn restart(&mut self, base: f64) {
        self.base = base;
        self.since = Some(Instant::now());
    }
}

pub struct HeadlessEngine {
    client: Client,
    notifier: RwLock<Option<NotificationSink>>,
    tracks: Mutex<Vec<VariantTrack>>,
    playhead: Mutex<Playhead>,
    abr_enabled: AtomicBool,
}

impl HeadlessEngine {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            notifier: RwLock::new(None),
            tracks: Mutex::new(Vec::new()),
            playhead: Mutex::new(Playhead::default()),
            abr_enabled: AtomicBool::new(true),
        }
    }

    pub fn set_notifier(&self, sink: NotificationSink) {
        if let Ok(mut notifier) = self.notifier.write() {
            *notifier = Some(sink);
        }
    }

    pub fn abr_enabled(&self) -> bool {
        self.abr_enabled.load(Ordering::Relaxed)
    }

    fn notify(&self, notification: EngineNotification) {
        let sink = self.notifier.read().ok().and_then(|n| n.clone());
        if let Some(sink) = sink {
            sink(notification);
        }
    }

    async fn fetch(&self, url: &str) -> Result<String, EngineError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| EngineError::new(1002, "network", e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::new(
                1001,
                "network",
                format!("{} answered {}", url, status),
            ));
        }
        response
            .text()
            .await
            .map_err(|e| EngineError::new(1002, "network", e.to_string()))
    }
}

#[async_trait]
impl PlaybackEngine for HeadlessEngine {
    async fn load(&self, url: &str, start_offset: f64) -> Result<(), EngineError> {
        let text = self.fetch(url).await?;
        if !text.trim_start().starts_with("#EXTM3U") {
            return Err(EngineError::new(4000, "manifest", format!("{} is not an HLS playlist", url)));
        }

        let mut tracks = variant_tracks(&text, url);
        let timeline = if tracks.is_empty() {
            // Already a media playlist.
            tracks.push(VariantTrack {
                id: 0,
                bandwidth: 0,
                width: 0,
                height: 0,
                uri: url.to_string(),
                active: true,
            });
            timeline_of(&text)
        } else {
            let best = tracks
                .iter_mut()
                .max_by_key(|t| t.bandwidth)
                .map(|t| {
                    t.active = true;
                    t.uri.clone()
                })
                .unwrap_or_default();
            match self.fetch(&best).await {
                Ok(media) => timeline_of(&media),
                Err(e) => {
                    warn!("Could not probe {}: {}", best, e);
                    Timeline::default()
                }
            }
        };

        info!(
            "Loaded {} ({} tracks, live: {}, duration: {:.1}s)",
            url,
            tracks.len(),
            timeline.live,
            timeline.duration
        );
        if let Ok(mut current) = self.tracks.lock() {
            *current = tracks;
        }
        if let Ok(mut playhead) = self.playhead.lock() {
            playhead.timeline = timeline;
            playhead.loaded_at = Some(Instant::now());
            playhead.restart(start_offset);
        }
        self.notify(EngineNotification::VariantChanged);
        Ok(())
    }

    async fn unload(&self) {
        debug!("Unloading");
        if let Ok(mut tracks) = self.tracks.lock() {
            tracks.clear();
        }
        if let Ok(mut playhead) = self.playhead.lock() {
            *playhead = Playhead::default();
        }
    }

    async fn variant_tracks(&self) -> Vec<VariantTrack> {
        self.tracks.lock().map(|t| t.clone()).unwrap_or_default()
    }

    async fn select_variant(&self, track_id: u64) -> Result<(), EngineError> {
        {
            let mut tracks = self
                .tracks
                .lock()
                .map_err(|_| EngineError::new(7000, "player", "track list poisoned"))?;
            if !tracks.iter().any(|t| t.id == track_id) {
                return Err(EngineError::new(
                    2000,
                    "track",
                    format!("no variant track {}", track_id),
                ));
            }
            for track in tracks.iter_mut() {
                track.active = track.id == track_id;
            }
        }
        self.notify(EngineNotification::VariantChanged);
        Ok(())
    }

    async fn set_abr_enabled(&self, enabled: bool) {
        debug!("Bitrate ladder {}", if enabled { "enabled" } else { "disabled" });
        self.abr_enabled.store(enabled, Ordering::Relaxed);
    }

    async fn status(&self) -> PlaybackStatus {
        let Ok(playhead) = self.playhead.lock() else {
            return PlaybackStatus::default();
        };
        let position = playhead.position();
        PlaybackStatus {
            position,
            paused: playhead.since.is_none(),
            buffering: false,
            live: playhead.timeline.live,
            seekable_end: if playhead.timeline.live {
                Some(playhead.live_edge().max(position))
            } else if playhead.timeline.duration > 0.0 {
                Some(playhead.timeline.duration)
            } else {
                None
            },
        }
    }

    async fn seek(&self, position: f64) -> Result<(), EngineError> {
        let mut playhead = self
            .playhead
            .lock()
            .map_err(|_| EngineError::new(7000, "player", "playhead poisoned"))?;
        if playhead.since.is_none() {
            return Err(EngineError::new(7001, "player", "nothing loaded"));
        }
        playhead.restart(position.max(0.0));
        Ok(())
    }
}

/// Variant tracks of a master playlist, URIs resolved against `playlist_url`.
pub fn variant_tracks(text: &str, playlist_url: &str) -> Vec<VariantTrack> {
    let base = Url::parse(playlist_url).ok();
    let mut tracks = Vec::new();
    let mut pending = None;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(attributes) = line.strip_prefix("#EXT-X-STREAM-INF:") {
            pending = Some(parse_attribute_list(attributes));
            continue;
        }
        if line.starts_with('#') {
            continue;
        }
        let Some(attributes) = pending.take() else {
            continue;
        };

        let resolution = attributes
            .get("RESOLUTION")
            .and_then(|r| r.parse::<Resolution>().ok())
            .unwrap_or(Resolution { width: 0, height: 0 });
        let uri = base
            .as_ref()
            .and_then(|b| b.join(line).ok())
            .map(|u| u.to_string())
            .unwrap_or_else(|| line.to_string());

        tracks.push(VariantTrack {
            id: tracks.len() as u64,
            bandwidth: attributes
                .get("BANDWIDTH")
                .and_then(|b| b.parse().ok())
                .unwrap_or(0),
            width: resolution.width,
            height: resolution.height,
            uri,
            active: false,
        });
    }

    tracks
}

/// Liveness and duration of a media playlist.
pub fn timeline_of(media_playlist: &str) -> Timeline {
    let mut timeline = Timeline {
        live: true,
        duration: 0.0,
    };
    for line in media_playlist.lines().map(str::trim) {
        if line == "#EXT-X-ENDLIST" || line == "#EXT-X-PLAYLIST-TYPE:VOD" {
            timeline.live = false;
        } else if let Some(info) = line.strip_prefix("#EXTINF:") {
            let seconds = info.split(',').next().unwrap_or_default();
            timeline.duration += seconds.trim().parse::<f64>().unwrap_or(0.0);
        }
    }
    timeline
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn tracks_resolve_against_the_playlist() {
        let master = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=1280x720
720p.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2000000,RESOLUTION=1920x1080,CODECS=\"avc1.640028,mp4a.40.2\"
https://other.example.com/1080p.m3u8
";
        let tracks = variant_tracks(master, "https://cdn.example.com/event/wide/master.m3u8");
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].uri, "https://cdn.example.com/event/wide/720p.m3u8");
        assert_eq!((tracks[0].width, tracks[0].height), (1280, 720));
        assert_eq!(tracks[1].uri, "https://other.example.com/1080p.m3u8");
        assert_eq!(tracks[1].bandwidth, 2_000_000);
        assert_eq!(tracks[1].id, 1);
    }

    #[test]
    fn media_playlist_timeline() {
        let vod = "#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXTINF:6.0,\na.ts\n#EXTINF:4.5,\nb.ts\n#EXT-X-ENDLIST\n";
        assert_eq!(timeline_of(vod), Timeline { live: false, duration: 10.5 });

        let live = "#EXTM3U\n#EXT-X-MEDIA-SEQUENCE:42\n#EXTINF:2.0,\nc.ts\n";
        assert!(timeline_of(live).live);
    }

    #[tokio::test]
    async fn selecting_a_track_notifies_variant_change() {
        let engine = HeadlessEngine::new(Client::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        engine.set_notifier(Arc::new(move |n: EngineNotification| sink.lock().unwrap().push(n)));

        *engine.tracks.lock().unwrap() = variant_tracks(
            "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=1\na.m3u8\n#EXT-X-STREAM-INF:BANDWIDTH=2\nb.m3u8\n",
            "https://cdn.example.com/x/master.m3u8",
        );
        engine.select_variant(1).await.unwrap();
        assert!(engine.select_variant(9).await.is_err());

        assert_eq!(*seen.lock().unwrap(), vec![EngineNotification::VariantChanged]);
        let tracks = engine.variant_tracks().await;
        assert!(tracks[1].active && !tracks[0].active);
    }

    #[tokio::test]
    async fn successful_load_notifies_variant_change() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/event/wide/master.m3u8"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "#EXTM3U\n#EXTINF:6.0,\na.ts\n#EXTINF:6.0,\nb.ts\n#EXT-X-ENDLIST\n",
            ))
            .mount(&server)
            .await;

        let engine = HeadlessEngine::new(Client::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        engine.set_notifier(Arc::new(move |n: EngineNotification| sink.lock().unwrap().push(n)));

        let url = format!("{}/event/wide/master.m3u8", server.uri());
        engine.load(&url, 4.0).await.unwrap();
        assert!(engine.load(&format!("{}/missing.m3u8", server.uri()), 0.0).await.is_err());

        assert_eq!(*seen.lock().unwrap(), vec![EngineNotification::VariantChanged]);
        let status = engine.status().await;
        assert!(!status.live);
        assert_eq!(status.seekable_end, Some(12.0));
    }

    #[tokio::test]
    async fn seeking_requires_a_loaded_presentation() {
        let engine = HeadlessEngine::new(Client::new());
        assert!(engine.seek(3.0).await.is_err());
        assert!(engine.status().await.paused);
    }
}
