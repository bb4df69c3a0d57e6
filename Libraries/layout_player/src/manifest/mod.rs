//! HLS multi-layout manifest data structures.
//! A top-level manifest lists variant streams for several layouts; entries sharing a layout
//! key are aggregated into one `Layout` whose master playlist lives at a predictable path.

pub mod parser;

use std::fmt;
use std::str::FromStr;
use url::Url;

/// Pixel dimensions of a variant stream, as written in `RESOLUTION=WxH`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn aspect_ratio(&self) -> Option<f64> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        Some(self.width as f64 / self.height as f64)
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (w, h) = value
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("invalid resolution: {value}"))?;
        let width = w.trim().parse::<u32>().map_err(|e| format!("invalid width in {value}: {e}"))?;
        let height = h.trim().parse::<u32>().map_err(|e| format!("invalid height in {value}: {e}"))?;
        Ok(Self { width, height })
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One rung of a layout's bitrate ladder.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantStreamDescriptor {
    /// Peak bandwidth in bits per second (`BANDWIDTH=`).
    pub bandwidth: u64,
    pub resolution: Resolution,
    /// The URI line exactly as it appears in the manifest.
    pub uri: String,
    /// 1-based line number of the URI line.
    pub line: usize,
    pub codecs: Option<String>,
    pub frame_rate: Option<f64>,
}

/// A named, independently addressable presentation of the event.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    /// Unique key within a registry.
    pub name: String,
    pub display_name: String,
    /// Variant streams in manifest order.
    pub streams: Vec<VariantStreamDescriptor>,
    /// `base_url + name + suffix`, never the URI parsed from the top-level manifest.
    pub master_url: String,
    /// The max-bandwidth stream; the first one wins on ties.
    pub best_quality: VariantStreamDescriptor,
}

impl Layout {
    /// Returns `None` when `streams` is empty, a layout always has at least one rung.
    pub fn new(
        name: &str,
        display_name: &str,
        master_url: String,
        streams: Vec<VariantStreamDescriptor>,
    ) -> Option<Self> {
        let best_quality = streams
            .iter()
            .fold(None::<&VariantStreamDescriptor>, |best, s| match best {
                Some(b) if b.bandwidth >= s.bandwidth => Some(b),
                _ => Some(s),
            })?
            .clone();

        Some(Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            streams,
            master_url,
            best_quality,
        })
    }

    /// True when `uri` is one of this layout's variant URIs, either verbatim or resolved
    /// against some base (engines usually report absolute URIs).
    pub fn owns_uri(&self, uri: &str) -> bool {
        self.streams.iter().any(|s| {
            let relative = s.uri.trim_start_matches("./");
            uri == s.uri || uri.strip_suffix(relative).is_some_and(|head| head.ends_with('/'))
        })
    }
}

/// Structural convention for sibling per-layout manifests.
pub fn master_url(base_url: &str, layout_key: &str, suffix: &str) -> String {
    format!("{base_url}{layout_key}{suffix}")
}

/// Directory of a manifest URL: query and fragment dropped, truncated after the last `/`.
pub fn base_url_of(manifest_url: &str) -> String {
    if let Ok(mut url) = Url::parse(manifest_url) {
        url.set_query(None);
        url.set_fragment(None);
        if let Ok(dir) = url.join("./") {
            return dir.to_string();
        }
    }

    let trimmed = manifest_url
        .split(['?', '#'])
        .next()
        .unwrap_or(manifest_url);
    trimmed
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/"))
        .unwrap_or_default()
}

/// Path component of the manifest's directory, used to key region metadata requests.
pub fn stream_path_of(manifest_url: &str) -> String {
    let base = base_url_of(manifest_url);
    match Url::parse(&base) {
        Ok(url) => url.path().to_string(),
        Err(_) => base,
    }
}
