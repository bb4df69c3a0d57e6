use crate::manifest::{master_url, Layout, Resolution, VariantStreamDescriptor};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;
use url::Url;

const STREAM_INF_TAG: &str = "#EXT-X-STREAM-INF";

static LAYOUT_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Layout\d+").expect("layout token pattern is valid"));

/// Entries collected for one layout key before the `Layout` is built.
struct LayoutEntries {
    display_name: Option<String>,
    streams: Vec<VariantStreamDescriptor>,
}

/// Parses a multi-layout top-level manifest into layouts sorted by name.
///
/// Every `#EXT-X-STREAM-INF` line has to be followed by its URI line (blank lines are
/// skipped, any other `#` line breaks the pair). Entries without a bandwidth, a resolution
/// or a resolvable layout key are dropped. Nothing here is an error: a manifest without a
/// single usable entry simply yields an empty list.
pub fn parse_layouts(text: &str, base_url: &str, suffix: &str) -> Vec<Layout> {
    let mut pending: Option<(usize, HashMap<String, String>)> = None;
    let mut layouts: BTreeMap<String, LayoutEntries> = BTreeMap::new();

    for (index, raw_line) in text.lines().enumerate() {
        let line_number = index + 1;
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(attributes) = stream_inf_attributes(line) {
            if let Some((orphan, _)) = pending.replace((line_number, parse_attribute_list(attributes))) {
                debug!("Stream-info on line {} has no URI, dropped", orphan);
            }
            continue;
        }

        if line.starts_with('#') {
            if let Some((orphan, _)) = pending.take() {
                debug!("Stream-info on line {} is not followed by a URI, dropped", orphan);
            }
            continue;
        }

        let Some((info_line, attributes)) = pending.take() else {
            continue;
        };

        let Some(descriptor) = build_descriptor(&attributes, line, line_number) else {
            debug!("Stream-info on line {} lacks a valid BANDWIDTH or RESOLUTION, dropped", info_line);
            continue;
        };

        let Some(key) = resolve_layout_key(&attributes, line) else {
            debug!("No layout key for URI '{}' on line {}, dropped", line, line_number);
            continue;
        };

        let entry = layouts.entry(key).or_insert_with(|| LayoutEntries {
            display_name: None,
            streams: Vec::new(),
        });
        if entry.display_name.is_none() {
            entry.display_name = non_empty(&attributes, "NAME").map(str::to_string);
        }
        entry.streams.push(descriptor);
    }

    // BTreeMap iteration is byte-wise ascending on the key, which is the output order.
    layouts
        .into_iter()
        .filter_map(|(key, entries)| {
            let display_name = entries.display_name.unwrap_or_else(|| key.clone());
            Layout::new(&key, &display_name, master_url(base_url, &key, suffix), entries.streams)
        })
        .collect()
}

fn stream_inf_attributes(line: &str) -> Option<&str> {
    let rest = line.strip_prefix(STREAM_INF_TAG)?;
    if rest.is_empty() {
        return Some("");
    }
    rest.strip_prefix(':')
}

fn build_descriptor(
    attributes: &HashMap<String, String>,
    uri: &str,
    line: usize,
) -> Option<VariantStreamDescriptor> {
    let bandwidth = attributes.get("BANDWIDTH")?.parse::<u64>().ok()?;
    let resolution = attributes.get("RESOLUTION")?.parse::<Resolution>().ok()?;

    Some(VariantStreamDescriptor {
        bandwidth,
        resolution,
        uri: uri.to_string(),
        line,
        codecs: non_empty(attributes, "CODECS").map(str::to_string),
        frame_rate: attributes.get("FRAME-RATE").and_then(|v| v.parse::<f64>().ok()),
    })
}

/// NAME, then the VIDEO group reference, then the first path segment, then a `Layout<N>` token.
fn resolve_layout_key(attributes: &HashMap<String, String>, uri: &str) -> Option<String> {
    non_empty(attributes, "NAME")
        .or_else(|| non_empty(attributes, "VIDEO"))
        .map(str::to_string)
        .or_else(|| first_path_segment(uri))
        .or_else(|| LAYOUT_TOKEN.find(uri).map(|m| m.as_str().to_string()))
}

/// The first directory of the URI path. A bare file name has no directory and yields `None`.
fn first_path_segment(uri: &str) -> Option<String> {
    let path = match Url::parse(uri) {
        Ok(url) => url.path().to_string(),
        Err(_) => uri.split(['?', '#']).next().unwrap_or(uri).to_string(),
    };

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty() && *s != ".").collect();
    if segments.len() < 2 {
        return None;
    }
    Some(segments[0].to_string())
}

fn non_empty<'a>(attributes: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    attributes
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

/// Splits an HLS attribute list on commas outside of quoted strings.
/// Keys are kept as written, quoted values are returned without their quotes.
pub fn parse_attribute_list(input: &str) -> HashMap<String, String> {
    let mut attributes = HashMap::new();
    let mut current = String::new();
    let mut in_quotes = false;

    let mut flush = |item: &mut String| {
        if let Some((key, value)) = item.split_once('=') {
            let key = key.trim();
            if !key.is_empty() {
                let value = value.trim().trim_matches('"');
                attributes.insert(key.to_string(), value.to_string());
            }
        }
        item.clear();
    };

    for c in input.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if !in_quotes => flush(&mut current),
            _ => current.push(c),
        }
    }
    flush(&mut current);

    attributes
}
