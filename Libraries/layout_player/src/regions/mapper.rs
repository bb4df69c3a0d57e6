use crate::config::{NoHitPolicy, SessionConfig};
use crate::regions::Region;
use crate::registry::LayoutRegistry;
use tracing::{debug, warn};

/// A pointer event relative to the rendering surface's bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub x: f64,
    pub y: f64,
    pub surface_width: f64,
    pub surface_height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasPoint {
    pub x: f64,
    pub y: f64,
}

/// Where the content is drawn inside the surface once letterboxed or pillarboxed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayedBox {
    pub offset_x: f64,
    pub offset_y: f64,
    pub width: f64,
    pub height: f64,
}

impl DisplayedBox {
    /// Fits content of `content_aspect` (width / height) centred inside the surface.
    pub fn fit(surface_width: f64, surface_height: f64, content_aspect: f64) -> Option<Self> {
        if surface_width <= 0.0 || surface_height <= 0.0 || content_aspect <= 0.0 || !content_aspect.is_finite() {
            return None;
        }

        let surface_aspect = surface_width / surface_height;
        let (width, height) = if surface_aspect > content_aspect {
            // Pillarbox: bars left and right.
            (surface_height * content_aspect, surface_height)
        } else {
            // Letterbox: bars top and bottom.
            (surface_width, surface_width / content_aspect)
        };

        Some(Self {
            offset_x: (surface_width - width) / 2.0,
            offset_y: (surface_height - height) / 2.0,
            width,
            height,
        })
    }
}

/// Maps a pointer into canvas space. Pointers on the bars outside the content yield `None`.
pub fn map_to_canvas(
    pointer: &PointerEvent,
    content_aspect: f64,
    canvas_width: f64,
    canvas_height: f64,
) -> Option<CanvasPoint> {
    let shown = DisplayedBox::fit(pointer.surface_width, pointer.surface_height, content_aspect)?;

    let u = (pointer.x - shown.offset_x) / shown.width;
    let v = (pointer.y - shown.offset_y) / shown.height;
    if !(0.0..=1.0).contains(&u) || !(0.0..=1.0).contains(&v) {
        return None;
    }

    Some(CanvasPoint {
        x: u * canvas_width,
        y: v * canvas_height,
    })
}

/// First region in stored order containing the point.
/// With `exclude_largest`, the single largest region is skipped as long as there is more than
/// one region; a lone region is never treated as background.
pub fn hit_test(regions: &[Region], point: CanvasPoint, exclude_largest: bool) -> Option<&Region> {
    let skipped = if exclude_largest && regions.len() > 1 {
        largest_region_index(regions)
    } else {
        None
    };

    regions
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != skipped)
        .map(|(_, r)| r)
        .find(|r| r.contains(point.x, point.y))
}

fn largest_region_index(regions: &[Region]) -> Option<usize> {
    let mut largest: Option<(usize, f64)> = None;
    for (i, region) in regions.iter().enumerate() {
        let area = region.area();
        match largest {
            Some((_, best)) if best >= area => {}
            _ => largest = Some((i, area)),
        }
    }
    largest.map(|(i, _)| i)
}

/// Resolves pointer events against the active layout's regions.
/// It only ever proposes a layout name; acting on the proposal is the controller's job.
#[derive(Debug, Clone, Copy)]
pub struct RegionHitMapper {
    exclude_largest: bool,
    no_hit: NoHitPolicy,
}

impl RegionHitMapper {
    pub fn new(exclude_largest: bool, no_hit: NoHitPolicy) -> Self {
        Self { exclude_largest, no_hit }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.exclude_largest_region, config.no_hit_policy)
    }

    pub fn propose(&self, registry: &LayoutRegistry, active: &str, pointer: &PointerEvent) -> Option<String> {
        let Some(set) = registry.regions_for(active) else {
            debug!("No region metadata for layout '{}'", active);
            return self.fallback(registry, active);
        };

        // The content's native aspect comes from its best rung, the canvas aspect otherwise.
        let content_aspect = registry
            .get(active)
            .and_then(|l| l.best_quality.resolution.aspect_ratio())
            .unwrap_or(set.canvas_width / set.canvas_height);

        let Some(point) = map_to_canvas(pointer, content_aspect, set.canvas_width, set.canvas_height) else {
            debug!("Pointer ({}, {}) is outside the displayed content", pointer.x, pointer.y);
            return self.fallback(registry, active);
        };

        let Some(region) = hit_test(&set.regions, point, self.exclude_largest) else {
            debug!("No region at canvas point ({:.1}, {:.1})", point.x, point.y);
            return self.fallback(registry, active);
        };

        let target = region.parent_layout_name.as_deref()?;
        match registry.find_ignore_case(target) {
            Some(layout) => Some(layout.name.clone()),
            None => {
                warn!(
                    "Region {}#{} links to unknown layout '{}', ignored",
                    region.source_type, region.source_idx, target
                );
                None
            }
        }
    }

    fn fallback(&self, registry: &LayoutRegistry, active: &str) -> Option<String> {
        match self.no_hit {
            NoHitPolicy::Ignore => None,
            NoHitPolicy::AdvanceLayout => registry.next_after(active).map(|l| l.name.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{Layout, Resolution, VariantStreamDescriptor};
    use crate::regions::LayoutRegionSet;

    fn region(x: f64, y: f64, w: f64, h: f64, parent: Option<&str>) -> Region {
        Region {
            x,
            y,
            width: w,
            height: h,
            source_type: "camera".into(),
            source_idx: 0,
            parent_layout_name: parent.map(str::to_string),
        }
    }

    fn layout(name: &str, width: u32, height: u32) -> Layout {
        let stream = VariantStreamDescriptor {
            bandwidth: 1,
            resolution: Resolution { width, height },
            uri: format!("{name}/a.m3u8"),
            line: 2,
            codecs: None,
            frame_rate: None,
        };
        Layout::new(name, name, String::new(), vec![stream]).unwrap()
    }

    fn registry(regions: Vec<Region>) -> LayoutRegistry {
        let mut registry = LayoutRegistry::new();
        registry.replace_layouts(vec![
            layout("studio", 1920, 1080),
            layout("wide", 1920, 1080),
            layout("zoom", 1920, 1080),
        ]);
        registry.set_regions(vec![LayoutRegionSet {
            layout_name: "Studio".into(),
            canvas_width: 1920.0,
            canvas_height: 1080.0,
            regions,
        }]);
        registry
    }

    fn pointer(x: f64, y: f64) -> PointerEvent {
        PointerEvent {
            x,
            y,
            surface_width: 1920.0,
            surface_height: 1080.0,
        }
    }

    #[test]
    fn left_half_region_proposes_wide() {
        let registry = registry(vec![region(0.0, 0.0, 960.0, 1080.0, Some("wide"))]);
        let mapper = RegionHitMapper::new(true, NoHitPolicy::Ignore);
        assert_eq!(mapper.propose(&registry, "studio", &pointer(100.0, 100.0)), Some("wide".into()));
    }

    #[test]
    fn letterboxed_surface_maps_into_canvas() {
        // 16:9 content on a 1000x1000 surface: 1000x562.5 box, 218.75 px bars on top and bottom.
        let surface = PointerEvent {
            x: 500.0,
            y: 218.75 + 562.5 / 2.0,
            surface_width: 1000.0,
            surface_height: 1000.0,
        };
        let point = map_to_canvas(&surface, 16.0 / 9.0, 1920.0, 1080.0).unwrap();
        assert!((point.x - 960.0).abs() < 1e-6);
        assert!((point.y - 540.0).abs() < 1e-6);

        let on_bar = PointerEvent { y: 100.0, ..surface };
        assert!(map_to_canvas(&on_bar, 16.0 / 9.0, 1920.0, 1080.0).is_none());
    }

    #[test]
    fn pillarboxed_surface_maps_into_canvas() {
        // 4:3 content on a 16:9 surface: 1440x1080 box with 240 px bars.
        let p = PointerEvent {
            x: 240.0,
            y: 0.0,
            surface_width: 1920.0,
            surface_height: 1080.0,
        };
        let point = map_to_canvas(&p, 4.0 / 3.0, 1440.0, 1080.0).unwrap();
        assert!(point.x.abs() < 1e-6);
        assert!(point.y.abs() < 1e-6);
    }

    #[test]
    fn largest_region_is_background() {
        let regions = vec![
            region(0.0, 0.0, 1920.0, 1080.0, Some("zoom")),
            region(1500.0, 800.0, 400.0, 250.0, Some("wide")),
        ];
        let registry = registry(regions);
        let mapper = RegionHitMapper::new(true, NoHitPolicy::Ignore);
        assert_eq!(mapper.propose(&registry, "studio", &pointer(1600.0, 900.0)), Some("wide".into()));
        assert_eq!(mapper.propose(&registry, "studio", &pointer(100.0, 100.0)), None);

        let including = RegionHitMapper::new(false, NoHitPolicy::Ignore);
        assert_eq!(including.propose(&registry, "studio", &pointer(100.0, 100.0)), Some("zoom".into()));
    }

    #[test]
    fn first_region_in_stored_order_wins() {
        let regions = vec![
            region(0.0, 0.0, 500.0, 500.0, Some("zoom")),
            region(0.0, 0.0, 400.0, 400.0, Some("wide")),
            region(1000.0, 0.0, 900.0, 1000.0, None),
        ];
        let mapper = RegionHitMapper::new(false, NoHitPolicy::Ignore);
        assert_eq!(mapper.propose(&registry(regions), "studio", &pointer(10.0, 10.0)), Some("zoom".into()));
    }

    #[test]
    fn no_hit_can_advance_to_next_layout() {
        let registry = registry(vec![region(0.0, 0.0, 100.0, 100.0, Some("wide"))]);
        let mapper = RegionHitMapper::new(true, NoHitPolicy::AdvanceLayout);
        assert_eq!(mapper.propose(&registry, "studio", &pointer(1800.0, 1000.0)), Some("wide".into()));
        assert_eq!(mapper.propose(&registry, "zoom", &pointer(1800.0, 1000.0)), Some("studio".into()));
    }

    #[test]
    fn unknown_parent_and_unlinked_regions_propose_nothing() {
        let regions = vec![
            region(0.0, 0.0, 100.0, 100.0, Some("missing")),
            region(200.0, 0.0, 100.0, 100.0, None),
        ];
        let mapper = RegionHitMapper::new(false, NoHitPolicy::AdvanceLayout);
        let registry = registry(regions);
        assert_eq!(mapper.propose(&registry, "studio", &pointer(50.0, 50.0)), None);
        assert_eq!(mapper.propose(&registry, "studio", &pointer(250.0, 50.0)), None);
    }

    #[test]
    fn parent_link_resolves_ignoring_case() {
        let registry = registry(vec![region(0.0, 0.0, 960.0, 1080.0, Some("WIDE"))]);
        let mapper = RegionHitMapper::new(true, NoHitPolicy::Ignore);
        assert_eq!(mapper.propose(&registry, "studio", &pointer(10.0, 10.0)), Some("wide".into()));
    }
}
