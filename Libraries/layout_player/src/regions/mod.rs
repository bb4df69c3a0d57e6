//! Clickable region metadata published alongside each layout.
//! Regions are boxes in a fixed canvas space (typically 1920x1080); a region linked to another
//! layout through `parent_layout_name` turns a click into a layout-switch proposal.

pub mod client;
pub mod mapper;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub source_type: String,
    pub source_idx: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_layout_name: Option<String>,
}

impl Region {
    /// Edges are inclusive.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// Canvas dimensions and ordered regions for one layout, as served by the region service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutRegionSet {
    pub layout_name: String,
    pub canvas_width: f64,
    pub canvas_height: f64,
    #[serde(default)]
    pub regions: Vec<Region>,
}
