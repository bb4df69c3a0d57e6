//! The layout set of the current load plus the region metadata fetched for it.

use crate::manifest::Layout;
use crate::regions::LayoutRegionSet;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct LayoutRegistry {
    layouts: Vec<Layout>,
    // Keyed by lowercased layout name, the join against `Layout::name` is case-insensitive.
    regions: HashMap<String, LayoutRegionSet>,
}

impl LayoutRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops both layouts and regions; called at the start of every top-level load.
    pub fn clear(&mut self) {
        self.layouts.clear();
        self.regions.clear();
    }

    /// Replaces the layout set wholesale. Regions already received for this load are kept.
    pub fn replace_layouts(&mut self, layouts: Vec<Layout>) {
        self.layouts = layouts;
    }

    pub fn set_regions(&mut self, sets: Vec<LayoutRegionSet>) {
        self.regions = sets
            .into_iter()
            .map(|set| (set.layout_name.to_lowercase(), set))
            .collect();
    }

    pub fn layouts(&self) -> &[Layout] {
        &self.layouts
    }

    pub fn names(&self) -> Vec<String> {
        self.layouts.iter().map(|l| l.name.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn first(&self) -> Option<&Layout> {
        self.layouts.first()
    }

    pub fn get(&self, name: &str) -> Option<&Layout> {
        self.layouts.iter().find(|l| l.name == name)
    }

    /// Exact match first, then a case-insensitive one.
    pub fn find_ignore_case(&self, name: &str) -> Option<&Layout> {
        self.get(name)
            .or_else(|| {
                let wanted = name.to_lowercase();
                self.layouts.iter().find(|l| l.name.to_lowercase() == wanted)
            })
    }

    /// The layout after `name` in registry order, wrapping around.
    pub fn next_after(&self, name: &str) -> Option<&Layout> {
        let index = self.layouts.iter().position(|l| l.name == name)?;
        self.layouts.get((index + 1) % self.layouts.len())
    }

    pub fn regions_for(&self, name: &str) -> Option<&LayoutRegionSet> {
        self.regions.get(&name.to_lowercase())
    }

    pub fn region_set_count(&self) -> usize {
        self.regions.len()
    }
}
