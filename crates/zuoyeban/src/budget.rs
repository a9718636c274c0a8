//! Column count and per-column height budget for a viewport.

use serde::{Deserialize, Serialize};

use crate::estimate::FontScale;

/// Lower bound on the column height budget
pub const MIN_COLUMN_HEIGHT: u32 = 200;

const CONTAINER_MARGIN: u32 = 15;
const SAFETY_MARGIN: u32 = 15;

/// Width breakpoints: a viewport at most this wide gets this many columns
const BREAKPOINTS: [(u32, usize); 3] = [(600, 1), (900, 2), (1200, 3)];
const MAX_COLUMNS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1920, 1080)
    }
}

/// Number of columns for a viewport width
pub fn column_count(viewport_width: u32) -> usize {
    BREAKPOINTS
        .iter()
        .find(|(max_width, _)| viewport_width <= *max_width)
        .map(|(_, count)| *count)
        .unwrap_or(MAX_COLUMNS)
}

/// Usable column height once fixed page elements and margins are removed
pub fn max_column_height(viewport_height: u32, fixed_chrome_height: u32) -> u32 {
    viewport_height
        .saturating_sub(fixed_chrome_height)
        .saturating_sub(CONTAINER_MARGIN + SAFETY_MARGIN)
        .max(MIN_COLUMN_HEIGHT)
}

/// Heights of the page elements above the columns, at the base font size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChromeMetrics {
    pub title: f64,
    pub toolbar: f64,
    pub home_button: f64,
}

impl Default for ChromeMetrics {
    fn default() -> Self {
        Self {
            title: 64.0,
            toolbar: 44.0,
            home_button: 40.0,
        }
    }
}

impl ChromeMetrics {
    pub fn fixed_height(&self, scale: FontScale) -> u32 {
        scale
            .apply(self.title)
            .saturating_add(scale.apply(self.toolbar))
            .saturating_add(scale.apply(self.home_button))
    }
}

/// Column count and height budget for one layout pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnBudget {
    pub column_count: usize,
    pub max_column_height: u32,
}

impl ColumnBudget {
    pub fn for_viewport(viewport: Viewport, chrome: &ChromeMetrics, scale: FontScale) -> Self {
        Self {
            column_count: column_count(viewport.width),
            max_column_height: max_column_height(viewport.height, chrome.fixed_height(scale)),
        }
    }
}
