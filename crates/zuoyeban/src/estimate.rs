//! Height estimation for homework items and subject headers.
//!
//! Heights are estimated from text length rather than measured, so a layout
//! pass never needs a rendering environment. Every scaled term is rounded up
//! to a whole pixel on its own before summing.

use crate::types::Entry;

/// Font size the metrics are calibrated for
pub const BASE_FONT_SIZE: f64 = 16.0;

/// Ratio of the current font size to [`BASE_FONT_SIZE`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontScale(f64);

impl FontScale {
    pub fn from_font_size(px: u32) -> Self {
        Self(f64::from(px.max(1)) / BASE_FONT_SIZE)
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Scale a base pixel value, rounding up
    pub fn apply(self, base: f64) -> u32 {
        (base * self.0).ceil() as u32
    }
}

impl Default for FontScale {
    fn default() -> Self {
        Self(1.0)
    }
}

/// Pixel constants at the base font size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightMetrics {
    pub base_structure: f64,
    pub line_height: f64,
    /// Characters per line at scale 1.0
    pub chars_per_line: f64,
    pub min_chars_per_line: usize,
    pub label_row: f64,
    pub padding_and_border: f64,
    pub item_spacing: f64,
    pub header_title: f64,
    pub header_padding: f64,
    pub header_margin: f64,
}

impl Default for HeightMetrics {
    fn default() -> Self {
        Self {
            base_structure: 75.0,
            line_height: 18.0,
            chars_per_line: 22.0,
            min_chars_per_line: 15,
            label_row: 22.0,
            padding_and_border: 15.0,
            item_spacing: 5.0,
            header_title: 35.0,
            header_padding: 12.0,
            header_margin: 8.0,
        }
    }
}

impl HeightMetrics {
    pub fn chars_per_line(&self, scale: FontScale) -> usize {
        let fitted = (self.chars_per_line / scale.value()).floor() as usize;
        fitted.max(self.min_chars_per_line)
    }

    /// Estimated rendered height of one homework item
    pub fn estimate_height(&self, entry: &Entry, scale: FontScale) -> u32 {
        self.estimate_parts(entry.content_len(), entry.labels.len(), scale)
    }

    /// Same as [`estimate_height`](Self::estimate_height) from raw counts
    pub fn estimate_parts(&self, content_len: usize, label_count: usize, scale: FontScale) -> u32 {
        // Empty content still renders one line
        let lines = content_len.div_ceil(self.chars_per_line(scale)).max(1) as u32;
        let content = lines * scale.apply(self.line_height);

        let labels = if label_count > 0 {
            scale.apply(self.label_row)
        } else {
            0
        };

        scale.apply(self.base_structure)
            + content
            + labels
            + scale.apply(self.padding_and_border)
            + scale.apply(self.item_spacing)
    }

    /// Height a subject title adds when a group opens in a column
    pub fn subject_header_height(&self, scale: FontScale) -> u32 {
        scale.apply(self.header_title)
            + scale.apply(self.header_padding)
            + scale.apply(self.header_margin)
    }
}
