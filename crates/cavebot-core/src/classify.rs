//! Color-ratio health classification over pixel grids.
//!
//! The classifier walks a screenshot of the health-bar region, ignores
//! background pixels, counts how many of the remaining pixels fall inside
//! each configured color band, and returns the state of the first band
//! (in configured order) whose pixel ratio clears its threshold.
//!
//! # Band Priority (first ratio match wins)
//!
//! The default configuration orders bands from healthiest to most
//! critical, mirroring how the bar drains left to right:
//!
//! | Band | Color | Default ratio |
//! |------|-------|---------------|
//! | **Full** | saturated green | 0.30 |
//! | **High** | olive green | 0.30 |
//! | **Medium** | yellow/orange | 0.01 |
//! | **Low** | red | 0.10 |
//!
//! Every threshold and channel range is configuration, not code: variant
//! game clients disagree on the exact bar colors, so the bands ship as
//! data the operator can re-tune without touching the classifier.

use serde::{Deserialize, Serialize};

use crate::model::HealthState;

/// A rectangular RGB pixel buffer, row-major, three bytes per pixel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelGrid {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

impl PixelGrid {
    /// Wrap a raw RGB buffer. Returns `None` when the buffer length does
    /// not match `width * height * 3`.
    pub fn new(width: u32, height: u32, rgb: Vec<u8>) -> Option<Self> {
        if rgb.len() != (width as usize) * (height as usize) * 3 {
            return None;
        }
        Some(Self { width, height, rgb })
    }

    /// Pixel at `(x, y)`, or `None` out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<(u8, u8, u8)> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) as usize) * 3;
        Some((self.rgb[idx], self.rgb[idx + 1], self.rgb[idx + 2]))
    }

    fn pixels(&self) -> impl Iterator<Item = (u8, u8, u8)> + '_ {
        self.rgb.chunks_exact(3).map(|p| (p[0], p[1], p[2]))
    }
}

/// Inclusive range over one color channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRange {
    pub min: u8,
    pub max: u8,
}

impl ChannelRange {
    pub fn new(min: u8, max: u8) -> Self {
        Self { min, max }
    }

    pub fn any() -> Self {
        Self { min: 0, max: 255 }
    }

    fn contains(&self, v: u8) -> bool {
        v >= self.min && v <= self.max
    }
}

impl Default for ChannelRange {
    fn default() -> Self {
        Self::any()
    }
}

/// Per-pixel RGB predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PixelRule {
    #[serde(default)]
    pub r: ChannelRange,
    #[serde(default)]
    pub g: ChannelRange,
    #[serde(default)]
    pub b: ChannelRange,
}

impl PixelRule {
    pub fn new(r: ChannelRange, g: ChannelRange, b: ChannelRange) -> Self {
        Self { r, g, b }
    }

    pub fn matches(&self, r: u8, g: u8, b: u8) -> bool {
        self.r.contains(r) && self.g.contains(g) && self.b.contains(b)
    }
}

/// One classification band: pixels matching `rule` vote for `state`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorBand {
    pub state: HealthState,
    pub rule: PixelRule,
    pub min_ratio: f32,
}

/// Classifier configuration: a background filter plus ordered bands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Pixels matching this rule are background and excluded from ratios.
    pub ignore: PixelRule,
    /// Bands evaluated in order; the first ratio match wins.
    pub bands: Vec<ColorBand>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            // Near-black border and empty-bar pixels.
            ignore: PixelRule::new(
                ChannelRange::new(0, 49),
                ChannelRange::new(0, 49),
                ChannelRange::new(0, 49),
            ),
            bands: vec![
                ColorBand {
                    state: HealthState::Full,
                    rule: PixelRule::new(
                        ChannelRange::new(0, 99),
                        ChannelRange::new(151, 255),
                        ChannelRange::new(0, 99),
                    ),
                    min_ratio: 0.30,
                },
                ColorBand {
                    state: HealthState::High,
                    rule: PixelRule::new(
                        ChannelRange::new(81, 139),
                        ChannelRange::new(121, 255),
                        ChannelRange::new(0, 79),
                    ),
                    min_ratio: 0.30,
                },
                ColorBand {
                    state: HealthState::Medium,
                    rule: PixelRule::new(
                        ChannelRange::new(121, 255),
                        ChannelRange::new(91, 200),
                        ChannelRange::new(0, 99),
                    ),
                    min_ratio: 0.01,
                },
                ColorBand {
                    state: HealthState::Low,
                    rule: PixelRule::new(
                        ChannelRange::new(151, 255),
                        ChannelRange::new(0, 99),
                        ChannelRange::new(0, 99),
                    ),
                    min_ratio: 0.10,
                },
            ],
        }
    }
}

/// Classify a health-bar screenshot.
///
/// Returns `Unknown` when the grid has no foreground pixels or no band
/// clears its ratio threshold.
pub fn classify(grid: &PixelGrid, cfg: &ClassifierConfig) -> HealthState {
    let mut total = 0usize;
    let mut counts = vec![0usize; cfg.bands.len()];

    for (r, g, b) in grid.pixels() {
        if cfg.ignore.matches(r, g, b) {
            continue;
        }
        total += 1;
        for (i, band) in cfg.bands.iter().enumerate() {
            if band.rule.matches(r, g, b) {
                counts[i] += 1;
            }
        }
    }

    if total == 0 {
        return HealthState::Unknown;
    }

    for (i, band) in cfg.bands.iter().enumerate() {
        let ratio = counts[i] as f32 / total as f32;
        if ratio >= band.min_ratio {
            return band.state;
        }
    }
    HealthState::Unknown
}
