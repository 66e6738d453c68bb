use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{AtlasError, Result};

/// MaxRects placement heuristics.
///
/// Every heuristic scores a candidate free rectangle with a `(primary, secondary)`
/// pair; remaining ties fall back to lowest `y`, then lowest `x`, then the
/// unrotated orientation, so placement never depends on free-list order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MaxRectsHeuristic {
    /// Minimize the shorter leftover side, then leftover area.
    #[default]
    BestShortSideFit,
    /// Minimize the longer leftover side, then the shorter one.
    BestLongSideFit,
    /// Minimize leftover area, then the shorter leftover side.
    BestAreaFit,
    /// Tetris-style: lowest top edge, then leftmost.
    BottomLeft,
    /// Maximize the perimeter touching bin edges and placed rects.
    ContactPoint,
}

impl FromStr for MaxRectsHeuristic {
    type Err = ();
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bssf" | "bestshortsidefit" | "best_short_side_fit" => Ok(Self::BestShortSideFit),
            "blsf" | "bestlongsidefit" | "best_long_side_fit" => Ok(Self::BestLongSideFit),
            "baf" | "bestareafit" | "best_area_fit" => Ok(Self::BestAreaFit),
            "bl" | "bottomleft" | "bottom_left" => Ok(Self::BottomLeft),
            "cp" | "contactpoint" | "contact_point" => Ok(Self::ContactPoint),
            _ => Err(()),
        }
    }
}

/// Sorting orders applied before packing. Ties always keep registration order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    AreaDesc,
    MaxSideDesc,
    NameAsc,
    None,
}

impl FromStr for SortOrder {
    type Err = ();
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "area_desc" => Ok(Self::AreaDesc),
            "max_side_desc" => Ok(Self::MaxSideDesc),
            "name_asc" => Ok(Self::NameAsc),
            "none" => Ok(Self::None),
            _ => Err(()),
        }
    }
}

/// What a batch run does with a source image whose pixels cannot be obtained.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DecodeErrorPolicy {
    /// Log a warning and leave the image out of the atlas.
    #[default]
    Skip,
    /// Fail the whole run.
    Abort,
}

impl FromStr for DecodeErrorPolicy {
    type Err = ();
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "abort" => Ok(Self::Abort),
            _ => Err(()),
        }
    }
}

/// Configuration of an offline packing run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PackerConfig {
    /// Maximum page width in pixels.
    pub max_width: u32,
    /// Maximum page height in pixels.
    pub max_height: u32,
    /// Allow 90° rotations for placements where beneficial.
    pub allow_rotation: bool,
    /// Force final page dimensions to be exactly max_width/max_height.
    pub force_max_dimensions: bool,

    /// Pixels around entire page border.
    pub border_padding: u32,
    /// Pixels between slots.
    pub texture_padding: u32,
    /// Edge pixels replicated around each region (for sampling safety).
    pub extrude: u32,

    /// Crop transparent borders (alpha <= trim_threshold) before packing.
    pub trim: bool,
    pub trim_threshold: u8,

    /// Propagate opaque colors into transparent pixels after composition.
    pub bleed: bool,
    pub bleed_iterations: u32,

    /// Round output page dimensions up to powers of two.
    pub power_of_two: bool,
    /// Force output page to be square (max(width,height)).
    pub square: bool,

    pub heuristic: MaxRectsHeuristic,
    pub sort_order: SortOrder,
    pub on_decode_error: DecodeErrorPolicy,
}

impl Default for PackerConfig {
    fn default() -> Self {
        Self {
            max_width: 1024,
            max_height: 1024,
            allow_rotation: true,
            force_max_dimensions: false,
            border_padding: 0,
            texture_padding: 0,
            extrude: 0,
            trim: false,
            trim_threshold: 0,
            bleed: true,
            bleed_iterations: 2,
            power_of_two: false,
            square: false,
            heuristic: MaxRectsHeuristic::default(),
            sort_order: SortOrder::default(),
            on_decode_error: DecodeErrorPolicy::default(),
        }
    }
}

impl PackerConfig {
    /// Validates the configuration parameters.
    ///
    /// Returns an error if dimensions are zero or the border padding leaves no
    /// usable space.
    pub fn validate(&self) -> Result<()> {
        if self.max_width == 0 || self.max_height == 0 {
            return Err(AtlasError::InvalidDimensions {
                width: self.max_width,
                height: self.max_height,
            });
        }
        let total_border = self.border_padding.saturating_mul(2);
        if total_border >= self.max_width || total_border >= self.max_height {
            return Err(AtlasError::InvalidConfig(format!(
                "border_padding ({}) * 2 exceeds atlas dimensions ({}x{})",
                self.border_padding, self.max_width, self.max_height
            )));
        }
        Ok(())
    }

    /// Margin added to each side of the source size when reserving a slot.
    pub(crate) fn slot_margin(&self) -> u32 {
        self.extrude.saturating_mul(2).saturating_add(self.texture_padding)
    }

    /// Create a fluent builder for `PackerConfig`.
    pub fn builder() -> PackerConfigBuilder {
        PackerConfigBuilder::new()
    }
}

/// Builder for `PackerConfig` for ergonomic construction.
#[derive(Debug, Default, Clone)]
pub struct PackerConfigBuilder {
    cfg: PackerConfig,
}

impl PackerConfigBuilder {
    pub fn new() -> Self {
        Self {
            cfg: PackerConfig::default(),
        }
    }
    pub fn with_max_dimensions(mut self, w: u32, h: u32) -> Self {
        self.cfg.max_width = w;
        self.cfg.max_height = h;
        self
    }
    pub fn allow_rotation(mut self, v: bool) -> Self {
        self.cfg.allow_rotation = v;
        self
    }
    pub fn force_max_dimensions(mut self, v: bool) -> Self {
        self.cfg.force_max_dimensions = v;
        self
    }
    pub fn border_padding(mut self, v: u32) -> Self {
        self.cfg.border_padding = v;
        self
    }
    pub fn texture_padding(mut self, v: u32) -> Self {
        self.cfg.texture_padding = v;
        self
    }
    pub fn extrude(mut self, v: u32) -> Self {
        self.cfg.extrude = v;
        self
    }
    pub fn trim(mut self, v: bool) -> Self {
        self.cfg.trim = v;
        self
    }
    pub fn trim_threshold(mut self, v: u8) -> Self {
        self.cfg.trim_threshold = v;
        self
    }
    pub fn bleed(mut self, v: bool) -> Self {
        self.cfg.bleed = v;
        self
    }
    pub fn bleed_iterations(mut self, v: u32) -> Self {
        self.cfg.bleed_iterations = v;
        self
    }
    pub fn pow2(mut self, v: bool) -> Self {
        self.cfg.power_of_two = v;
        self
    }
    pub fn square(mut self, v: bool) -> Self {
        self.cfg.square = v;
        self
    }
    pub fn heuristic(mut self, v: MaxRectsHeuristic) -> Self {
        self.cfg.heuristic = v;
        self
    }
    pub fn sort_order(mut self, v: SortOrder) -> Self {
        self.cfg.sort_order = v;
        self
    }
    pub fn on_decode_error(mut self, v: DecodeErrorPolicy) -> Self {
        self.cfg.on_decode_error = v;
        self
    }
    pub fn build(self) -> PackerConfig {
        self.cfg
    }
}

/// Configuration of a [`RuntimeAtlasPacker`](crate::runtime::RuntimeAtlasPacker).
///
/// Pages start at `initial_width x initial_height` and double (power of two)
/// up to `max_width x max_height` before a new page is opened.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub initial_width: u32,
    pub initial_height: u32,
    pub max_width: u32,
    pub max_height: u32,
    /// Upper bound on the number of pages; `None` means unlimited.
    pub max_pages: Option<usize>,
    pub allow_rotation: bool,
    pub texture_padding: u32,
    pub extrude: u32,
    pub heuristic: MaxRectsHeuristic,
    pub bleed: bool,
    pub bleed_iterations: u32,
    /// Fill color of freshly allocated page pixels.
    pub background: [u8; 4],
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            initial_width: 256,
            initial_height: 256,
            max_width: 2048,
            max_height: 2048,
            max_pages: None,
            allow_rotation: true,
            texture_padding: 0,
            extrude: 0,
            heuristic: MaxRectsHeuristic::default(),
            bleed: false,
            bleed_iterations: 2,
            background: [0, 0, 0, 0],
        }
    }
}

impl RuntimeConfig {
    pub fn validate(&self) -> Result<()> {
        for (w, h) in [
            (self.initial_width, self.initial_height),
            (self.max_width, self.max_height),
        ] {
            if w == 0 || h == 0 {
                return Err(AtlasError::InvalidDimensions {
                    width: w,
                    height: h,
                });
            }
        }
        if !self.initial_width.is_power_of_two() || !self.initial_height.is_power_of_two() {
            return Err(AtlasError::InvalidConfig(format!(
                "initial page size {}x{} must be a power of two",
                self.initial_width, self.initial_height
            )));
        }
        if self.initial_width > self.max_width || self.initial_height > self.max_height {
            return Err(AtlasError::InvalidConfig(format!(
                "initial page size {}x{} exceeds max {}x{}",
                self.initial_width, self.initial_height, self.max_width, self.max_height
            )));
        }
        if self.max_pages == Some(0) {
            return Err(AtlasError::InvalidConfig("max_pages must be at least 1".into()));
        }
        Ok(())
    }

    pub(crate) fn slot_margin(&self) -> u32 {
        self.extrude.saturating_mul(2).saturating_add(self.texture_padding)
    }
}
