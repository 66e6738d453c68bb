use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle (pixels). `x,y` is top-left; `w,h` are sizes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }
    /// Inclusive right edge coordinate (`x + w - 1`).
    pub fn right(&self) -> u32 {
        self.x + self.w.saturating_sub(1)
    }
    /// Inclusive bottom edge coordinate (`y + h - 1`).
    pub fn bottom(&self) -> u32 {
        self.y + self.h.saturating_sub(1)
    }
    /// Exclusive right edge (`x + w`).
    pub fn right_ex(&self) -> u32 {
        self.x + self.w
    }
    /// Exclusive bottom edge (`y + h`).
    pub fn bottom_ex(&self) -> u32 {
        self.y + self.h
    }
    pub fn area(&self) -> u64 {
        (self.w as u64) * (self.h as u64)
    }
    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }
    /// Returns true if `r` is fully inside `self` (inclusive edges).
    pub fn contains(&self, r: &Rect) -> bool {
        r.x >= self.x
            && r.y >= self.y
            && r.right_ex() <= self.right_ex()
            && r.bottom_ex() <= self.bottom_ex()
    }
    /// True when the two rectangles share at least one pixel.
    pub fn intersects(&self, other: &Rect) -> bool {
        !(self.x >= other.right_ex()
            || other.x >= self.right_ex()
            || self.y >= other.bottom_ex()
            || other.y >= self.bottom_ex())
    }
    /// Smallest rectangle covering both. An empty side is ignored.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let x2 = self.right_ex().max(other.right_ex());
        let y2 = self.bottom_ex().max(other.bottom_ex());
        Rect::new(x, y, x2 - x, y2 - y)
    }
    /// Grows the rectangle by `by` on every side, clamped to `[0, max_w) x [0, max_h)`.
    pub fn expand_clamped(&self, by: u32, max_w: u32, max_h: u32) -> Rect {
        let x = self.x.saturating_sub(by);
        let y = self.y.saturating_sub(by);
        let x2 = self.x.saturating_add(self.w).saturating_add(by).min(max_w);
        let y2 = self.y.saturating_add(self.h).saturating_add(by).min(max_h);
        Rect::new(x, y, x2.saturating_sub(x), y2.saturating_sub(y))
    }
    /// Intersection with `[0, max_w) x [0, max_h)`; empty when they do not overlap.
    pub fn clipped(&self, max_w: u32, max_h: u32) -> Rect {
        let x = self.x.min(max_w);
        let y = self.y.min(max_h);
        let x2 = self.x.saturating_add(self.w).min(max_w);
        let y2 = self.y.saturating_add(self.h).min(max_h);
        Rect::new(x, y, x2 - x, y2 - y)
    }
}

/// One named image placed on an atlas page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AtlasRegion {
    /// Unique key of the source image.
    pub name: String,
    /// Index of the page the region landed on.
    pub page: usize,
    /// Pixels written to the page for this region: content plus extrusion margin,
    /// in stored (post-rotation) orientation.
    pub packed: Rect,
    /// Content pixels on the page (packed rect without the extrusion margin).
    pub frame: Rect,
    /// Part of the original asset that was packed, in source orientation.
    /// `x,y` is the crop offset; without trimming this is the whole image.
    pub source: Rect,
    /// Size of the original asset before trimming.
    pub source_size: (u32, u32),
    /// True if transparent borders were cropped away.
    pub trimmed: bool,
    /// True if the content was stored rotated 90° clockwise.
    pub rotated: bool,
}

impl AtlasRegion {
    /// Maps a pixel of the original asset to its page coordinate.
    ///
    /// Returns `None` for pixels outside [`source`](Self::source), i.e. trimmed
    /// away or beyond the asset.
    pub fn page_coord(&self, sx: u32, sy: u32) -> Option<(u32, u32)> {
        let lx = sx.checked_sub(self.source.x)?;
        let ly = sy.checked_sub(self.source.y)?;
        if lx >= self.source.w || ly >= self.source.h {
            return None;
        }
        Some(if self.rotated {
            (self.frame.x + (self.source.h - 1 - ly), self.frame.y + lx)
        } else {
            (self.frame.x + lx, self.frame.y + ly)
        })
    }

    /// Normalized texture coordinates `(u0, v0, u1, v1)` of the content on a page of the given size.
    pub fn uv(&self, page_width: u32, page_height: u32) -> (f32, f32, f32, f32) {
        let pw = page_width.max(1) as f32;
        let ph = page_height.max(1) as f32;
        (
            self.frame.x as f32 / pw,
            self.frame.y as f32 / ph,
            self.frame.right_ex() as f32 / pw,
            self.frame.bottom_ex() as f32 / ph,
        )
    }
}

/// A single atlas page (logical record).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page {
    pub id: usize,
    pub width: u32,
    pub height: u32,
    pub regions: Vec<AtlasRegion>,
}

/// Atlas-level metadata written into every descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Meta {
    /// Schema version for the descriptor format; current: "1".
    pub schema_version: String,
    pub app: String,
    pub version: String,
    pub format: String,
    pub max_dim: (u32, u32),
    pub padding: (u32, u32),
    pub extrude: u32,
    pub trim: bool,
    pub allow_rotation: bool,
    pub bleed: bool,
    pub bleed_iterations: u32,
}

/// Per-page metadata consumed by a loader.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AtlasDescriptor {
    /// File name of the page image (e.g. `atlas-0.png`).
    pub page: String,
    /// File name this descriptor is written to (e.g. `atlas-0.json`).
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub regions: Vec<AtlasRegion>,
    /// Descriptor file names of every other page from the same run.
    pub related_pages: Vec<String>,
    pub meta: Meta,
}

impl AtlasDescriptor {
    pub fn region(&self, name: &str) -> Option<&AtlasRegion> {
        self.regions.iter().find(|r| r.name == name)
    }
}

/// Statistics about atlas packing efficiency.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PackStats {
    /// Total number of pages in the atlas.
    pub num_pages: usize,
    /// Total number of regions packed.
    pub num_regions: usize,
    /// Sum of width * height over all pages.
    pub total_page_area: u64,
    /// Sum of content width * height over all regions.
    pub used_area: u64,
    /// used_area / total_page_area (0.0 to 1.0).
    pub occupancy: f64,
    pub max_page_width: u32,
    pub max_page_height: u32,
    pub num_rotated: usize,
    /// Number of regions with cropped transparent borders.
    pub num_trimmed: usize,
}

impl PackStats {
    pub fn from_pages(pages: &[Page]) -> Self {
        let mut num_regions = 0;
        let mut total_page_area = 0u64;
        let mut used_area = 0u64;
        let mut max_page_width = 0u32;
        let mut max_page_height = 0u32;
        let mut num_rotated = 0;
        let mut num_trimmed = 0;

        for page in pages {
            total_page_area += (page.width as u64) * (page.height as u64);
            max_page_width = max_page_width.max(page.width);
            max_page_height = max_page_height.max(page.height);
            for region in &page.regions {
                num_regions += 1;
                used_area += region.frame.area();
                if region.rotated {
                    num_rotated += 1;
                }
                if region.trimmed {
                    num_trimmed += 1;
                }
            }
        }

        let occupancy = if total_page_area > 0 {
            used_area as f64 / total_page_area as f64
        } else {
            0.0
        };

        PackStats {
            num_pages: pages.len(),
            num_regions,
            total_page_area,
            used_area,
            occupancy,
            max_page_width,
            max_page_height,
            num_rotated,
            num_trimmed,
        }
    }

    /// Returns a human-readable summary of the statistics.
    pub fn summary(&self) -> String {
        format!(
            "Pages: {}, Regions: {}, Occupancy: {:.2}%, Total Area: {} px², Used Area: {} px², Rotated: {}, Trimmed: {}",
            self.num_pages,
            self.num_regions,
            self.occupancy * 100.0,
            self.total_page_area,
            self.used_area,
            self.num_rotated,
            self.num_trimmed,
        )
    }

    /// Returns wasted space in pixels.
    pub fn wasted_area(&self) -> u64 {
        self.total_page_area.saturating_sub(self.used_area)
    }
}
