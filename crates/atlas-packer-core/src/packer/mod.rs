use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{MaxRectsHeuristic, SortOrder};
use crate::error::{AtlasError, Result};
use crate::model::Rect;

pub mod maxrects;

pub use maxrects::Bin;

/// A rectangle to pack: source size plus margins. Its index in the input slice is its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackRect<'a> {
    pub key: &'a str,
    pub w: u32,
    pub h: u32,
}

impl<'a> PackRect<'a> {
    pub fn new(key: &'a str, w: u32, h: u32) -> Self {
        Self { key, w, h }
    }

    /// Slot for a `w x h` source with `margin` added on each axis.
    /// `None` when a side does not fit in `u32`.
    pub fn with_margin(key: &'a str, w: u32, h: u32, margin: u32) -> Option<Self> {
        Some(Self::new(key, w.checked_add(margin)?, h.checked_add(margin)?))
    }
}

/// A rectangle placed in a bin. `w,h` are in stored orientation (swapped when `rotated`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedRect {
    /// Index of the originating [`PackRect`].
    pub id: usize,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    pub rotated: bool,
}

impl PlacedRect {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.w, self.h)
    }
}

/// Bin geometry and placement rules shared by every bin of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinOptions {
    pub width: u32,
    pub height: u32,
    /// Inset applied on every side of the bin.
    pub border: u32,
    pub allow_rotation: bool,
    pub heuristic: MaxRectsHeuristic,
}

impl BinOptions {
    pub fn new(width: u32, height: u32, allow_rotation: bool) -> Self {
        Self {
            width,
            height,
            border: 0,
            allow_rotation,
            heuristic: MaxRectsHeuristic::default(),
        }
    }

    pub fn open_bin(&self) -> Bin {
        Bin::new(
            self.width,
            self.height,
            self.border,
            self.allow_rotation,
            self.heuristic,
        )
    }
}

/// Returns input indices in packing order. The sort is stable, so ties keep registration order.
pub fn packing_order(rects: &[PackRect<'_>], order: SortOrder) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..rects.len()).collect();
    match order {
        SortOrder::None => {}
        SortOrder::AreaDesc => idx.sort_by_key(|&i| {
            std::cmp::Reverse((rects[i].w as u64) * (rects[i].h as u64))
        }),
        SortOrder::MaxSideDesc => {
            idx.sort_by_key(|&i| std::cmp::Reverse(rects[i].w.max(rects[i].h)))
        }
        SortOrder::NameAsc => idx.sort_by(|&a, &b| rects[a].key.cmp(rects[b].key)),
    }
    idx
}

/// Packs `rects` into as few bins as the heuristic manages.
///
/// Rects are placed in [`packing_order`]. When the open bin cannot take the next
/// rect it is closed and a fresh bin is opened. A rect that fits no empty bin in
/// any allowed orientation aborts the run with [`AtlasError::Oversize`] before
/// anything is placed.
pub fn pack_rects(
    rects: &[PackRect<'_>],
    opts: &BinOptions,
    order: SortOrder,
) -> Result<Vec<Bin>> {
    if rects.is_empty() {
        return Ok(Vec::new());
    }
    if let Some(r) = rects.iter().find(|r| r.w == 0 || r.h == 0) {
        return Err(AtlasError::InvalidConfig(format!(
            "'{}' has a zero dimension ({}x{})",
            r.key, r.w, r.h
        )));
    }
    let mut current = opts.open_bin();
    if let Some(r) = rects.iter().find(|r| !current.admits(r.w, r.h)) {
        return Err(AtlasError::Oversize {
            key: r.key.to_string(),
            width: r.w,
            height: r.h,
            max_width: opts.width,
            max_height: opts.height,
        });
    }

    let mut bins: Vec<Bin> = Vec::new();
    for i in packing_order(rects, order) {
        let r = &rects[i];
        if current.insert(i, r.w, r.h).is_some() {
            continue;
        }
        debug!(
            bin = bins.len(),
            placed = current.placed().len(),
            "bin full, opening next"
        );
        let full = std::mem::replace(&mut current, opts.open_bin());
        bins.push(full);
        // an empty bin admits every rect checked above
        if current.insert(i, r.w, r.h).is_none() {
            return Err(AtlasError::Oversize {
                key: r.key.to_string(),
                width: r.w,
                height: r.h,
                max_width: opts.width,
                max_height: opts.height,
            });
        }
    }
    if !current.is_empty() {
        bins.push(current);
    }
    Ok(bins)
}
