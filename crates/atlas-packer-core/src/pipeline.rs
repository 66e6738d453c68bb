use std::collections::HashSet;

use image::RgbaImage;
use tracing::{debug, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::compositing::{self, ComposeOptions, SlotGeometry};
use crate::config::{DecodeErrorPolicy, PackerConfig};
use crate::descriptor::build_descriptors;
use crate::error::{AtlasError, Result};
use crate::model::{AtlasDescriptor, AtlasRegion, Meta, PackStats, Page, Rect};
use crate::packer::{Bin, BinOptions, PackRect, pack_rects};
use crate::source::{LoadedSource, SourceImage};

/// Output RGBA page and its logical page record.
pub struct OutputPage {
    pub page: Page,
    pub rgba: RgbaImage,
}

/// Output of a packing run: composed pages plus run metadata.
pub struct PackOutput {
    pub pages: Vec<OutputPage>,
    pub meta: Meta,
    /// Keys left out because their pixels could not be obtained.
    pub skipped: Vec<String>,
}

impl PackOutput {
    /// Builds one descriptor per page, named after `base_name`.
    pub fn descriptors(&self, base_name: &str) -> Vec<AtlasDescriptor> {
        let pages: Vec<Page> = self.pages.iter().map(|p| p.page.clone()).collect();
        build_descriptors(&pages, base_name, &self.meta)
    }

    pub fn stats(&self) -> PackStats {
        let pages: Vec<Page> = self.pages.iter().map(|p| p.page.clone()).collect();
        PackStats::from_pages(&pages)
    }

    /// Finds a region by name on any page.
    pub fn region(&self, name: &str) -> Option<&AtlasRegion> {
        self.pages
            .iter()
            .flat_map(|p| p.page.regions.iter())
            .find(|r| r.name == name)
    }
}

/// Packs `inputs` into atlas pages using configuration `cfg` and returns composed pages.
///
/// Notes:
/// - Packing order is deterministic: `sort_order` with ties kept in registration order.
/// - Pixels are obtained before packing; failures follow `on_decode_error`.
/// - With `trim`, only the visible bounds of each source are packed; a fully
///   transparent source keeps its whole size.
/// - A source that fits no bin aborts the run with [`AtlasError::Oversize`].
#[instrument(skip_all, fields(inputs = inputs.len()))]
pub fn pack_images(inputs: Vec<SourceImage>, cfg: PackerConfig) -> Result<PackOutput> {
    cfg.validate()?;
    if inputs.is_empty() {
        return Err(AtlasError::Empty);
    }
    ensure_unique(inputs.iter().map(|s| s.key.as_str()))?;

    let (loaded, skipped) = load_sources(inputs, cfg.on_decode_error)?;
    if loaded.is_empty() {
        return Err(AtlasError::Empty);
    }

    let crops: Vec<Rect> = loaded.iter().map(|s| crop_rect(s, &cfg)).collect();
    let rects = loaded
        .iter()
        .zip(&crops)
        .map(|(s, c)| slot_rect(&s.key, c.w, c.h, &cfg))
        .collect::<Result<Vec<_>>>()?;
    let bins = pack_rects(&rects, &bin_options(&cfg), cfg.sort_order)?;
    debug!(bins = bins.len(), "placement done");

    let opts = ComposeOptions::from(&cfg);
    let compose = |(page_id, bin): (usize, &Bin)| {
        let page = page_record(page_id, bin, &cfg, |id| {
            let s = &loaded[id];
            (s.key.clone(), crops[id], s.rgba.dimensions())
        });
        let rgba = compositing::composite(
            bin,
            page.width,
            page.height,
            |id| loaded.get(id).map(|s| (&s.rgba, crops[id])),
            &opts,
        );
        OutputPage { page, rgba }
    };
    #[cfg(feature = "parallel")]
    let pages: Vec<OutputPage> = bins.par_iter().enumerate().map(compose).collect();
    #[cfg(not(feature = "parallel"))]
    let pages: Vec<OutputPage> = bins.iter().enumerate().map(compose).collect();

    Ok(PackOutput {
        pages,
        meta: meta_for(&cfg),
        skipped,
    })
}

/// Packs sizes into pages without compositing pixel data.
/// Inputs are (key, width, height). Returns page records with regions; no RGBA pages.
/// There are no pixels to inspect, so `trim` has no effect here.
pub fn pack_layout<K: Into<String>>(
    inputs: Vec<(K, u32, u32)>,
    cfg: PackerConfig,
) -> Result<Vec<Page>> {
    cfg.validate()?;
    if inputs.is_empty() {
        return Err(AtlasError::Empty);
    }
    let items: Vec<(String, u32, u32)> = inputs
        .into_iter()
        .map(|(k, w, h)| (k.into(), w, h))
        .collect();
    ensure_unique(items.iter().map(|(k, _, _)| k.as_str()))?;

    let rects = items
        .iter()
        .map(|(k, w, h)| slot_rect(k, *w, *h, &cfg))
        .collect::<Result<Vec<_>>>()?;
    let bins = pack_rects(&rects, &bin_options(&cfg), cfg.sort_order)?;
    Ok(bins
        .iter()
        .enumerate()
        .map(|(page_id, bin)| {
            page_record(page_id, bin, &cfg, |id| {
                let (k, w, h) = &items[id];
                (k.clone(), Rect::new(0, 0, *w, *h), (*w, *h))
            })
        })
        .collect())
}

/// Run metadata shared by every descriptor of a run.
pub fn meta_for(cfg: &PackerConfig) -> Meta {
    Meta {
        schema_version: "1".into(),
        app: "atlas-packer".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        format: "RGBA8888".into(),
        max_dim: (cfg.max_width, cfg.max_height),
        padding: (cfg.border_padding, cfg.texture_padding),
        extrude: cfg.extrude,
        trim: cfg.trim,
        allow_rotation: cfg.allow_rotation,
        bleed: cfg.bleed,
        bleed_iterations: cfg.bleed_iterations,
    }
}

fn bin_options(cfg: &PackerConfig) -> BinOptions {
    BinOptions {
        width: cfg.max_width,
        height: cfg.max_height,
        border: cfg.border_padding,
        allow_rotation: cfg.allow_rotation,
        heuristic: cfg.heuristic,
    }
}

/// Slot for a `w x h` source plus the configured margins.
fn slot_rect<'a>(key: &'a str, w: u32, h: u32, cfg: &PackerConfig) -> Result<PackRect<'a>> {
    let margin = cfg.slot_margin();
    PackRect::with_margin(key, w, h, margin).ok_or_else(|| AtlasError::Oversize {
        key: key.to_string(),
        width: w.saturating_add(margin),
        height: h.saturating_add(margin),
        max_width: cfg.max_width,
        max_height: cfg.max_height,
    })
}

/// Part of `src` that gets packed: its visible bounds when trimming, else all of it.
fn crop_rect(src: &LoadedSource, cfg: &PackerConfig) -> Rect {
    let (w, h) = src.rgba.dimensions();
    let full = Rect::new(0, 0, w, h);
    if !cfg.trim {
        return full;
    }
    compositing::visible_bounds(&src.rgba, cfg.trim_threshold).unwrap_or(full)
}

fn ensure_unique<'a>(keys: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for key in keys {
        if !seen.insert(key) {
            return Err(AtlasError::InvalidConfig(format!("duplicate key '{key}'")));
        }
    }
    Ok(())
}

/// Obtains every source's pixels, in registration order.
fn load_sources(
    inputs: Vec<SourceImage>,
    policy: DecodeErrorPolicy,
) -> Result<(Vec<LoadedSource>, Vec<String>)> {
    #[cfg(feature = "parallel")]
    let results: Vec<(String, Result<LoadedSource>)> = inputs
        .into_par_iter()
        .map(|s| (s.key.clone(), s.load()))
        .collect();
    #[cfg(not(feature = "parallel"))]
    let results: Vec<(String, Result<LoadedSource>)> = inputs
        .into_iter()
        .map(|s| (s.key.clone(), s.load()))
        .collect();

    let mut loaded = Vec::with_capacity(results.len());
    let mut skipped = Vec::new();
    for (key, res) in results {
        match res {
            Ok(src) => loaded.push(src),
            Err(e) if policy == DecodeErrorPolicy::Skip => {
                warn!(%key, error = %e, "skipping source image");
                skipped.push(key);
            }
            Err(e) => return Err(e),
        }
    }
    Ok((loaded, skipped))
}

/// Builds the page record for `bin`.
/// `source_of` maps a placement id to `(key, packed part of the source, source size)`.
fn page_record<F>(page_id: usize, bin: &Bin, cfg: &PackerConfig, source_of: F) -> Page
where
    F: Fn(usize) -> (String, Rect, (u32, u32)),
{
    let regions = bin
        .placed()
        .iter()
        .map(|p| {
            let geom = SlotGeometry::of(p, cfg.extrude, cfg.texture_padding);
            let (name, source, (w, h)) = source_of(p.id);
            AtlasRegion {
                name,
                page: page_id,
                packed: geom.packed,
                frame: geom.frame,
                source,
                source_size: (w, h),
                trimmed: source != Rect::new(0, 0, w, h),
                rotated: p.rotated,
            }
        })
        .collect();
    let (width, height) = compute_page_size(bin, cfg);
    Page {
        id: page_id,
        width,
        height,
        regions,
    }
}

/// Compute final page dimensions given a filled bin and config.
fn compute_page_size(bin: &Bin, cfg: &PackerConfig) -> (u32, u32) {
    if cfg.force_max_dimensions {
        return (cfg.max_width, cfg.max_height);
    }
    let used = bin.used_bounds();
    let mut page_w = (used.right_ex() + cfg.border_padding).max(1);
    let mut page_h = (used.bottom_ex() + cfg.border_padding).max(1);
    if cfg.power_of_two {
        page_w = page_w.next_power_of_two();
        page_h = page_h.next_power_of_two();
    }
    if cfg.square {
        let m = page_w.max(page_h);
        page_w = m;
        page_h = m;
    }
    (page_w, page_h)
}
