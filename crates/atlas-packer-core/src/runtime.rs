//! Incremental atlas packing for assets requested while the application runs.
//!
//! Producers call [`RuntimeAtlasPacker::request`] (or [`AtlasRequester::request`]
//! from other threads) and get a [`RegionHandle`] back immediately. Nothing is
//! decoded or placed until the owner calls [`RuntimeAtlasPacker::flush`], which
//! decodes the queued images, places them into the existing pages (reusing their
//! leftover free space), grows or opens pages as needed and reports which page
//! areas changed so only those need to be uploaded.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use image::{Rgba, RgbaImage, imageops};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::compositing::{self, ComposeOptions};
use crate::config::{RuntimeConfig, SortOrder};
use crate::descriptor::build_descriptors;
use crate::error::{AtlasError, Result};
use crate::model::{AtlasDescriptor, AtlasRegion, Meta, PackStats, Page, Rect};
use crate::packer::{Bin, PackRect, PlacedRect, packing_order};
use crate::source::{LoadedSource, SourceImage};

/// Resolution state of a requested region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleState {
    /// Queued; waiting for the next flush.
    Pending,
    /// Placed and composed.
    Resolved(AtlasRegion),
    /// Rejected; the message says why. The name may be requested again.
    Failed(String),
}

struct HandleInner {
    name: String,
    width: u32,
    height: u32,
    state: RwLock<HandleState>,
}

/// Forward reference to a region that becomes usable after a flush.
///
/// Clones share state. Two handles compare equal only if they come from the
/// same request.
#[derive(Clone)]
pub struct RegionHandle {
    inner: Arc<HandleInner>,
}

impl RegionHandle {
    fn new(name: String, width: u32, height: u32) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                name,
                width,
                height,
                state: RwLock::new(HandleState::Pending),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Requested size, in source orientation.
    pub fn size(&self) -> (u32, u32) {
        (self.inner.width, self.inner.height)
    }

    pub fn state(&self) -> HandleState {
        self.inner.state.read().clone()
    }

    /// The placed region, once resolved.
    pub fn resolved(&self) -> Option<AtlasRegion> {
        match &*self.inner.state.read() {
            HandleState::Resolved(region) => Some(region.clone()),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(*self.inner.state.read(), HandleState::Resolved(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(*self.inner.state.read(), HandleState::Failed(_))
    }

    fn resolve(&self, region: AtlasRegion) {
        *self.inner.state.write() = HandleState::Resolved(region);
    }

    fn fail(&self, reason: impl Into<String>) {
        *self.inner.state.write() = HandleState::Failed(reason.into());
    }
}

impl PartialEq for RegionHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for RegionHandle {}

impl fmt::Debug for RegionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionHandle")
            .field("name", &self.inner.name)
            .field("size", &self.size())
            .field("state", &*self.inner.state.read())
            .finish()
    }
}

struct PendingRequest {
    handle: RegionHandle,
    source: SourceImage,
}

#[derive(Default)]
struct RequestQueue {
    /// Every name that is pending or resolved. Failed names are removed.
    handles: HashMap<String, RegionHandle>,
    pending: Vec<PendingRequest>,
}

#[derive(Default)]
struct Shared {
    queue: Mutex<RequestQueue>,
}

impl Shared {
    fn request<F>(&self, name: String, width: u32, height: u32, decode: F) -> RegionHandle
    where
        F: FnOnce() -> Result<RgbaImage> + Send + 'static,
    {
        let mut queue = self.queue.lock();
        if let Some(handle) = queue.handles.get(&name) {
            return handle.clone();
        }
        let handle = RegionHandle::new(name.clone(), width, height);
        if width == 0 || height == 0 {
            warn!(%name, width, height, "rejecting zero-sized request");
            handle.fail(format!("zero-sized request {width}x{height}"));
            return handle;
        }
        queue.handles.insert(name.clone(), handle.clone());
        queue.pending.push(PendingRequest {
            handle: handle.clone(),
            source: SourceImage::deferred(name, width, height, decode),
        });
        handle
    }

    /// Drops `handle` from the name index so the name can be requested again.
    fn forget(&self, handle: &RegionHandle) {
        let mut queue = self.queue.lock();
        if queue
            .handles
            .get(handle.name())
            .is_some_and(|h| h == handle)
        {
            queue.handles.remove(handle.name());
        }
    }
}

/// Cloneable producer side of a [`RuntimeAtlasPacker`]. Safe to use from any thread.
#[derive(Clone)]
pub struct AtlasRequester {
    shared: Arc<Shared>,
}

impl AtlasRequester {
    /// See [`RuntimeAtlasPacker::request`].
    pub fn request<F>(
        &self,
        name: impl Into<String>,
        width: u32,
        height: u32,
        decode: F,
    ) -> RegionHandle
    where
        F: FnOnce() -> Result<RgbaImage> + Send + 'static,
    {
        self.shared.request(name.into(), width, height, decode)
    }
}

/// Page area changed by a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateRegion {
    pub page_id: usize,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// The page was created or reallocated at a new size; upload it whole.
    pub resized: bool,
}

impl UpdateRegion {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn area(&self) -> u64 {
        (self.width as u64) * (self.height as u64)
    }
}

/// Outcome of one [`RuntimeAtlasPacker::flush`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Number of requests placed by this flush.
    pub resolved: usize,
    /// Names whose pixels could not be obtained. Failures from a flush that
    /// returned an error are reported by the next one.
    pub failed: Vec<String>,
    /// Changed page areas, at most one per page, in page order.
    pub updates: Vec<UpdateRegion>,
    pub pages_added: usize,
}

struct RuntimePage {
    bin: Bin,
    image: RgbaImage,
    regions: Vec<AtlasRegion>,
}

/// Where one decoded request goes.
struct Placement {
    index: usize,
    page: usize,
    placed: PlacedRect,
}

/// Bin states after placing a whole batch, computed without touching the packer.
struct Plan {
    bins: Vec<Bin>,
    placements: Vec<Placement>,
}

/// Online atlas packer: requests are queued by any thread and applied in batches by `flush`.
pub struct RuntimeAtlasPacker {
    cfg: RuntimeConfig,
    compose: ComposeOptions,
    shared: Arc<Shared>,
    pages: Vec<RuntimePage>,
    /// Decode failures of a flush that ended in an error.
    unreported: Vec<String>,
}

impl RuntimeAtlasPacker {
    pub fn new(cfg: RuntimeConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            compose: ComposeOptions::from(&cfg),
            cfg,
            shared: Arc::new(Shared::default()),
            pages: Vec::new(),
            unreported: Vec::new(),
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.cfg
    }

    /// Producer handle sharing this packer's request queue.
    pub fn requester(&self) -> AtlasRequester {
        AtlasRequester {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Queues `name` for packing and returns its handle without decoding or placing anything.
    ///
    /// Requesting a name that is pending or already resolved returns the existing
    /// handle and drops `decode` unused.
    pub fn request<F>(
        &self,
        name: impl Into<String>,
        width: u32,
        height: u32,
        decode: F,
    ) -> RegionHandle
    where
        F: FnOnce() -> Result<RgbaImage> + Send + 'static,
    {
        self.shared.request(name.into(), width, height, decode)
    }

    /// Applies every queued request.
    ///
    /// A request that cannot be placed even on a maximum-size page fails with
    /// [`AtlasError::Capacity`]; one that needs a page beyond `max_pages` fails
    /// with [`AtlasError::PageLimit`]. In both cases nothing is committed, the
    /// offending handle becomes failed and the rest of the batch is queued again.
    /// Names that failed to decode in that flush go into the next report.
    #[instrument(skip_all)]
    pub fn flush(&mut self) -> Result<FlushReport> {
        let batch = std::mem::take(&mut self.shared.queue.lock().pending);
        let mut report = FlushReport {
            failed: std::mem::take(&mut self.unreported),
            ..FlushReport::default()
        };
        if batch.is_empty() {
            return Ok(report);
        }
        debug!(requests = batch.len(), "flushing");

        let mut ready: Vec<(RegionHandle, LoadedSource)> = Vec::with_capacity(batch.len());
        for (handle, res) in decode_batch(batch) {
            match res {
                Ok(src) => ready.push((handle, src)),
                Err(e) => {
                    warn!(name = handle.name(), error = %e, "runtime request failed to decode");
                    handle.fail(e.to_string());
                    self.shared.forget(&handle);
                    report.failed.push(handle.name().to_string());
                }
            }
        }
        if ready.is_empty() {
            return Ok(report);
        }

        let plan = match self.plan(&ready) {
            Ok(plan) => plan,
            Err((index, err)) => {
                warn!(error = %err, "runtime request rejected");
                let (handle, _) = &ready[index];
                handle.fail(err.to_string());
                self.shared.forget(handle);
                self.requeue(ready, index);
                self.unreported = report.failed;
                return Err(err);
            }
        };
        self.commit(plan, &ready, &mut report);
        report.resolved = ready.len();
        Ok(report)
    }

    /// Places the batch on cloned bins. Errors carry the batch index of the offending request.
    fn plan(
        &self,
        ready: &[(RegionHandle, LoadedSource)],
    ) -> std::result::Result<Plan, (usize, AtlasError)> {
        let margin = self.cfg.slot_margin();
        let mut rects: Vec<PackRect<'_>> = Vec::with_capacity(ready.len());
        for (index, (_, s)) in ready.iter().enumerate() {
            let (w, h) = s.rgba.dimensions();
            let rect = PackRect::with_margin(&s.key, w, h, margin).ok_or_else(|| {
                let (sw, sh) = (w.saturating_add(margin), h.saturating_add(margin));
                (index, self.capacity_error(&s.key, sw, sh))
            })?;
            rects.push(rect);
        }
        let mut bins: Vec<Bin> = self.pages.iter().map(|p| p.bin.clone()).collect();
        let mut placements = Vec::with_capacity(rects.len());
        for index in packing_order(&rects, SortOrder::AreaDesc) {
            let (page, placed) = self
                .place_one(&mut bins, index, &rects[index])
                .map_err(|e| (index, e))?;
            placements.push(Placement {
                index,
                page,
                placed,
            });
        }
        Ok(Plan { bins, placements })
    }

    /// Free space of existing pages first, then growth of existing pages, then a new page.
    fn place_one(
        &self,
        bins: &mut Vec<Bin>,
        id: usize,
        r: &PackRect<'_>,
    ) -> Result<(usize, PlacedRect)> {
        let capacity = || self.capacity_error(r.key, r.w, r.h);
        if !self.open_bin(self.cfg.max_width, self.cfg.max_height).admits(r.w, r.h) {
            return Err(capacity());
        }
        for (page, bin) in bins.iter_mut().enumerate() {
            if let Some(placed) = bin.insert(id, r.w, r.h) {
                return Ok((page, placed));
            }
        }
        for (page, bin) in bins.iter_mut().enumerate() {
            if let Some(placed) = self.grow_into(bin, id, r.w, r.h) {
                debug!(page, width = bin.width(), height = bin.height(), "page grown");
                return Ok((page, placed));
            }
        }
        if let Some(max_pages) = self.cfg.max_pages {
            if bins.len() >= max_pages {
                return Err(AtlasError::PageLimit { max_pages });
            }
        }
        let mut bin = self.open_bin(self.cfg.initial_width, self.cfg.initial_height);
        let placed = match bin.insert(id, r.w, r.h) {
            Some(placed) => placed,
            None => self.grow_into(&mut bin, id, r.w, r.h).ok_or_else(capacity)?,
        };
        debug!(page = bins.len(), "page opened");
        bins.push(bin);
        Ok((bins.len() - 1, placed))
    }

    /// Doubles `bin` step by step until the rect fits. Leaves `bin` untouched if it
    /// would not fit even at the maximum size.
    fn grow_into(&self, bin: &mut Bin, id: usize, w: u32, h: u32) -> Option<PlacedRect> {
        let (max_w, max_h) = (self.cfg.max_width, self.cfg.max_height);
        let mut at_max = bin.clone();
        at_max.grow(max_w, max_h);
        at_max.find_position(w, h)?;
        while let Some((nw, nh)) = next_page_size(bin.width(), bin.height(), max_w, max_h) {
            bin.grow(nw, nh);
            if let Some(placed) = bin.insert(id, w, h) {
                return Some(placed);
            }
        }
        None
    }

    fn capacity_error(&self, key: &str, width: u32, height: u32) -> AtlasError {
        AtlasError::Capacity {
            key: key.to_string(),
            width,
            height,
            max_width: self.cfg.max_width,
            max_height: self.cfg.max_height,
        }
    }

    fn open_bin(&self, width: u32, height: u32) -> Bin {
        Bin::new(width, height, 0, self.cfg.allow_rotation, self.cfg.heuristic)
    }

    /// Puts the batch back at the front of the queue, minus the rejected request.
    fn requeue(&self, ready: Vec<(RegionHandle, LoadedSource)>, rejected: usize) {
        let retry: Vec<PendingRequest> = ready
            .into_iter()
            .enumerate()
            .filter(|(i, _)| *i != rejected)
            .map(|(_, (handle, src))| PendingRequest {
                handle,
                source: SourceImage::from_rgba(src.key, src.rgba),
            })
            .collect();
        let mut queue = self.shared.queue.lock();
        queue.pending.splice(0..0, retry);
    }

    fn commit(
        &mut self,
        plan: Plan,
        ready: &[(RegionHandle, LoadedSource)],
        report: &mut FlushReport,
    ) {
        let Plan { bins, placements } = plan;
        let background = Rgba(self.cfg.background);
        let mut resized = vec![false; bins.len()];
        for (page_id, bin) in bins.into_iter().enumerate() {
            let (w, h) = (bin.width(), bin.height());
            match self.pages.get_mut(page_id) {
                Some(page) => {
                    if page.image.dimensions() != (w, h) {
                        page.image = reallocate(&page.image, w, h, background);
                        resized[page_id] = true;
                    }
                    page.bin = bin;
                }
                None => {
                    self.pages.push(RuntimePage {
                        bin,
                        image: RgbaImage::from_pixel(w, h, background),
                        regions: Vec::new(),
                    });
                    resized[page_id] = true;
                    report.pages_added += 1;
                }
            }
        }

        let mut dirty: Vec<Option<Rect>> = vec![None; self.pages.len()];
        for Placement {
            index,
            page,
            placed,
        } in placements
        {
            let (handle, src) = &ready[index];
            let rt = &mut self.pages[page];
            let (sw, sh) = src.rgba.dimensions();
            let source = Rect::new(0, 0, sw, sh);
            let geom =
                compositing::draw_placed(&mut rt.image, &placed, &src.rgba, source, &self.compose);
            let region = AtlasRegion {
                name: src.key.clone(),
                page,
                packed: geom.packed,
                frame: geom.frame,
                source,
                source_size: (sw, sh),
                trimmed: false,
                rotated: placed.rotated,
            };
            rt.regions.push(region.clone());
            handle.resolve(region);
            let slot = placed.rect();
            dirty[page] = Some(dirty[page].map_or(slot, |d| d.union(&slot)));
        }

        for (page_id, rt) in self.pages.iter_mut().enumerate() {
            let (pw, ph) = rt.image.dimensions();
            let rect = if resized[page_id] {
                Rect::new(0, 0, pw, ph)
            } else if let Some(d) = dirty[page_id] {
                d
            } else {
                continue;
            };
            let rect = if self.compose.bleed {
                let grown = rect.expand_clamped(self.compose.bleed_iterations, pw, ph);
                compositing::bleed_region(&mut rt.image, grown, self.compose.bleed_iterations);
                grown
            } else {
                rect
            };
            report.updates.push(UpdateRegion {
                page_id,
                x: rect.x,
                y: rect.y,
                width: rect.w,
                height: rect.h,
                resized: resized[page_id],
            });
        }
    }

    /// Resolved region for `name`, if any.
    pub fn get(&self, name: &str) -> Option<AtlasRegion> {
        self.shared
            .queue
            .lock()
            .handles
            .get(name)
            .and_then(RegionHandle::resolved)
    }

    /// True if `name` is pending or resolved.
    pub fn contains(&self, name: &str) -> bool {
        self.shared.queue.lock().handles.contains_key(name)
    }

    pub fn pending_len(&self) -> usize {
        self.shared.queue.lock().pending.len()
    }

    pub fn num_pages(&self) -> usize {
        self.pages.len()
    }

    pub fn page_image(&self, page_id: usize) -> Option<&RgbaImage> {
        self.pages.get(page_id).map(|p| &p.image)
    }

    /// Copies the pixels covered by `update`, for partial texture upload.
    pub fn region_pixels(&self, update: &UpdateRegion) -> Option<RgbaImage> {
        let image = self.page_image(update.page_id)?;
        let (pw, ph) = image.dimensions();
        if update.is_empty() || update.x + update.width > pw || update.y + update.height > ph {
            return None;
        }
        Some(imageops::crop_imm(image, update.x, update.y, update.width, update.height).to_image())
    }

    /// Logical page records of the current state.
    pub fn pages(&self) -> Vec<Page> {
        self.pages
            .iter()
            .enumerate()
            .map(|(id, p)| Page {
                id,
                width: p.image.width(),
                height: p.image.height(),
                regions: p.regions.clone(),
            })
            .collect()
    }

    /// Descriptors of the current pages, named after `base_name`.
    pub fn snapshot_descriptors(&self, base_name: &str) -> Vec<AtlasDescriptor> {
        build_descriptors(&self.pages(), base_name, &self.meta())
    }

    pub fn stats(&self) -> PackStats {
        PackStats::from_pages(&self.pages())
    }

    fn meta(&self) -> Meta {
        Meta {
            schema_version: "1".into(),
            app: "atlas-packer".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            format: "RGBA8888".into(),
            max_dim: (self.cfg.max_width, self.cfg.max_height),
            padding: (0, self.cfg.texture_padding),
            extrude: self.cfg.extrude,
            trim: false,
            allow_rotation: self.cfg.allow_rotation,
            bleed: self.cfg.bleed,
            bleed_iterations: self.cfg.bleed_iterations,
        }
    }
}

/// Obtains the pixels of every queued request, in queue order.
fn decode_batch(batch: Vec<PendingRequest>) -> Vec<(RegionHandle, Result<LoadedSource>)> {
    #[cfg(feature = "parallel")]
    let iter = batch.into_par_iter();
    #[cfg(not(feature = "parallel"))]
    let iter = batch.into_iter();
    iter.map(|p| (p.handle, p.source.load())).collect()
}

/// Next power-of-two step towards the maximum: the narrower side doubles first.
fn next_page_size(w: u32, h: u32, max_w: u32, max_h: u32) -> Option<(u32, u32)> {
    let can_w = w < max_w;
    let can_h = h < max_h;
    match (can_w, can_h) {
        (false, false) => None,
        (true, true) if w <= h => Some((w.saturating_mul(2).min(max_w), h)),
        (true, true) => Some((w, h.saturating_mul(2).min(max_h))),
        (true, false) => Some((w.saturating_mul(2).min(max_w), h)),
        (false, true) => Some((w, h.saturating_mul(2).min(max_h))),
    }
}

/// New page buffer of `w x h` holding the old content at the origin.
fn reallocate(old: &RgbaImage, w: u32, h: u32, background: Rgba<u8>) -> RgbaImage {
    let mut image = RgbaImage::from_pixel(w, h, background);
    let (ow, oh) = old.dimensions();
    compositing::blit_rgba(old, Rect::new(0, 0, ow, oh), &mut image, 0, 0, false);
    image
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growth_doubles_the_narrower_side_first() {
        assert_eq!(next_page_size(256, 256, 1024, 1024), Some((512, 256)));
        assert_eq!(next_page_size(512, 256, 1024, 1024), Some((512, 512)));
        assert_eq!(next_page_size(1024, 512, 1024, 1024), Some((1024, 1024)));
        assert_eq!(next_page_size(1024, 1024, 1024, 1024), None);
    }
}
