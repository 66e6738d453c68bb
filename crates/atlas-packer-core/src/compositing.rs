use image::{Rgba, RgbaImage};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::{PackerConfig, RuntimeConfig};
use crate::model::Rect;
use crate::packer::{Bin, PlacedRect};

/// Pixel options applied when drawing placed rects onto a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComposeOptions {
    pub extrude: u32,
    pub texture_padding: u32,
    pub bleed: bool,
    pub bleed_iterations: u32,
    pub background: [u8; 4],
}

impl From<&PackerConfig> for ComposeOptions {
    fn from(cfg: &PackerConfig) -> Self {
        Self {
            extrude: cfg.extrude,
            texture_padding: cfg.texture_padding,
            bleed: cfg.bleed,
            bleed_iterations: cfg.bleed_iterations,
            background: [0, 0, 0, 0],
        }
    }
}

impl From<&RuntimeConfig> for ComposeOptions {
    fn from(cfg: &RuntimeConfig) -> Self {
        Self {
            extrude: cfg.extrude,
            texture_padding: cfg.texture_padding,
            bleed: cfg.bleed,
            bleed_iterations: cfg.bleed_iterations,
            background: cfg.background,
        }
    }
}

/// Where a placed slot's pixels land on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotGeometry {
    /// Content plus extrusion margin (the slot without padding).
    pub packed: Rect,
    /// Content only.
    pub frame: Rect,
}

impl SlotGeometry {
    /// Half the padding goes before the packed rect, the rest after it.
    pub fn of(placed: &PlacedRect, extrude: u32, texture_padding: u32) -> Self {
        let pad_half = texture_padding / 2;
        let packed = Rect::new(
            placed.x + pad_half,
            placed.y + pad_half,
            placed.w.saturating_sub(texture_padding),
            placed.h.saturating_sub(texture_padding),
        );
        let frame = Rect::new(
            packed.x + extrude,
            packed.y + extrude,
            packed.w.saturating_sub(extrude.saturating_mul(2)),
            packed.h.saturating_sub(extrude.saturating_mul(2)),
        );
        Self { packed, frame }
    }
}

/// Composes one page from the placements of `bin`.
///
/// `lookup` maps a placement id to its source pixels and the part of them to
/// draw; ids it cannot resolve are left as background. Output is fully
/// determined by the inputs.
pub fn composite<'a, F>(
    bin: &Bin,
    width: u32,
    height: u32,
    mut lookup: F,
    opts: &ComposeOptions,
) -> RgbaImage
where
    F: FnMut(usize) -> Option<(&'a RgbaImage, Rect)>,
{
    let mut canvas = RgbaImage::from_pixel(width, height, Rgba(opts.background));
    for placed in bin.placed() {
        if let Some((src, src_rect)) = lookup(placed.id) {
            draw_placed(&mut canvas, placed, src, src_rect, opts);
        }
    }
    if opts.bleed {
        bleed(&mut canvas, opts.bleed_iterations);
    }
    canvas
}

/// Blits `src_rect` of `src` into its slot and extrudes the slot edges. Returns the slot geometry.
pub fn draw_placed(
    canvas: &mut RgbaImage,
    placed: &PlacedRect,
    src: &RgbaImage,
    src_rect: Rect,
    opts: &ComposeOptions,
) -> SlotGeometry {
    let geom = SlotGeometry::of(placed, opts.extrude, opts.texture_padding);
    blit_rgba(
        src,
        src_rect,
        canvas,
        geom.frame.x,
        geom.frame.y,
        placed.rotated,
    );
    extrude_edges(canvas, geom.frame, opts.extrude);
    geom
}

/// Copies `src_rect` of `src` to `(dx, dy)` of `canvas`.
///
/// `src_rect` is first clipped to `src`, the copy then to the canvas.
/// When `rotated`, the copy is a 90° clockwise rotation done in the same pass:
/// the destination pixel at local `(x, y)` reads source `(y, src_rect.h - 1 - x)`.
pub fn blit_rgba(
    src: &RgbaImage,
    src_rect: Rect,
    canvas: &mut RgbaImage,
    dx: u32,
    dy: u32,
    rotated: bool,
) {
    let src_rect = src_rect.clipped(src.width(), src.height());
    let (cw, ch) = canvas.dimensions();
    let src_stride = src.width() as usize * 4;
    let dst_stride = cw as usize * 4;
    let (rw, rh) = if rotated {
        (src_rect.h, src_rect.w)
    } else {
        (src_rect.w, src_rect.h)
    };
    let vis_w = rw.min(cw.saturating_sub(dx)) as usize;
    let vis_h = rh.min(ch.saturating_sub(dy));
    if vis_w == 0 || vis_h == 0 {
        return;
    }
    let src_buf = src.as_raw();
    let dst_buf: &mut [u8] = &mut **canvas;

    for yy in 0..vis_h {
        let dst_row = (dy + yy) as usize * dst_stride + dx as usize * 4;
        let dst = &mut dst_buf[dst_row..dst_row + vis_w * 4];
        if rotated {
            let sx = (src_rect.x + yy) as usize * 4;
            for (xx, px) in dst.chunks_exact_mut(4).enumerate() {
                let sy = (src_rect.y + src_rect.h - 1) as usize - xx;
                let o = sy * src_stride + sx;
                px.copy_from_slice(&src_buf[o..o + 4]);
            }
        } else {
            let o = (src_rect.y + yy) as usize * src_stride + src_rect.x as usize * 4;
            dst.copy_from_slice(&src_buf[o..o + vis_w * 4]);
        }
    }
}

/// Replicates the border pixels of `content` outward by `extrude` pixels.
///
/// Left/right columns are extended first, then the widened top/bottom rows are
/// copied outward, which fills each corner block with its corner pixel.
pub fn extrude_edges(canvas: &mut RgbaImage, content: Rect, extrude: u32) {
    let (cw, ch) = canvas.dimensions();
    if extrude == 0 || content.is_empty() || content.right_ex() > cw || content.bottom_ex() > ch
    {
        return;
    }
    let left = extrude.min(content.x) as usize;
    let right = extrude.min(cw - content.right_ex()) as usize;
    let top = extrude.min(content.y) as usize;
    let bottom = extrude.min(ch - content.bottom_ex()) as usize;
    let stride = cw as usize * 4;
    let buf: &mut [u8] = &mut **canvas;

    for y in content.y..content.bottom_ex() {
        let row = y as usize * stride;
        let first = row + content.x as usize * 4;
        let last = row + (content.right_ex() - 1) as usize * 4;
        for i in 1..=left {
            buf.copy_within(first..first + 4, first - i * 4);
        }
        for i in 1..=right {
            buf.copy_within(last..last + 4, last + i * 4);
        }
    }

    let x0 = (content.x as usize - left) * 4;
    let span = (content.w as usize + left + right) * 4;
    let top_row = content.y as usize * stride + x0;
    for i in 1..=top {
        let dst = (content.y as usize - i) * stride + x0;
        buf.copy_within(top_row..top_row + span, dst);
    }
    let bottom_row = (content.bottom_ex() as usize - 1) * stride + x0;
    for i in 1..=bottom {
        let dst = (content.bottom_ex() as usize - 1 + i) * stride + x0;
        buf.copy_within(bottom_row..bottom_row + span, dst);
    }
}

/// Bounds of the pixels with alpha above `threshold`, or `None` if there are none.
pub fn visible_bounds(img: &RgbaImage, threshold: u8) -> Option<Rect> {
    let w = img.width() as usize;
    if w == 0 {
        return None;
    }
    let (mut x1, mut y1, mut x2, mut y2) = (usize::MAX, usize::MAX, 0, 0);
    for (y, row) in img.as_raw().chunks_exact(w * 4).enumerate() {
        let mut visible = row
            .chunks_exact(4)
            .enumerate()
            .filter(|(_, p)| p[3] > threshold)
            .map(|(x, _)| x);
        let Some(first) = visible.next() else {
            continue;
        };
        let last = visible.last().unwrap_or(first);
        x1 = x1.min(first);
        x2 = x2.max(last);
        y1 = y1.min(y);
        y2 = y;
    }
    (y1 != usize::MAX).then(|| {
        Rect::new(
            x1 as u32,
            y1 as u32,
            (x2 - x1 + 1) as u32,
            (y2 - y1 + 1) as u32,
        )
    })
}

/// Color bleed over the whole canvas. See [`bleed_region`].
pub fn bleed(canvas: &mut RgbaImage, iterations: u32) {
    let (w, h) = canvas.dimensions();
    bleed_region(canvas, Rect::new(0, 0, w, h), iterations);
}

/// Spreads opaque colors into fully transparent pixels of `region`, one pixel per iteration.
///
/// A pixel with alpha 0 takes the average RGB of its colored 4-neighbors and
/// becomes colored itself for the next iteration; alpha is never changed.
/// Each iteration reads the previous buffer and writes a fresh one, so the
/// result does not depend on visiting order.
///
/// Pixels up to `iterations` beyond `region` are read, so the pixels inside
/// come out exactly as a whole-canvas pass would leave them. Only pixels inside
/// `region` are written.
pub fn bleed_region(canvas: &mut RgbaImage, region: Rect, iterations: u32) {
    let (cw, ch) = canvas.dimensions();
    let region = region.clipped(cw, ch);
    if iterations == 0 || region.is_empty() {
        return;
    }
    let window = region.expand_clamped(iterations, cw, ch);
    let (w, h) = (window.w as usize, window.h as usize);
    let stride = cw as usize * 4;

    let mut cur = vec![0u8; w * h * 4];
    {
        let buf: &[u8] = canvas.as_raw();
        for y in 0..h {
            let o = (window.y as usize + y) * stride + window.x as usize * 4;
            cur[y * w * 4..(y + 1) * w * 4].copy_from_slice(&buf[o..o + w * 4]);
        }
    }
    let mut known: Vec<bool> = cur.chunks_exact(4).map(|p| p[3] > 0).collect();
    let mut next = cur.clone();
    let mut next_known = known.clone();

    for _ in 0..iterations {
        let grid = BleedGrid {
            rgba: &cur,
            known: &known,
            w,
            h,
        };
        #[cfg(feature = "parallel")]
        let changed = next
            .par_chunks_mut(w * 4)
            .zip(next_known.par_chunks_mut(w))
            .enumerate()
            .map(|(y, (row, krow))| grid.bleed_row(y, row, krow))
            .reduce(|| false, |a, b| a || b);
        #[cfg(not(feature = "parallel"))]
        let changed = next
            .chunks_mut(w * 4)
            .zip(next_known.chunks_mut(w))
            .enumerate()
            .map(|(y, (row, krow))| grid.bleed_row(y, row, krow))
            .fold(false, |a, b| a || b);
        if !changed {
            break;
        }
        cur.copy_from_slice(&next);
        known.copy_from_slice(&next_known);
    }

    let (ox, oy) = ((region.x - window.x) as usize, (region.y - window.y) as usize);
    let rw = region.w as usize * 4;
    let buf: &mut [u8] = &mut **canvas;
    for y in 0..region.h as usize {
        let o = (region.y as usize + y) * stride + region.x as usize * 4;
        let s = ((oy + y) * w + ox) * 4;
        buf[o..o + rw].copy_from_slice(&cur[s..s + rw]);
    }
}

/// Read-only view of one bleed iteration's input.
struct BleedGrid<'a> {
    rgba: &'a [u8],
    known: &'a [bool],
    w: usize,
    h: usize,
}

impl BleedGrid<'_> {
    /// Fills row `y` of the output. Returns true if any pixel became colored.
    fn bleed_row(&self, y: usize, out: &mut [u8], out_known: &mut [bool]) -> bool {
        let mut changed = false;
        for x in 0..self.w {
            let i = y * self.w + x;
            if self.known[i] {
                continue;
            }
            let mut sum = [0u32; 3];
            let mut count = 0u32;
            let mut add = |j: usize| {
                if self.known[j] {
                    let p = &self.rgba[j * 4..j * 4 + 3];
                    sum[0] += p[0] as u32;
                    sum[1] += p[1] as u32;
                    sum[2] += p[2] as u32;
                    count += 1;
                }
            };
            if x > 0 {
                add(i - 1);
            }
            if x + 1 < self.w {
                add(i + 1);
            }
            if y > 0 {
                add(i - self.w);
            }
            if y + 1 < self.h {
                add(i + self.w);
            }
            if count > 0 {
                let px = &mut out[x * 4..x * 4 + 3];
                for c in 0..3 {
                    px[c] = (sum[c] / count) as u8;
                }
                out_known[x] = true;
                changed = true;
            }
        }
        changed
    }
}
