use atlas_packer_core::compositing::{bleed, bleed_region, blit_rgba, extrude_edges};
use atlas_packer_core::prelude::*;
use image::{Rgba, RgbaImage};

/// Every pixel distinct so any misplaced copy shows up.
fn gradient(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, y| Rgba([x as u8 * 10 + 1, y as u8 * 10 + 1, 77, 255]))
}

fn cfg(max_w: u32, max_h: u32) -> PackerConfigBuilder {
    PackerConfig::builder()
        .with_max_dimensions(max_w, max_h)
        .bleed(false)
}

#[test]
fn rotated_region_maps_back_to_source_pixels() {
    let src = gradient(8, 16);
    let out = pack_images(
        vec![SourceImage::from_rgba("tall", src.clone())],
        cfg(16, 8).build(),
    )
    .unwrap();
    let page = &out.pages[0];
    let region = &page.page.regions[0];
    assert!(region.rotated);
    assert_eq!(region.frame, Rect::new(0, 0, 16, 8));
    assert_eq!(region.source, Rect::new(0, 0, 8, 16));

    for sy in 0..16 {
        for sx in 0..8 {
            let (px, py) = region.page_coord(sx, sy).unwrap();
            assert_eq!(page.rgba.get_pixel(px, py), src.get_pixel(sx, sy));
        }
    }
    // stored pixel at local (x, y) is source (y, source_h - 1 - x)
    for y in 0..8 {
        for x in 0..16 {
            assert_eq!(page.rgba.get_pixel(x, y), src.get_pixel(y, 15 - x));
        }
    }
}

#[test]
fn extrusion_replicates_edges_and_corners() {
    let src = gradient(4, 4);
    let out = pack_images(
        vec![SourceImage::from_rgba("sq", src.clone())],
        cfg(64, 64).extrude(2).build(),
    )
    .unwrap();
    let page = &out.pages[0];
    assert_eq!(page.rgba.dimensions(), (8, 8));
    let region = &page.page.regions[0];
    assert_eq!(region.packed, Rect::new(0, 0, 8, 8));
    assert_eq!(region.frame, Rect::new(2, 2, 4, 4));
    for py in 0..8u32 {
        for px in 0..8u32 {
            let sx = px.saturating_sub(2).min(3);
            let sy = py.saturating_sub(2).min(3);
            assert_eq!(page.rgba.get_pixel(px, py), src.get_pixel(sx, sy), "at {px},{py}");
        }
    }
}

#[test]
fn extrusion_follows_rotated_content() {
    let src = gradient(4, 8);
    let out = pack_images(
        vec![SourceImage::from_rgba("r", src.clone())],
        cfg(10, 6).extrude(1).build(),
    )
    .unwrap();
    let page = &out.pages[0];
    let region = &page.page.regions[0];
    assert!(region.rotated);
    assert_eq!(region.packed, Rect::new(0, 0, 10, 6));
    assert_eq!(region.frame, Rect::new(1, 1, 8, 4));
    for py in 0..6u32 {
        for px in 0..10u32 {
            let lx = px.saturating_sub(1).min(7);
            let ly = py.saturating_sub(1).min(3);
            assert_eq!(page.rgba.get_pixel(px, py), src.get_pixel(ly, 7 - lx), "at {px},{py}");
        }
    }
}

#[test]
fn extrusion_is_clipped_at_the_canvas_edge() {
    let mut canvas = RgbaImage::new(4, 4);
    canvas.put_pixel(0, 0, Rgba([9, 9, 9, 255]));
    extrude_edges(&mut canvas, Rect::new(0, 0, 1, 1), 3);
    for y in 0..4 {
        for x in 0..4 {
            assert_eq!(canvas.get_pixel(x, y), &Rgba([9, 9, 9, 255]));
        }
    }
}

#[test]
fn blit_clips_to_canvas() {
    let src = gradient(6, 6);
    let mut canvas = RgbaImage::new(4, 4);
    blit_rgba(&src, Rect::new(0, 0, 6, 6), &mut canvas, 2, 2, false);
    assert_eq!(canvas.get_pixel(2, 2), src.get_pixel(0, 0));
    assert_eq!(canvas.get_pixel(3, 3), src.get_pixel(1, 1));
    assert_eq!(canvas.get_pixel(0, 0)[3], 0);
}

#[test]
fn blit_clips_source_rect_to_the_source_image() {
    let src = gradient(4, 4);
    let mut canvas = RgbaImage::new(16, 16);
    blit_rgba(&src, Rect::new(2, 2, 4, 4), &mut canvas, 0, 0, false);
    assert_eq!(canvas.get_pixel(0, 0), src.get_pixel(2, 2));
    assert_eq!(canvas.get_pixel(1, 1), src.get_pixel(3, 3));
    assert_eq!(canvas.get_pixel(2, 0)[3], 0);
    assert_eq!(canvas.get_pixel(0, 2)[3], 0);

    // entirely outside the source: nothing to copy
    let before = canvas.clone();
    blit_rgba(&src, Rect::new(9, 9, 4, 4), &mut canvas, 4, 4, true);
    blit_rgba(&src, Rect::new(u32::MAX, 0, 4, 4), &mut canvas, 4, 4, false);
    assert_eq!(canvas.as_raw(), before.as_raw());

    // rotated copy of the clipped 2x4 column strip
    let mut rot = RgbaImage::new(16, 16);
    blit_rgba(&src, Rect::new(2, 0, 4, 4), &mut rot, 0, 0, true);
    assert_eq!(rot.get_pixel(0, 0), src.get_pixel(2, 3));
    assert_eq!(rot.get_pixel(3, 1), src.get_pixel(3, 0));
    assert_eq!(rot.get_pixel(0, 2)[3], 0);
}

#[test]
fn bleed_fills_rgb_but_keeps_alpha_zero() {
    let red = [200, 40, 10, 255];
    let out = pack_images(
        vec![SourceImage::from_rgba("dot", RgbaImage::from_pixel(2, 2, Rgba(red)))],
        PackerConfig::builder()
            .with_max_dimensions(64, 64)
            .texture_padding(4)
            .bleed(true)
            .bleed_iterations(1)
            .build(),
    )
    .unwrap();
    let img = &out.pages[0].rgba;
    assert_eq!(img.dimensions(), (6, 6));
    assert_eq!(out.pages[0].page.regions[0].frame, Rect::new(2, 2, 2, 2));
    // content untouched
    assert_eq!(img.get_pixel(2, 2), &Rgba(red));
    // direct neighbor picked up the color, stays transparent
    assert_eq!(img.get_pixel(1, 2), &Rgba([200, 40, 10, 0]));
    // diagonal needs a second iteration
    assert_eq!(img.get_pixel(1, 1), &Rgba([0, 0, 0, 0]));
    assert!(img.pixels().filter(|p| p[3] == 0).count() == 32);
}

#[test]
fn bleed_iterations_spread_one_pixel_each() {
    let mut canvas = RgbaImage::new(5, 1);
    canvas.put_pixel(0, 0, Rgba([100, 50, 25, 255]));
    bleed(&mut canvas, 2);
    assert_eq!(canvas.get_pixel(1, 0), &Rgba([100, 50, 25, 0]));
    assert_eq!(canvas.get_pixel(2, 0), &Rgba([100, 50, 25, 0]));
    assert_eq!(canvas.get_pixel(3, 0), &Rgba([0, 0, 0, 0]));
}

#[test]
fn bleed_averages_opaque_neighbors() {
    let mut canvas = RgbaImage::new(3, 1);
    canvas.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
    canvas.put_pixel(2, 0, Rgba([0, 0, 255, 255]));
    bleed(&mut canvas, 1);
    assert_eq!(canvas.get_pixel(1, 0), &Rgba([127, 0, 127, 0]));
}

#[test]
fn bleed_region_matches_full_bleed_inside_and_writes_nothing_outside() {
    let mut canvas = RgbaImage::new(8, 8);
    canvas.put_pixel(3, 3, Rgba([10, 20, 30, 255]));
    let before = canvas.clone();
    let mut full = canvas.clone();
    bleed(&mut full, 3);

    let region = Rect::new(4, 4, 4, 4);
    bleed_region(&mut canvas, region, 3);
    for y in 0..8 {
        for x in 0..8 {
            let expected = if region.contains(&Rect::new(x, y, 1, 1)) {
                full.get_pixel(x, y)
            } else {
                before.get_pixel(x, y)
            };
            assert_eq!(canvas.get_pixel(x, y), expected, "at {x},{y}");
        }
    }
    // color from the opaque pixel outside the region reaches its corner
    assert_eq!(canvas.get_pixel(4, 4), &Rgba([10, 20, 30, 0]));
    assert_eq!(canvas.get_pixel(3, 4), &Rgba([0, 0, 0, 0]));
}

#[test]
fn bleed_region_reads_neighbors_just_outside() {
    let mut canvas = RgbaImage::new(8, 1);
    canvas.put_pixel(0, 0, Rgba([90, 60, 30, 255]));
    bleed_region(&mut canvas, Rect::new(1, 0, 3, 1), 2);
    assert_eq!(canvas.get_pixel(1, 0), &Rgba([90, 60, 30, 0]));
    assert_eq!(canvas.get_pixel(2, 0), &Rgba([90, 60, 30, 0]));
    assert_eq!(canvas.get_pixel(3, 0), &Rgba([0, 0, 0, 0]));
}
