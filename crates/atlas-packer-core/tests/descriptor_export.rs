use std::path::PathBuf;

use atlas_packer_core::descriptor::{page_file_names, related_pages};
use atlas_packer_core::prelude::*;
use image::{Rgba, RgbaImage};

fn tiles(n: usize, w: u32, h: u32) -> Vec<SourceImage> {
    (0..n)
        .map(|i| {
            SourceImage::from_rgba(
                format!("t{i}"),
                RgbaImage::from_pixel(w, h, Rgba([i as u8, 1, 2, 255])),
            )
        })
        .collect()
}

fn temp_dir(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("atlas-packer-{tag}-{}", std::process::id()))
}

#[test]
fn multi_page_descriptors_list_every_other_page() {
    let cfg = PackerConfig::builder().with_max_dimensions(32, 32).build();
    let out = pack_images(tiles(4, 32, 32), cfg).unwrap();
    let descs = out.descriptors("ui");
    assert_eq!(descs.len(), 4);
    let names: Vec<&str> = descs.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, ["ui-0.json", "ui-1.json", "ui-2.json", "ui-3.json"]);
    assert_eq!(descs[2].page, "ui-2.png");
    assert_eq!(
        descs[1].related_pages,
        vec!["ui-0.json", "ui-2.json", "ui-3.json"]
    );
    for d in &descs {
        assert_eq!(d.related_pages.len(), 3);
        assert!(!d.related_pages.contains(&d.name));
        // a loader starting anywhere reaches every region
        let reachable: usize = std::iter::once(d.name.as_str())
            .chain(d.related_pages.iter().map(String::as_str))
            .map(|n| descs.iter().find(|o| o.name == n).unwrap().regions.len())
            .sum();
        assert_eq!(reachable, 4);
    }
}

#[test]
fn single_page_uses_plain_names() {
    let cfg = PackerConfig::builder().with_max_dimensions(64, 64).build();
    let out = pack_images(tiles(3, 8, 8), cfg).unwrap();
    let descs = out.descriptors("atlas");
    assert_eq!(descs.len(), 1);
    assert_eq!(descs[0].page, "atlas.png");
    assert_eq!(descs[0].name, "atlas.json");
    assert!(descs[0].related_pages.is_empty());
    assert_eq!(descs[0].regions.len(), 3);
    assert_eq!(descs[0].meta.bleed_iterations, 2);
    assert_eq!(
        page_file_names("atlas", 2, 3),
        ("atlas-2.png".to_string(), "atlas-2.json".to_string())
    );
    assert_eq!(related_pages("atlas", 0, 2), vec!["atlas-1.json"]);
}

#[test]
fn source_size_survives_rotation_and_extrusion() {
    let cfg = PackerConfig::builder()
        .with_max_dimensions(40, 12)
        .extrude(1)
        .texture_padding(2)
        .build();
    let sizes = [(6u32, 30u32), (20, 4), (5, 5)];
    let inputs = sizes
        .iter()
        .enumerate()
        .map(|(i, (w, h))| {
            SourceImage::from_rgba(format!("s{i}"), RgbaImage::from_pixel(*w, *h, Rgba([1; 4])))
        })
        .collect();
    let out = pack_images(inputs, cfg).unwrap();
    let descs = out.descriptors("atlas");
    for (i, (w, h)) in sizes.iter().enumerate() {
        let region = descs
            .iter()
            .find_map(|d| d.region(&format!("s{i}")))
            .unwrap();
        assert_eq!((region.source.w, region.source.h), (*w, *h));
        let stored = if region.rotated { (*h, *w) } else { (*w, *h) };
        assert_eq!((region.frame.w, region.frame.h), stored);
        assert_eq!(region.packed.w, region.frame.w + 2);
    }
    assert!(out.region("s0").unwrap().rotated);
}

#[test]
fn json_carries_regions_and_related_pages() {
    let cfg = PackerConfig::builder()
        .with_max_dimensions(16, 16)
        .extrude(1)
        .build();
    let out = pack_images(tiles(2, 10, 10), cfg).unwrap();
    let descs = out.descriptors("sheet");
    let v = to_json(&descs[0]);
    let frame = &v["frames"]["t0"];
    assert_eq!(frame["sourceSize"]["w"], 10);
    assert_eq!(frame["frame"]["x"], 1);
    assert_eq!(frame["packed"]["w"], 12);
    assert_eq!(frame["rotated"], false);
    assert_eq!(v["meta"]["image"], "sheet-0.png");
    assert_eq!(v["meta"]["relatedMultiPacks"][0], "sheet-1.json");
    assert_eq!(v["meta"]["extrude"], 1);
}

#[test]
fn write_atlas_creates_pages_and_descriptors() {
    let dir = temp_dir("write");
    let _ = std::fs::remove_dir_all(&dir);
    let cfg = PackerConfig::builder().with_max_dimensions(16, 16).build();
    let out = pack_images(tiles(2, 16, 16), cfg).unwrap();
    let written = write_atlas(&dir, "pack", &out).unwrap();
    let names: Vec<String> = written
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["pack-0.png", "pack-1.png", "pack-0.json", "pack-1.json"]);

    let png = image::open(dir.join("pack-1.png")).unwrap().to_rgba8();
    assert_eq!(png.as_raw(), out.pages[1].rgba.as_raw());
    let json: serde_json::Value =
        serde_json::from_slice(&std::fs::read(dir.join("pack-0.json")).unwrap()).unwrap();
    assert_eq!(json["meta"]["relatedMultiPacks"][0], "pack-1.json");
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn write_failure_is_reported() {
    let blocker = temp_dir("blocker");
    std::fs::write(&blocker, b"not a dir").unwrap();
    let out = pack_images(tiles(1, 4, 4), PackerConfig::default()).unwrap();
    let err = write_atlas(&blocker.join("sub"), "x", &out).unwrap_err();
    assert!(matches!(err, AtlasError::Io(_)));
    std::fs::remove_file(&blocker).unwrap();
}
