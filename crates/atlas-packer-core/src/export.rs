use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::error::Result;
use crate::model::{AtlasDescriptor, Rect};
use crate::pipeline::PackOutput;

fn rect_json(r: &Rect) -> Value {
    json!({"x": r.x, "y": r.y, "w": r.w, "h": r.h})
}

/// Regions keyed by name, with page-level fields under `meta`.
/// Shape: `{ frames: { name: { frame, packed, rotated, trimmed, spriteSourceSize, sourceSize } }, meta: { image, size, relatedMultiPacks, .. } }`.
pub fn to_json(desc: &AtlasDescriptor) -> Value {
    let mut frames = serde_json::Map::new();
    for region in &desc.regions {
        frames.insert(
            region.name.clone(),
            json!({
                "frame": rect_json(&region.frame),
                "packed": rect_json(&region.packed),
                "rotated": region.rotated,
                "trimmed": region.trimmed,
                "spriteSourceSize": rect_json(&region.source),
                "sourceSize": {"w": region.source_size.0, "h": region.source_size.1},
            }),
        );
    }
    let m = &desc.meta;
    json!({
        "frames": frames,
        "meta": {
            "app": m.app,
            "version": m.version,
            "schemaVersion": m.schema_version,
            "image": desc.page,
            "format": m.format,
            "size": {"w": desc.width, "h": desc.height},
            "relatedMultiPacks": desc.related_pages,
            "padding": {"border": m.padding.0, "texture": m.padding.1},
            "extrude": m.extrude,
            "trim": m.trim,
            "allowRotation": m.allow_rotation,
            "bleed": m.bleed,
            "bleedIterations": m.bleed_iterations,
        }
    })
}

/// Writes every page image and its descriptor into `dir`, creating it if needed.
/// Returns the written paths, images first then descriptors, in page order.
#[instrument(skip_all, fields(dir = %dir.display(), base_name = base_name))]
pub fn write_atlas(dir: &Path, base_name: &str, output: &PackOutput) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let descriptors = output.descriptors(base_name);
    let mut written = Vec::with_capacity(descriptors.len() * 2);
    for (page, desc) in output.pages.iter().zip(&descriptors) {
        let path = dir.join(&desc.page);
        page.rgba.save(&path)?;
        debug!(path = %path.display(), "page written");
        written.push(path);
    }
    for desc in &descriptors {
        let path = dir.join(&desc.name);
        fs::write(&path, serde_json::to_vec_pretty(&to_json(desc))?)?;
        written.push(path);
    }
    Ok(written)
}
