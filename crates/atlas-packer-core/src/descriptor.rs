//! Per-page atlas descriptors.
//!
//! A run named `atlas` produces `atlas.png` + `atlas.json` when it fits one page,
//! and `atlas-<i>.png` + `atlas-<i>.json` otherwise. Every descriptor of a
//! multi-page run lists the descriptor files of all other pages so a loader can
//! find a region regardless of the page it landed on.

use crate::model::{AtlasDescriptor, Meta, Page};

/// Image and descriptor file names of page `index` out of `count` pages.
pub fn page_file_names(base_name: &str, index: usize, count: usize) -> (String, String) {
    if count > 1 {
        (
            format!("{base_name}-{index}.png"),
            format!("{base_name}-{index}.json"),
        )
    } else {
        (format!("{base_name}.png"), format!("{base_name}.json"))
    }
}

/// Descriptor file names of every page except `index`, in page order.
pub fn related_pages(base_name: &str, index: usize, count: usize) -> Vec<String> {
    if count <= 1 {
        return Vec::new();
    }
    (0..count)
        .filter(|&i| i != index)
        .map(|i| page_file_names(base_name, i, count).1)
        .collect()
}

/// Builds one descriptor per page, in page order.
pub fn build_descriptors(pages: &[Page], base_name: &str, meta: &Meta) -> Vec<AtlasDescriptor> {
    let count = pages.len();
    pages
        .iter()
        .enumerate()
        .map(|(index, page)| {
            let (image, name) = page_file_names(base_name, index, count);
            AtlasDescriptor {
                page: image,
                name,
                width: page.width,
                height: page.height,
                regions: page.regions.clone(),
                related_pages: related_pages(base_name, index, count),
                meta: meta.clone(),
            }
        })
        .collect()
}
