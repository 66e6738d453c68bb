//! Core library for packing images into texture atlases.
//!
//! - Placement: MaxRects (BSSF/BLSF/BAF/BL/CP) over one or more fixed-size bins
//! - Compositing: rotation-aware blit, edge extrusion, double-buffered color bleed
//! - Offline: `pack_images` packs a batch of images into pages plus descriptors
//! - Runtime: `RuntimeAtlasPacker` queues requests from any thread and applies them on `flush`
//!
//! Quick example:
//! ```no_run
//! use atlas_packer_core::{PackerConfig, SourceImage, pack_images, write_atlas};
//! # fn main() -> atlas_packer_core::Result<()> {
//! let a = image::open("a.png")?;
//! let b = image::open("b.png")?;
//! let inputs = vec![SourceImage::new("a", a), SourceImage::new("b", b)];
//! let cfg = PackerConfig::builder().with_max_dimensions(512, 512).extrude(1).build();
//! let out = pack_images(inputs, cfg)?;
//! println!("{}", out.stats().summary());
//! write_atlas(std::path::Path::new("out"), "atlas", &out)?;
//! # Ok(()) }
//! ```

pub mod compositing;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod export;
pub mod model;
pub mod packer;
pub mod pipeline;
pub mod runtime;
pub mod source;

pub use config::*;
pub use error::*;
pub use export::*;
pub use model::*;
pub use pipeline::*;
pub use source::SourceImage;

/// Convenience prelude for common types and functions.
/// Importing `atlas_packer_core::prelude::*` brings the primary APIs into scope.
pub mod prelude {
    pub use crate::config::{
        DecodeErrorPolicy, MaxRectsHeuristic, PackerConfig, PackerConfigBuilder, RuntimeConfig,
        SortOrder,
    };
    pub use crate::error::{AtlasError, Result};
    pub use crate::model::{AtlasDescriptor, AtlasRegion, Meta, PackStats, Page, Rect};
    pub use crate::runtime::{
        AtlasRequester, FlushReport, HandleState, RegionHandle, RuntimeAtlasPacker, UpdateRegion,
    };
    pub use crate::source::SourceImage;
    pub use crate::{OutputPage, PackOutput, pack_images, pack_layout, to_json, write_atlas};
}
