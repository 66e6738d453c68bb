use thiserror::Error;

#[derive(Debug, Error)]
pub enum AtlasError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid atlas dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Nothing to pack")]
    Empty,
    /// A rectangle does not fit the largest bin in any allowed orientation.
    #[error(
        "'{key}' ({width}x{height} incl. margins) does not fit in a {max_width}x{max_height} bin"
    )]
    Oversize {
        key: String,
        width: u32,
        height: u32,
        max_width: u32,
        max_height: u32,
    },
    #[error("Failed to decode '{key}': {reason}")]
    Decode { key: String, reason: String },
    #[error("'{key}' decoded to {actual:?}, registered as {expected:?}")]
    DimensionMismatch {
        key: String,
        expected: (u32, u32),
        actual: (u32, u32),
    },
    /// Runtime texture growth would exceed the configured maximum page size.
    #[error(
        "'{key}' ({width}x{height}) exceeds runtime page capacity {max_width}x{max_height}"
    )]
    Capacity {
        key: String,
        width: u32,
        height: u32,
        max_width: u32,
        max_height: u32,
    },
    #[error("Runtime atlas is full: page limit of {max_pages} reached")]
    PageLimit { max_pages: usize },
}

pub type Result<T> = std::result::Result<T, AtlasError>;
