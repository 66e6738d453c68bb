use std::fmt;

use image::{DynamicImage, RgbaImage};

use crate::error::{AtlasError, Result};

/// Deferred decoder producing RGBA8 pixels. May run on any thread.
pub type DecodeFn = Box<dyn FnOnce() -> Result<RgbaImage> + Send>;

/// Pixel data of a source image, either decoded up front or on demand.
pub enum PixelSource {
    Loaded(RgbaImage),
    Deferred(DecodeFn),
}

impl fmt::Debug for PixelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelSource::Loaded(img) => f
                .debug_tuple("Loaded")
                .field(&img.dimensions())
                .finish(),
            PixelSource::Deferred(_) => f.write_str("Deferred"),
        }
    }
}

/// A named image registered for packing. Its size is known before its pixels are.
#[derive(Debug)]
pub struct SourceImage {
    pub key: String,
    pub width: u32,
    pub height: u32,
    pixels: PixelSource,
}

/// A source image whose pixels have been obtained and checked against its registered size.
#[derive(Debug, Clone)]
pub struct LoadedSource {
    pub key: String,
    pub rgba: RgbaImage,
}

impl SourceImage {
    /// Registers already-decoded pixels.
    pub fn new(key: impl Into<String>, image: DynamicImage) -> Self {
        Self::from_rgba(key, image.to_rgba8())
    }

    pub fn from_rgba(key: impl Into<String>, rgba: RgbaImage) -> Self {
        let (width, height) = rgba.dimensions();
        Self {
            key: key.into(),
            width,
            height,
            pixels: PixelSource::Loaded(rgba),
        }
    }

    /// Registers an image by size only; `decode` runs when the pixels are first needed.
    pub fn deferred<F>(key: impl Into<String>, width: u32, height: u32, decode: F) -> Self
    where
        F: FnOnce() -> Result<RgbaImage> + Send + 'static,
    {
        Self {
            key: key.into(),
            width,
            height,
            pixels: PixelSource::Deferred(Box::new(decode)),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.pixels, PixelSource::Loaded(_))
    }

    /// Obtains the pixels, running the deferred decoder if needed.
    ///
    /// Decoder failures are reported as [`AtlasError::Decode`] and a buffer whose
    /// size disagrees with the registered one as [`AtlasError::DimensionMismatch`].
    pub fn load(self) -> Result<LoadedSource> {
        let SourceImage {
            key,
            width,
            height,
            pixels,
        } = self;
        let rgba = match pixels {
            PixelSource::Loaded(rgba) => rgba,
            PixelSource::Deferred(decode) => match decode() {
                Ok(rgba) => rgba,
                Err(AtlasError::Decode { reason, .. }) => {
                    return Err(AtlasError::Decode { key, reason });
                }
                Err(e) => {
                    return Err(AtlasError::Decode {
                        key,
                        reason: e.to_string(),
                    });
                }
            },
        };
        if rgba.dimensions() != (width, height) {
            return Err(AtlasError::DimensionMismatch {
                key,
                expected: (width, height),
                actual: rgba.dimensions(),
            });
        }
        Ok(LoadedSource { key, rgba })
    }
}
