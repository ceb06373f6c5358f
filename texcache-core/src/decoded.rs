//! Decoded pixel buffers.

use std::{fmt, sync::Arc};

use sha2::{Digest, Sha256};

use crate::error::{Result, TextureError};
use crate::format::PixelFormat;

/// CPU-side pixels ready for upload.
///
/// Pixel storage is shared, so cloning an image (for example to keep it in a
/// shadow record) does not copy the buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct DecodedImage {
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    pixels: Arc<[u8]>,
}

impl DecodedImage {
    /// Wrap tightly packed pixels, validating the buffer length.
    pub fn new(
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
        pixels: impl Into<Arc<[u8]>>,
    ) -> Result<Self> {
        let pixels = pixels.into();
        if width == 0 || height == 0 {
            return Err(TextureError::InvalidData(format!(
                "zero-sized image {width}x{height}"
            )));
        }
        let expected =
            pixel_format.byte_len(width, height).ok_or_else(|| {
                TextureError::InvalidData(format!(
                    "{width}x{height} {pixel_format} is too large"
                ))
            })?;
        if pixels.len() != expected {
            return Err(TextureError::InvalidData(format!(
                "{width}x{height} {pixel_format} needs {expected} bytes, got {}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixel_format,
            pixels,
        })
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Layout of the pixel buffer.
    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    /// Tightly packed pixel bytes.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// The pixel buffer, shared without copying.
    pub fn shared_pixels(&self) -> Arc<[u8]> {
        Arc::clone(&self.pixels)
    }

    /// Hex SHA-256 of dimensions, format and pixels.
    pub fn checksum(&self) -> String {
        content_checksum(
            self.width,
            self.height,
            self.pixel_format,
            &self.pixels,
        )
    }
}

impl fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pixel_format", &self.pixel_format)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

pub(crate) fn content_checksum(
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    pixels: &[u8],
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(width.to_le_bytes());
    hasher.update(height.to_le_bytes());
    hasher.update(pixel_format.to_string().as_bytes());
    hasher.update(pixels);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_buffers() {
        let err = DecodedImage::new(2, 2, PixelFormat::Rgba8888, vec![0u8; 15])
            .unwrap_err();
        assert!(matches!(err, TextureError::InvalidData(_)));
    }

    #[test]
    fn rejects_dimensions_that_overflow() {
        let err = DecodedImage::new(
            u32::MAX,
            u32::MAX,
            PixelFormat::Rgba8888,
            vec![0u8; 4],
        )
        .unwrap_err();
        assert!(matches!(err, TextureError::InvalidData(_)));
    }

    #[test]
    fn rejects_empty_dimensions() {
        let err = DecodedImage::new(0, 4, PixelFormat::A8, Vec::new())
            .unwrap_err();
        assert!(matches!(err, TextureError::InvalidData(_)));
    }

    #[test]
    fn checksum_tracks_content() {
        let a = DecodedImage::new(1, 1, PixelFormat::Rgb888, vec![1, 2, 3])
            .unwrap();
        let b = DecodedImage::new(1, 1, PixelFormat::Rgb888, vec![1, 2, 3])
            .unwrap();
        let c = DecodedImage::new(1, 1, PixelFormat::Rgb888, vec![1, 2, 4])
            .unwrap();
        assert_eq!(a.checksum(), b.checksum());
        assert_ne!(a.checksum(), c.checksum());
        assert_eq!(a.checksum().len(), 64);
    }
}
