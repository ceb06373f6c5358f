//! Decoder dispatch: maps an [`ImageFormat`] to the routine that turns file
//! bytes into a [`DecodedImage`].
//!
//! Decoders are shared between the caller thread and the loader thread, so
//! they must be `Send + Sync` and reentrant for concurrent calls on
//! different buffers.

use std::{collections::HashMap, fmt, path::Path, sync::Arc};

use ::image::DynamicImage;

use crate::decoded::DecodedImage;
use crate::error::{Result, TextureError};
use crate::format::{ImageFormat, PixelFormat};

/// Turns encoded image bytes into pixels.
pub trait ImageDecoder: Send + Sync {
    /// Decode `bytes` that hold an image of `format`.
    fn decode(&self, bytes: &[u8], format: ImageFormat)
    -> Result<DecodedImage>;
}

impl<F> ImageDecoder for F
where
    F: Fn(&[u8], ImageFormat) -> Result<DecodedImage> + Send + Sync,
{
    fn decode(
        &self,
        bytes: &[u8],
        format: ImageFormat,
    ) -> Result<DecodedImage> {
        self(bytes, format)
    }
}

/// Raster decoder backed by the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterDecoder;

impl RasterDecoder {
    /// Formats this decoder handles.
    pub const FORMATS: [ImageFormat; 6] = [
        ImageFormat::Png,
        ImageFormat::Jpeg,
        ImageFormat::Tiff,
        ImageFormat::Webp,
        ImageFormat::Gif,
        ImageFormat::Bmp,
    ];

    fn container(format: ImageFormat) -> Option<::image::ImageFormat> {
        match format {
            ImageFormat::Png => Some(::image::ImageFormat::Png),
            ImageFormat::Jpeg => Some(::image::ImageFormat::Jpeg),
            ImageFormat::Tiff => Some(::image::ImageFormat::Tiff),
            ImageFormat::Webp => Some(::image::ImageFormat::WebP),
            ImageFormat::Gif => Some(::image::ImageFormat::Gif),
            ImageFormat::Bmp => Some(::image::ImageFormat::Bmp),
            ImageFormat::Pvr | ImageFormat::Etc => None,
        }
    }
}

impl ImageDecoder for RasterDecoder {
    fn decode(
        &self,
        bytes: &[u8],
        format: ImageFormat,
    ) -> Result<DecodedImage> {
        let container = Self::container(format).ok_or_else(|| {
            TextureError::UnsupportedFormat(format.to_string())
        })?;

        let img = ::image::load_from_memory_with_format(bytes, container)
            .map_err(|e| TextureError::decode("", e))?;

        into_decoded(img)
    }
}

fn into_decoded(img: DynamicImage) -> Result<DecodedImage> {
    let (width, height) = (img.width(), img.height());
    match img {
        DynamicImage::ImageLuma8(buf) => {
            DecodedImage::new(width, height, PixelFormat::I8, buf.into_raw())
        }
        DynamicImage::ImageLumaA8(buf) => DecodedImage::new(
            width,
            height,
            PixelFormat::Ai88,
            buf.into_raw(),
        ),
        other if other.color().has_alpha() => DecodedImage::new(
            width,
            height,
            PixelFormat::Rgba8888,
            other.into_rgba8().into_raw(),
        ),
        other => DecodedImage::new(
            width,
            height,
            PixelFormat::Rgb888,
            other.into_rgb8().into_raw(),
        ),
    }
}

/// Extension-driven decoder table.
#[derive(Clone)]
pub struct DecoderRegistry {
    by_format: HashMap<ImageFormat, Arc<dyn ImageDecoder>>,
}

impl DecoderRegistry {
    /// An empty table; every format is unsupported until registered.
    pub fn empty() -> Self {
        Self {
            by_format: HashMap::new(),
        }
    }

    /// Raster formats handled by [`RasterDecoder`]. PVR and ETC stay
    /// unregistered until the host provides a decoder for them.
    pub fn with_defaults() -> Self {
        let raster: Arc<dyn ImageDecoder> = Arc::new(RasterDecoder);
        let mut registry = Self::empty();
        for format in RasterDecoder::FORMATS {
            registry.by_format.insert(format, Arc::clone(&raster));
        }
        registry
    }

    /// Route `format` to `decoder`, replacing any previous one.
    pub fn register(
        &mut self,
        format: ImageFormat,
        decoder: Arc<dyn ImageDecoder>,
    ) -> &mut Self {
        self.by_format.insert(format, decoder);
        self
    }

    /// True when a decoder is registered for `format`.
    pub fn supports(&self, format: ImageFormat) -> bool {
        self.by_format.contains_key(&format)
    }

    /// Decoder for `format`, or `UnsupportedFormat`.
    pub fn decoder_for(
        &self,
        format: ImageFormat,
    ) -> Result<Arc<dyn ImageDecoder>> {
        self.by_format
            .get(&format)
            .cloned()
            .ok_or_else(|| TextureError::UnsupportedFormat(format.to_string()))
    }

    /// Decode bytes already in memory.
    pub fn decode(
        &self,
        bytes: &[u8],
        format: ImageFormat,
    ) -> Result<DecodedImage> {
        self.decoder_for(format)?.decode(bytes, format)
    }

    /// Read and decode a file. `format` overrides extension dispatch when
    /// given.
    pub fn decode_file(
        &self,
        path: &Path,
        format: Option<ImageFormat>,
    ) -> Result<DecodedImage> {
        let format = match format {
            Some(format) => format,
            None => ImageFormat::from_path(path)?,
        };
        let decoder = self.decoder_for(format)?;
        let bytes =
            std::fs::read(path).map_err(|e| TextureError::from_io(path, e))?;
        decoder
            .decode(&bytes, format)
            .map_err(|e| e.with_path(path))
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut formats: Vec<_> = self.by_format.keys().copied().collect();
        formats.sort();
        f.debug_struct("DecoderRegistry")
            .field("formats", &formats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::image::{Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn encode_png(img: DynamicImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ::image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn decodes_rgba_png() {
        let png = encode_png(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            3,
            2,
            Rgba([10, 20, 30, 40]),
        )));

        let decoded = RasterDecoder.decode(&png, ImageFormat::Png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (3, 2));
        assert_eq!(decoded.pixel_format(), PixelFormat::Rgba8888);
        assert_eq!(&decoded.pixels()[..4], &[10, 20, 30, 40]);
    }

    #[test]
    fn opaque_png_decodes_to_rgb() {
        let png = encode_png(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            2,
            2,
            Rgb([1, 2, 3]),
        )));

        let decoded = RasterDecoder.decode(&png, ImageFormat::Png).unwrap();
        assert_eq!(decoded.pixel_format(), PixelFormat::Rgb888);
        assert_eq!(decoded.pixels().len(), 12);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let err = RasterDecoder
            .decode(b"definitely not a png", ImageFormat::Png)
            .unwrap_err();
        assert!(matches!(err, TextureError::Decode { .. }));
    }

    #[test]
    fn pvr_is_unsupported_until_registered() {
        let mut registry = DecoderRegistry::with_defaults();
        assert!(!registry.supports(ImageFormat::Pvr));
        assert!(matches!(
            registry.decode(&[0u8; 4], ImageFormat::Pvr),
            Err(TextureError::UnsupportedFormat(_))
        ));

        registry.register(
            ImageFormat::Pvr,
            Arc::new(|_: &[u8], _: ImageFormat| {
                DecodedImage::new(1, 1, PixelFormat::Rgb565, vec![0, 0])
            }),
        );
        let decoded = registry.decode(&[0u8; 4], ImageFormat::Pvr).unwrap();
        assert_eq!(decoded.pixel_format(), PixelFormat::Rgb565);
    }

    #[test]
    fn decode_file_reports_missing_path() {
        let err = DecoderRegistry::with_defaults()
            .decode_file(Path::new("/nonexistent/texcache/a.png"), None)
            .unwrap_err();
        assert!(matches!(err, TextureError::PathNotFound(_)));
    }
}
