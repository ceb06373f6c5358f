//! Image container formats and GPU pixel formats.

use std::{fmt, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TextureError};

/// Container format of an image file, derived from its extension.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG.
    Png,
    /// JPEG (`.jpg`, `.jpeg`).
    Jpeg,
    /// TIFF (`.tif`, `.tiff`).
    Tiff,
    /// WebP.
    Webp,
    /// GIF, first frame only.
    Gif,
    /// Windows bitmap.
    Bmp,
    /// PowerVR container (`.pvr`, `.pvr.ccz`).
    Pvr,
    /// ETC1 in a PKM container.
    Etc,
}

impl ImageFormat {
    /// Every recognised container format.
    pub const ALL: [ImageFormat; 8] = [
        ImageFormat::Png,
        ImageFormat::Jpeg,
        ImageFormat::Tiff,
        ImageFormat::Webp,
        ImageFormat::Gif,
        ImageFormat::Bmp,
        ImageFormat::Pvr,
        ImageFormat::Etc,
    ];

    /// Resolve the format implied by a file name.
    pub fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        // Compressed PVR archives carry a double extension.
        if name.ends_with(".pvr.ccz") || name.ends_with(".pvr.gz") {
            return Ok(ImageFormat::Pvr);
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        Self::from_extension(&ext)
            .ok_or_else(|| TextureError::UnsupportedFormat(ext_label(&ext, path)))
    }

    /// Format for a lowercase extension without the dot.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(ImageFormat::Png),
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "tif" | "tiff" => Some(ImageFormat::Tiff),
            "webp" => Some(ImageFormat::Webp),
            "gif" => Some(ImageFormat::Gif),
            "bmp" => Some(ImageFormat::Bmp),
            "pvr" => Some(ImageFormat::Pvr),
            "pkm" | "etc" => Some(ImageFormat::Etc),
            _ => None,
        }
    }

    /// Canonical extension.
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Tiff => "tiff",
            ImageFormat::Webp => "webp",
            ImageFormat::Gif => "gif",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Pvr => "pvr",
            ImageFormat::Etc => "etc",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn ext_label(ext: &str, path: &Path) -> String {
    if ext.is_empty() {
        format!("<no extension> ({})", path.display())
    } else {
        ext.to_string()
    }
}

/// Layout of the pixels handed to the GPU.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// 8 bits per channel with alpha.
    #[default]
    Rgba8888,
    /// 8 bits per channel, no alpha.
    Rgb888,
    /// 16-bit packed color.
    Rgb565,
    /// 16-bit packed color with 4-bit alpha.
    Rgba4444,
    /// 16-bit packed color with 1-bit alpha.
    Rgb5A1,
    /// Alpha only.
    A8,
    /// Intensity only.
    I8,
    /// Alpha and intensity.
    Ai88,
}

impl PixelFormat {
    /// Storage size of one pixel.
    pub fn bits_per_pixel(&self) -> u32 {
        match self {
            PixelFormat::Rgba8888 => 32,
            PixelFormat::Rgb888 => 24,
            PixelFormat::Rgb565
            | PixelFormat::Rgba4444
            | PixelFormat::Rgb5A1
            | PixelFormat::Ai88 => 16,
            PixelFormat::A8 | PixelFormat::I8 => 8,
        }
    }

    /// Number of bytes a tightly packed `width` x `height` image occupies,
    /// or `None` when that does not fit in `usize`.
    pub fn byte_len(&self, width: u32, height: u32) -> Option<usize> {
        (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(self.bits_per_pixel() as usize)
            .map(|bits| bits / 8)
    }

    /// True when the format carries an alpha channel.
    pub fn has_alpha(&self) -> bool {
        matches!(
            self,
            PixelFormat::Rgba8888
                | PixelFormat::Rgba4444
                | PixelFormat::Rgb5A1
                | PixelFormat::A8
                | PixelFormat::Ai88
        )
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Rgba8888 => "RGBA8888",
            PixelFormat::Rgb888 => "RGB888",
            PixelFormat::Rgb565 => "RGB565",
            PixelFormat::Rgba4444 => "RGBA4444",
            PixelFormat::Rgb5A1 => "RGB5A1",
            PixelFormat::A8 => "A8",
            PixelFormat::I8 => "I8",
            PixelFormat::Ai88 => "AI88",
        };
        f.write_str(name)
    }
}
