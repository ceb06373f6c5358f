//! Memory report produced by `dump_cached_texture_info`.

use std::fmt;

use crate::format::PixelFormat;
use crate::gpu::GpuTextureId;

/// One cached texture in a [`CacheReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    /// Cache key.
    pub key: String,
    /// References held outside the cache.
    pub external_refs: usize,
    /// Current GPU name.
    pub gpu_id: GpuTextureId,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel layout.
    pub pixel_format: PixelFormat,
    /// Estimated GPU memory.
    pub bytes: usize,
}

/// Contents of the cache and the GPU memory they account for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheReport {
    /// Entries in key order.
    pub entries: Vec<ReportEntry>,
}

impl CacheReport {
    /// Number of entries.
    pub fn texture_count(&self) -> usize {
        self.entries.len()
    }

    /// Sum of the entries' estimated memory.
    pub fn total_bytes(&self) -> usize {
        self.entries.iter().map(|e| e.bytes).sum()
    }

    /// Total in whole KiB.
    pub fn total_kib(&self) -> usize {
        self.total_bytes() / 1024
    }

    /// Total in MiB.
    pub fn total_mib(&self) -> f64 {
        self.total_bytes() as f64 / (1024.0 * 1024.0)
    }
}

impl fmt::Display for ReportEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\"{}\" rc={} id={} {} x {} @ {} bpp => {} KB",
            self.key,
            self.external_refs,
            self.gpu_id,
            self.width,
            self.height,
            self.pixel_format.bits_per_pixel(),
            self.bytes / 1024
        )
    }
}

impl fmt::Display for CacheReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{entry}")?;
        }
        write!(
            f,
            "TextureCache: {} textures, for {} KB ({:.2} MB)",
            self.texture_count(),
            self.total_kib(),
            self.total_mib()
        )
    }
}
