//! GPU collaborator seam.
//!
//! The cache never talks to a graphics API directly; it drives a
//! [`GpuBackend`] from the owning thread. [`HeadlessGpu`] keeps texture
//! contents in memory and can simulate a lost context.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::decoded::{DecodedImage, content_checksum};
use crate::error::{Result, TextureError};
use crate::format::PixelFormat;

/// Opaque name of a GPU texture object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
pub struct GpuTextureId(pub u64);

impl fmt::Display for GpuTextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Texture minification and magnification filter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    /// Nearest texel.
    Nearest,
    /// Bilinear.
    #[default]
    Linear,
    /// Nearest texel from the nearest mip level.
    NearestMipmapNearest,
    /// Bilinear from the nearest mip level.
    LinearMipmapNearest,
    /// Nearest texel, blended across mip levels.
    NearestMipmapLinear,
    /// Trilinear.
    LinearMipmapLinear,
}

/// Texture coordinate wrap mode.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Wrap {
    /// Clamp to the edge texel.
    #[default]
    ClampToEdge,
    /// Tile.
    Repeat,
    /// Tile, mirroring every other copy.
    MirroredRepeat,
}

/// Sampling parameters applied to a texture object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default,
)]
pub struct TexParams {
    /// Filter used when shrinking.
    pub min_filter: Filter,
    /// Filter used when enlarging.
    pub mag_filter: Filter,
    /// Horizontal wrap.
    pub wrap_s: Wrap,
    /// Vertical wrap.
    pub wrap_t: Wrap,
}

impl TexParams {
    /// Linear filtering, clamped.
    pub fn antialiased() -> Self {
        Self {
            min_filter: Filter::Linear,
            mag_filter: Filter::Linear,
            ..Self::default()
        }
    }

    /// Nearest filtering, clamped.
    pub fn aliased() -> Self {
        Self {
            min_filter: Filter::Nearest,
            mag_filter: Filter::Nearest,
            ..Self::default()
        }
    }

    /// Same filters with both axes set to repeat.
    pub fn repeating(self) -> Self {
        Self {
            wrap_s: Wrap::Repeat,
            wrap_t: Wrap::Repeat,
            ..self
        }
    }
}

/// Texture upload and parameter calls. Always invoked from the thread that
/// owns the cache.
pub trait GpuBackend {
    /// Create a texture object holding `image`.
    fn upload(&mut self, image: &DecodedImage) -> Result<GpuTextureId>;

    /// Set sampling parameters. Unknown ids are ignored.
    fn apply_params(&mut self, id: GpuTextureId, params: &TexParams);

    /// Free a texture object. Unknown ids are ignored.
    fn release(&mut self, id: GpuTextureId);
}

#[derive(Debug, Clone)]
struct HeadlessTexture {
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    pixels: Vec<u8>,
    params: Option<TexParams>,
}

/// In-memory backend.
///
/// Every upload copies the pixels into backend-owned storage, which makes it
/// possible to verify what a real device would hold.
#[derive(Debug, Default)]
pub struct HeadlessGpu {
    next_id: u64,
    textures: HashMap<GpuTextureId, HeadlessTexture>,
    uploads: usize,
    releases: usize,
    contexts_lost: usize,
    max_dimension: Option<u32>,
}

impl HeadlessGpu {
    /// Backend with no textures and no size limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject uploads larger than `max` on either side, like a device with a
    /// limited maximum texture size.
    pub fn with_max_dimension(mut self, max: u32) -> Self {
        self.max_dimension = Some(max);
        self
    }

    /// Drop every texture object, as happens when the context is destroyed.
    pub fn lose_context(&mut self) {
        tracing::debug!(
            textures = self.textures.len(),
            "headless gpu context lost"
        );
        self.textures.clear();
        self.contexts_lost += 1;
    }

    /// True while `id` names a live texture object.
    pub fn is_resident(&self, id: GpuTextureId) -> bool {
        self.textures.contains_key(&id)
    }

    /// Number of live texture objects.
    pub fn resident_count(&self) -> usize {
        self.textures.len()
    }

    /// Successful uploads since creation.
    pub fn upload_count(&self) -> usize {
        self.uploads
    }

    /// Texture objects freed through `release`.
    pub fn release_count(&self) -> usize {
        self.releases
    }

    /// Number of simulated context losses.
    pub fn contexts_lost(&self) -> usize {
        self.contexts_lost
    }

    /// Parameters last applied to `id`.
    pub fn params(&self, id: GpuTextureId) -> Option<TexParams> {
        self.textures.get(&id).and_then(|t| t.params)
    }

    /// Bytes held by `id`.
    pub fn pixels(&self, id: GpuTextureId) -> Option<&[u8]> {
        self.textures.get(&id).map(|t| t.pixels.as_slice())
    }

    /// Hex SHA-256 of what the texture object currently holds.
    pub fn checksum(&self, id: GpuTextureId) -> Option<String> {
        self.textures.get(&id).map(|t| {
            content_checksum(t.width, t.height, t.pixel_format, &t.pixels)
        })
    }
}

impl GpuBackend for HeadlessGpu {
    fn upload(&mut self, image: &DecodedImage) -> Result<GpuTextureId> {
        if let Some(max) = self.max_dimension
            && (image.width() > max || image.height() > max)
        {
            return Err(TextureError::Upload(format!(
                "{}x{} exceeds maximum texture size {max}",
                image.width(),
                image.height()
            )));
        }

        self.next_id += 1;
        let id = GpuTextureId(self.next_id);
        self.textures.insert(
            id,
            HeadlessTexture {
                width: image.width(),
                height: image.height(),
                pixel_format: image.pixel_format(),
                pixels: image.pixels().to_vec(),
                params: None,
            },
        );
        self.uploads += 1;
        Ok(id)
    }

    fn apply_params(&mut self, id: GpuTextureId, params: &TexParams) {
        if let Some(texture) = self.textures.get_mut(&id) {
            texture.params = Some(*params);
        }
    }

    fn release(&mut self, id: GpuTextureId) {
        if self.textures.remove(&id).is_some() {
            self.releases += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> DecodedImage {
        DecodedImage::new(2, 1, PixelFormat::Rgb888, vec![1, 2, 3, 4, 5, 6])
            .unwrap()
    }

    #[test]
    fn upload_assigns_fresh_ids() {
        let mut gpu = HeadlessGpu::new();
        let a = gpu.upload(&image()).unwrap();
        let b = gpu.upload(&image()).unwrap();
        assert_ne!(a, b);
        assert_eq!(gpu.upload_count(), 2);
        assert_eq!(gpu.checksum(a), Some(image().checksum()));
    }

    #[test]
    fn lost_context_drops_contents() {
        let mut gpu = HeadlessGpu::new();
        let id = gpu.upload(&image()).unwrap();
        gpu.lose_context();
        assert!(!gpu.is_resident(id));
        assert_eq!(gpu.checksum(id), None);
    }

    #[test]
    fn oversize_upload_rejected() {
        let mut gpu = HeadlessGpu::new().with_max_dimension(1);
        assert!(matches!(
            gpu.upload(&image()),
            Err(TextureError::Upload(_))
        ));
    }

    #[test]
    fn params_presets() {
        assert_eq!(TexParams::aliased().min_filter, Filter::Nearest);
        assert_eq!(TexParams::antialiased().mag_filter, Filter::Linear);
        assert_eq!(TexParams::aliased().repeating().wrap_t, Wrap::Repeat);
    }
}
