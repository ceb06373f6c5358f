//! Texture handles and their release path.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, mpsc};

use parking_lot::Mutex;

use crate::format::PixelFormat;
use crate::gpu::{GpuTextureId, TexParams};

/// Shared ownership of a cached texture.
///
/// The cache keeps one strong reference per entry; every scene object
/// that uses the texture keeps another. [`Arc::strong_count`] is the
/// reference count used for eviction.
pub type TextureHandle = Arc<Texture>;

/// Identity of a texture for its whole lifetime. Unlike the GPU name it
/// survives a context reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(u64);

impl fmt::Display for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tex#{}", self.0)
    }
}

/// Posted when the last reference to a texture goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Released {
    pub id: TextureId,
    pub gpu_id: GpuTextureId,
}

/// GPU-resident image plus metadata.
pub struct Texture {
    id: TextureId,
    gpu_id: AtomicU64,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    params: Mutex<Option<TexParams>>,
    release: mpsc::Sender<Released>,
}

impl Texture {
    /// Stable identity.
    pub fn id(&self) -> TextureId {
        self.id
    }

    /// Current GPU name. Changes after a context reload.
    pub fn gpu_id(&self) -> GpuTextureId {
        GpuTextureId(self.gpu_id.load(Ordering::Acquire))
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel layout on the GPU.
    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    /// Storage size of one pixel.
    pub fn bits_per_pixel(&self) -> u32 {
        self.pixel_format.bits_per_pixel()
    }

    /// Estimated GPU memory held by the texture.
    pub fn bytes(&self) -> usize {
        self.pixel_format
            .byte_len(self.width, self.height)
            .unwrap_or(usize::MAX)
    }

    /// Last parameters applied through the cache, if any.
    pub fn params(&self) -> Option<TexParams> {
        *self.params.lock()
    }

    pub(crate) fn set_params(&self, params: TexParams) {
        *self.params.lock() = Some(params);
    }

    pub(crate) fn rebind(&self, gpu_id: GpuTextureId) {
        self.gpu_id.store(gpu_id.0, Ordering::Release);
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        // The cache may already be gone; nothing left to release then.
        let _ = self.release.send(Released {
            id: self.id,
            gpu_id: self.gpu_id(),
        });
    }
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("gpu_id", &self.gpu_id())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pixel_format", &self.pixel_format)
            .finish()
    }
}

/// Creates textures and collects the GPU names of dropped ones so they can
/// be freed on the owning thread.
#[derive(Debug)]
pub(crate) struct TextureFactory {
    next_id: u64,
    tx: mpsc::Sender<Released>,
    rx: mpsc::Receiver<Released>,
}

impl TextureFactory {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { next_id: 0, tx, rx }
    }

    pub fn create(
        &mut self,
        gpu_id: GpuTextureId,
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
    ) -> TextureHandle {
        self.next_id += 1;
        Arc::new(Texture {
            id: TextureId(self.next_id),
            gpu_id: AtomicU64::new(gpu_id.0),
            width,
            height,
            pixel_format,
            params: Mutex::new(None),
            release: self.tx.clone(),
        })
    }

    /// Textures dropped since the last call.
    pub fn take_released(&self) -> Vec<Released> {
        self.rx.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropping_last_reference_posts_release() {
        let mut factory = TextureFactory::new();
        let texture = factory.create(GpuTextureId(7), 4, 4, PixelFormat::A8);
        let id = texture.id();
        let extra = Arc::clone(&texture);

        drop(texture);
        assert!(factory.take_released().is_empty());

        drop(extra);
        assert_eq!(
            factory.take_released(),
            vec![Released {
                id,
                gpu_id: GpuTextureId(7)
            }]
        );
    }

    #[test]
    fn rebind_swaps_gpu_name() {
        let mut factory = TextureFactory::new();
        let texture =
            factory.create(GpuTextureId(1), 2, 2, PixelFormat::Rgba8888);
        texture.rebind(GpuTextureId(9));
        assert_eq!(texture.gpu_id(), GpuTextureId(9));
        assert_eq!(texture.bytes(), 16);
    }

    #[test]
    fn ids_are_unique() {
        let mut factory = TextureFactory::new();
        let a = factory.create(GpuTextureId(1), 1, 1, PixelFormat::A8);
        let b = factory.create(GpuTextureId(1), 1, 1, PixelFormat::A8);
        assert_ne!(a.id(), b.id());
    }
}
