#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use image::{Rgba, RgbaImage};
use tempfile::TempDir;
use texcache_core::{
    CacheSettings, DecodedImage, DecoderRegistry, FontDefinition, HeadlessGpu,
    ImageDecoder, ImageFormat, PixelFormat, RasterDecoder, TextRenderer,
    TextureCache, TextureError,
};

/// A temp directory with PNG fixtures in it.
pub struct Assets {
    pub dir: TempDir,
}

impl Assets {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    /// Write a `size` x `size` PNG whose pixels depend on `seed`.
    pub fn png(&self, name: &str, size: u32, seed: u8) -> PathBuf {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create fixture dir");
        }
        let img = RgbaImage::from_fn(size, size, |x, y| {
            Rgba([
                seed,
                (x as u8).wrapping_mul(31),
                (y as u8).wrapping_mul(17),
                255,
            ])
        });
        img.save(&path).expect("write png fixture");
        path
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn settings(&self) -> CacheSettings {
        CacheSettings::default().with_search_path(self.dir.path())
    }
}

/// Raster decoder that counts how often it runs.
#[derive(Debug, Clone, Default)]
pub struct CountingDecoder {
    calls: Arc<AtomicUsize>,
}

impl CountingDecoder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn registry(&self) -> DecoderRegistry {
        let mut registry = DecoderRegistry::with_defaults();
        for format in RasterDecoder::FORMATS {
            registry.register(format, Arc::new(self.clone()));
        }
        registry
    }
}

impl ImageDecoder for CountingDecoder {
    fn decode(
        &self,
        bytes: &[u8],
        format: ImageFormat,
    ) -> texcache_core::Result<DecodedImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        RasterDecoder.decode(bytes, format)
    }
}

/// Renders every string as a `len` x 1 A8 strip, one byte per char.
#[derive(Debug, Default)]
pub struct StubTextRenderer;

impl TextRenderer for StubTextRenderer {
    fn render(
        &self,
        text: &str,
        _font: &FontDefinition,
    ) -> texcache_core::Result<DecodedImage> {
        if text.is_empty() {
            return Err(TextureError::TextRender("empty string".into()));
        }
        let bytes: Vec<u8> = text.bytes().collect();
        DecodedImage::new(bytes.len() as u32, 1, PixelFormat::A8, bytes)
    }
}

/// Route cache logs to the test harness. Honors `RUST_LOG`; silent otherwise.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "off".into()),
        )
        .with_test_writer()
        .try_init();
}

pub fn cache_with(
    assets: &Assets,
    decoder: &CountingDecoder,
) -> TextureCache<HeadlessGpu> {
    init_tracing();
    TextureCache::new(HeadlessGpu::new(), assets.settings())
        .with_decoders(decoder.registry())
        .with_text_renderer(StubTextRenderer)
}

/// Tick until no async request is outstanding.
pub fn drain(cache: &mut TextureCache<HeadlessGpu>) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while cache.pipeline_stats().outstanding > 0 {
        assert!(Instant::now() < deadline, "async pipeline did not drain");
        cache.tick();
        std::thread::sleep(Duration::from_millis(1));
    }
}
