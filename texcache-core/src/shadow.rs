//! Shadow copies of texture sources for rebuilding GPU state after the
//! context is lost.
//!
//! Every upload made through the cache records where its pixels came from.
//! [`ShadowRegistry::reload_all`] replays those records in creation order and
//! re-applies the last sampling parameters.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use tracing::{debug, warn};

use crate::decoded::DecodedImage;
use crate::decoder::DecoderRegistry;
use crate::error::{Result, TextureError};
use crate::format::{ImageFormat, PixelFormat};
use crate::gpu::{GpuBackend, TexParams};
use crate::text::{FontDefinition, TextRenderer};
use crate::texture::{Texture, TextureHandle, TextureId};

/// What a texture was built from.
#[derive(Clone)]
pub enum ShadowSource {
    /// An image file, decoded again from disk.
    ImageFile {
        /// Resolved path of the file.
        path: PathBuf,
        /// Format the file was decoded as.
        format: ImageFormat,
    },
    /// Caller-supplied pixels, kept by reference.
    RawData {
        /// Tightly packed pixels.
        bytes: Arc<[u8]>,
        /// Layout of `bytes`.
        pixel_format: PixelFormat,
        /// Width in pixels.
        width: u32,
        /// Height in pixels.
        height: u32,
    },
    /// A string rendered again through the configured [`TextRenderer`].
    RenderedText {
        /// The rendered string.
        text: String,
        /// Font used to render it.
        font: FontDefinition,
    },
    /// An in-memory image handed to the cache.
    Image(DecodedImage),
}

impl ShadowSource {
    /// Short name of the source kind, as shown in dumps and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ShadowSource::ImageFile { .. } => "image-file",
            ShadowSource::RawData { .. } => "raw-data",
            ShadowSource::RenderedText { .. } => "string",
            ShadowSource::Image(_) => "image",
        }
    }

    fn regenerate(
        &self,
        decoders: &DecoderRegistry,
        text: Option<&dyn TextRenderer>,
    ) -> Result<DecodedImage> {
        match self {
            ShadowSource::ImageFile { path, format } => {
                decoders.decode_file(path, Some(*format))
            }
            ShadowSource::RawData {
                bytes,
                pixel_format,
                width,
                height,
            } => DecodedImage::new(
                *width,
                *height,
                *pixel_format,
                Arc::clone(bytes),
            ),
            ShadowSource::RenderedText { text: s, font } => text
                .ok_or_else(|| {
                    TextureError::TextRender(
                        "no text renderer configured".into(),
                    )
                })?
                .render(s, font),
            ShadowSource::Image(image) => Ok(image.clone()),
        }
    }
}

impl fmt::Debug for ShadowSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShadowSource::ImageFile { path, format } => f
                .debug_struct("ImageFile")
                .field("path", path)
                .field("format", format)
                .finish(),
            ShadowSource::RawData {
                bytes,
                pixel_format,
                width,
                height,
            } => f
                .debug_struct("RawData")
                .field("bytes", &bytes.len())
                .field("pixel_format", pixel_format)
                .field("width", width)
                .field("height", height)
                .finish(),
            ShadowSource::RenderedText { text, font } => f
                .debug_struct("RenderedText")
                .field("text", text)
                .field("font", font)
                .finish(),
            ShadowSource::Image(image) => {
                f.debug_tuple("Image").field(image).finish()
            }
        }
    }
}

impl fmt::Display for ShadowSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShadowSource::ImageFile { path, .. } => {
                write!(f, "file {}", path.display())
            }
            ShadowSource::RawData {
                pixel_format,
                width,
                height,
                ..
            } => write!(f, "raw {width}x{height} {pixel_format}"),
            ShadowSource::RenderedText { text, .. } => {
                write!(f, "string {text:?}")
            }
            ShadowSource::Image(image) => {
                write!(f, "image {}x{}", image.width(), image.height())
            }
        }
    }
}

/// How one live texture was built, and the parameters last applied to it.
#[derive(Debug)]
pub struct ShadowRecord {
    texture: Weak<Texture>,
    source: ShadowSource,
    params: Option<TexParams>,
}

impl ShadowRecord {
    /// Where the pixels come from.
    pub fn source(&self) -> &ShadowSource {
        &self.source
    }

    /// Sampling parameters re-applied after a reload.
    pub fn params(&self) -> Option<TexParams> {
        self.params
    }

    /// The tracked texture, if it is still alive.
    pub fn texture(&self) -> Option<TextureHandle> {
        self.texture.upgrade()
    }
}

/// A record that could not be rebuilt.
#[derive(Debug)]
pub struct ReloadFailure {
    /// Texture whose record failed.
    pub texture: TextureId,
    /// Display form of the record's source.
    pub source: String,
    /// Why regeneration or upload failed.
    pub error: TextureError,
}

/// Outcome of a [`ShadowRegistry::reload_all`] pass.
#[derive(Debug, Default)]
pub struct ReloadReport {
    /// Records rebuilt and rebound.
    pub reloaded: usize,
    /// Records dropped because their texture no longer exists.
    pub pruned: usize,
    /// Records that failed; their textures keep the previous GPU object.
    pub failures: Vec<ReloadFailure>,
    /// Set when the call arrived while a reload was already running.
    pub skipped: bool,
}

impl ReloadReport {
    /// True when the pass ran and every record succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.skipped
    }
}

/// Creation-ordered registry with one record per live texture.
#[derive(Debug, Default)]
pub struct ShadowRegistry {
    next_seq: u64,
    records: BTreeMap<u64, ShadowRecord>,
    by_texture: HashMap<TextureId, u64>,
    reloading: bool,
}

impl ShadowRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked textures.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// True while [`reload_all`](Self::reload_all) is running.
    pub fn is_reloading(&self) -> bool {
        self.reloading
    }

    /// Record for `texture`, if tracked.
    pub fn record(&self, texture: TextureId) -> Option<&ShadowRecord> {
        self.by_texture
            .get(&texture)
            .and_then(|seq| self.records.get(seq))
    }

    /// Records in replay order.
    pub fn records(&self) -> impl Iterator<Item = &ShadowRecord> {
        self.records.values()
    }

    /// Remember how `texture` was built. A texture that is already tracked
    /// has its source replaced and keeps its position and parameters.
    pub fn track(&mut self, texture: &TextureHandle, source: ShadowSource) {
        if self.reloading {
            return;
        }

        if let Some(record) = self
            .by_texture
            .get(&texture.id())
            .and_then(|seq| self.records.get_mut(seq))
        {
            record.source = source;
            return;
        }

        self.next_seq += 1;
        let seq = self.next_seq;
        self.records.insert(
            seq,
            ShadowRecord {
                texture: Arc::downgrade(texture),
                source,
                params: texture.params(),
            },
        );
        self.by_texture.insert(texture.id(), seq);
    }

    /// Remember the parameters to re-apply for `texture`.
    pub fn update_params(&mut self, texture: TextureId, params: TexParams) {
        if let Some(record) = self
            .by_texture
            .get(&texture)
            .and_then(|seq| self.records.get_mut(seq))
        {
            record.params = Some(params);
        }
    }

    /// Forget `texture`. Returns whether a record existed.
    pub fn untrack(&mut self, texture: TextureId) -> bool {
        match self.by_texture.remove(&texture) {
            Some(seq) => self.records.remove(&seq).is_some(),
            None => false,
        }
    }

    /// Rebuild every tracked texture from its source.
    ///
    /// Failures are reported per record; the pass always visits every
    /// record.
    pub fn reload_all<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        decoders: &DecoderRegistry,
        text: Option<&dyn TextRenderer>,
    ) -> ReloadReport {
        let mut report = ReloadReport::default();
        if self.reloading {
            warn!("texture reload requested while one is running");
            report.skipped = true;
            return report;
        }
        self.reloading = true;

        let mut dead = Vec::new();
        for (seq, record) in &self.records {
            let Some(texture) = record.texture.upgrade() else {
                dead.push(*seq);
                continue;
            };

            match reload_one(backend, decoders, text, &texture, record) {
                Ok(()) => report.reloaded += 1,
                Err(error) => {
                    warn!(
                        texture = %texture.id(),
                        source = %record.source,
                        error = %error,
                        "failed to reload texture"
                    );
                    report.failures.push(ReloadFailure {
                        texture: texture.id(),
                        source: record.source.to_string(),
                        error,
                    });
                }
            }
        }

        for seq in dead {
            self.records.remove(&seq);
            report.pruned += 1;
        }
        self.by_texture.retain(|_, seq| self.records.contains_key(seq));

        self.reloading = false;
        debug!(
            reloaded = report.reloaded,
            failed = report.failures.len(),
            pruned = report.pruned,
            "texture reload finished"
        );
        report
    }
}

fn reload_one<B: GpuBackend + ?Sized>(
    backend: &mut B,
    decoders: &DecoderRegistry,
    text: Option<&dyn TextRenderer>,
    texture: &Texture,
    record: &ShadowRecord,
) -> Result<()> {
    let image = record.source.regenerate(decoders, text)?;

    // The old object stays bound until its replacement exists.
    let old = texture.gpu_id();
    let gpu_id = backend.upload(&image)?;
    if old != gpu_id {
        backend.release(old);
    }
    texture.rebind(gpu_id);

    if let Some(params) = record.params {
        backend.apply_params(gpu_id, &params);
    }
    Ok(())
}
