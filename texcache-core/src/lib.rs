//! GPU texture cache with a background decode pipeline.
//!
//! [`TextureCache`] deduplicates decode and upload work per key and hands
//! out shared [`TextureHandle`]s. Files can be loaded synchronously or on a
//! dedicated loader thread, in which case results are uploaded and
//! delivered from [`TextureCache::tick`] on the owning thread.
//!
//! With the `context-recovery` feature (on by default) every upload is
//! mirrored in a [`ShadowRegistry`] so that all live textures can be rebuilt
//! after the GPU context is lost, see
//! [`TextureCache::reload_all_textures`].
//!
//! ```no_run
//! use texcache_core::{CacheSettings, HeadlessGpu, TextureCache};
//!
//! let mut cache = TextureCache::new(HeadlessGpu::new(), CacheSettings::default());
//! let background = cache.add_image("assets/bg.png")?;
//! assert!(std::sync::Arc::ptr_eq(&background, &cache.add_image("assets/bg.png")?));
//! # Ok::<(), texcache_core::TextureError>(())
//! ```

pub mod cache;
pub mod decoded;
pub mod decoder;
pub mod error;
pub mod format;
pub mod gpu;
pub mod pipeline;
pub mod report;
pub mod resolver;
pub mod scheduler;
pub mod settings;
pub mod shadow;
pub mod store;
pub mod text;
pub mod texture;

pub use cache::{AsyncStatus, TextureCache};
pub use decoded::DecodedImage;
pub use decoder::{DecoderRegistry, ImageDecoder, RasterDecoder};
pub use error::{Result, TextureError};
pub use format::{ImageFormat, PixelFormat};
pub use gpu::{Filter, GpuBackend, GpuTextureId, HeadlessGpu, TexParams, Wrap};
pub use pipeline::{PipelineStats, Ticket};
pub use report::{CacheReport, ReportEntry};
pub use resolver::AssetResolver;
pub use scheduler::{ManualTicks, TickScheduler};
pub use settings::{CacheSettings, DEFAULT_WORKER_THREAD_NAME};
pub use shadow::{
    ReloadFailure, ReloadReport, ShadowRecord, ShadowRegistry, ShadowSource,
};
pub use store::TextureStore;
pub use text::{FontDefinition, GlyphRasterizer, TextAlignment, TextRenderer};
pub use texture::{Texture, TextureHandle, TextureId};
