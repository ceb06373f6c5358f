//! The texture cache facade.
//!
//! A [`TextureCache`] is owned by one thread (the render thread). All of its
//! methods, including [`TextureCache::tick`], must be called from that
//! thread; only file decoding for async loads happens elsewhere.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::decoded::DecodedImage;
use crate::decoder::DecoderRegistry;
use crate::error::{Result, TextureError};
use crate::format::{ImageFormat, PixelFormat};
use crate::gpu::{GpuBackend, HeadlessGpu, TexParams};
use crate::pipeline::{
    AsyncLoader, DecodedResult, LoadRequest, PipelineStats, Ticket,
};
use crate::report::{CacheReport, ReportEntry};
use crate::resolver::AssetResolver;
use crate::scheduler::{ManualTicks, TickScheduler};
use crate::settings::CacheSettings;
#[cfg(feature = "context-recovery")]
use crate::shadow::ShadowRegistry;
use crate::shadow::{ReloadReport, ShadowSource};
use crate::store::TextureStore;
use crate::text::{FontDefinition, GlyphRasterizer, TextRenderer};
use crate::texture::{TextureFactory, TextureHandle};

type AsyncCallback = Box<dyn FnOnce(Result<TextureHandle>)>;

/// What happened to an async load request at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncStatus {
    /// Already cached; the callback has run.
    Cached,
    /// Queued for the loader thread.
    Queued(Ticket),
    /// Attached to an identical request that is already decoding.
    Joined(Ticket),
    /// Rejected before queueing; the callback has run with the error.
    Rejected,
}

struct InFlight {
    key: String,
    callbacks: Vec<AsyncCallback>,
}

/// Keyed texture cache with an async loader and context-loss recovery.
///
/// Not `Send`: callbacks and GPU calls stay on the thread that owns it.
pub struct TextureCache<B: GpuBackend = HeadlessGpu> {
    settings: CacheSettings,
    backend: B,
    resolver: AssetResolver,
    decoders: Arc<DecoderRegistry>,
    text_renderer: Option<Box<dyn TextRenderer>>,
    scheduler: Box<dyn TickScheduler>,
    store: TextureStore,
    factory: TextureFactory,
    loader: AsyncLoader,
    in_flight: BTreeMap<Ticket, InFlight>,
    in_flight_by_key: HashMap<String, Ticket>,
    next_ticket: u64,
    outstanding: usize,
    drain_scheduled: bool,
    #[cfg(feature = "context-recovery")]
    shadow: ShadowRegistry,
}

impl<B: GpuBackend> TextureCache<B> {
    /// Cache over `backend` with the default decoders, the glyph rasterizer
    /// and a [`ManualTicks`] scheduler. The loader thread starts on first use.
    pub fn new(backend: B, settings: CacheSettings) -> Self {
        let decoders = Arc::new(DecoderRegistry::with_defaults());
        let loader = AsyncLoader::new(
            Arc::clone(&decoders),
            settings.worker_thread_name.clone(),
        );

        Self {
            resolver: AssetResolver::new(settings.search_paths.clone()),
            settings,
            backend,
            decoders,
            text_renderer: Some(Box::new(GlyphRasterizer::new())),
            scheduler: Box::new(ManualTicks::new()),
            store: TextureStore::new(),
            factory: TextureFactory::new(),
            loader,
            in_flight: BTreeMap::new(),
            in_flight_by_key: HashMap::new(),
            next_ticket: 0,
            outstanding: 0,
            drain_scheduled: false,
            #[cfg(feature = "context-recovery")]
            shadow: ShadowRegistry::new(),
        }
    }

    /// Replace the decoder table. Must be called before the first async
    /// load starts the loader thread.
    pub fn with_decoders(mut self, decoders: DecoderRegistry) -> Self {
        self.decoders = Arc::new(decoders);
        self.loader = AsyncLoader::new(
            Arc::clone(&self.decoders),
            self.settings.worker_thread_name.clone(),
        );
        self
    }

    /// Hook the drain tick into the host's scheduler.
    pub fn with_scheduler(
        mut self,
        scheduler: impl TickScheduler + 'static,
    ) -> Self {
        self.scheduler = Box::new(scheduler);
        self
    }

    /// Replace the renderer used for string textures.
    pub fn with_text_renderer(
        mut self,
        renderer: impl TextRenderer + 'static,
    ) -> Self {
        self.text_renderer = Some(Box::new(renderer));
        self
    }

    /// Settings the cache was built with.
    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// The GPU backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable access to the GPU backend.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Decoder table shared with the loader thread.
    pub fn decoders(&self) -> &DecoderRegistry {
        &self.decoders
    }

    /// Records used to rebuild textures after a context loss.
    #[cfg(feature = "context-recovery")]
    pub fn shadow_registry(&self) -> &ShadowRegistry {
        &self.shadow
    }

    /// Number of keyed entries.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// True when no keyed entry exists.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Store key for a name as given or as resolved on disk.
    fn lookup_key(&self, name: &str) -> Option<String> {
        if self.store.contains(name) {
            return Some(name.to_string());
        }
        let key = AssetResolver::key_for(&self.resolver.resolve(name).ok()?);
        self.store.contains(&key).then_some(key)
    }

    /// Already-loaded texture for `key`, without decoding or uploading.
    pub fn texture_for_key(&self, key: &str) -> Option<TextureHandle> {
        self.lookup_key(key).and_then(|k| self.store.get(&k))
    }

    /// Load an image file, or return the cached texture for it.
    pub fn add_image(&mut self, path: &str) -> Result<TextureHandle> {
        self.load_file(path, None)
    }

    /// Like [`add_image`](Self::add_image) but decodes as PVR regardless of
    /// extension.
    pub fn add_pvr_image(&mut self, path: &str) -> Result<TextureHandle> {
        self.load_file(path, Some(ImageFormat::Pvr))
    }

    /// Like [`add_image`](Self::add_image) but decodes as ETC.
    pub fn add_etc_image(&mut self, path: &str) -> Result<TextureHandle> {
        self.load_file(path, Some(ImageFormat::Etc))
    }

    fn load_file(
        &mut self,
        name: &str,
        forced: Option<ImageFormat>,
    ) -> Result<TextureHandle> {
        if let Some(texture) = self.store.get(name) {
            debug!(key = %name, "texture cache hit");
            return Ok(texture);
        }

        let path = self.resolver.resolve(name)?;
        let key = AssetResolver::key_for(&path);
        if let Some(texture) = self.store.get(&key) {
            debug!(key = %key, "texture cache hit");
            return Ok(texture);
        }

        let format = match forced {
            Some(format) => format,
            None => ImageFormat::from_path(&path)?,
        };
        let image = self.decoders.decode_file(&path, Some(format))?;
        let texture = self.upload(&image)?;
        self.track(&texture, ShadowSource::ImageFile { path, format });

        debug!(
            key = %key,
            width = image.width(),
            height = image.height(),
            "texture loaded"
        );
        Ok(self.store.insert_if_absent(key, texture))
    }

    /// Upload an image that is already in memory. With a key the result is
    /// cached (and an existing entry returned); without one a new texture
    /// is created on every call.
    pub fn add_decoded_image(
        &mut self,
        image: DecodedImage,
        key: Option<&str>,
    ) -> Result<TextureHandle> {
        if let Some(key) = key
            && let Some(texture) = self.store.get(key)
        {
            return Ok(texture);
        }

        let texture = self.upload(&image)?;
        self.track(&texture, ShadowSource::Image(image));
        Ok(match key {
            Some(key) => self.store.insert_if_absent(key.to_string(), texture),
            None => texture,
        })
    }

    /// Upload raw pixels of a known layout.
    pub fn add_raw_data(
        &mut self,
        key: Option<&str>,
        bytes: impl Into<Arc<[u8]>>,
        pixel_format: PixelFormat,
        width: u32,
        height: u32,
    ) -> Result<TextureHandle> {
        if let Some(key) = key
            && let Some(texture) = self.store.get(key)
        {
            return Ok(texture);
        }

        let image = DecodedImage::new(width, height, pixel_format, bytes)?;
        let texture = self.upload(&image)?;
        self.track(
            &texture,
            ShadowSource::RawData {
                bytes: image.shared_pixels(),
                pixel_format,
                width,
                height,
            },
        );
        Ok(match key {
            Some(key) => self.store.insert_if_absent(key.to_string(), texture),
            None => texture,
        })
    }

    /// Render `text` into a new texture. String textures are not keyed.
    pub fn add_string_texture(
        &mut self,
        text: &str,
        font: &FontDefinition,
    ) -> Result<TextureHandle> {
        let renderer = self.text_renderer.as_deref().ok_or_else(|| {
            TextureError::TextRender("no text renderer configured".into())
        })?;
        let image = renderer.render(text, font)?;
        let texture = self.upload(&image)?;
        self.track(
            &texture,
            ShadowSource::RenderedText {
                text: text.to_string(),
                font: font.clone(),
            },
        );
        Ok(texture)
    }

    /// Apply sampling parameters and remember them for context reloads.
    pub fn set_tex_params(&mut self, texture: &TextureHandle, params: TexParams) {
        self.backend.apply_params(texture.gpu_id(), &params);
        texture.set_params(params);
        #[cfg(feature = "context-recovery")]
        self.shadow.update_params(texture.id(), params);
    }

    fn upload(&mut self, image: &DecodedImage) -> Result<TextureHandle> {
        let gpu_id = self.backend.upload(image)?;
        Ok(self.factory.create(
            gpu_id,
            image.width(),
            image.height(),
            image.pixel_format(),
        ))
    }

    #[cfg(feature = "context-recovery")]
    fn track(&mut self, texture: &TextureHandle, source: ShadowSource) {
        if self.settings.context_recovery {
            self.shadow.track(texture, source);
        }
    }

    #[cfg(not(feature = "context-recovery"))]
    fn track(&mut self, _texture: &TextureHandle, _source: ShadowSource) {}

    /// Load `path` on the loader thread and call `on_loaded` with `target`
    /// once the texture is in the cache.
    ///
    /// `target` is held weakly: if it is dropped before the load completes
    /// the callback is skipped.
    pub fn add_image_async<T: 'static>(
        &mut self,
        path: &str,
        target: &Rc<T>,
        on_loaded: impl FnOnce(&T, Result<TextureHandle>) + 'static,
    ) -> AsyncStatus {
        let target = Rc::downgrade(target);
        self.add_image_async_with(path, move |outcome| {
            match target.upgrade() {
                Some(target) => on_loaded(&target, outcome),
                None => debug!("async texture target dropped before delivery"),
            }
        })
    }

    /// Load `path` on the loader thread and call `callback` from
    /// [`tick`](Self::tick) once done.
    ///
    /// A cached texture, or a request that fails before queueing, runs the
    /// callback before this returns.
    pub fn add_image_async_with(
        &mut self,
        path: &str,
        callback: impl FnOnce(Result<TextureHandle>) + 'static,
    ) -> AsyncStatus {
        if let Some(texture) = self.texture_for_key(path) {
            debug!(key = %path, "async load served from cache");
            callback(Ok(texture));
            return AsyncStatus::Cached;
        }

        let (path, format) = match self
            .resolver
            .resolve(path)
            .and_then(|p| ImageFormat::from_path(&p).map(|f| (p, f)))
        {
            Ok(resolved) => resolved,
            Err(err) => {
                warn!(path = %path, error = %err, "async texture load rejected");
                callback(Err(err));
                return AsyncStatus::Rejected;
            }
        };
        let key = AssetResolver::key_for(&path);

        if self.settings.dedupe_in_flight
            && let Some(ticket) = self.in_flight_by_key.get(&key).copied()
            && let Some(in_flight) = self.in_flight.get_mut(&ticket)
        {
            debug!(key = %key, ticket = ticket.0, "joining in-flight load");
            in_flight.callbacks.push(Box::new(callback));
            self.outstanding += 1;
            return AsyncStatus::Joined(ticket);
        }

        self.next_ticket += 1;
        let ticket = Ticket(self.next_ticket);
        let request = LoadRequest {
            ticket,
            key: key.clone(),
            path,
            format,
        };
        if let Err(err) = self.loader.submit(request) {
            callback(Err(err));
            return AsyncStatus::Rejected;
        }

        self.in_flight.insert(
            ticket,
            InFlight {
                key: key.clone(),
                callbacks: vec![Box::new(callback)],
            },
        );
        self.in_flight_by_key.insert(key, ticket);
        self.outstanding += 1;

        if !self.drain_scheduled {
            self.scheduler.schedule_drain(self.settings.drain_interval());
            self.drain_scheduled = true;
        }
        AsyncStatus::Queued(ticket)
    }

    /// Drain step: upload everything the loader has finished, fire the
    /// callbacks in submission order and free textures whose last reference
    /// went away. Returns the number of loader results processed.
    pub fn tick(&mut self) -> usize {
        let ready = self.loader.take_ready();
        let processed = ready.len();
        for result in ready {
            self.deliver(result);
        }

        if self.outstanding == 0 && self.drain_scheduled {
            self.scheduler.unschedule_drain();
            self.drain_scheduled = false;
        }

        self.collect_released();
        processed
    }

    fn deliver(&mut self, result: DecodedResult) {
        let DecodedResult { request, outcome } = result;
        let Some(in_flight) = self.in_flight.remove(&request.ticket) else {
            warn!(ticket = request.ticket.0, "decoded texture has no subscriber");
            return;
        };
        if self.in_flight_by_key.get(&in_flight.key) == Some(&request.ticket) {
            self.in_flight_by_key.remove(&in_flight.key);
        }

        let outcome =
            outcome.and_then(|image| self.install_decoded(&request, image));

        for callback in in_flight.callbacks {
            self.outstanding = self.outstanding.saturating_sub(1);
            callback(outcome.clone());
        }
    }

    fn install_decoded(
        &mut self,
        request: &LoadRequest,
        image: DecodedImage,
    ) -> Result<TextureHandle> {
        // A synchronous load may have beaten the loader to it.
        if let Some(texture) = self.store.get(&request.key) {
            return Ok(texture);
        }

        let texture = self.upload(&image)?;
        self.track(
            &texture,
            ShadowSource::ImageFile {
                path: request.path.clone(),
                format: request.format,
            },
        );
        debug!(key = %request.key, "async texture installed");
        Ok(self.store.insert_if_absent(request.key.clone(), texture))
    }

    /// Queue depths of the async pipeline.
    pub fn pipeline_stats(&self) -> PipelineStats {
        PipelineStats {
            outstanding: self.outstanding,
            ..self.loader.stats()
        }
    }

    /// Free GPU objects of textures whose last reference was dropped.
    fn collect_released(&mut self) -> usize {
        let released = self.factory.take_released();
        for texture in &released {
            self.backend.release(texture.gpu_id);
            #[cfg(feature = "context-recovery")]
            self.shadow.untrack(texture.id);
        }
        released.len()
    }

    /// Drop every cache entry. Textures still referenced elsewhere stay
    /// alive for their holders.
    pub fn remove_all_textures(&mut self) -> usize {
        let removed = self.store.clear().len();
        self.collect_released();
        debug!(removed, "removed all textures");
        removed
    }

    /// Drop entries that only the cache still references.
    pub fn remove_unused_textures(&mut self) -> usize {
        let removed = self.store.remove_unused();
        for (key, _) in &removed {
            debug!(key = %key, "removing unused texture");
        }
        let count = removed.len();
        drop(removed);
        self.collect_released();
        count
    }

    /// Drop the entry holding `texture`. Returns whether one existed.
    pub fn remove_texture(&mut self, texture: &TextureHandle) -> bool {
        let removed = self.store.remove_handle(texture).is_some();
        self.collect_released();
        removed
    }

    /// Drop the entry for `key`, matched as given or as resolved on disk.
    pub fn remove_texture_for_key(&mut self, key: &str) -> bool {
        let Some(key) = self.lookup_key(key) else {
            return false;
        };
        let removed = self.store.remove(&key).is_some();
        self.collect_released();
        removed
    }

    /// Copy of the key to texture map.
    pub fn snapshot_textures(&self) -> BTreeMap<String, TextureHandle> {
        self.store.snapshot()
    }

    /// Per-texture memory report. Also written to the log.
    pub fn dump_cached_texture_info(&self) -> CacheReport {
        let report = CacheReport {
            entries: self
                .store
                .iter()
                .map(|(key, texture)| ReportEntry {
                    key: key.to_string(),
                    external_refs: Arc::strong_count(texture) - 1,
                    gpu_id: texture.gpu_id(),
                    width: texture.width(),
                    height: texture.height(),
                    pixel_format: texture.pixel_format(),
                    bytes: texture.bytes(),
                })
                .collect(),
        };

        for entry in &report.entries {
            info!("{entry}");
        }
        info!(
            textures = report.texture_count(),
            kib = report.total_kib(),
            "TextureCache: {} textures, for {} KB ({:.2} MB)",
            report.texture_count(),
            report.total_kib(),
            report.total_mib()
        );
        report
    }

    /// Rebuild every live texture from its recorded source, e.g. after the
    /// GPU context was recreated.
    pub fn reload_all_textures(&mut self) -> ReloadReport {
        self.collect_released();

        #[cfg(feature = "context-recovery")]
        if self.settings.context_recovery {
            return self.shadow.reload_all(
                &mut self.backend,
                &self.decoders,
                self.text_renderer.as_deref(),
            );
        }

        debug!("context recovery disabled; nothing to reload");
        ReloadReport::default()
    }

    /// Stop the loader thread. Pending async requests are answered with
    /// [`TextureError::ShutDown`]. Idempotent.
    pub fn shutdown(&mut self) {
        let discarded = self.loader.shutdown();
        let pending = std::mem::take(&mut self.in_flight);
        self.in_flight_by_key.clear();

        if discarded > 0 || !pending.is_empty() {
            debug!(
                discarded,
                pending = pending.len(),
                "texture loader shut down with work outstanding"
            );
        }
        for (_, in_flight) in pending {
            for callback in in_flight.callbacks {
                callback(Err(TextureError::ShutDown));
            }
        }
        self.outstanding = 0;

        if self.drain_scheduled {
            self.scheduler.unschedule_drain();
            self.drain_scheduled = false;
        }
    }
}

impl<B: GpuBackend> Drop for TextureCache<B> {
    fn drop(&mut self) {
        self.shutdown();
        self.remove_all_textures();
    }
}

impl<B: GpuBackend> fmt::Display for TextureCache<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<TextureCache | Number of textures = {}>", self.store.len())
    }
}

impl<B: GpuBackend> fmt::Debug for TextureCache<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextureCache")
            .field("textures", &self.store.len())
            .field("outstanding", &self.outstanding)
            .field("drain_scheduled", &self.drain_scheduled)
            .field("decoders", &self.decoders)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn cache() -> TextureCache {
        TextureCache::new(HeadlessGpu::new(), CacheSettings::default())
    }

    fn pixels(fill: u8) -> DecodedImage {
        DecodedImage::new(2, 2, PixelFormat::Rgba8888, vec![fill; 16]).unwrap()
    }

    #[test]
    fn keyed_in_memory_image_is_cached() {
        let mut cache = cache();
        let a = cache.add_decoded_image(pixels(1), Some("ui/a")).unwrap();
        let b = cache.add_decoded_image(pixels(2), Some("ui/a")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.backend().upload_count(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn unkeyed_in_memory_image_is_never_cached() {
        let mut cache = cache();
        let a = cache.add_decoded_image(pixels(1), None).unwrap();
        let b = cache.add_decoded_image(pixels(1), None).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(cache.is_empty());
    }

    #[test]
    fn raw_data_validates_size() {
        let mut cache = cache();
        let err = cache
            .add_raw_data(Some("raw"), vec![0u8; 3], PixelFormat::Rgb565, 2, 2)
            .unwrap_err();
        assert!(matches!(err, TextureError::InvalidData(_)));
        assert!(cache.is_empty());
    }

    #[test]
    fn raw_data_with_huge_dimensions_is_invalid() {
        let mut cache = cache();
        let err = cache
            .add_raw_data(
                Some("k"),
                vec![0u8; 4],
                PixelFormat::Rgba8888,
                u32::MAX,
                u32::MAX,
            )
            .unwrap_err();
        assert!(matches!(err, TextureError::InvalidData(_)));
        assert!(cache.is_empty());
        assert_eq!(cache.backend().upload_count(), 0);
    }

    #[test]
    fn dropped_texture_releases_gpu_object_on_tick() {
        let mut cache = cache();
        let texture = cache.add_decoded_image(pixels(1), None).unwrap();
        let gpu_id = texture.gpu_id();
        assert!(cache.backend().is_resident(gpu_id));

        drop(texture);
        cache.tick();
        assert!(!cache.backend().is_resident(gpu_id));
    }

    #[test]
    fn tex_params_reach_backend_and_texture() {
        let mut cache = cache();
        let texture = cache.add_decoded_image(pixels(1), Some("p")).unwrap();
        cache.set_tex_params(&texture, TexParams::aliased());
        assert_eq!(texture.params(), Some(TexParams::aliased()));
        assert_eq!(
            cache.backend().params(texture.gpu_id()),
            Some(TexParams::aliased())
        );
    }

    #[test]
    fn display_counts_textures() {
        let mut cache = cache();
        cache.add_decoded_image(pixels(1), Some("x")).unwrap();
        assert_eq!(cache.to_string(), "<TextureCache | Number of textures = 1>");
    }

    #[test]
    fn async_rejection_runs_callback_immediately() {
        let mut cache = cache();
        let seen = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&seen);
        let status = cache.add_image_async_with(
            "/nonexistent/texcache/async.png",
            move |outcome| {
                *sink.borrow_mut() = Some(outcome.map(|_| ()));
            },
        );
        assert_eq!(status, AsyncStatus::Rejected);
        assert!(matches!(
            seen.borrow().as_ref(),
            Some(Err(TextureError::PathNotFound(_)))
        ));
        assert_eq!(cache.pipeline_stats().outstanding, 0);
    }

    #[test]
    fn string_texture_without_renderer_fails() {
        let mut cache = cache();
        cache.text_renderer = None;
        let err = cache
            .add_string_texture("hi", &FontDefinition::new("ui.ttf", 10.0))
            .unwrap_err();
        assert!(matches!(err, TextureError::TextRender(_)));
    }
}
