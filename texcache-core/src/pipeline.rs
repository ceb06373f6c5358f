//! Background decode pipeline.
//!
//! One loader thread sits between two queues:
//!
//! ```text
//! owner thread --LoadRequest--> [inbound] --> loader thread (read + decode)
//! owner thread <--DecodedResult-- [outbound] <--/
//! ```
//!
//! Each queue has its own mutex and the loader never holds both. The owner
//! thread only blocks on the loader in [`AsyncLoader::shutdown`].

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, warn};

use crate::decoded::DecodedImage;
use crate::decoder::DecoderRegistry;
use crate::error::{Result, TextureError};
use crate::format::ImageFormat;

/// Identifies one submission to the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(pub u64);

/// Work item handed to the loader thread. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    /// Submission this request belongs to.
    pub ticket: Ticket,
    /// Cache key the result is stored under.
    pub key: String,
    /// Resolved file to decode.
    pub path: PathBuf,
    /// Format implied by the file name.
    pub format: ImageFormat,
}

/// Produced by the loader thread, consumed by the owner thread.
#[derive(Debug)]
pub struct DecodedResult {
    /// The request that was decoded.
    pub request: LoadRequest,
    /// Pixels, or why decoding failed.
    pub outcome: Result<DecodedImage>,
}

#[derive(Debug, Default)]
struct Inbound {
    queue: VecDeque<LoadRequest>,
    quit: bool,
}

#[derive(Debug, Default)]
struct Shared {
    inbound: Mutex<Inbound>,
    wake: Condvar,
    outbound: Mutex<VecDeque<DecodedResult>>,
    decoded_total: AtomicU64,
}

/// Point-in-time view of the pipeline queues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Async requests whose callbacks have not fired yet.
    pub outstanding: usize,
    /// Requests waiting for the loader thread.
    pub queued: usize,
    /// Decoded results waiting for the next drain.
    pub ready: usize,
    /// Files decoded (or failed) by the loader since start.
    pub decoded_total: u64,
}

/// Owns the loader thread and both queues.
#[derive(Debug)]
pub struct AsyncLoader {
    shared: Arc<Shared>,
    decoders: Arc<DecoderRegistry>,
    thread_name: String,
    worker: Option<JoinHandle<()>>,
    shut_down: bool,
}

impl AsyncLoader {
    /// Loader that will decode with `decoders` on a thread named
    /// `thread_name`. No thread is started yet.
    pub fn new(decoders: Arc<DecoderRegistry>, thread_name: String) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            decoders,
            thread_name,
            worker: None,
            shut_down: false,
        }
    }

    /// True once the loader thread has started.
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Queue a request, starting the loader thread on first use.
    pub fn submit(&mut self, request: LoadRequest) -> Result<()> {
        if self.shut_down {
            return Err(TextureError::ShutDown);
        }
        self.ensure_started()?;

        debug!(
            ticket = request.ticket.0,
            key = %request.key,
            "queueing async texture load"
        );
        self.shared.inbound.lock().queue.push_back(request);
        self.shared.wake.notify_one();
        Ok(())
    }

    fn ensure_started(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        let decoders = Arc::clone(&self.decoders);
        let handle = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || run_loader(&shared, &decoders))
            .map_err(|e| {
                TextureError::Worker(format!(
                    "failed to spawn loader thread: {e}"
                ))
            })?;

        debug!(thread = %self.thread_name, "texture loader thread started");
        self.worker = Some(handle);
        Ok(())
    }

    /// Everything decoded so far. Results that land while the caller is
    /// processing this batch are picked up by the next call.
    pub fn take_ready(&self) -> Vec<DecodedResult> {
        let mut outbound = self.shared.outbound.lock();
        outbound.drain(..).collect()
    }

    /// Queue depths and the decode count.
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            outstanding: 0,
            queued: self.shared.inbound.lock().queue.len(),
            ready: self.shared.outbound.lock().len(),
            decoded_total: self.shared.decoded_total.load(Ordering::Relaxed),
        }
    }

    /// Signal the loader to quit and join it.
    ///
    /// The loader finishes whatever is still queued before it exits; those
    /// results are discarded along with anything not yet drained. Returns
    /// the number of discarded results.
    pub fn shutdown(&mut self) -> usize {
        if self.shut_down {
            return 0;
        }
        self.shut_down = true;

        {
            let mut inbound = self.shared.inbound.lock();
            inbound.quit = true;
        }
        self.shared.wake.notify_all();

        if let Some(handle) = self.worker.take()
            && handle.join().is_err()
        {
            error!(thread = %self.thread_name, "texture loader thread panicked");
        }

        let discarded = self.shared.outbound.lock().drain(..).count();
        if discarded > 0 {
            debug!(discarded, "discarding decoded textures at shutdown");
        }
        discarded
    }
}

impl Drop for AsyncLoader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_loader(shared: &Shared, decoders: &DecoderRegistry) {
    loop {
        let request = {
            let mut inbound = shared.inbound.lock();
            loop {
                if let Some(request) = inbound.queue.pop_front() {
                    break request;
                }
                if inbound.quit {
                    debug!("texture loader thread exiting");
                    return;
                }
                shared.wake.wait(&mut inbound);
            }
        };

        let outcome = decode_request(decoders, &request);
        if let Err(err) = &outcome {
            warn!(key = %request.key, error = %err, "async texture decode failed");
        }

        shared
            .outbound
            .lock()
            .push_back(DecodedResult { request, outcome });
        shared.decoded_total.fetch_add(1, Ordering::Relaxed);
    }
}

fn decode_request(
    decoders: &DecoderRegistry,
    request: &LoadRequest,
) -> Result<DecodedImage> {
    // A panicking decoder must not take the loader thread down with it.
    match panic::catch_unwind(AssertUnwindSafe(|| {
        decoders.decode_file(&request.path, Some(request.format))
    })) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(key = %request.key, %reason, "decoder panicked");
            Err(TextureError::decode(
                &request.path,
                format!("decoder panicked: {reason}"),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::PixelFormat;
    use std::time::{Duration, Instant};

    fn request(ticket: u64, path: &str, format: ImageFormat) -> LoadRequest {
        LoadRequest {
            ticket: Ticket(ticket),
            key: path.to_string(),
            path: PathBuf::from(path),
            format,
        }
    }

    fn wait_for(loader: &AsyncLoader, count: usize) -> Vec<DecodedResult> {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut results = Vec::new();
        while results.len() < count && Instant::now() < deadline {
            results.extend(loader.take_ready());
            thread::sleep(Duration::from_millis(1));
        }
        results
    }

    /// Decoder that ignores file contents.
    fn stub_registry() -> Arc<DecoderRegistry> {
        let mut registry = DecoderRegistry::empty();
        registry.register(
            ImageFormat::Png,
            Arc::new(|bytes: &[u8], _: ImageFormat| {
                if bytes.starts_with(b"panic") {
                    panic!("corrupt stream");
                }
                DecodedImage::new(1, 1, PixelFormat::A8, vec![bytes.len() as u8])
            }),
        );
        Arc::new(registry)
    }

    #[test]
    fn thread_starts_lazily() {
        let loader =
            AsyncLoader::new(stub_registry(), "test-loader".to_string());
        assert!(!loader.is_running());
    }

    #[test]
    fn results_arrive_in_submission_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut loader =
            AsyncLoader::new(stub_registry(), "test-loader".to_string());

        for i in 0..8u64 {
            let path = dir.path().join(format!("{i}.png"));
            std::fs::write(&path, vec![0u8; i as usize + 1]).unwrap();
            loader
                .submit(request(i, path.to_str().unwrap(), ImageFormat::Png))
                .unwrap();
        }

        let results = wait_for(&loader, 8);
        let tickets: Vec<u64> =
            results.iter().map(|r| r.request.ticket.0).collect();
        assert_eq!(tickets, (0..8).collect::<Vec<_>>());
        assert!(results.iter().all(|r| r.outcome.is_ok()));
    }

    #[test]
    fn failures_do_not_stop_the_loader() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.png");
        std::fs::write(&bad, b"panic please").unwrap();
        let good = dir.path().join("good.png");
        std::fs::write(&good, b"ok").unwrap();

        let mut loader =
            AsyncLoader::new(stub_registry(), "test-loader".to_string());
        loader
            .submit(request(1, "/nonexistent/texcache.png", ImageFormat::Png))
            .unwrap();
        loader
            .submit(request(2, bad.to_str().unwrap(), ImageFormat::Png))
            .unwrap();
        loader
            .submit(request(3, good.to_str().unwrap(), ImageFormat::Png))
            .unwrap();

        let results = wait_for(&loader, 3);
        assert_eq!(results.len(), 3);
        assert!(matches!(
            results[0].outcome,
            Err(TextureError::PathNotFound(_))
        ));
        assert!(matches!(results[1].outcome, Err(TextureError::Decode { .. })));
        assert!(results[2].outcome.is_ok());
        assert_eq!(loader.stats().decoded_total, 3);
    }

    #[test]
    fn shutdown_with_queued_work_terminates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.png");
        std::fs::write(&path, b"ok").unwrap();

        let mut loader =
            AsyncLoader::new(stub_registry(), "test-loader".to_string());
        for i in 0..64 {
            loader
                .submit(request(i, path.to_str().unwrap(), ImageFormat::Png))
                .unwrap();
        }

        let started = Instant::now();
        loader.shutdown();
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(!loader.is_running());
        assert_eq!(loader.stats().queued, 0);
        assert_eq!(loader.stats().ready, 0);
        assert!(matches!(
            loader.submit(request(99, "x.png", ImageFormat::Png)),
            Err(TextureError::ShutDown)
        ));
    }

    #[test]
    fn shutdown_wakes_an_idle_loader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.png");
        std::fs::write(&path, b"ok").unwrap();

        let mut loader =
            AsyncLoader::new(stub_registry(), "test-loader".to_string());
        loader
            .submit(request(1, path.to_str().unwrap(), ImageFormat::Png))
            .unwrap();
        assert_eq!(wait_for(&loader, 1).len(), 1);

        // The loader is now parked on the condition variable.
        loader.shutdown();
        assert!(!loader.is_running());
    }
}
