//! Cache tuning knobs.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Loader thread name used when none is configured.
pub const DEFAULT_WORKER_THREAD_NAME: &str = "texcache-loader";

/// Runtime tuning for a [`TextureCache`](crate::TextureCache).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Roots searched, in order, when an image name is not an existing path.
    pub search_paths: Vec<PathBuf>,
    /// Name of the background decode thread.
    pub worker_thread_name: String,
    /// Attach a second async request for a key that is already decoding to
    /// the first one instead of decoding the file again.
    pub dedupe_in_flight: bool,
    /// Interval requested from the host scheduler for the drain tick.
    pub drain_interval_ms: u64,
    /// Keep shadow records for context-loss recovery. Ignored when the
    /// `context-recovery` feature is compiled out.
    pub context_recovery: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            worker_thread_name: DEFAULT_WORKER_THREAD_NAME.to_string(),
            dedupe_in_flight: true,
            drain_interval_ms: 16,
            context_recovery: true,
        }
    }
}

impl CacheSettings {
    /// `drain_interval_ms` as a [`Duration`].
    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }

    /// Append a search root.
    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }
}
