//! Drain tick scheduling.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Host hook for the periodic drain.
///
/// The cache asks for a tick while async loads are outstanding and cancels
/// it once the last one is delivered. The host must then call
/// [`TextureCache::tick`](crate::TextureCache::tick) on the owning thread at
/// roughly the requested interval.
pub trait TickScheduler {
    /// Start calling `tick` every `interval`.
    fn schedule_drain(&mut self, interval: Duration);

    /// Stop calling `tick`.
    fn unschedule_drain(&mut self);
}

/// Scheduler for hosts that poll: records whether a tick is wanted.
///
/// Clones share state, so the host keeps one copy and hands another to the
/// cache.
#[derive(Debug, Clone, Default)]
pub struct ManualTicks {
    inner: Arc<ManualTicksInner>,
}

#[derive(Debug, Default)]
struct ManualTicksInner {
    scheduled: AtomicBool,
    interval_ms: AtomicU64,
    schedules: AtomicUsize,
    unschedules: AtomicUsize,
}

impl ManualTicks {
    /// Nothing scheduled.
    pub fn new() -> Self {
        Self::default()
    }

    /// True while the cache wants ticks.
    pub fn is_scheduled(&self) -> bool {
        self.inner.scheduled.load(Ordering::Acquire)
    }

    /// Interval of the latest request.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.inner.interval_ms.load(Ordering::Relaxed))
    }

    /// How many times a drain tick was registered.
    pub fn schedule_count(&self) -> usize {
        self.inner.schedules.load(Ordering::Relaxed)
    }

    /// How many times a drain tick was cancelled.
    pub fn unschedule_count(&self) -> usize {
        self.inner.unschedules.load(Ordering::Relaxed)
    }
}

impl TickScheduler for ManualTicks {
    fn schedule_drain(&mut self, interval: Duration) {
        self.inner
            .interval_ms
            .store(interval.as_millis() as u64, Ordering::Relaxed);
        self.inner.scheduled.store(true, Ordering::Release);
        self.inner.schedules.fetch_add(1, Ordering::Relaxed);
    }

    fn unschedule_drain(&mut self) {
        self.inner.scheduled.store(false, Ordering::Release);
        self.inner.unschedules.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let host = ManualTicks::new();
        let mut cache_side = host.clone();

        cache_side.schedule_drain(Duration::from_millis(16));
        assert!(host.is_scheduled());
        assert_eq!(host.interval(), Duration::from_millis(16));

        cache_side.unschedule_drain();
        assert!(!host.is_scheduled());
        assert_eq!(host.schedule_count(), 1);
        assert_eq!(host.unschedule_count(), 1);
    }
}
