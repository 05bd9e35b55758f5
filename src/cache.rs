use std::time::{Duration, Instant};

use tracing::debug;

/// Analytics payloads stay valid for this long before a rebuild.
pub const DEFAULT_PAYLOAD_TTL: Duration = Duration::from_secs(600);

/// Single-slot cache for an expensive computed value. Holds the value with
/// the instant it was built; a fresh slot is served as a clone, a stale or
/// empty slot triggers recomputation.
#[derive(Debug)]
pub struct TtlCache<T> {
    ttl: Duration,
    slot: Option<(T, Instant)>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        TtlCache { ttl, slot: None }
    }

    /// Return the cached value, rebuilding through `compute` when the slot
    /// is empty or older than the TTL.
    pub fn get_or_compute(&mut self, compute: impl FnOnce() -> T) -> T {
        if let Some((value, built_at)) = &self.slot {
            if built_at.elapsed() < self.ttl {
                debug!("Cache hit - age={:.1}s", built_at.elapsed().as_secs_f32());
                return value.clone();
            }
            debug!("Cache expired - age={:.1}s", built_at.elapsed().as_secs_f32());
        }
        let value = compute();
        self.slot = Some((value.clone(), Instant::now()));
        value
    }

    /// Drop the slot so the next read recomputes, regardless of age.
    pub fn invalidate(&mut self) {
        self.slot = None;
    }
}

impl<T: Clone> Default for TtlCache<T> {
    fn default() -> Self {
        TtlCache::new(DEFAULT_PAYLOAD_TTL)
    }
}
