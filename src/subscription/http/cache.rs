use std::any::Any;
use std::time::{Duration, Instant};

/// A cached entry with timestamp and staleness information.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp: Instant,
    pub is_stale: bool,
}

impl<T> CacheEntry<T> {
    /// Creates a new cache entry with the given data.
    pub fn new(data: T) -> Self {
        Self {
            data,
            timestamp: Instant::now(),
            is_stale: false,
        }
    }

    /// Checks if this entry is stale based on the given stale time.
    pub fn check_staleness(&mut self, stale_time: Duration) -> bool {
        if self.timestamp.elapsed() > stale_time {
            self.is_stale = true;
        }
        self.is_stale
    }

    /// Marks this entry as stale.
    pub const fn mark_stale(&mut self) {
        self.is_stale = true;
    }

    /// Checks if this entry should be garbage collected based on cache time.
    pub fn should_gc(&self, cache_time: Duration) -> bool {
        self.timestamp.elapsed() > cache_time
    }
}

/// Type-erased view of a [`CacheEntry`], so one map can hold entries of
/// every value type.
pub(crate) trait AnyEntry: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn mark_stale(&mut self);
    fn should_gc(&self, cache_time: Duration) -> bool;
}

impl<T: Send + Sync + 'static> AnyEntry for CacheEntry<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn mark_stale(&mut self) {
        Self::mark_stale(self);
    }

    fn should_gc(&self, cache_time: Duration) -> bool {
        Self::should_gc(self, cache_time)
    }
}
