use std::time::Duration;

/// Caching behaviour shared by every query of a [`QueryClient`].
///
/// [`QueryClient`]: super::QueryClient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfig {
    /// How long data is considered fresh before becoming stale.
    ///
    /// A new query subscription that finds fresh data uses it without
    /// refetching. Stale data is emitted first and then refetched.
    pub stale_time: Duration,

    /// How long cached data is retained before
    /// [`QueryClient::collect_garbage`](super::QueryClient::collect_garbage)
    /// drops it.
    pub cache_time: Duration,

    /// Buffer size of the channel that carries invalidation and
    /// fetch-next-page events to active queries.
    pub event_capacity: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(0),      // immediately stale
            cache_time: Duration::from_secs(5 * 60), // 5 minutes
            event_capacity: 100,
        }
    }
}

impl QueryConfig {
    /// Creates a new query configuration with the given stale and cache times.
    #[must_use]
    pub const fn new(stale_time: Duration, cache_time: Duration) -> Self {
        Self {
            stale_time,
            cache_time,
            event_capacity: 100,
        }
    }

    #[must_use]
    pub const fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    #[must_use]
    pub const fn with_cache_time(mut self, cache_time: Duration) -> Self {
        self.cache_time = cache_time;
        self
    }

    /// Sets the event channel size. Zero is raised to one.
    #[must_use]
    pub const fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = if capacity == 0 { 1 } else { capacity };
        self
    }
}
