use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Limits for the tile cache and its fetch pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Loaded tiles kept before least-recently-used eviction.
    pub max_tiles: usize,
    /// Optional cap on decoded payload bytes across loaded tiles.
    pub max_bytes: Option<usize>,
    /// Queued (not yet dispatched) requests; further misses are deferred.
    pub max_queued: usize,
    /// Concurrent fetches the loader keeps open.
    pub max_in_flight: usize,
    /// Requests dispatched per frame.
    pub dispatch_per_frame: usize,
    pub retry: RetryPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_tiles: 1_024,
            max_bytes: None,
            max_queued: 512,
            max_in_flight: 16,
            dispatch_per_frame: 32,
            retry: RetryPolicy::default(),
        }
    }
}
