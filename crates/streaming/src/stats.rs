use serde::Serialize;

/// Snapshot of cache occupancy and lifetime counters.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub loaded: usize,
    pub pending: usize,
    pub errored: usize,
    pub loaded_bytes: usize,
    pub queued: usize,
    pub in_flight: usize,
    pub hits: u64,
    pub misses: u64,
    pub deferred: u64,
    pub evictions: u64,
    pub failures: u64,
    pub stale_completions: u64,
}

impl CacheStats {
    /// Fraction of lookups answered from loaded tiles.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}
