//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, and evictions.

use serde::Serialize;

// == Cache Stats ==
/// Tracks cache performance metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals
    pub misses: u64,
    /// Number of entries evicted due to LRU policy
    pub evictions: u64,
    /// Current number of entries in the cache
    pub total_entries: usize,
    /// Bytes currently charged (key + value over all entries)
    pub bytes: usize,
    /// Configured capacity in bytes
    pub capacity: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    // == Wire Rendering ==
    /// Renders the `stats` command reply, `END` included, final terminator excluded.
    pub fn to_wire(&self) -> Vec<u8> {
        let lines = [
            ("curr_items", self.total_entries as u64),
            ("bytes", self.bytes as u64),
            ("limit_maxbytes", self.capacity as u64),
            ("get_hits", self.hits),
            ("get_misses", self.misses),
            ("evictions", self.evictions),
        ];

        let mut out = String::new();
        for (name, value) in lines {
            out.push_str(&format!("STAT {} {}\r\n", name, value));
        }
        out.push_str("END");
        out.into_bytes()
    }
}
