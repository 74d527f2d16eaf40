//! Cache Module
//!
//! Provides the byte-bounded in-memory cache with LRU eviction.

mod entry;
mod lru;
mod stats;
mod storage;
mod store;


// Re-export public types
pub use entry::CacheEntry;
pub use lru::RecencyList;
pub use stats::CacheStats;
pub use storage::Storage;
pub use store::CacheStore;
