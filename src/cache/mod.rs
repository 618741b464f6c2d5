//! In-memory caching layer for backend query results.
//!
//! This module provides a small, backend-agnostic caching mechanism that:
//! - Caches lists of entities under a composite query key
//! - Treats entries older than the configured TTL as absent
//! - Never evicts by size; entries go away on staleness or explicit clear
//! - Never caches failures and never serves stale data

mod layer;
mod storage;
mod traits;

pub use layer::CacheLayer;
pub use storage::MemoryStorage;
pub use traits::Cacheable;
