//! Manifest cache with a fixed time-to-live.
//!
//! Fetched sets are kept in the persistent store under a single key, keyed by
//! normalized set number. Entries expire seven days after they were cached
//! and are evicted lazily when read.

mod layer;
mod traits;

pub use layer::ResponseCache;
pub use traits::CacheResult;
#[cfg(test)]
pub use traits::CacheSource;
