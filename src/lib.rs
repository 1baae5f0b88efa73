pub mod adaptive;
pub mod config;
pub mod error;
pub mod facade;
pub mod keys;
pub mod store;

// Re-export commonly used types
pub use adaptive::{AccessStat, AdaptiveCache, adaptive_ttl};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use facade::RealtyCache;
pub use store::{CacheEntry, EntrySnapshot, HybridStore};
