use thiserror::Error;

/// Main error type for cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Entry size {size_kb}KB exceeds cache capacity {capacity_kb}KB")]
    EntryTooLarge { size_kb: u64, capacity_kb: u64 },
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
