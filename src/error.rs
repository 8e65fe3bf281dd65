//! Error types for the playlist catalog

/// Result type alias for catalog operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the catalog API
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Operation attempted before `Catalog::initialize`
    #[error("Catalog not initialized")]
    NotInitialized,

    /// Lookup by sequence number with no match
    #[error("Channel not found: {0}")]
    ChannelNotFound(usize),

    /// Refresh requested while another cycle is running
    #[error("A refresh is already in progress")]
    RefreshInProgress,

    /// Playlist could not be fetched or parsed
    #[error("Failed to fetch playlist: {0}")]
    Fetch(#[from] FetchError),

    /// Persisted cache is malformed
    #[error("Failed to decode cache: {0}")]
    CacheDecode(#[source] CacheError),

    /// Cache could not be written or read
    #[error("Cache error: {0}")]
    Cache(#[source] CacheError),

    /// Refresh requested outside a tokio runtime
    #[error("Refresh requires a running tokio runtime")]
    NoRuntime,

    /// Refresh worker stopped without reporting an outcome
    #[error("{0}")]
    Internal(String),
}

impl From<CacheError> for Error {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Decode(_) => Self::CacheDecode(err),
            other => Self::Cache(other),
        }
    }
}

/// Errors produced while fetching or tokenizing a playlist
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Invalid playlist URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status, with a user-facing message
    #[error("{message}")]
    Status { code: u16, message: String },

    #[error("Playlist too large: {size_mb:.1}MB (limit {limit_mb}MB)")]
    TooLarge { size_mb: f64, limit_mb: usize },

    #[error("Playlist line exceeds max length of {0} bytes")]
    LineTooLong(usize),

    #[error("Timed out while reading playlist line")]
    ReadTimeout,

    #[error("Invalid playlist format (missing #EXTM3U header)")]
    MissingHeader,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Upstream returned no usable entries
    #[error("Playlist has no entries")]
    Empty,
}

/// Errors from the cache codec and the cache file store
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("malformed cache data: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("failed to encode cache data: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_errors_map_to_cache_decode() {
        let json_err = serde_json::from_str::<Vec<u8>>("{").unwrap_err();
        let err: Error = CacheError::Decode(json_err).into();
        assert!(matches!(err, Error::CacheDecode(_)));
    }

    #[test]
    fn test_io_errors_map_to_cache() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err: Error = CacheError::Io(io).into();
        assert!(matches!(err, Error::Cache(_)));
        assert!(err.to_string().contains("disk full"));
    }
}
