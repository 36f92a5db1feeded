/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the memory engine
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Corruption: {0}")]
    Corruption(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Feature disabled in current mode: {0}")]
    FeatureDisabled(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error is recoverable (can retry with backoff)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::ProviderUnavailable(_) | Error::ResourceExhausted(_) | Error::Io(_) => true,
            Error::InvalidArgument(_)
            | Error::NotFound(_)
            | Error::DimensionMismatch { .. }
            | Error::Conflict(_)
            | Error::Corruption(_)
            | Error::FeatureDisabled(_)
            | Error::Serialization(_) => false,
        }
    }

    /// Whether the failing step should degrade rather than abort the pipeline.
    ///
    /// Provider outages never fail an ingest or a query; the affected step
    /// falls back to its local implementation.
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            Error::ProviderUnavailable(_) | Error::ResourceExhausted(_)
        )
    }
}
