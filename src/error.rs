//! Error types for the presentation pipeline.

/// Top-level error type for the presentation system.
#[derive(Debug, thiserror::Error)]
pub enum PerformError {
    /// Voice resolution error (download, synthesis, or empty result).
    #[error("resolve error: {0}")]
    Resolve(String),

    /// Audio decode or output device error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Animation trigger error.
    #[error("animation error: {0}")]
    Animation(String),

    /// Face expression error.
    #[error("face error: {0}")]
    Face(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// HTTP download error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, PerformError>;
