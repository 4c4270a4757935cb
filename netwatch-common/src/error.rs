use thiserror::Error;

/// Common error type shared by the monitoring engine's crates.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid IPv4 address: {0}")]
    InvalidIp(String),
}

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
