use thiserror::Error;

/// Errors originating from the transport module.
#[derive(Error, Debug)]
pub enum NetError {
    /// Socket creation or send failure.
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization failure.
    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    /// The destination did not resolve to any address.
    #[error("cannot resolve destination '{0}'")]
    Resolve(String),

    /// A bridge frame failed validation.
    #[error("invalid bridge frame: {0}")]
    Frame(String),
}
