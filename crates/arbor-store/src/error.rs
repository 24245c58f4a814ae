use arbor_types::{ObjectName, TypeError};

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object was not found.
    #[error("object not found: {0}")]
    NotFound(ObjectName),

    /// No remote with this name is configured.
    #[error("remote not found: {0}")]
    RemoteNotFound(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The object data is malformed or cannot be decoded.
    #[error("corrupt object {name}: {reason}")]
    CorruptObject { name: ObjectName, reason: String },

    /// A content stream could not be parsed.
    #[error("invalid content stream: {0}")]
    InvalidContentStream(String),

    /// A tombstone was written before the tombstone feature was enabled.
    #[error("tombstone commits are not enabled for this repository")]
    TombstonesDisabled,

    /// The repository configuration is unreadable or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Type(#[from] TypeError),
}

impl StoreError {
    /// Returns `true` if the error means "object absent" rather than a fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
