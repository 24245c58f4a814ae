//! Error types for the integrity checker.

use arbor_store::StoreError;
use arbor_types::{ObjectId, ObjectName, ObjectType};

/// Fatal conditions that abort a sweep.
///
/// Missing or corrupt objects that the sweep can tolerate never become an
/// error; they are recorded in the [`FsckReport`](crate::FsckReport).
#[derive(Debug, thiserror::Error)]
pub enum FsckError {
    /// A metadata object does not conform to its type's schema.
    #[error("while validating {kind} {object}: {reason}")]
    Structural {
        object: ObjectId,
        kind: ObjectType,
        reason: String,
    },

    /// Stored content does not match its checksum and no repair policy is
    /// set.
    #[error("corrupted object {object}; {reason}")]
    Corrupted { object: ObjectName, reason: String },

    /// A store operation failed for a reason other than absence.
    #[error("{context}: {source}")]
    Store {
        /// What the checker was doing.
        context: String,
        #[source]
        source: StoreError,
    },

    /// The repair remote selection is invalid.
    #[error("{0}")]
    RemoteSelection(String),

    /// The caller cancelled the operation.
    #[error("operation was cancelled")]
    Cancelled,
}

impl FsckError {
    /// Build a mapper that wraps a store error with context.
    pub(crate) fn store(context: impl Into<String>) -> impl FnOnce(StoreError) -> FsckError {
        let context = context.into();
        move |source| FsckError::Store { context, source }
    }

    pub(crate) fn structural(object: &ObjectId, kind: ObjectType, reason: impl Into<String>) -> Self {
        FsckError::Structural {
            object: *object,
            kind,
            reason: reason.into(),
        }
    }
}

/// Convenience alias for checker results.
pub type FsckResult<T> = Result<T, FsckError>;
