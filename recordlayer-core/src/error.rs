//! Error types and result types for record store operations.
//!
//! Every fallible operation in the crate returns [`RecordStoreResult<T>`]. Backend failures are
//! surfaced unchanged (wrapped in [`RecordStoreError::Backend`]); nothing in this layer retries.
//! A missing record is never an error: reads return `None` and writes report zero matches.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a record store.
#[derive(Error, Debug)]
pub enum RecordStoreError {
    /// A collection handle was requested from a backend that is not (or no longer) connected.
    #[error("Store is not connected")]
    NotConnected,
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A record with the given identifier already exists in the collection.
    /// The first argument is the identifier, the second is the collection name.
    #[error("Record {0} already exists in collection {1}")]
    DuplicateIdentity(String, String),
    /// A change set touches the same target field through more than one mutation category.
    #[error("Conflicting changes for field {0}")]
    ConflictingChange(String),
    /// A caller-supplied argument is outside of its valid range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// The document has an invalid structure (e.g. it is not a map).
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// Serialization/deserialization error when converting between formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for record store operations.
pub type RecordStoreResult<T> = Result<T, RecordStoreError>;

impl From<BsonError> for RecordStoreError {
    fn from(err: BsonError) -> Self {
        RecordStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for RecordStoreError {
    fn from(err: SerdeJsonError) -> Self {
        RecordStoreError::Serialization(err.to_string())
    }
}
