//! Error taxonomy for the storage core.
//!
//! Every public operation in this crate returns [`Result<T>`]; no panics or
//! unwinding are expected to cross a component boundary. Variant names track
//! the status codes named in the specification's error-handling section
//! one-for-one so that a log line or a test assertion can cite the taxonomy
//! directly.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no suitable version for compaction")]
    NoSuitableVersion,

    #[error("compaction already running for this tablet")]
    Busy,

    #[error("delete action error: {0}")]
    DeleteAction(String),

    #[error("invalid delete parameters: {0}")]
    InvalidParameters(String),

    #[error("invalid delete condition: {0}")]
    InvalidCondition(String),

    #[error("push version already exists: {0}")]
    VersionAlreadyExists(String),

    #[error("push failed to build delta: {0}")]
    BuildDeltaFailed(String),

    #[error("push version incorrect: {0}")]
    VersionIncorrect(String),

    #[error("header load failed, invalid key: {0}")]
    HeaderLoadInvalidKey(String),

    #[error("header save failed: {0}")]
    HeaderSaveFailed(String),

    #[error("checksum mismatch: {0}")]
    ChecksumMismatch(String),

    #[error("broker error: {0}")]
    Broker(String),

    #[error("memory allocation failed: {0}")]
    MemAllocFailed(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("component not initialized: {0}")]
    NotInitialized(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("tablet not found: {0}")]
    TabletNotFound(String),
}

impl From<bincode::error::EncodeError> for StorageError {
    fn from(e: bincode::error::EncodeError) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

impl From<bincode::error::DecodeError> for StorageError {
    fn from(e: bincode::error::DecodeError) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
