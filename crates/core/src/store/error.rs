//! Error types for storage operations.
//!
//! Absent records are `Ok(None)` at the API level, never an error; these
//! variants cover genuine faults (I/O, corrupt data). Callers must not
//! conflate the two.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to create the storage directory.
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to read a record file from disk.
    #[error("Failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write a record file to disk.
    #[error("Failed to write {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to remove a record file.
    #[error("Failed to remove {path}: {source}")]
    FileRemove {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A record file exists but does not parse.
    #[error("Failed to parse record at {path}: {source}")]
    RecordParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// A record could not be serialized for writing.
    #[error("Failed to serialize record: {0}")]
    RecordSerialize(#[from] serde_json::Error),

    /// Failed to walk the storage directory.
    #[error("Failed to traverse directory {path}: {source}")]
    DirectoryWalk {
        path: PathBuf,
        source: walkdir::Error,
    },
}

/// Type alias for Result with StoreError.
pub type StoreResult<T> = Result<T, StoreError>;
