//! Shared error taxonomy for every storage operation.
//!
//! Callers only ever see two kinds of failure: the medium (or the driver
//! behind it) misbehaved, or the named entry does not exist. Driver-level
//! `io::Error` values are translated at the `Medium` boundary and never
//! escape it.

use thiserror::Error;

/// Remote-command error code for a generic mass storage failure.
pub const MASS_STORAGE_ERROR_CODE: i16 = -250;

/// Remote-command error code for a missing file or directory.
pub const FILE_NAME_NOT_FOUND_CODE: i16 = -256;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Medium not healthy, or the driver failed an open, rename, remove,
    /// mkdir, rmdir, truncate or write.
    #[error("Mass storage error")]
    MassStorage,
    /// The path does not exist, or a copy destination could not be created.
    #[error("File name not found")]
    NotFound,
}

impl StorageError {
    /// Numeric code as reported over the remote command interface.
    pub fn code(&self) -> i16 {
        match self {
            StorageError::MassStorage => MASS_STORAGE_ERROR_CODE,
            StorageError::NotFound => FILE_NAME_NOT_FOUND_CODE,
        }
    }
}
