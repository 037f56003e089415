//! Driver capability: the storage abstraction the medium layer consumes.
//!
//! Drivers are intentionally dumb. They mount, open, enumerate, rename and
//! remove; they know nothing about the health gate, the shared error codes,
//! or the transfer protocol. `Medium` layers all of that on top.
//!
//! # Implementing a driver
//!
//! Implement `StorageDriver` and a matching `DriverFile`. Paths arrive as
//! caller strings; use `MediumPath::new` to normalize them and return
//! `ErrorKind::InvalidInput` for anything it rejects. File handles are
//! released when dropped.
//!
//! Two backends ship with the crate:
//!
//! - [`HostDriver`]: a directory on the host filesystem standing in for the
//!   card (the simulator).
//! - [`MemoryDriver`]: an in-memory volume with FAT-style cluster geometry
//!   and fault injection, used to exercise the physical-media code paths.

pub mod host;
pub mod memory;

use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::timestamp::PackedDateTime;

pub use host::HostDriver;
pub use memory::{MemoryDriver, MemoryFaults};

/// Bytes per block on the medium.
pub const BLOCK_SIZE: u64 = 512;

/// Callback the driver uses to stamp newly written entries.
pub type TimestampSource = Arc<dyn Fn() -> PackedDateTime + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Existing entry, read-only. Directories open in this mode.
    Read,
    /// Create if absent, discard existing contents.
    Write,
    /// Create if absent, position at the end of existing contents.
    Append,
}

/// Open file or directory handle.
pub trait DriverFile: Read + Write {
    /// Entry size in bytes (zero for directories).
    fn size(&self) -> u64;

    fn is_directory(&self) -> bool;

    /// Entry name without its directory.
    fn name(&self) -> &str;

    fn truncate(&mut self, len: u64) -> io::Result<()>;

    /// Restart directory enumeration from the first entry.
    fn rewind_directory(&mut self) -> io::Result<()>;

    /// Open the next entry of a directory handle, `None` when exhausted.
    fn open_next(&mut self) -> io::Result<Option<Self>>
    where
        Self: Sized;

    /// Last-write timestamp from the native directory record.
    fn dir_record(&self) -> io::Result<PackedDateTime>;
}

/// Mass-storage driver capability.
pub trait StorageDriver {
    type File: DriverFile;

    /// Mount the medium.
    fn begin(&mut self) -> io::Result<()>;

    /// Host-simulated media get their root directory created on mount and
    /// report usage through [`StorageDriver::host_usage`].
    fn is_simulated(&self) -> bool {
        false
    }

    fn set_timestamp_source(&mut self, source: TimestampSource);

    fn open(&mut self, path: &str, mode: OpenMode) -> io::Result<Self::File>;

    fn exists(&mut self, path: &str) -> bool;

    /// Create a directory and any missing parents. Fails if it already exists.
    fn mkdir(&mut self, path: &str) -> io::Result<()>;

    /// Remove an empty directory.
    fn rmdir(&mut self, path: &str) -> io::Result<()>;

    fn rename(&mut self, from: &str, to: &str) -> io::Result<()>;

    /// Remove a file.
    fn remove(&mut self, path: &str) -> io::Result<()>;

    /// `(used, free)` bytes supplied by the host, if this backend has them.
    fn host_usage(&mut self) -> Option<io::Result<(u64, u64)>> {
        None
    }

    fn cluster_count(&mut self) -> io::Result<u64>;

    fn blocks_per_cluster(&mut self) -> io::Result<u64>;

    /// Scan the allocation table. `tick` is called periodically while
    /// scanning so the caller can service other duties.
    fn free_cluster_count(&mut self, tick: &mut dyn FnMut()) -> io::Result<u64>;
}
