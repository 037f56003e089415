//! sdcard-core: mass-storage access layer for an embedded instrument
//!
//! Provides a health-gated [`Medium`] over a pluggable [`StorageDriver`],
//! with directory catalogs, chunked transfers, entry mutators, a
//! numeric-text scanner, and packed FAT timestamps localized through a
//! timezone and DST rule.
//!
//! # Quick Start
//!
//! ```no_run
//! use sdcard_core::{Frame, MediumConfig};
//!
//! let config = MediumConfig::load_default()?;
//! let mut medium = config.open_host();
//! medium.initialize();
//!
//! for entry in medium.catalog("/").unwrap_or_default() {
//!     println!("{} {} {}", entry.name, entry.kind, entry.size);
//! }
//! medium
//!     .upload("/run.list", |frame| {
//!         if let Frame::Data(bytes) = frame {
//!             print!("{}", String::from_utf8_lossy(bytes));
//!         }
//!     })
//!     .ok();
//! # Ok::<(), std::io::Error>(())
//! ```
//!
//! Every operation returns [`StorageError`]; its `code()` is the numeric
//! error reported over the remote command interface.

pub mod catalog;
pub mod classify;
pub mod config;
pub mod driver;
pub mod error;
pub mod medium;
pub mod mutate;
pub mod path;
pub mod scan;
pub mod timestamp;
pub mod transfer;

// Re-export commonly used types
pub use catalog::DirectoryEntry;
pub use classify::{EntryKind, classify};
pub use config::{ConfigDefaults, MediumConfig};
pub use driver::{DriverFile, HostDriver, MemoryDriver, MemoryFaults, OpenMode, StorageDriver};
pub use error::{Result, StorageError};
pub use medium::{Medium, MediumStatus};
pub use mutate::UsageInfo;
pub use path::{MAX_PATH_LENGTH, MediumPath};
pub use scan::TextScanner;
pub use timestamp::{
    Clock, DstRule, FileDate, FileTime, FixedClock, PackedDateTime, SystemClock, Timestamp,
    TimestampBridge, ZoneConfig,
};
pub use transfer::{Frame, NoProgress, ProgressSink};

/// Shared helpers for the unit tests of the operation modules.
#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use crate::driver::MemoryDriver;
    use crate::medium::Medium;
    use crate::timestamp::{SystemClock, TimestampBridge, ZoneConfig};

    pub fn bridge() -> TimestampBridge {
        TimestampBridge::new(Arc::new(SystemClock), ZoneConfig::default())
    }

    /// An initialized medium sharing `card`'s volume.
    pub fn mounted(card: &MemoryDriver) -> Medium<MemoryDriver> {
        let mut medium = Medium::new(card.clone(), bridge());
        medium.initialize();
        medium
    }
}
