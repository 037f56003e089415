//! Medium: the health-gated handle every storage operation goes through.
//!
//! A `Medium` owns one driver, its mount status, the timestamp bridge and
//! the cooperative tick hook. Operations live in sibling modules
//! (`catalog`, `transfer`, `mutate`) as further `impl Medium` blocks; each
//! one starts with [`Medium::gate`] so an unhealthy medium fails with
//! `MassStorage` before any driver call is made.
//!
//! ```text
//! caller  ->  Medium (gate + error taxonomy + protocol)  ->  StorageDriver
//! ```

use std::io;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::driver::{DriverFile, OpenMode, StorageDriver};
use crate::error::{Result, StorageError};
use crate::path::MediumPath;
use crate::scan::TextScanner;
use crate::timestamp::TimestampBridge;

/// Mount state, changed only by [`Medium::initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediumStatus {
    #[default]
    Untested,
    Ok,
    Failed,
}

/// Health-gated access to one storage medium.
pub struct Medium<D: StorageDriver> {
    pub(crate) driver: D,
    status: MediumStatus,
    pub(crate) bridge: TimestampBridge,
    pub(crate) tick: Box<dyn FnMut()>,
}

impl<D: StorageDriver> Medium<D> {
    /// Wrap a driver. The medium stays `Untested` until `initialize`.
    pub fn new(driver: D, bridge: TimestampBridge) -> Self {
        Self {
            driver,
            status: MediumStatus::Untested,
            bridge,
            tick: Box::new(|| {}),
        }
    }

    /// Install the hook called between chunks of long operations.
    pub fn set_tick(&mut self, tick: impl FnMut() + 'static) {
        self.tick = Box::new(tick);
    }

    /// Mount the medium and record the outcome.
    pub fn initialize(&mut self) -> MediumStatus {
        match self.driver.begin() {
            Ok(()) => {
                if self.driver.is_simulated() {
                    if let Err(e) = self.driver.mkdir("/") {
                        debug!("medium root not created: {}", e);
                    }
                }
                let bridge = self.bridge.clone();
                self.driver
                    .set_timestamp_source(Arc::new(move || bridge.now_packed()));
                self.status = MediumStatus::Ok;
                info!("medium mounted");
            }
            Err(e) => {
                warn!("medium mount failed: {}", e);
                self.status = MediumStatus::Failed;
            }
        }
        self.status
    }

    pub fn status(&self) -> MediumStatus {
        self.status
    }

    pub fn is_healthy(&self) -> bool {
        self.status == MediumStatus::Ok
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn bridge(&self) -> &TimestampBridge {
        &self.bridge
    }

    /// First check of every operation.
    pub(crate) fn gate(&self) -> Result<()> {
        if self.is_healthy() {
            Ok(())
        } else {
            Err(StorageError::MassStorage)
        }
    }

    pub(crate) fn tick(&mut self) {
        (self.tick)()
    }

    /// Succeeds if `path` names an existing entry.
    pub fn exists(&mut self, path: &str) -> Result<()> {
        self.gate()?;
        if self.driver.exists(path) {
            Ok(())
        } else {
            Err(StorageError::NotFound)
        }
    }

    /// Create the directory that will hold `path`. An existing parent is
    /// not an error.
    pub fn make_parent_dir(&mut self, path: &str) -> Result<()> {
        self.gate()?;
        let path = MediumPath::new(path).map_err(|e| mass_storage("make parent dir", e))?;
        let parent = path.parent().unwrap_or_else(MediumPath::root);
        if self.driver.exists(parent.as_str()) {
            return Ok(());
        }
        self.driver
            .mkdir(parent.as_str())
            .map_err(|e| mass_storage("make parent dir", e))
    }

    /// Open a file for numeric-text scanning.
    pub fn open_scanner(&mut self, path: &str) -> Result<TextScanner<D::File>> {
        self.gate()?;
        let file = self.open_file(path)?;
        Ok(TextScanner::new(file))
    }

    /// Open an existing regular file for reading.
    pub(crate) fn open_file(&mut self, path: &str) -> Result<D::File> {
        let file = self
            .driver
            .open(path, OpenMode::Read)
            .map_err(|e| not_found(path, e))?;
        if file.is_directory() {
            debug!("{} is a directory", path);
            return Err(StorageError::NotFound);
        }
        Ok(file)
    }
}

/// Log a driver failure and collapse it to `MassStorage`.
pub(crate) fn mass_storage(context: &str, err: io::Error) -> StorageError {
    debug!("{}: {}", context, err);
    StorageError::MassStorage
}

/// Log a failed lookup and collapse it to `NotFound`.
pub(crate) fn not_found(path: &str, err: io::Error) -> StorageError {
    debug!("{}: {}", path, err);
    StorageError::NotFound
}
