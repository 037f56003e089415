//! Structural operations: move, delete, directories, timestamps, usage.

use crate::driver::{BLOCK_SIZE, DriverFile, OpenMode, StorageDriver};
use crate::error::{Result, StorageError};
use crate::medium::{Medium, mass_storage, not_found};
use crate::timestamp::{FileDate, FileTime, Timestamp};

/// Space accounting for the medium, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageInfo {
    pub used_bytes: u64,
    pub free_bytes: u64,
}

impl UsageInfo {
    /// Usage of a FAT-style volume from its cluster geometry.
    pub fn from_clusters(total_clusters: u64, free_clusters: u64, blocks_per_cluster: u64) -> Self {
        let cluster_bytes = BLOCK_SIZE.saturating_mul(blocks_per_cluster);
        Self {
            used_bytes: total_clusters
                .saturating_sub(free_clusters)
                .saturating_mul(cluster_bytes),
            free_bytes: free_clusters.saturating_mul(cluster_bytes),
        }
    }

    /// Capacity, saturating at `u64::MAX` for geometry no real card has.
    pub fn total_bytes(&self) -> u64 {
        self.used_bytes.saturating_add(self.free_bytes)
    }
}

impl<D: StorageDriver> Medium<D> {
    /// Rename `src` to `dst`.
    pub fn move_entry(&mut self, src: &str, dst: &str) -> Result<()> {
        self.gate()?;
        if !self.driver.exists(src) {
            return Err(StorageError::NotFound);
        }
        self.driver
            .rename(src, dst)
            .map_err(|e| mass_storage("move", e))
    }

    /// Remove the file at `path`.
    pub fn delete_entry(&mut self, path: &str) -> Result<()> {
        self.gate()?;
        if !self.driver.exists(path) {
            return Err(StorageError::NotFound);
        }
        self.driver
            .remove(path)
            .map_err(|e| mass_storage("delete", e))
    }

    pub fn make_directory(&mut self, path: &str) -> Result<()> {
        self.gate()?;
        self.driver
            .mkdir(path)
            .map_err(|e| mass_storage("mkdir", e))
    }

    pub fn remove_directory(&mut self, path: &str) -> Result<()> {
        self.gate()?;
        self.driver
            .rmdir(path)
            .map_err(|e| mass_storage("rmdir", e))
    }

    /// Local date of the last write to `path`.
    pub fn get_date(&mut self, path: &str) -> Result<FileDate> {
        self.gate()?;
        Ok(self.last_write(path)?.date())
    }

    /// Local time of day of the last write to `path`.
    pub fn get_time(&mut self, path: &str) -> Result<FileTime> {
        self.gate()?;
        if !self.driver.exists(path) {
            return Err(StorageError::NotFound);
        }
        Ok(self.last_write(path)?.time())
    }

    fn last_write(&mut self, path: &str) -> Result<Timestamp> {
        let entry = self
            .driver
            .open(path, OpenMode::Read)
            .map_err(|e| not_found(path, e))?;
        let packed = entry
            .dir_record()
            .map_err(|e| mass_storage("directory record", e))?;
        Ok(self.bridge.entry_to_local(packed))
    }

    /// Used and free space. Physical media are scanned cluster by cluster,
    /// calling the tick hook as the scan progresses.
    pub fn usage_info(&mut self) -> Result<UsageInfo> {
        self.gate()?;
        if let Some(usage) = self.driver.host_usage() {
            let (used_bytes, free_bytes) = usage.map_err(|e| mass_storage("host usage", e))?;
            return Ok(UsageInfo {
                used_bytes,
                free_bytes,
            });
        }
        let total = self
            .driver
            .cluster_count()
            .map_err(|e| mass_storage("cluster count", e))?;
        let free = self
            .driver
            .free_cluster_count(&mut *self.tick)
            .map_err(|e| mass_storage("free cluster scan", e))?;
        let blocks = self
            .driver
            .blocks_per_cluster()
            .map_err(|e| mass_storage("cluster geometry", e))?;
        Ok(UsageInfo::from_clusters(total, free, blocks))
    }
}
