//! Directory enumeration.

use crate::classify::{EntryKind, classify};
use crate::driver::{DriverFile, OpenMode, StorageDriver};
use crate::error::{Result, StorageError};
use crate::medium::{Medium, mass_storage, not_found};
use crate::path::MAX_PATH_LENGTH;

/// One entry reported while listing a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
}

impl DirectoryEntry {
    fn from_file<F: DriverFile>(file: &F) -> Self {
        let is_dir = file.is_directory();
        Self {
            name: bounded_name(file.name()),
            kind: classify(file.name(), is_dir),
            size: if is_dir { 0 } else { file.size() },
        }
    }
}

/// Cut `name` to at most `MAX_PATH_LENGTH` bytes on a char boundary.
fn bounded_name(name: &str) -> String {
    if name.len() <= MAX_PATH_LENGTH {
        return name.to_string();
    }
    let mut end = MAX_PATH_LENGTH;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

impl<D: StorageDriver> Medium<D> {
    /// Visit every entry of `dir` in the driver's native order. Each entry
    /// handle is closed after its callback returns.
    pub fn list_entries(
        &mut self,
        dir: &str,
        mut on_entry: impl FnMut(&DirectoryEntry),
    ) -> Result<()> {
        self.gate()?;
        let mut handle = self
            .driver
            .open(dir, OpenMode::Read)
            .map_err(|e| not_found(dir, e))?;
        if !handle.is_directory() {
            return Err(StorageError::NotFound);
        }
        handle
            .rewind_directory()
            .map_err(|e| mass_storage("rewind directory", e))?;
        while let Some(entry) = handle
            .open_next()
            .map_err(|e| mass_storage("read directory", e))?
        {
            on_entry(&DirectoryEntry::from_file(&entry));
            drop(entry);
        }
        Ok(())
    }

    /// Number of entries in `dir`.
    pub fn count_entries(&mut self, dir: &str) -> Result<usize> {
        let mut count = 0;
        self.list_entries(dir, |_| count += 1)?;
        Ok(count)
    }

    /// All entries of `dir`, in native order.
    pub fn catalog(&mut self, dir: &str) -> Result<Vec<DirectoryEntry>> {
        let mut entries = Vec::new();
        self.list_entries(dir, |entry| entries.push(entry.clone()))?;
        Ok(entries)
    }
}
