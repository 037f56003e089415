//! In-memory volume with FAT-style geometry.
//!
//! `MemoryDriver` behaves like a physical card: usage comes from cluster
//! counts rather than the host, enumeration follows creation order, and
//! every driver failure the medium layer has to survive can be injected
//! through [`MemoryFaults`]. Clones share the same volume, so a test can
//! hand one clone to a `Medium` and inspect the card through another.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::{self, ErrorKind, Read, Write};
use std::rc::Rc;

use super::{BLOCK_SIZE, DriverFile, OpenMode, StorageDriver, TimestampSource};
use crate::path::MediumPath;
use crate::timestamp::PackedDateTime;

/// Clusters scanned between cooperative ticks during a free-space scan.
pub const SCAN_TICK_INTERVAL: u64 = 1024;

const DEFAULT_TOTAL_CLUSTERS: u64 = 4096;
const DEFAULT_BLOCKS_PER_CLUSTER: u64 = 8;

/// Failures to inject into the next driver calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryFaults {
    pub fail_mount: bool,
    /// Opening a missing path for writing fails.
    pub fail_create: bool,
    pub fail_truncate: bool,
    pub fail_rename: bool,
    pub fail_remove: bool,
    pub fail_mkdir: bool,
    pub fail_rmdir: bool,
    pub fail_dir_record: bool,
    /// Every file read returns an error.
    pub fail_reads: bool,
    /// Total bytes the volume accepts before writes come back short.
    pub write_limit: Option<u64>,
    /// Reads report end-of-file past this offset, whatever the file size.
    pub read_limit: Option<u64>,
}

#[derive(Debug)]
struct Node {
    seq: u64,
    is_dir: bool,
    data: Vec<u8>,
    modified: PackedDateTime,
}

struct Volume {
    nodes: BTreeMap<MediumPath, Node>,
    next_seq: u64,
    faults: MemoryFaults,
    total_clusters: u64,
    blocks_per_cluster: u64,
    timestamp: Option<TimestampSource>,
    open_handles: usize,
    calls: usize,
    bytes_written: u64,
}

impl Volume {
    fn stamp(&self) -> PackedDateTime {
        self.timestamp.as_ref().map(|source| source()).unwrap_or_default()
    }

    fn insert(&mut self, path: MediumPath, is_dir: bool, data: Vec<u8>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let modified = self.stamp();
        self.nodes.insert(
            path,
            Node {
                seq,
                is_dir,
                data,
                modified,
            },
        );
    }

    fn is_dir(&self, path: &MediumPath) -> bool {
        self.nodes.get(path).is_some_and(|n| n.is_dir)
    }

    /// Direct children of `dir` in creation order.
    fn children(&self, dir: &MediumPath) -> Vec<MediumPath> {
        let mut children: Vec<(&MediumPath, u64)> = self
            .nodes
            .iter()
            .filter(|(path, _)| path.parent().as_ref() == Some(dir))
            .map(|(path, node)| (path, node.seq))
            .collect();
        children.sort_by_key(|(_, seq)| *seq);
        children.into_iter().map(|(path, _)| path.clone()).collect()
    }

    fn create_dirs(&mut self, path: &MediumPath) -> io::Result<()> {
        let mut missing = Vec::new();
        let mut cursor = Some(path.clone());
        while let Some(p) = cursor {
            match self.nodes.get(&p) {
                Some(node) if node.is_dir => break,
                Some(_) => {
                    return Err(io::Error::new(
                        ErrorKind::InvalidInput,
                        format!("not a directory: {}", p),
                    ));
                }
                None => {
                    cursor = p.parent();
                    missing.push(p);
                }
            }
        }
        for dir in missing.into_iter().rev() {
            self.insert(dir, true, Vec::new());
        }
        Ok(())
    }

    fn cluster_bytes(&self) -> u64 {
        BLOCK_SIZE * self.blocks_per_cluster
    }

    fn used_clusters(&self) -> u64 {
        let cluster_bytes = self.cluster_bytes();
        self.nodes
            .iter()
            .filter(|(path, _)| !path.is_root())
            .map(|(_, node)| {
                if node.is_dir {
                    1
                } else {
                    (node.data.len() as u64).div_ceil(cluster_bytes)
                }
            })
            .sum()
    }
}

fn parse(path: &str) -> io::Result<MediumPath> {
    MediumPath::new(path)
}

fn not_found(path: &MediumPath) -> io::Error {
    io::Error::new(ErrorKind::NotFound, format!("no such entry: {}", path))
}

fn injected(what: &str) -> io::Error {
    io::Error::other(format!("injected {} failure", what))
}

/// Shared in-memory volume. See the module docs.
#[derive(Clone)]
pub struct MemoryDriver {
    volume: Rc<RefCell<Volume>>,
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::with_geometry(DEFAULT_TOTAL_CLUSTERS, DEFAULT_BLOCKS_PER_CLUSTER)
    }

    pub fn with_geometry(total_clusters: u64, blocks_per_cluster: u64) -> Self {
        let mut volume = Volume {
            nodes: BTreeMap::new(),
            next_seq: 0,
            faults: MemoryFaults::default(),
            total_clusters,
            blocks_per_cluster,
            timestamp: None,
            open_handles: 0,
            calls: 0,
            bytes_written: 0,
        };
        volume.insert(MediumPath::root(), true, Vec::new());
        Self {
            volume: Rc::new(RefCell::new(volume)),
        }
    }

    /// Place a file on the card, creating parent directories.
    pub fn insert_file(&self, path: &str, data: &[u8]) -> io::Result<()> {
        let path = parse(path)?;
        let mut vol = self.volume.borrow_mut();
        if let Some(parent) = path.parent() {
            vol.create_dirs(&parent)?;
        }
        vol.insert(path, false, data.to_vec());
        Ok(())
    }

    pub fn insert_dir(&self, path: &str) -> io::Result<()> {
        let path = parse(path)?;
        self.volume.borrow_mut().create_dirs(&path)
    }

    /// Overwrite the last-write record of an entry.
    pub fn set_modified(&self, path: &str, stamp: PackedDateTime) -> io::Result<()> {
        let path = parse(path)?;
        let mut vol = self.volume.borrow_mut();
        let node = vol.nodes.get_mut(&path).ok_or_else(|| not_found(&path))?;
        node.modified = stamp;
        Ok(())
    }

    pub fn modified(&self, path: &str) -> Option<PackedDateTime> {
        let path = parse(path).ok()?;
        self.volume.borrow().nodes.get(&path).map(|n| n.modified)
    }

    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        let path = parse(path).ok()?;
        let vol = self.volume.borrow();
        vol.nodes
            .get(&path)
            .filter(|n| !n.is_dir)
            .map(|n| n.data.clone())
    }

    pub fn contains(&self, path: &str) -> bool {
        parse(path).is_ok_and(|p| self.volume.borrow().nodes.contains_key(&p))
    }

    pub fn set_faults(&self, faults: MemoryFaults) {
        let mut vol = self.volume.borrow_mut();
        vol.faults = faults;
        vol.bytes_written = 0;
    }

    /// Handles currently open against this volume.
    pub fn open_handles(&self) -> usize {
        self.volume.borrow().open_handles
    }

    /// Driver calls made since creation or the last `reset_calls`.
    pub fn calls(&self) -> usize {
        self.volume.borrow().calls
    }

    pub fn reset_calls(&self) {
        self.volume.borrow_mut().calls = 0;
    }

    fn call(&self) -> std::cell::RefMut<'_, Volume> {
        let mut vol = self.volume.borrow_mut();
        vol.calls += 1;
        vol
    }

    fn handle(&self, path: MediumPath, is_dir: bool, pos: u64, writable: bool) -> MemoryFile {
        self.volume.borrow_mut().open_handles += 1;
        let name = path.file_name().unwrap_or("/").to_string();
        MemoryFile {
            volume: Rc::clone(&self.volume),
            path,
            name,
            is_dir,
            pos,
            writable,
            dir_cursor: 0,
        }
    }
}

impl StorageDriver for MemoryDriver {
    type File = MemoryFile;

    fn begin(&mut self) -> io::Result<()> {
        let vol = self.call();
        if vol.faults.fail_mount {
            return Err(injected("mount"));
        }
        Ok(())
    }

    fn set_timestamp_source(&mut self, source: TimestampSource) {
        self.volume.borrow_mut().timestamp = Some(source);
    }

    fn open(&mut self, path: &str, mode: OpenMode) -> io::Result<MemoryFile> {
        let path = parse(path)?;
        let (is_dir, pos, writable) = {
            let mut vol = self.call();
            match mode {
                OpenMode::Read => {
                    let node = vol.nodes.get(&path).ok_or_else(|| not_found(&path))?;
                    (node.is_dir, 0, false)
                }
                OpenMode::Write | OpenMode::Append => {
                    if vol.is_dir(&path) {
                        return Err(io::Error::new(
                            ErrorKind::InvalidInput,
                            format!("is a directory: {}", path),
                        ));
                    }
                    if !vol.nodes.contains_key(&path) {
                        let parent_ok = path.parent().is_some_and(|p| vol.is_dir(&p));
                        if !parent_ok {
                            return Err(not_found(&path));
                        }
                        if vol.faults.fail_create {
                            return Err(injected("create"));
                        }
                        vol.insert(path.clone(), false, Vec::new());
                    }
                    let stamp = vol.stamp();
                    let node = vol.nodes.get_mut(&path).ok_or_else(|| not_found(&path))?;
                    if mode == OpenMode::Write {
                        node.data.clear();
                        node.modified = stamp;
                    }
                    let pos = if mode == OpenMode::Append {
                        node.data.len() as u64
                    } else {
                        0
                    };
                    (false, pos, true)
                }
            }
        };
        Ok(self.handle(path, is_dir, pos, writable))
    }

    fn exists(&mut self, path: &str) -> bool {
        let vol = self.call();
        parse(path).is_ok_and(|p| vol.nodes.contains_key(&p))
    }

    fn mkdir(&mut self, path: &str) -> io::Result<()> {
        let path = parse(path)?;
        let mut vol = self.call();
        if vol.faults.fail_mkdir {
            return Err(injected("mkdir"));
        }
        if vol.nodes.contains_key(&path) {
            return Err(io::Error::new(
                ErrorKind::AlreadyExists,
                format!("already exists: {}", path),
            ));
        }
        vol.create_dirs(&path)
    }

    fn rmdir(&mut self, path: &str) -> io::Result<()> {
        let path = parse(path)?;
        let mut vol = self.call();
        if vol.faults.fail_rmdir {
            return Err(injected("rmdir"));
        }
        if path.is_root() || !vol.is_dir(&path) {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("not a removable directory: {}", path),
            ));
        }
        if !vol.children(&path).is_empty() {
            return Err(io::Error::other(format!("directory not empty: {}", path)));
        }
        vol.nodes.remove(&path);
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> io::Result<()> {
        let from = parse(from)?;
        let to = parse(to)?;
        let mut vol = self.call();
        if vol.faults.fail_rename {
            return Err(injected("rename"));
        }
        if !vol.nodes.contains_key(&from) {
            return Err(not_found(&from));
        }
        if vol.nodes.contains_key(&to) {
            return Err(io::Error::new(
                ErrorKind::AlreadyExists,
                format!("already exists: {}", to),
            ));
        }
        if from.is_root() || to.starts_with(&from) {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("cannot move {} into itself", from),
            ));
        }
        if !to.parent().is_some_and(|p| vol.is_dir(&p)) {
            return Err(not_found(&to));
        }
        let moved: Vec<MediumPath> = vol
            .nodes
            .keys()
            .filter(|p| p.starts_with(&from))
            .cloned()
            .collect();
        for old in moved {
            if let Some(node) = vol.nodes.remove(&old) {
                let suffix = &old.as_str()[from.as_str().len()..];
                let new = MediumPath::new(&format!("{}{}", to.as_str(), suffix))?;
                vol.nodes.insert(new, node);
            }
        }
        Ok(())
    }

    fn remove(&mut self, path: &str) -> io::Result<()> {
        let path = parse(path)?;
        let mut vol = self.call();
        if vol.faults.fail_remove {
            return Err(injected("remove"));
        }
        match vol.nodes.get(&path) {
            None => Err(not_found(&path)),
            Some(node) if node.is_dir => Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("is a directory: {}", path),
            )),
            Some(_) => {
                vol.nodes.remove(&path);
                Ok(())
            }
        }
    }

    fn cluster_count(&mut self) -> io::Result<u64> {
        Ok(self.call().total_clusters)
    }

    fn blocks_per_cluster(&mut self) -> io::Result<u64> {
        Ok(self.call().blocks_per_cluster)
    }

    fn free_cluster_count(&mut self, tick: &mut dyn FnMut()) -> io::Result<u64> {
        let (total, used) = {
            let vol = self.call();
            (vol.total_clusters, vol.used_clusters())
        };
        for cluster in 1..=total {
            if cluster % SCAN_TICK_INTERVAL == 0 {
                tick();
            }
        }
        Ok(total.saturating_sub(used))
    }
}

/// Handle onto a `MemoryDriver` entry.
pub struct MemoryFile {
    volume: Rc<RefCell<Volume>>,
    path: MediumPath,
    name: String,
    is_dir: bool,
    pos: u64,
    writable: bool,
    dir_cursor: usize,
}

impl Read for MemoryFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let vol = self.volume.borrow();
        if vol.faults.fail_reads {
            return Err(injected("read"));
        }
        let node = vol.nodes.get(&self.path).ok_or_else(|| not_found(&self.path))?;
        if node.is_dir {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("is a directory: {}", self.path),
            ));
        }
        let len = node.data.len() as u64;
        let end = vol.faults.read_limit.map_or(len, |limit| limit.min(len));
        if self.pos >= end {
            return Ok(0);
        }
        let n = ((end - self.pos) as usize).min(buf.len());
        let start = self.pos as usize;
        buf[..n].copy_from_slice(&node.data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Write for MemoryFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.writable {
            return Err(io::Error::new(
                ErrorKind::PermissionDenied,
                format!("opened read-only: {}", self.path),
            ));
        }
        let mut vol = self.volume.borrow_mut();
        let accepted = match vol.faults.write_limit {
            Some(limit) => (limit.saturating_sub(vol.bytes_written) as usize).min(buf.len()),
            None => buf.len(),
        };
        vol.bytes_written += accepted as u64;
        let stamp = vol.stamp();
        let node = vol
            .nodes
            .get_mut(&self.path)
            .ok_or_else(|| not_found(&self.path))?;
        let start = self.pos as usize;
        let end = start + accepted;
        if node.data.len() < end {
            node.data.resize(end, 0);
        }
        node.data[start..end].copy_from_slice(&buf[..accepted]);
        node.modified = stamp;
        self.pos = end as u64;
        Ok(accepted)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl DriverFile for MemoryFile {
    fn size(&self) -> u64 {
        let vol = self.volume.borrow();
        vol.nodes
            .get(&self.path)
            .filter(|n| !n.is_dir)
            .map_or(0, |n| n.data.len() as u64)
    }

    fn is_directory(&self) -> bool {
        self.is_dir
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        let mut vol = self.volume.borrow_mut();
        if vol.faults.fail_truncate {
            return Err(injected("truncate"));
        }
        if !self.writable {
            return Err(io::Error::new(
                ErrorKind::PermissionDenied,
                format!("opened read-only: {}", self.path),
            ));
        }
        let node = vol
            .nodes
            .get_mut(&self.path)
            .ok_or_else(|| not_found(&self.path))?;
        node.data.truncate(len as usize);
        self.pos = self.pos.min(len);
        Ok(())
    }

    fn rewind_directory(&mut self) -> io::Result<()> {
        if !self.is_dir {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("not a directory: {}", self.path),
            ));
        }
        self.dir_cursor = 0;
        Ok(())
    }

    fn open_next(&mut self) -> io::Result<Option<MemoryFile>> {
        if !self.is_dir {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("not a directory: {}", self.path),
            ));
        }
        let next = {
            let vol = self.volume.borrow();
            vol.children(&self.path)
                .into_iter()
                .nth(self.dir_cursor)
                .map(|p| {
                    let is_dir = vol.is_dir(&p);
                    (p, is_dir)
                })
        };
        let Some((path, is_dir)) = next else {
            return Ok(None);
        };
        self.dir_cursor += 1;
        let driver = MemoryDriver {
            volume: Rc::clone(&self.volume),
        };
        Ok(Some(driver.handle(path, is_dir, 0, false)))
    }

    fn dir_record(&self) -> io::Result<PackedDateTime> {
        let vol = self.volume.borrow();
        if vol.faults.fail_dir_record {
            return Err(injected("directory record"));
        }
        vol.nodes
            .get(&self.path)
            .map(|n| n.modified)
            .ok_or_else(|| not_found(&self.path))
    }
}

impl Drop for MemoryFile {
    fn drop(&mut self) {
        let mut vol = self.volume.borrow_mut();
        vol.open_handles = vol.open_handles.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_write_then_read_back() {
        let mut drv = MemoryDriver::new();
        let mut file = drv.open("/a.bin", OpenMode::Write).unwrap();
        assert_eq!(file.write(b"hello").unwrap(), 5);
        drop(file);
        let mut file = drv.open("/a.bin", OpenMode::Read).unwrap();
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"hello");
        assert_eq!(file.size(), 5);
    }

    #[test]
    fn test_append_positions_at_end() {
        let mut drv = MemoryDriver::new();
        drv.insert_file("/log.txt", b"one").unwrap();
        let mut file = drv.open("/log.txt", OpenMode::Append).unwrap();
        file.write_all(b"two").unwrap();
        drop(file);
        assert_eq!(drv.contents("/log.txt").unwrap(), b"onetwo");
    }

    #[test]
    fn test_write_mode_discards_contents() {
        let mut drv = MemoryDriver::new();
        drv.insert_file("/x", b"old contents").unwrap();
        let file = drv.open("/x", OpenMode::Write).unwrap();
        drop(file);
        assert_eq!(drv.contents("/x").unwrap(), b"");
    }

    #[test]
    fn test_create_requires_parent() {
        let mut drv = MemoryDriver::new();
        let err = drv.open("/missing/x", OpenMode::Write).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_handles_are_counted() {
        let mut drv = MemoryDriver::new();
        drv.insert_file("/a", b"").unwrap();
        let a = drv.open("/a", OpenMode::Read).unwrap();
        let b = drv.open("/", OpenMode::Read).unwrap();
        assert_eq!(drv.open_handles(), 2);
        drop(a);
        drop(b);
        assert_eq!(drv.open_handles(), 0);
    }

    #[test]
    fn test_enumeration_follows_creation_order() {
        let mut drv = MemoryDriver::new();
        drv.insert_file("/z.bin", b"").unwrap();
        drv.insert_dir("/a").unwrap();
        drv.insert_file("/m.list", b"").unwrap();
        drv.insert_file("/a/nested", b"").unwrap();
        let mut dir = drv.open("/", OpenMode::Read).unwrap();
        dir.rewind_directory().unwrap();
        let mut names = Vec::new();
        while let Some(entry) = dir.open_next().unwrap() {
            names.push(entry.name().to_string());
        }
        assert_eq!(names, ["z.bin", "a", "m.list"]);
    }

    #[test]
    fn test_rename_moves_subtree() {
        let mut drv = MemoryDriver::new();
        drv.insert_file("/d/inner/f", b"x").unwrap();
        drv.rename("/d", "/e").unwrap();
        assert!(!drv.contains("/d/inner/f"));
        assert_eq!(drv.contents("/e/inner/f").unwrap(), b"x");
    }

    #[test]
    fn test_rmdir_requires_empty() {
        let mut drv = MemoryDriver::new();
        drv.insert_file("/d/f", b"").unwrap();
        assert!(drv.rmdir("/d").is_err());
        drv.remove("/d/f").unwrap();
        drv.rmdir("/d").unwrap();
        assert!(!drv.contains("/d"));
    }

    #[test]
    fn test_mkdir_existing_fails() {
        let mut drv = MemoryDriver::new();
        drv.mkdir("/d/e").unwrap();
        assert!(drv.contains("/d"));
        let err = drv.mkdir("/d").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_write_limit_gives_short_write() {
        let mut drv = MemoryDriver::new();
        drv.set_faults(MemoryFaults {
            write_limit: Some(3),
            ..Default::default()
        });
        let mut file = drv.open("/f", OpenMode::Write).unwrap();
        assert_eq!(file.write(b"abcdef").unwrap(), 3);
        assert_eq!(file.write(b"gh").unwrap(), 0);
    }

    #[test]
    fn test_read_limit_truncates_reads() {
        let mut drv = MemoryDriver::new();
        drv.insert_file("/f", &[7u8; 100]).unwrap();
        drv.set_faults(MemoryFaults {
            read_limit: Some(10),
            ..Default::default()
        });
        let mut file = drv.open("/f", OpenMode::Read).unwrap();
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).unwrap();
        assert_eq!(buf.len(), 10);
        assert_eq!(file.size(), 100);
    }

    #[test]
    fn test_free_cluster_scan_ticks() {
        let mut drv = MemoryDriver::with_geometry(4096, 1);
        drv.insert_file("/f", &[0u8; 1025]).unwrap();
        let mut ticks = 0;
        let free = drv.free_cluster_count(&mut || ticks += 1).unwrap();
        assert_eq!(free, 4096 - 3);
        assert_eq!(ticks, 4);
    }

    #[test]
    fn test_timestamp_source_stamps_writes() {
        let mut drv = MemoryDriver::new();
        let stamp = PackedDateTime {
            date: 0x5021,
            time: 0x6000,
        };
        drv.set_timestamp_source(Arc::new(move || stamp));
        let mut file = drv.open("/f", OpenMode::Write).unwrap();
        file.write_all(b"x").unwrap();
        assert_eq!(file.dir_record().unwrap(), stamp);
    }

    #[test]
    fn test_calls_are_counted() {
        let mut drv = MemoryDriver::new();
        assert_eq!(drv.calls(), 0);
        drv.exists("/nope");
        drv.begin().unwrap();
        assert_eq!(drv.calls(), 2);
        drv.reset_calls();
        assert_eq!(drv.calls(), 0);
    }
}
