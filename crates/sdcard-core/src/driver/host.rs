//! Host filesystem backend: a directory standing in for the card.
//!
//! Medium paths map to OS paths under `root`. For example, with
//! `root = /tmp/card`, the medium path `/lists/run.list` maps to
//! `/tmp/card/lists/run.list`. Usage is reported by the host rather than
//! from cluster counts.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use filetime::FileTime as HostFileTime;

use super::{DriverFile, OpenMode, StorageDriver, TimestampSource};
use crate::path::MediumPath;
use crate::timestamp::{PackedDateTime, Timestamp};

fn unsupported(what: &str) -> io::Error {
    io::Error::new(
        ErrorKind::Unsupported,
        format!("{} is not available on a host-backed medium", what),
    )
}

/// Filesystem-backed medium.
pub struct HostDriver {
    root: PathBuf,
    timestamp: Option<TimestampSource>,
}

impl HostDriver {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            timestamp: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a medium path to an OS path.
    fn os_path(&self, path: &MediumPath) -> PathBuf {
        let relative = path.relative();
        if relative.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        }
    }

    fn resolve(&self, path: &str) -> io::Result<(MediumPath, PathBuf)> {
        let path = MediumPath::new(path)?;
        let os_path = self.os_path(&path);
        Ok((path, os_path))
    }

    fn handle(&self, path: &MediumPath, os_path: PathBuf, file: Option<File>) -> HostFile {
        HostFile {
            name: path.file_name().unwrap_or("/").to_string(),
            label: path.to_string(),
            os_path,
            file,
            entries: Vec::new(),
            cursor: 0,
            stamp: None,
        }
    }
}

/// Total size of regular files beneath `dir`.
fn used_bytes(dir: &Path) -> io::Result<u64> {
    let mut total = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_dir() {
            total += used_bytes(&entry.path())?;
        } else {
            total += meta.len();
        }
    }
    Ok(total)
}

impl StorageDriver for HostDriver {
    type File = HostFile;

    fn begin(&mut self) -> io::Result<()> {
        match fs::metadata(&self.root) {
            Ok(meta) if !meta.is_dir() => Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("medium root is not a directory: {}", self.root.display()),
            )),
            Ok(_) => Ok(()),
            // The root is created by the medium layer after mounting.
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn is_simulated(&self) -> bool {
        true
    }

    fn set_timestamp_source(&mut self, source: TimestampSource) {
        self.timestamp = Some(source);
    }

    fn open(&mut self, path: &str, mode: OpenMode) -> io::Result<HostFile> {
        let (path, os_path) = self.resolve(path)?;
        match mode {
            OpenMode::Read => {
                let meta = fs::metadata(&os_path)?;
                let file = if meta.is_dir() {
                    None
                } else {
                    Some(File::open(&os_path)?)
                };
                Ok(self.handle(&path, os_path, file))
            }
            OpenMode::Write | OpenMode::Append => {
                let mut options = OpenOptions::new();
                options.create(true);
                if mode == OpenMode::Write {
                    options.write(true).truncate(true);
                } else {
                    options.append(true);
                }
                let file = options.open(&os_path)?;
                let mut handle = self.handle(&path, os_path, Some(file));
                handle.stamp = self.timestamp.clone();
                Ok(handle)
            }
        }
    }

    fn exists(&mut self, path: &str) -> bool {
        self.resolve(path)
            .is_ok_and(|(_, os_path)| fs::metadata(os_path).is_ok())
    }

    fn mkdir(&mut self, path: &str) -> io::Result<()> {
        let (path, os_path) = self.resolve(path)?;
        if fs::metadata(&os_path).is_ok() {
            return Err(io::Error::new(
                ErrorKind::AlreadyExists,
                format!("already exists: {}", path),
            ));
        }
        fs::create_dir_all(os_path)
    }

    fn rmdir(&mut self, path: &str) -> io::Result<()> {
        let (path, os_path) = self.resolve(path)?;
        if path.is_root() {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                "cannot remove the medium root",
            ));
        }
        fs::remove_dir(os_path)
    }

    fn rename(&mut self, from: &str, to: &str) -> io::Result<()> {
        let (_, from_os) = self.resolve(from)?;
        let (to, to_os) = self.resolve(to)?;
        if fs::metadata(&to_os).is_ok() {
            return Err(io::Error::new(
                ErrorKind::AlreadyExists,
                format!("already exists: {}", to),
            ));
        }
        fs::rename(from_os, to_os)
    }

    fn remove(&mut self, path: &str) -> io::Result<()> {
        let (_, os_path) = self.resolve(path)?;
        fs::remove_file(os_path)
    }

    fn host_usage(&mut self) -> Option<io::Result<(u64, u64)>> {
        Some(used_bytes(&self.root).and_then(|used| {
            let free = fs2::available_space(&self.root)?;
            Ok((used, free))
        }))
    }

    fn cluster_count(&mut self) -> io::Result<u64> {
        Err(unsupported("cluster count"))
    }

    fn blocks_per_cluster(&mut self) -> io::Result<u64> {
        Err(unsupported("cluster geometry"))
    }

    fn free_cluster_count(&mut self, _tick: &mut dyn FnMut()) -> io::Result<u64> {
        Err(unsupported("free cluster scan"))
    }
}

/// Handle onto a host file or directory.
pub struct HostFile {
    /// Medium-side name for messages. Entry names can be longer than a
    /// valid `MediumPath`.
    label: String,
    os_path: PathBuf,
    name: String,
    /// `None` for directories.
    file: Option<File>,
    entries: Vec<PathBuf>,
    cursor: usize,
    /// Applied as the modification time when a written handle is dropped.
    stamp: Option<TimestampSource>,
}

impl HostFile {
    fn file(&mut self) -> io::Result<&mut File> {
        let label = &self.label;
        self.file.as_mut().ok_or_else(|| {
            io::Error::new(
                ErrorKind::InvalidInput,
                format!("is a directory: {}", label),
            )
        })
    }
}

impl Read for HostFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file()?.read(buf)
    }
}

impl Write for HostFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file()?.flush()
    }
}

impl DriverFile for HostFile {
    fn size(&self) -> u64 {
        match &self.file {
            Some(file) => file.metadata().map_or(0, |m| m.len()),
            None => 0,
        }
    }

    fn is_directory(&self) -> bool {
        self.file.is_none()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.file()?.set_len(len)
    }

    fn rewind_directory(&mut self) -> io::Result<()> {
        if self.file.is_some() {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("not a directory: {}", self.label),
            ));
        }
        self.entries = fs::read_dir(&self.os_path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<io::Result<Vec<_>>>()?;
        self.cursor = 0;
        Ok(())
    }

    /// Next entry of the directory. Entries the host refuses to open are
    /// logged and skipped so one bad file cannot hide its siblings.
    fn open_next(&mut self) -> io::Result<Option<HostFile>> {
        while let Some(os_path) = self.entries.get(self.cursor).cloned() {
            self.cursor += 1;
            let name = os_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let file = match fs::metadata(&os_path) {
                Ok(meta) if meta.is_dir() => None,
                Ok(_) => match File::open(&os_path) {
                    Ok(file) => Some(file),
                    Err(e) => {
                        log::warn!("skipping {}: {}", os_path.display(), e);
                        continue;
                    }
                },
                Err(e) => {
                    log::warn!("skipping {}: {}", os_path.display(), e);
                    continue;
                }
            };
            let label = format!("{}/{}", self.label.trim_end_matches('/'), name);
            return Ok(Some(HostFile {
                label,
                os_path,
                name,
                file,
                entries: Vec::new(),
                cursor: 0,
                stamp: None,
            }));
        }
        Ok(None)
    }

    fn dir_record(&self) -> io::Result<PackedDateTime> {
        let modified = fs::metadata(&self.os_path)?.modified()?;
        let utc = DateTime::<Utc>::from(modified).naive_utc();
        Ok(PackedDateTime::pack(&Timestamp::from_naive(&utc)))
    }
}

impl Drop for HostFile {
    fn drop(&mut self) {
        let Some(source) = self.stamp.take() else {
            return;
        };
        // Close before touching the mtime so buffered writes cannot move it.
        self.file = None;
        if let Some(seconds) = source().unpack().to_unix() {
            let mtime = HostFileTime::from_unix_time(seconds, 0);
            if let Err(e) = filetime::set_file_mtime(&self.os_path, mtime) {
                log::debug!("could not stamp {}: {}", self.os_path.display(), e);
            }
        }
    }
}
