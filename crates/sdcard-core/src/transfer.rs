//! Chunked file transfers: upload to a consumer, download from a buffer,
//! and on-medium copy with progress and rollback.
//!
//! Every handle opened here is owned by the call that opened it and is
//! dropped before the call returns, on success and on every error path.

use std::io::{self, ErrorKind, Read, Write};

use log::{debug, info, warn};

use crate::driver::{DriverFile, OpenMode, StorageDriver};
use crate::error::{Result, StorageError};
use crate::medium::{Medium, mass_storage, not_found};
use crate::path::MediumPath;

/// Data frame size for `upload`.
pub const UPLOAD_CHUNK_SIZE: usize = 64;

/// Buffer size for `copy_file`.
pub const COPY_CHUNK_SIZE: usize = 512;

/// One event of an upload stream.
///
/// A stream is one `SizeAnnouncement`, then `Data` frames until one is
/// shorter than `UPLOAD_CHUNK_SIZE` (possibly empty), then `EndOfStream`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    SizeAnnouncement(u64),
    Data(&'a [u8]),
    EndOfStream,
}

/// Receives copy progress. Returning `false` from `update` cancels.
pub trait ProgressSink {
    fn show(&mut self) {}

    fn update(&mut self, current: u64, total: u64) -> bool;

    fn hide(&mut self) {}
}

/// Progress sink that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn update(&mut self, _current: u64, _total: u64) -> bool {
        true
    }
}

/// Read until `buf` is full or the source reports end of data.
fn fill_chunk<R: Read>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Write as much of `data` as the sink accepts. Stops at the first
/// zero-length write and returns the byte count that landed.
fn write_chunk<W: Write>(sink: &mut W, data: &[u8]) -> io::Result<usize> {
    let mut written = 0;
    while written < data.len() {
        match sink.write(&data[written..]) {
            Ok(0) => break,
            Ok(n) => written += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(written)
}

impl<D: StorageDriver> Medium<D> {
    /// Stream the contents of `path` to `on_frame`.
    pub fn upload(&mut self, path: &str, mut on_frame: impl FnMut(Frame<'_>)) -> Result<()> {
        self.gate()?;
        let mut file = self.open_file(path)?;
        let size = file.size();
        debug!("upload {} ({} bytes)", path, size);
        on_frame(Frame::SizeAnnouncement(size));

        let mut buf = [0u8; UPLOAD_CHUNK_SIZE];
        loop {
            let n = fill_chunk(&mut file, &mut buf).map_err(|e| mass_storage("upload read", e))?;
            on_frame(Frame::Data(&buf[..n]));
            if n < UPLOAD_CHUNK_SIZE {
                break;
            }
        }

        drop(file);
        on_frame(Frame::EndOfStream);
        debug!("upload {} done", path);
        Ok(())
    }

    /// Write `data` to `path`, creating it if needed. Without `truncate`
    /// the data is appended to the existing contents.
    pub fn download(&mut self, path: &str, truncate: bool, data: &[u8]) -> Result<()> {
        self.gate()?;
        debug!("download {} ({} bytes, truncate={})", path, data.len(), truncate);
        let mut file = match self.driver.open(path, OpenMode::Append) {
            Ok(file) => file,
            Err(e) if truncate => return Err(mass_storage("download truncate", e)),
            Err(e) => return Err(not_found(path, e)),
        };
        if truncate {
            file.truncate(0)
                .map_err(|e| mass_storage("download truncate", e))?;
        }
        let written = write_chunk(&mut file, data).map_err(|e| mass_storage("download write", e))?;
        if written != data.len() {
            debug!("download {}: wrote {} of {} bytes", path, written, data.len());
            return Err(StorageError::MassStorage);
        }
        Ok(())
    }

    /// Copy `src` to `dst` in `COPY_CHUNK_SIZE` chunks. On any failure or
    /// cancellation the partial destination is removed.
    ///
    /// A destination naming the source itself is refused before anything
    /// is opened, since opening it for writing would empty the source.
    pub fn copy_file(
        &mut self,
        src: &str,
        dst: &str,
        progress: &mut dyn ProgressSink,
    ) -> Result<()> {
        self.gate()?;
        if let (Ok(from), Ok(to)) = (MediumPath::new(src), MediumPath::new(dst)) {
            if from == to {
                debug!("copy {} -> {}: source and destination are the same file", src, dst);
                return Err(StorageError::MassStorage);
            }
        }
        let mut source = self.open_file(src)?;
        let total = source.size();
        let mut dest = self
            .driver
            .open(dst, OpenMode::Write)
            .map_err(|e| not_found(dst, e))?;
        debug!("copy {} -> {} ({} bytes)", src, dst, total);

        progress.show();
        let result = self.copy_chunks(&mut source, &mut dest, total, progress);
        drop(source);
        drop(dest);
        progress.hide();

        if let Err(e) = result {
            if let Err(remove_err) = self.driver.remove(dst) {
                warn!("could not remove partial copy {}: {}", dst, remove_err);
            }
            return Err(e);
        }
        debug!("copy {} -> {} done", src, dst);
        Ok(())
    }

    fn copy_chunks(
        &mut self,
        source: &mut D::File,
        dest: &mut D::File,
        total: u64,
        progress: &mut dyn ProgressSink,
    ) -> Result<()> {
        let mut buf = [0u8; COPY_CHUNK_SIZE];
        let mut written = 0u64;
        loop {
            let n = fill_chunk(source, &mut buf).map_err(|e| mass_storage("copy read", e))?;
            if n > 0 {
                let accepted =
                    write_chunk(dest, &buf[..n]).map_err(|e| mass_storage("copy write", e))?;
                written += accepted as u64;
                if accepted < n {
                    debug!("copy: short write, {} of {} bytes", accepted, n);
                    return Err(StorageError::MassStorage);
                }
            }
            // Every chunk reports, the final short or empty one included.
            if !progress.update(written, total) {
                info!("copy cancelled after {} of {} bytes", written, total);
                return Err(StorageError::MassStorage);
            }
            if n < COPY_CHUNK_SIZE {
                break;
            }
            self.tick();
        }
        if written != total {
            debug!("copy: wrote {} of {} bytes", written, total);
            return Err(StorageError::MassStorage);
        }
        Ok(())
    }
}
