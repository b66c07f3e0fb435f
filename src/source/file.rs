//! Byte-range file source backed by positional reads.

use crate::protocol::SendError;
use bytes::Bytes;
use std::fs::File;
use std::io;
use std::sync::Arc;

/// Read granularity for the blocking-pool hops.
const READ_CHUNK_SIZE: u64 = 64 * 1024;

/// Streams `length` bytes of a file starting at `offset`.
///
/// The handle is shared: the source owns its read position but not the
/// file's lifetime — the metadata cache (or whoever opened it) drops the
/// last reference. Positional reads keep concurrent sources over the
/// same handle from trampling each other's offsets.
pub struct FileSource {
    file: Arc<File>,
    offset: u64,
    remaining: u64,
}

impl FileSource {
    pub fn new(file: Arc<File>, offset: u64, length: u64) -> Self {
        Self { file, offset, remaining: length }
    }

    /// Bytes not yet produced.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Hints the kernel that `length` bytes from `offset` will be read
    /// sequentially. Advisory only; errors are ignored.
    pub fn advise_sequential(&self) {
        advise_sequential(&self.file, self.offset, self.remaining);
    }

    pub(crate) async fn next_chunk(&mut self) -> Result<Option<Bytes>, SendError> {
        if self.remaining == 0 {
            return Ok(None);
        }

        let len = self.remaining.min(READ_CHUNK_SIZE) as usize;
        let file = Arc::clone(&self.file);
        let offset = self.offset;

        let buf = tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; len];
            let n = read_at(&file, &mut buf, offset)?;
            buf.truncate(n);
            Ok::<_, io::Error>(buf)
        })
        .await
        .map_err(|e| SendError::io(io::Error::other(e)))?
        .map_err(SendError::io)?;

        if buf.is_empty() {
            // the file shrank below the advertised length
            return Err(SendError::invalid_body("file truncated while streaming"));
        }

        self.offset += buf.len() as u64;
        self.remaining -= buf.len() as u64;

        Ok(Some(Bytes::from(buf)))
    }
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

#[cfg(target_os = "linux")]
pub fn advise_sequential(file: &File, offset: u64, length: u64) {
    use std::os::unix::io::AsRawFd;
    unsafe {
        libc::posix_fadvise(file.as_raw_fd(), offset as libc::off_t, length as libc::off_t, libc::POSIX_FADV_SEQUENTIAL);
    }
}

#[cfg(not(target_os = "linux"))]
pub fn advise_sequential(_file: &File, _offset: u64, _length: u64) {}
