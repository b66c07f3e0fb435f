//! File metadata service: stat results, validators, mimetypes, and a
//! per-worker cache of open handles.
//!
//! A [`FileInfo`] is shared by reference for the duration of a request;
//! the cache (or the last in-flight response) dropping its `Arc` closes
//! the handle. Sources performing positional reads never disturb each
//! other, so one cached handle serves any number of concurrent
//! responses.

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant, SystemTime};

use http::header::HeaderValue;
use tracing::debug;

/// Metadata snapshot of one filesystem path.
#[derive(Debug)]
pub struct FileInfo {
    path: PathBuf,
    exists: bool,
    is_directory: bool,
    size: u64,
    mtime: Option<SystemTime>,
    etag: Option<String>,
    last_modified: Option<String>,
    mimetype: String,
    error: Option<io::ErrorKind>,
    handle: OnceLock<Option<Arc<File>>>,
}

impl FileInfo {
    /// Stats `path` and builds a snapshot. Lookup failures produce a
    /// non-existent entry carrying the error kind, which the pathinfo
    /// walk inspects.
    pub fn stat(path: impl AsRef<Path>) -> Arc<FileInfo> {
        let path = path.as_ref().to_path_buf();

        let info = match std::fs::metadata(&path) {
            Ok(metadata) => {
                let mtime = metadata.modified().ok();
                let size = metadata.len();
                let etag = Some(compute_etag(&metadata, size, mtime));
                let last_modified = mtime.map(httpdate::fmt_http_date);
                let mimetype = if metadata.is_dir() {
                    "inode/directory".to_string()
                } else {
                    mime_guess::from_path(&path).first_or_octet_stream().essence_str().to_string()
                };

                FileInfo {
                    path,
                    exists: true,
                    is_directory: metadata.is_dir(),
                    size,
                    mtime,
                    etag,
                    last_modified,
                    mimetype,
                    error: None,
                    handle: OnceLock::new(),
                }
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "stat failed");
                FileInfo {
                    path,
                    exists: false,
                    is_directory: false,
                    size: 0,
                    mtime: None,
                    etag: None,
                    last_modified: None,
                    mimetype: String::new(),
                    error: Some(e.kind()),
                    handle: OnceLock::new(),
                }
            }
        };

        Arc::new(info)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn mtime(&self) -> Option<SystemTime> {
        self.mtime
    }

    /// Strong-ish validator derived from identity, size and mtime.
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    /// RFC 7231 HTTP-date string of the mtime.
    pub fn last_modified(&self) -> Option<&str> {
        self.last_modified.as_deref()
    }

    pub fn mimetype(&self) -> &str {
        &self.mimetype
    }

    /// The stat error for missing entries (pathinfo resolution cares
    /// about `NotADirectory`).
    pub fn error(&self) -> Option<io::ErrorKind> {
        self.error
    }

    /// Opens (once) and returns the shared read handle, or `None` when
    /// the file cannot be opened.
    pub fn handle(&self) -> Option<Arc<File>> {
        self.handle
            .get_or_init(|| match File::open(&self.path) {
                Ok(file) => Some(Arc::new(file)),
                Err(e) => {
                    debug!(path = %self.path.display(), error = %e, "open failed");
                    None
                }
            })
            .clone()
    }

    /// Header-ready ETag value.
    pub fn etag_value(&self) -> Option<HeaderValue> {
        self.etag().and_then(|tag| HeaderValue::from_str(tag).ok())
    }

    /// Header-ready Last-Modified value.
    pub fn last_modified_value(&self) -> Option<HeaderValue> {
        self.last_modified().and_then(|lm| HeaderValue::from_str(lm).ok())
    }
}

#[cfg(unix)]
fn compute_etag(metadata: &std::fs::Metadata, size: u64, mtime: Option<SystemTime>) -> String {
    use std::os::unix::fs::MetadataExt;
    let secs = mtime
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or_default();
    format!("\"{:x}-{:x}-{:x}\"", metadata.ino(), size, secs)
}

#[cfg(not(unix))]
fn compute_etag(_metadata: &std::fs::Metadata, size: u64, mtime: Option<SystemTime>) -> String {
    let secs = mtime
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or_default();
    format!("\"{:x}-{:x}\"", size, secs)
}

/// Per-worker metadata cache with time-based expiry.
///
/// Lives on exactly one worker thread, so a plain `RefCell` map is
/// enough; the entries it hands out are `Arc`s that may outlive the
/// cache slot.
pub struct FileInfoCache {
    entries: std::cell::RefCell<HashMap<PathBuf, CacheSlot>>,
    ttl: Duration,
}

struct CacheSlot {
    info: Arc<FileInfo>,
    cached_at: Instant,
}

impl FileInfoCache {
    pub fn new(ttl: Duration) -> Self {
        Self { entries: Default::default(), ttl }
    }

    pub fn lookup(&self, path: impl AsRef<Path>) -> Arc<FileInfo> {
        let path = path.as_ref();

        if let Some(slot) = self.entries.borrow().get(path) {
            if slot.cached_at.elapsed() < self.ttl {
                return Arc::clone(&slot.info);
            }
        }

        let info = FileInfo::stat(path);
        self.entries
            .borrow_mut()
            .insert(path.to_path_buf(), CacheSlot { info: Arc::clone(&info), cached_at: Instant::now() });
        info
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}
