use std::cell::RefCell;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{
    HeaderName, HeaderValue, ACCEPT_RANGES, CONNECTION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, COOKIE, DATE,
    ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, IF_RANGE, LAST_MODIFIED, RANGE, SERVER, TRANSFER_ENCODING, VARY, VIA,
};
use http::{Method, StatusCode, Uri, Version};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error, warn};

use crate::fileinfo::{FileInfo, FileInfoCache};
use crate::protocol::status::{content_forbidden, reason_phrase};
use crate::protocol::uri::DecodedTarget;
use crate::protocol::{range, HeaderList, PayloadSize, RangeSpec, RequestHead, ResponseHead, Vary};
use crate::request::Notes;
use crate::source::{BodySource, FileSource, FilterChain};

const KEEP_ALIVE: HeaderName = HeaderName::from_static("keep-alive");

/// Runs when the response status is an error and the handler produced
/// no body; returns true when it wrote a replacement body.
pub type ErrorHandler = Box<dyn FnOnce(&mut Request) -> bool + Send>;

/// Runs once the response body has drained (or failed) with the byte
/// count transmitted or the I/O error.
pub type WriteCompleteHandler = Box<dyn FnOnce(io::Result<u64>) + Send>;

/// Runs when the client goes away mid-request. Must not touch the
/// request — it may already be gone.
pub type AbortHandler = Box<dyn FnOnce() + Send>;

/// Per-exchange state: parsed request metadata plus the mutable
/// response under construction. At most one lives per connection.
pub struct Request {
    head: RequestHead,
    unparsed_uri: Bytes,
    path: Vec<u8>,
    query: Option<Vec<u8>>,
    pathinfo: Vec<u8>,
    directory_depth: i32,
    hostname: String,
    hostid: Option<String>,
    local_port: u16,
    document_root: PathBuf,
    fileinfo: Option<Arc<FileInfo>>,
    fileinfo_cache: Option<Rc<FileInfoCache>>,
    expecting_continue: bool,

    status: Option<StatusCode>,
    response_headers: HeaderList,
    output_filters: FilterChain,
    output: BodySource,
    output_pending: bool,
    bytes_transmitted: u64,

    notes: Notes,
    error_handler: Option<ErrorHandler>,
    write_complete: Option<WriteCompleteHandler>,
    abort_handler: Option<AbortHandler>,
    finished: bool,
    aborted: bool,
}

impl Request {
    pub(crate) fn new(head: RequestHead, target: DecodedTarget, local_port: u16) -> Self {
        let unparsed_uri = Bytes::copy_from_slice(
            head.uri().path_and_query().map(|pq| pq.as_str().as_bytes()).unwrap_or(b"*"),
        );

        // Host sans port, as sent by the client
        let hostname = head
            .headers()
            .get(http::header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(|h| h.split(':').next().unwrap_or(h).to_string())
            .unwrap_or_default();

        Self {
            head,
            unparsed_uri,
            path: target.path,
            query: target.query,
            pathinfo: Vec::new(),
            directory_depth: target.depth,
            hostname,
            hostid: None,
            local_port,
            document_root: PathBuf::new(),
            fileinfo: None,
            fileinfo_cache: None,
            expecting_continue: false,
            status: None,
            response_headers: HeaderList::new(),
            output_filters: FilterChain::new(),
            output: BodySource::Empty,
            output_pending: false,
            bytes_transmitted: 0,
            notes: Notes::default(),
            error_handler: None,
            write_complete: None,
            abort_handler: None,
            finished: false,
            aborted: false,
        }
    }

    // request side

    pub fn method(&self) -> &Method {
        self.head.method()
    }

    pub fn uri(&self) -> &Uri {
        self.head.uri()
    }

    pub fn version(&self) -> Version {
        self.head.version()
    }

    pub fn headers(&self) -> &http::HeaderMap {
        self.head.headers()
    }

    /// Raw request target as received, before decoding.
    pub fn unparsed_uri(&self) -> &[u8] {
        &self.unparsed_uri
    }

    /// Percent-decoded path. Begins with `/`, or equals `*`.
    pub fn path(&self) -> &[u8] {
        &self.path
    }

    pub fn path_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.path)
    }

    /// Raw query bytes, when the target carried one.
    pub fn query(&self) -> Option<&[u8]> {
        self.query.as_deref()
    }

    /// Trailing virtual path under a resolved file, e.g. `/extra` in
    /// `/script/extra`. Empty until [`Self::map_file`] resolves it.
    pub fn pathinfo(&self) -> &[u8] {
        &self.pathinfo
    }

    pub fn directory_depth(&self) -> i32 {
        self.directory_depth
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// `hostname:port` identity, lazily built from the Host header and
    /// the local port; overridable for virtual-host canonicalization.
    pub fn hostid(&mut self) -> &str {
        if self.hostid.is_none() {
            self.hostid = Some(format!("{}:{}", self.hostname, self.local_port));
        }
        self.hostid.as_deref().unwrap()
    }

    pub fn set_hostid(&mut self, value: impl Into<String>) {
        self.hostid = Some(value.into());
    }

    pub fn supports_protocol(&self, major: u8, minor: u8) -> bool {
        let wanted = match (major, minor) {
            (0, 9) => Version::HTTP_09,
            (1, 0) => Version::HTTP_10,
            (1, 1) => Version::HTTP_11,
            _ => return false,
        };
        self.version() >= wanted
    }

    pub fn request_header(&self, name: impl http::header::AsHeaderName) -> Option<&HeaderValue> {
        self.head.headers().get(name)
    }

    /// Looks up one cookie by exact name in the `Cookie` header.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        let header = self.request_header(COOKIE)?.to_str().ok()?;

        for pair in header.split(';') {
            let pair = pair.trim_matches([' ', '\t']);
            let (key, value) = match pair.split_once('=') {
                Some((k, v)) => (k, v),
                None => (pair, ""),
            };
            if key.trim_matches([' ', '\t']) == name {
                return Some(value.trim_matches([' ', '\t']));
            }
        }
        None
    }

    pub fn document_root(&self) -> &Path {
        &self.document_root
    }

    pub fn set_document_root(&mut self, root: impl Into<PathBuf>) {
        self.document_root = root.into();
    }

    pub fn fileinfo(&self) -> Option<&Arc<FileInfo>> {
        self.fileinfo.as_ref()
    }

    pub fn set_fileinfo(&mut self, fileinfo: Arc<FileInfo>) {
        self.fileinfo = Some(fileinfo);
    }

    pub fn expecting_continue(&self) -> bool {
        self.expecting_continue
    }

    pub(crate) fn set_expecting_continue(&mut self, value: bool) {
        self.expecting_continue = value;
    }

    pub fn notes(&mut self) -> &mut Notes {
        &mut self.notes
    }

    /// Builds the cache fingerprint for this exchange from the response
    /// `Vary` header and the request's header values.
    pub fn vary_record(&self) -> Option<Vary> {
        let value = self.response_headers.get(&VARY)?.to_str().ok()?.to_string();
        Some(Vary::create(&value, self.head.headers()))
    }

    // response side

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    pub fn response_headers(&self) -> &HeaderList {
        &self.response_headers
    }

    pub fn response_headers_mut(&mut self) -> &mut HeaderList {
        &mut self.response_headers
    }

    pub fn output_filters_mut(&mut self) -> &mut FilterChain {
        &mut self.output_filters
    }

    /// Appends a source to the output chain.
    pub fn write(&mut self, source: BodySource) {
        self.output.push(source);
        self.output_pending = true;
    }

    pub fn write_buffer(&mut self, bytes: impl Into<Bytes>) {
        self.write(BodySource::buffer(bytes.into()));
    }

    /// Defers `callback` until everything queued so far has reached the
    /// write path, or invokes it inline when nothing is pending (or the
    /// client is gone). Returns whether the call was deferred.
    pub fn write_callback(&mut self, callback: impl FnOnce() + Send + 'static) -> bool {
        if self.aborted || !self.output_pending {
            callback();
            return false;
        }

        self.output.push(BodySource::callback(callback));
        true
    }

    pub fn is_output_pending(&self) -> bool {
        self.output_pending
    }

    pub fn bytes_transmitted(&self) -> u64 {
        self.bytes_transmitted
    }

    pub(crate) fn add_bytes_transmitted(&mut self, n: u64) {
        self.bytes_transmitted += n;
    }

    pub fn set_error_handler(&mut self, handler: impl FnOnce(&mut Request) -> bool + Send + 'static) {
        self.error_handler = Some(Box::new(handler));
    }

    pub fn set_write_complete_handler(&mut self, handler: impl FnOnce(io::Result<u64>) + Send + 'static) {
        self.write_complete = Some(Box::new(handler));
    }

    /// Registers a client-abort callback. The callback must not assume
    /// the request still exists when it runs.
    pub fn set_abort_handler(&mut self, handler: impl FnOnce() + Send + 'static) {
        self.abort_handler = Some(Box::new(handler));
    }

    pub(crate) fn take_abort_handler(&mut self) -> Option<AbortHandler> {
        self.abort_handler.take()
    }

    pub(crate) fn take_write_complete(&mut self) -> Option<WriteCompleteHandler> {
        self.write_complete.take()
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub(crate) fn set_aborted(&mut self) {
        self.aborted = true;
    }

    /// Marks the exchange complete. Idempotent: the second and later
    /// calls are no-ops. No output may be appended afterwards.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.abort_handler = None;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Emits 400 and finishes when the decoded path escaped the virtual
    /// root. Returns whether a traversal was detected.
    pub fn test_directory_traversal(&mut self) -> bool {
        if self.directory_depth >= 0 {
            return false;
        }

        warn!(path = %self.path_lossy(), "directory traversal detected");
        self.set_status(StatusCode::BAD_REQUEST);
        self.finish();
        true
    }

    // filesystem mapping

    pub(crate) fn set_fileinfo_cache(&mut self, cache: Rc<FileInfoCache>) {
        self.fileinfo_cache = Some(cache);
    }

    /// Stats `path` through the worker's metadata cache (or directly
    /// when none is attached).
    pub fn lookup(&self, path: impl AsRef<Path>) -> Arc<FileInfo> {
        match &self.fileinfo_cache {
            Some(cache) => cache.lookup(path),
            None => FileInfo::stat(path),
        }
    }

    /// Maps the decoded path under the document root and resolves
    /// pathinfo by walking up while the lookup reports not-a-directory.
    pub fn map_file(&mut self) -> Arc<FileInfo> {
        let relative: &[u8] = self.path.strip_prefix(b"/").unwrap_or(&self.path);
        let full = self.document_root.join(bytes_as_path(relative));

        let info = self.lookup(&full);
        self.fileinfo = Some(Arc::clone(&info));
        self.update_path_info();
        self.fileinfo.clone().unwrap()
    }

    fn update_path_info(&mut self) {
        let Some(mut info) = self.fileinfo.clone() else {
            return;
        };
        let original_len = info.path().as_os_str().len();

        loop {
            if info.exists() {
                let stripped = original_len - info.path().as_os_str().len();
                if stripped > 0 && stripped <= self.path.len() {
                    self.pathinfo = self.path[self.path.len() - stripped..].to_vec();
                }
                break;
            }

            if info.error() == Some(io::ErrorKind::NotADirectory) {
                let Some(parent) = info.path().parent() else {
                    break;
                };
                info = self.lookup(parent.to_path_buf());
            } else {
                break;
            }
        }

        self.fileinfo = Some(info);
    }

    // static file responses

    /// Serves `file` honoring conditional and range headers.
    ///
    /// Sets the status (200, 206, 304, 400, 403, 405 or 416), pushes the
    /// validator and framing headers, and queues the body sources for
    /// GET. The caller still finishes the request.
    pub fn send_file(&mut self, file: Arc<FileInfo>) {
        let status = self.verify_client_cache(&file);
        if status != StatusCode::OK {
            self.set_status(status);
            self.fileinfo = Some(file);
            return;
        }

        let handle = if self.method() == Method::GET {
            match file.handle() {
                Some(handle) => Some(handle),
                None => {
                    error!(path = %file.path().display(), "could not open file");
                    self.set_status(StatusCode::FORBIDDEN);
                    self.fileinfo = Some(file);
                    return;
                }
            }
        } else if self.method() == Method::HEAD {
            None
        } else {
            self.set_status(StatusCode::METHOD_NOT_ALLOWED);
            self.fileinfo = Some(file);
            return;
        };

        if let Some(value) = file.last_modified_value() {
            self.response_headers.push(LAST_MODIFIED, value);
        }
        if let Some(value) = file.etag_value() {
            self.response_headers.push(ETAG, value);
        }

        if !self.process_range_request(&file, handle.as_ref()) {
            self.response_headers.push(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
            if let Ok(value) = HeaderValue::from_str(file.mimetype()) {
                self.response_headers.push(CONTENT_TYPE, value);
            }
            self.response_headers.push(CONTENT_LENGTH, HeaderValue::from(file.size()));

            if let Some(handle) = handle {
                let source = FileSource::new(handle, 0, file.size());
                source.advise_sequential();
                self.write(BodySource::File(source));
            }
        }

        self.fileinfo = Some(file);
    }

    /// Evaluates `If-None-Match` / `If-Modified-Since` against the
    /// file's validators.
    pub fn verify_client_cache(&self, file: &FileInfo) -> StatusCode {
        if let Some(if_none_match) = self.request_header(IF_NONE_MATCH).and_then(|v| v.to_str().ok()) {
            if Some(if_none_match) == file.etag() {
                return match self.request_header(IF_MODIFIED_SINCE).and_then(|v| v.to_str().ok()) {
                    Some(since) => match httpdate::parse_http_date(since) {
                        Ok(_) => StatusCode::NOT_MODIFIED,
                        Err(_) => StatusCode::BAD_REQUEST,
                    },
                    None => StatusCode::NOT_MODIFIED,
                };
            }
        } else if let Some(since) = self.request_header(IF_MODIFIED_SINCE).and_then(|v| v.to_str().ok()) {
            let Ok(since) = httpdate::parse_http_date(since) else {
                return StatusCode::BAD_REQUEST;
            };
            if let Some(mtime) = file.mtime() {
                // HTTP dates have second granularity
                if truncate_to_secs(mtime) <= since {
                    return StatusCode::NOT_MODIFIED;
                }
            }
        }

        StatusCode::OK
    }

    /// Processes a `Range:` request if one was sent.
    ///
    /// Returns false when there is no (valid) range request and the full
    /// representation should be served. A syntactically valid but
    /// unsatisfiable range sets 416 and returns true.
    fn process_range_request(&mut self, file: &FileInfo, handle: Option<&Arc<std::fs::File>>) -> bool {
        let Some(range_value) = self.request_header(RANGE) else {
            return false;
        };
        let Some(spec) = RangeSpec::parse(range_value.as_bytes()) else {
            return false;
        };

        // If-Range: serve the full file unless the validator still holds
        if let Some(cond) = self.request_header(IF_RANGE).and_then(|v| v.to_str().ok()) {
            let matches_etag = Some(cond) == file.etag();
            let matches_mtime = Some(cond) == file.last_modified();
            if !matches_etag && !matches_mtime {
                return false;
            }
        }

        self.set_status(StatusCode::PARTIAL_CONTENT);

        if spec.len() > 1 {
            self.send_multi_range(&spec, file, handle)
        } else {
            self.send_single_range(&spec, file, handle)
        }

        true
    }

    fn send_single_range(&mut self, spec: &RangeSpec, file: &FileInfo, handle: Option<&Arc<std::fs::File>>) {
        let Some((first, last)) = range::resolve(*spec.get(0).unwrap(), file.size()) else {
            self.set_status(StatusCode::RANGE_NOT_SATISFIABLE);
            return;
        };
        let length = last - first + 1;

        if let Ok(value) = HeaderValue::from_str(file.mimetype()) {
            self.response_headers.push(CONTENT_TYPE, value);
        }
        self.response_headers.push(CONTENT_LENGTH, HeaderValue::from(length));
        let content_range = format!("bytes {}-{}/{}", first, last, file.size());
        self.response_headers.push(CONTENT_RANGE, HeaderValue::from_str(&content_range).unwrap());

        if let Some(handle) = handle {
            let source = FileSource::new(Arc::clone(handle), first, length);
            source.advise_sequential();
            self.write(BodySource::File(source));
        }
    }

    fn send_multi_range(&mut self, spec: &RangeSpec, file: &FileInfo, handle: Option<&Arc<std::fs::File>>) {
        let boundary = generate_boundary();
        let mut parts = Vec::with_capacity(spec.len() * 2 + 1);
        let mut content_length = 0u64;

        for byte_range in spec.iter() {
            let Some((first, last)) = range::resolve(*byte_range, file.size()) else {
                self.set_status(StatusCode::RANGE_NOT_SATISFIABLE);
                return;
            };
            let part_length = last - first + 1;

            let part_head = format!(
                "\r\n--{boundary}\r\nContent-Type: {}\r\nContent-Range: bytes {}-{}/{}\r\n\r\n",
                file.mimetype(),
                first,
                last,
                file.size()
            );
            content_length += part_head.len() as u64 + part_length;

            if let Some(handle) = handle {
                parts.push(BodySource::buffer(part_head));
                parts.push(BodySource::File(FileSource::new(Arc::clone(handle), first, part_length)));
            }
        }

        let close = format!("\r\n--{boundary}--\r\n");
        content_length += close.len() as u64;

        let content_type = format!("multipart/byteranges; boundary={boundary}");
        self.response_headers.push(CONTENT_TYPE, HeaderValue::from_str(&content_type).unwrap());
        self.response_headers.push(CONTENT_LENGTH, HeaderValue::from(content_length));

        if handle.is_some() {
            parts.push(BodySource::buffer(close));
            self.write(BodySource::composite(parts));
        }
    }

    // response assembly

    /// Generates the built-in error page for the current status, unless
    /// a user error handler produces output first or the status forbids
    /// content.
    pub(crate) fn prepare_default_content(&mut self) {
        if self.output_pending {
            return;
        }

        if self.status.is_none() {
            // nothing handled the request
            self.status = Some(StatusCode::NOT_FOUND);
        }
        let status = self.status.unwrap();

        if status.as_u16() >= 400 {
            if let Some(handler) = self.error_handler.take() {
                debug!(status = %status, "running custom error handler");
                if handler(self) && self.output_pending {
                    return;
                }
            }
        }

        if content_forbidden(status) {
            return;
        }

        if status.as_u16() >= 400 {
            let reason = reason_phrase(status);
            let body = format!(
                "<html><head><title>{reason}</title></head><body><h1>{} {reason}</h1></body></html>\r\n",
                status.as_str()
            );
            self.response_headers.overwrite(CONTENT_TYPE, HeaderValue::from_static("text/html"));
            self.response_headers.overwrite(CONTENT_LENGTH, HeaderValue::from(body.len()));
            self.write_buffer(body);
        } else {
            self.response_headers.overwrite(CONTENT_LENGTH, HeaderValue::from_static("0"));
        }
    }

    /// Builds the response head and framing decision.
    ///
    /// Returns the head, the payload framing, and the final keep-alive
    /// verdict (the caller's wish, narrowed by what the framing allows).
    pub(crate) fn serialize(&mut self, cx: SerializeContext) -> (ResponseHead, PayloadSize, bool) {
        if self.expecting_continue {
            // handler never claimed the body we withheld
            self.status = Some(StatusCode::EXPECTATION_FAILED);
            self.expecting_continue = false;
        }

        let status = *self.status.get_or_insert(StatusCode::OK);
        let version = if self.supports_protocol(1, 1) { Version::HTTP_11 } else { Version::HTTP_10 };
        let mut keep_alive = cx.keep_alive;
        if cx.remaining_requests == Some(0) {
            keep_alive = false;
        }

        let payload_size = if self.method() == Method::HEAD || content_forbidden(status) {
            PayloadSize::Empty
        } else if let Some(value) = self.response_headers.get(&CONTENT_LENGTH) {
            match value.to_str().ok().and_then(|s| s.trim().parse::<u64>().ok()) {
                Some(n) => PayloadSize::Length(n),
                None => {
                    keep_alive = false;
                    PayloadSize::Unbounded
                }
            }
        } else if self.response_headers.contains(&TRANSFER_ENCODING) {
            // the application brought its own framing; stream it raw
            keep_alive = false;
            PayloadSize::Unbounded
        } else if version == Version::HTTP_11 {
            self.response_headers.push(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
            PayloadSize::Chunked
        } else if !self.output_pending {
            self.response_headers.overwrite(CONTENT_LENGTH, HeaderValue::from_static("0"));
            PayloadSize::Empty
        } else {
            // HTTP/1.0, unknown length: delimited by close
            keep_alive = false;
            PayloadSize::Unbounded
        };

        if !self.response_headers.contains(&DATE) {
            self.response_headers.push(DATE, cx.date);
        }

        if let Some(tag) = cx.server_tag {
            if self.response_headers.contains(&SERVER) {
                self.response_headers.push(VIA, tag);
            } else {
                self.response_headers.push(SERVER, tag);
            }
        }

        if keep_alive {
            self.response_headers.push(CONNECTION, HeaderValue::from_static("keep-alive"));
            let timeout = cx.keep_alive_timeout.as_secs();
            let value = match cx.remaining_requests {
                Some(n) => format!("timeout={timeout}, max={n}"),
                None => format!("timeout={timeout}"),
            };
            self.response_headers.push(KEEP_ALIVE, HeaderValue::from_str(&value).unwrap());
        } else {
            self.response_headers.push(CONNECTION, HeaderValue::from_static("close"));
        }

        let head = ResponseHead { version, status, headers: std::mem::take(&mut self.response_headers) };
        (head, payload_size, keep_alive)
    }

    /// Hands over the queued output, wrapped in the filter chain when
    /// one is installed (which guarantees the chain's terminal frame is
    /// emitted exactly once, even for empty bodies).
    pub(crate) fn take_output(&mut self) -> BodySource {
        let output = std::mem::take(&mut self.output);
        self.output_pending = false;

        let filters = std::mem::take(&mut self.output_filters);
        if filters.is_empty() {
            output
        } else {
            BodySource::filtered(output, filters)
        }
    }

    /// Clears request-scoped application data after the request-done
    /// hooks ran.
    pub(crate) fn finalize_cleanup(&mut self) {
        self.notes.clear();
        self.error_handler = None;
        self.write_complete = None;
        self.abort_handler = None;
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", self.method())
            .field("path", &self.path_lossy())
            .field("version", &self.version())
            .field("status", &self.status)
            .field("finished", &self.finished)
            .finish()
    }
}

/// Inputs the connection feeds into response serialization.
pub struct SerializeContext {
    pub date: HeaderValue,
    /// Tag for Server/Via advertising; `None` disables it.
    pub server_tag: Option<HeaderValue>,
    pub keep_alive: bool,
    pub keep_alive_timeout: Duration,
    /// Requests left on this connection; `None` means unlimited.
    pub remaining_requests: Option<u64>,
}

fn truncate_to_secs(t: std::time::SystemTime) -> std::time::SystemTime {
    match t.duration_since(std::time::SystemTime::UNIX_EPOCH) {
        Ok(d) => std::time::SystemTime::UNIX_EPOCH + Duration::from_secs(d.as_secs()),
        Err(_) => t,
    }
}

#[cfg(unix)]
fn bytes_as_path(bytes: &[u8]) -> &Path {
    use std::os::unix::ffi::OsStrExt;
    Path::new(std::ffi::OsStr::from_bytes(bytes))
}

#[cfg(not(unix))]
fn bytes_as_path(bytes: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
}

/// 16 hex digits from a per-worker PRNG; unique within a response is
/// all multipart framing needs.
fn generate_boundary() -> String {
    thread_local! {
        static BOUNDARY_RNG: RefCell<SmallRng> = RefCell::new(SmallRng::from_entropy());
    }

    BOUNDARY_RNG.with(|rng| {
        let mut rng = rng.borrow_mut();
        (0..16).map(|_| char::from_digit(rng.gen_range(0..16u32), 16).unwrap()).collect()
    })
}
