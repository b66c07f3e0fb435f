//! Response body sources.
//!
//! A [`BodySource`] is an ordered producer of bytes consumed by the
//! connection's write loop. Handlers compose them freely: owned buffers,
//! byte ranges of shared file handles, FIFO composites (how multi-range
//! responses are built), deferred callbacks that fire when the write
//! path reaches them, and filter-wrapped sources that transform the byte
//! stream and emit a terminal frame exactly once.

mod file;
mod filter;

pub use file::FileSource;
pub use filter::{Filter, FilterChain, FilterSource};

use crate::protocol::SendError;
use bytes::Bytes;
use std::collections::VecDeque;

/// A callback deferred until the write path reaches it in the stream.
pub type DeferredCallback = Box<dyn FnOnce() + Send>;

pub enum BodySource {
    Empty,
    /// An owned chunk of bytes.
    Buffer(Bytes),
    /// A byte range of a shared file handle.
    File(FileSource),
    /// Sources consumed front to back.
    Composite(VecDeque<BodySource>),
    /// Produces no bytes; invoked once when reached.
    Callback(Option<DeferredCallback>),
    /// A wrapped source whose output runs through a filter chain.
    Filtered(Box<FilterSource>),
}

impl BodySource {
    pub fn buffer(bytes: impl Into<Bytes>) -> Self {
        Self::Buffer(bytes.into())
    }

    pub fn composite(sources: Vec<BodySource>) -> Self {
        Self::Composite(sources.into())
    }

    pub fn callback(f: impl FnOnce() + Send + 'static) -> Self {
        Self::Callback(Some(Box::new(f)))
    }

    pub fn filtered(inner: BodySource, chain: FilterChain) -> Self {
        Self::Filtered(Box::new(FilterSource::new(inner, chain)))
    }

    /// Exact byte count this source will produce, when knowable up
    /// front. Filtered sources are opaque.
    pub fn exact_size(&self) -> Option<u64> {
        match self {
            Self::Empty => Some(0),
            Self::Buffer(bytes) => Some(bytes.len() as u64),
            Self::File(file) => Some(file.remaining()),
            Self::Composite(sources) => {
                let mut total = 0u64;
                for source in sources {
                    total = total.checked_add(source.exact_size()?)?;
                }
                Some(total)
            }
            Self::Callback(_) => Some(0),
            Self::Filtered(_) => None,
        }
    }

    /// Appends another source, flattening into an existing composite.
    pub fn push(&mut self, source: BodySource) {
        match self {
            Self::Composite(sources) => sources.push_back(source),
            Self::Empty => *self = source,
            _ => {
                let first = std::mem::replace(self, Self::Empty);
                *self = Self::Composite(VecDeque::from([first, source]));
            }
        }
    }

    /// Produces the next non-empty chunk, or `None` once exhausted.
    ///
    /// Callback sources fire here, on the write path, after everything
    /// queued before them has been produced.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, SendError> {
        match self {
            Self::Empty => Ok(None),
            Self::Buffer(bytes) => {
                if bytes.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(std::mem::take(bytes)))
                }
            }
            Self::File(file) => file.next_chunk().await,
            Self::Composite(sources) => loop {
                let Some(front) = sources.front_mut() else {
                    return Ok(None);
                };
                // boxed: composites may nest
                match Box::pin(front.next_chunk()).await? {
                    Some(bytes) => return Ok(Some(bytes)),
                    None => {
                        sources.pop_front();
                    }
                }
            },
            Self::Callback(callback) => {
                if let Some(callback) = callback.take() {
                    callback();
                }
                Ok(None)
            }
            Self::Filtered(filter_source) => filter_source.next_chunk().await,
        }
    }
}

impl Default for BodySource {
    fn default() -> Self {
        Self::Empty
    }
}

impl From<Bytes> for BodySource {
    fn from(bytes: Bytes) -> Self {
        Self::Buffer(bytes)
    }
}

impl From<&'static str> for BodySource {
    fn from(s: &'static str) -> Self {
        Self::Buffer(Bytes::from_static(s.as_bytes()))
    }
}

impl std::fmt::Debug for BodySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Buffer(bytes) => f.debug_tuple("Buffer").field(&bytes.len()).finish(),
            Self::File(file) => f.debug_tuple("File").field(&file.remaining()).finish(),
            Self::Composite(sources) => f.debug_tuple("Composite").field(&sources.len()).finish(),
            Self::Callback(_) => f.write_str("Callback"),
            Self::Filtered(_) => f.write_str("Filtered"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn collect(mut source: BodySource) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = source.next_chunk().await.unwrap() {
            out.extend_from_slice(&chunk);
        }
        out
    }

    #[tokio::test]
    async fn composite_is_fifo() {
        let source = BodySource::composite(vec![
            BodySource::buffer("part one, "),
            BodySource::Empty,
            BodySource::buffer("part two"),
        ]);
        assert_eq!(collect(source).await, b"part one, part two");
    }

    #[tokio::test]
    async fn callback_fires_after_preceding_output() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = fired.clone();

        let mut source = BodySource::buffer("data");
        source.push(BodySource::callback(move || {
            fired2.fetch_add(1, Ordering::SeqCst);
        }));
        source.push(BodySource::buffer("more"));

        let mut out = Vec::new();
        let first = source.next_chunk().await.unwrap().unwrap();
        out.extend_from_slice(&first);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        while let Some(chunk) = source.next_chunk().await.unwrap() {
            out.extend_from_slice(&chunk);
        }

        assert_eq!(out, b"datamore");
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exact_size_sums_composites() {
        let source = BodySource::composite(vec![
            BodySource::buffer("12345"),
            BodySource::callback(|| {}),
            BodySource::buffer("678"),
        ]);
        assert_eq!(source.exact_size(), Some(8));
    }
}
