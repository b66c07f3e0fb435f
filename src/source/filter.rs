//! Composable byte transformers for the response stream.

use crate::protocol::SendError;
use crate::source::BodySource;
use bytes::{Bytes, BytesMut};

/// A byte-to-byte transformer with an explicit end-of-stream step.
///
/// `process` may buffer internally and return fewer (or more) bytes than
/// it was given; `finish` flushes whatever the transform holds back and
/// emits any terminal frame. The driver guarantees `finish` is called
/// exactly once per response, even when the wrapped source is empty.
pub trait Filter: Send {
    fn process(&mut self, input: Bytes) -> Bytes;

    fn finish(&mut self) -> Bytes {
        Bytes::new()
    }
}

/// An ordered chain of filters; bytes flow through them front to back.
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn Filter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, filter: impl Filter + 'static) {
        self.filters.push(Box::new(filter));
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn process(&mut self, input: Bytes) -> Bytes {
        let mut data = input;
        for filter in &mut self.filters {
            data = filter.process(data);
        }
        data
    }

    /// Finishes every filter in order. A filter's terminal output still
    /// flows through the filters after it before their own terminal
    /// frames are appended.
    pub fn finish(&mut self) -> Bytes {
        let mut carried = Bytes::new();
        for filter in &mut self.filters {
            let mut out = BytesMut::new();
            if !carried.is_empty() {
                out.extend_from_slice(&filter.process(carried));
            }
            out.extend_from_slice(&filter.finish());
            carried = out.freeze();
        }
        carried
    }
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterChain").field("len", &self.filters.len()).finish()
    }
}

/// A source wrapped in a filter chain.
pub struct FilterSource {
    inner: BodySource,
    chain: FilterChain,
    finished: bool,
}

impl FilterSource {
    pub fn new(inner: BodySource, chain: FilterChain) -> Self {
        Self { inner, chain, finished: false }
    }

    pub(crate) async fn next_chunk(&mut self) -> Result<Option<Bytes>, SendError> {
        loop {
            if self.finished {
                return Ok(None);
            }

            // boxed: the wrapped source may itself be composite or filtered
            match Box::pin(self.inner.next_chunk()).await? {
                Some(bytes) => {
                    let out = self.chain.process(bytes);
                    if !out.is_empty() {
                        return Ok(Some(out));
                    }
                    // transform held everything back, pull more input
                }
                None => {
                    self.finished = true;
                    let tail = self.chain.finish();
                    if !tail.is_empty() {
                        return Ok(Some(tail));
                    }
                    return Ok(None);
                }
            }
        }
    }
}
