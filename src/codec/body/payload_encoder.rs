//! Dispatching body encoder: fixed length, chunked, close-delimited, or
//! no body.

use crate::codec::body::chunked_encoder::ChunkedEncoder;
use crate::codec::body::length_encoder::LengthEncoder;
use crate::protocol::{PayloadItem, PayloadSize, SendError};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::Encoder;

pub struct PayloadEncoder {
    kind: Kind,
}

enum Kind {
    Length(LengthEncoder),
    Chunked(ChunkedEncoder),
    /// Raw passthrough until the connection closes (HTTP/1.0 fallback,
    /// or application-supplied framing).
    Unbounded { received_eof: bool },
    NoBody,
}

impl PayloadEncoder {
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    pub fn chunked() -> Self {
        Self { kind: Kind::Chunked(ChunkedEncoder::new()) }
    }

    pub fn fixed_length(size: u64) -> Self {
        Self { kind: Kind::Length(LengthEncoder::new(size)) }
    }

    pub fn unbounded() -> Self {
        Self { kind: Kind::Unbounded { received_eof: false } }
    }

    /// True once the strategy has emitted everything it ever will.
    pub fn is_finish(&self) -> bool {
        match &self.kind {
            Kind::Length(encoder) => encoder.is_finish(),
            Kind::Chunked(encoder) => encoder.is_finish(),
            Kind::Unbounded { received_eof } => *received_eof,
            Kind::NoBody => true,
        }
    }
}

impl From<PayloadSize> for PayloadEncoder {
    fn from(payload_size: PayloadSize) -> Self {
        match payload_size {
            PayloadSize::Length(size) => PayloadEncoder::fixed_length(size),
            PayloadSize::Chunked => PayloadEncoder::chunked(),
            PayloadSize::Empty => PayloadEncoder::empty(),
            PayloadSize::Unbounded => PayloadEncoder::unbounded(),
        }
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for PayloadEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match &mut self.kind {
            Kind::Length(encoder) => encoder.encode(item, dst),
            Kind::Chunked(encoder) => encoder.encode(item, dst),
            Kind::Unbounded { received_eof } => {
                match item {
                    PayloadItem::Chunk(bytes) => dst.put(bytes),
                    PayloadItem::Eof => *received_eof = true,
                }
                Ok(())
            }
            Kind::NoBody => Ok(()),
        }
    }
}
