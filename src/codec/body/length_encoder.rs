use crate::protocol::{PayloadItem, SendError};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::Encoder;
use tracing::warn;

/// Passes body bytes through untouched, bounded by the Content-Length
/// already emitted in the headers. Bytes past the budget are dropped
/// with a warning rather than corrupting the framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    received_eof: bool,
    remaining: u64,
}

impl LengthEncoder {
    pub fn new(length: u64) -> Self {
        Self { received_eof: false, remaining: length }
    }

    pub fn is_finish(&self) -> bool {
        self.remaining == 0 && self.received_eof
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for LengthEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            PayloadItem::Chunk(mut bytes) => {
                if !bytes.has_remaining() {
                    return Ok(());
                }

                let len = bytes.remaining() as u64;
                if len > self.remaining {
                    warn!(excess = len - self.remaining, "body exceeds declared content-length, truncating");
                    let take = self.remaining as usize;
                    dst.put(bytes.take(take));
                    self.remaining = 0;
                    return Ok(());
                }

                dst.put(bytes);
                self.remaining -= len;
                Ok(())
            }
            PayloadItem::Eof => {
                if self.remaining > 0 {
                    warn!(missing = self.remaining, "body ended short of declared content-length");
                }
                self.received_eof = true;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn passes_exactly_the_declared_bytes() {
        let mut encoder = LengthEncoder::new(5);
        let mut dst = BytesMut::new();

        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"hello")), &mut dst).unwrap();
        encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();

        assert_eq!(&dst[..], b"hello");
        assert!(encoder.is_finish());
    }

    #[test]
    fn excess_bytes_are_truncated() {
        let mut encoder = LengthEncoder::new(3);
        let mut dst = BytesMut::new();

        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"hello")), &mut dst).unwrap();
        assert_eq!(&dst[..], b"hel");
    }
}
