//! Content-Length delimited body decoding (RFC 7230 §3.3.2).

use std::cmp;

use crate::protocol::{ParseError, PayloadItem};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// Counts down a fixed byte budget, yielding whatever the buffer holds
/// until it reaches zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthDecoder {
    remaining: u64,
}

impl LengthDecoder {
    pub fn new(length: u64) -> Self {
        Self { remaining: length }
    }
}

impl Decoder for LengthDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.remaining == 0 {
            return Ok(Some(PayloadItem::Eof));
        }

        if src.is_empty() {
            return Ok(None);
        }

        let len = cmp::min(self.remaining, src.len() as u64);
        let bytes = src.split_to(len as usize).freeze();

        self.remaining -= bytes.len() as u64;
        Ok(Some(PayloadItem::Chunk(bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_at_the_advertised_length() {
        let mut buffer = BytesMut::from(&b"1012345678rest-of-stream"[..]);

        let mut decoder = LengthDecoder::new(10);
        let payload = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(&payload.as_bytes().unwrap()[..], b"1012345678");

        // the remainder belongs to the next message
        assert_eq!(&buffer[..], b"rest-of-stream");
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn sums_across_partial_reads() {
        let mut decoder = LengthDecoder::new(8);
        let mut total = 0usize;

        for piece in [&b"abc"[..], &b"de"[..], &b"fgh"[..]] {
            let mut buffer = BytesMut::from(piece);
            while let Some(item) = decoder.decode(&mut buffer).unwrap() {
                match item {
                    PayloadItem::Chunk(bytes) => total += bytes.len(),
                    PayloadItem::Eof => break,
                }
            }
        }

        assert_eq!(total, 8);
        assert!(decoder.decode(&mut BytesMut::new()).unwrap().unwrap().is_eof());
    }
}
