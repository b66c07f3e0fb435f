//! Chunked transfer decoding (RFC 7230 §4.1).
//!
//! Each chunk is a hex size line (optionally with extensions, which are
//! skipped), the data, and a CRLF. The zero-size chunk ends the body;
//! trailer fields after it are recognized and discarded.

use crate::protocol::{ParseError, PayloadItem};
use bytes::{Buf, Bytes, BytesMut};
use std::io;
use std::io::ErrorKind;
use std::task::Poll;
use tokio_util::codec::Decoder;
use tracing::trace;
use ChunkedState::*;

/// Resumable chunked-body decoder.
///
/// Chunk data is yielded as it arrives — a chunk split across reads
/// produces multiple `Chunk` items. After the terminal chunk and its
/// trailers, every further decode call reports `Eof`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    remaining_size: u64,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: Size, remaining_size: 0 }
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Position inside the chunk grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Hex digits of the chunk size
    Size,
    /// Whitespace between size and extension/CRLF
    SizeLws,
    /// Chunk extension, skipped up to CR
    Extension,
    /// LF closing the size line
    SizeLf,
    /// Chunk data
    Body,
    /// CR after chunk data
    BodyCr,
    /// LF after chunk data
    BodyLf,
    /// Trailer field, skipped up to CR
    Trailer,
    /// LF closing a trailer field
    TrailerLf,
    /// CR of the final empty line
    EndCr,
    /// LF of the final empty line
    EndLf,
    /// Message complete
    End,
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.state == End {
                trace!("finished reading chunked body");
                return Ok(Some(PayloadItem::Eof));
            }

            if src.is_empty() {
                return Ok(None);
            }

            let mut out = None;

            self.state = match self.state.step(src, &mut self.remaining_size, &mut out) {
                Poll::Pending => return Ok(None),
                Poll::Ready(Ok(next)) => next,
                Poll::Ready(Err(e)) => return Err(ParseError::io(e)),
            };

            if let Some(bytes) = out {
                trace!(len = bytes.len(), "read chunked bytes");
                return Ok(Some(PayloadItem::Chunk(bytes)));
            }
        }
    }
}

macro_rules! next_byte {
    ($src:ident) => {{
        if $src.len() > 0 {
            $src.get_u8()
        } else {
            return Poll::Pending;
        }
    }};
}

fn bad_chunk(reason: &'static str) -> Poll<Result<ChunkedState, io::Error>> {
    Poll::Ready(Err(io::Error::new(ErrorKind::InvalidInput, reason)))
}

impl ChunkedState {
    fn step(
        &self,
        src: &mut BytesMut,
        remaining_size: &mut u64,
        out: &mut Option<Bytes>,
    ) -> Poll<Result<ChunkedState, io::Error>> {
        match self {
            Size => Self::read_size(src, remaining_size),
            SizeLws => Self::read_size_lws(src),
            Extension => Self::read_extension(src),
            SizeLf => Self::read_size_lf(src, remaining_size),
            Body => Self::read_body(src, remaining_size, out),
            BodyCr => Self::expect(src, b'\r', BodyLf, "invalid chunk body CR"),
            BodyLf => Self::expect(src, b'\n', Size, "invalid chunk body LF"),
            Trailer => Self::read_trailer(src),
            TrailerLf => Self::expect(src, b'\n', EndCr, "invalid trailer LF"),
            EndCr => Self::read_end_cr(src),
            EndLf => Self::expect(src, b'\n', End, "invalid chunk end LF"),
            End => Poll::Ready(Ok(End)),
        }
    }

    /// Accumulates hex size digits until whitespace, extension or CR.
    fn read_size(src: &mut BytesMut, size: &mut u64) -> Poll<Result<ChunkedState, io::Error>> {
        let digit = match next_byte!(src) {
            b @ b'0'..=b'9' => b - b'0',
            b @ b'a'..=b'f' => b + 10 - b'a',
            b @ b'A'..=b'F' => b + 10 - b'A',
            b'\t' | b' ' => return Poll::Ready(Ok(SizeLws)),
            b';' => return Poll::Ready(Ok(Extension)),
            b'\r' => return Poll::Ready(Ok(SizeLf)),
            _ => return bad_chunk("invalid chunk size"),
        };

        *size = match size.checked_mul(16).and_then(|s| s.checked_add(digit as u64)) {
            Some(s) => s,
            None => return bad_chunk("chunk size overflow"),
        };

        Poll::Ready(Ok(Size))
    }

    /// Whitespace may follow the size, but no further digits.
    fn read_size_lws(src: &mut BytesMut) -> Poll<Result<ChunkedState, io::Error>> {
        match next_byte!(src) {
            b'\t' | b' ' => Poll::Ready(Ok(SizeLws)),
            b';' => Poll::Ready(Ok(Extension)),
            b'\r' => Poll::Ready(Ok(SizeLf)),
            _ => bad_chunk("invalid chunk size whitespace"),
        }
    }

    /// Extensions are ignored; they end at CRLF. A bare LF inside an
    /// extension is rejected rather than silently accepted as a line
    /// ending.
    fn read_extension(src: &mut BytesMut) -> Poll<Result<ChunkedState, io::Error>> {
        match next_byte!(src) {
            b'\r' => Poll::Ready(Ok(SizeLf)),
            b'\n' => bad_chunk("chunk extension contains bare LF"),
            _ => Poll::Ready(Ok(Extension)),
        }
    }

    fn read_size_lf(src: &mut BytesMut, size: &mut u64) -> Poll<Result<ChunkedState, io::Error>> {
        match next_byte!(src) {
            b'\n' if *size == 0 => Poll::Ready(Ok(EndCr)),
            b'\n' => Poll::Ready(Ok(Body)),
            _ => bad_chunk("invalid chunk size LF"),
        }
    }

    /// Takes as much chunk data as the buffer holds, up to the chunk's
    /// remaining size.
    fn read_body(
        src: &mut BytesMut,
        size: &mut u64,
        out: &mut Option<Bytes>,
    ) -> Poll<Result<ChunkedState, io::Error>> {
        if src.is_empty() {
            return Poll::Ready(Ok(Body));
        }

        if *size == 0 {
            return Poll::Ready(Ok(BodyCr));
        }

        let take = (*size).min(src.len() as u64) as usize;
        *size -= take as u64;
        *out = Some(src.split_to(take).freeze());

        if *size > 0 {
            Poll::Ready(Ok(Body))
        } else {
            Poll::Ready(Ok(BodyCr))
        }
    }

    /// Trailer fields are read and discarded up to their CR.
    fn read_trailer(src: &mut BytesMut) -> Poll<Result<ChunkedState, io::Error>> {
        match next_byte!(src) {
            b'\r' => Poll::Ready(Ok(TrailerLf)),
            _ => Poll::Ready(Ok(Trailer)),
        }
    }

    /// After the zero chunk: either the final CRLF, or the first byte of
    /// a trailer field.
    fn read_end_cr(src: &mut BytesMut) -> Poll<Result<ChunkedState, io::Error>> {
        match next_byte!(src) {
            b'\r' => Poll::Ready(Ok(EndLf)),
            _ => Poll::Ready(Ok(Trailer)),
        }
    }

    fn expect(
        src: &mut BytesMut,
        byte: u8,
        next: ChunkedState,
        error: &'static str,
    ) -> Poll<Result<ChunkedState, io::Error>> {
        if next_byte!(src) == byte {
            Poll::Ready(Ok(next))
        } else {
            bad_chunk(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_chunk() {
        let mut buffer = BytesMut::from(&b"10\r\n1234567890abcdef\r\n0\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        let item = decoder.decode(&mut buffer).unwrap().unwrap();
        assert!(item.is_chunk());
        assert_eq!(&item.as_bytes().unwrap()[..], b"1234567890abcdef");

        let item = decoder.decode(&mut buffer).unwrap().unwrap();
        assert!(item.is_eof());
    }

    #[test]
    fn multiple_chunks() {
        let mut buffer = BytesMut::from(&b"5\r\nhello\r\n7\r\n, world\r\n0\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(&chunk.as_bytes().unwrap()[..], b"hello");

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(&chunk.as_bytes().unwrap()[..], b", world");

        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn extensions_are_skipped() {
        let mut buffer = BytesMut::from(&b"5;chunk-ext=value\r\nhello\r\n0\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(&chunk.as_bytes().unwrap()[..], b"hello");
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn trailers_are_recognized_but_unused() {
        let mut buffer = BytesMut::from(&b"5\r\nhello\r\n0\r\nTrailer: value\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(&chunk.as_bytes().unwrap()[..], b"hello");
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn chunk_split_across_reads() {
        let mut buffer = BytesMut::from(&b"5\r\nhel"[..]);
        let mut decoder = ChunkedDecoder::new();

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(&chunk.as_bytes().unwrap()[..], b"hel");

        buffer.extend_from_slice(b"lo\r\n0\r\n\r\n");

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(&chunk.as_bytes().unwrap()[..], b"lo");
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn invalid_size_is_rejected() {
        let mut buffer = BytesMut::from(&b"xyz\r\n"[..]);
        assert!(ChunkedDecoder::new().decode(&mut buffer).is_err());
    }

    #[test]
    fn size_overflow_is_rejected() {
        let mut buffer = BytesMut::from(&b"fffffffffffffffff\r\n"[..]);
        assert!(ChunkedDecoder::new().decode(&mut buffer).is_err());
    }

    #[test]
    fn missing_crlf_after_data_is_rejected() {
        let mut buffer = BytesMut::from(&b"5\r\nhelloBad"[..]);
        let mut decoder = ChunkedDecoder::new();

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(&chunk.as_bytes().unwrap()[..], b"hello");
        assert!(decoder.decode(&mut buffer).is_err());
    }

    #[test]
    fn zero_size_chunk_alone() {
        let mut buffer = BytesMut::from(&b"0\r\n\r\n"[..]);
        assert!(ChunkedDecoder::new().decode(&mut buffer).unwrap().unwrap().is_eof());
    }
}
