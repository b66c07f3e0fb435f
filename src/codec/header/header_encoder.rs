use crate::protocol::{status, ResponseHead, SendError};

use bytes::{BufMut, BytesMut};
use http::Version;
use std::io;
use std::io::ErrorKind;
use tokio_util::codec::Encoder;
use tracing::error;

const INIT_HEADER_SIZE: usize = 4 * 1024;

/// Serializes a response head: status line with the crate's reason
/// phrases, then every header in insertion order, then the blank line.
///
/// Framing headers are expected to be present already — the encoder
/// writes exactly what the head carries and invents nothing.
pub struct HeaderEncoder;

impl Encoder<ResponseHead> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, head: ResponseHead, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(INIT_HEADER_SIZE);

        match head.version {
            Version::HTTP_11 => dst.put_slice(b"HTTP/1.1 "),
            Version::HTTP_10 => dst.put_slice(b"HTTP/1.0 "),
            v => {
                error!(http_version = ?v, "unsupported http version");
                return Err(io::Error::from(ErrorKind::Unsupported).into());
            }
        }

        dst.put_slice(head.status.as_str().as_bytes());
        dst.put_slice(b" ");
        dst.put_slice(status::reason_phrase(head.status).as_bytes());
        dst.put_slice(b"\r\n");

        for (name, value) in head.headers.iter() {
            dst.put_slice(name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
    use http::StatusCode;

    #[test]
    fn status_line_uses_served_reason_phrases() {
        let head = ResponseHead::new(Version::HTTP_11, StatusCode::OK);
        let mut dst = BytesMut::new();
        HeaderEncoder.encode(head, &mut dst).unwrap();
        assert!(dst.starts_with(b"HTTP/1.1 200 Ok\r\n"));
    }

    #[test]
    fn headers_keep_insertion_order() {
        let mut head = ResponseHead::new(Version::HTTP_11, StatusCode::NOT_FOUND);
        head.headers.push(CONTENT_TYPE, HeaderValue::from_static("text/html"));
        head.headers.push(HeaderName::from_static("x-first"), HeaderValue::from_static("1"));
        head.headers.push(CONTENT_LENGTH, HeaderValue::from_static("0"));

        let mut dst = BytesMut::new();
        HeaderEncoder.encode(head, &mut dst).unwrap();

        let text = std::str::from_utf8(&dst).unwrap();
        assert_eq!(
            text,
            "HTTP/1.1 404 Not Found\r\ncontent-type: text/html\r\nx-first: 1\r\ncontent-length: 0\r\n\r\n"
        );
    }

    #[test]
    fn http10_status_line() {
        let head = ResponseHead::new(Version::HTTP_10, StatusCode::OK);
        let mut dst = BytesMut::new();
        HeaderEncoder.encode(head, &mut dst).unwrap();
        assert!(dst.starts_with(b"HTTP/1.0 200 Ok\r\n"));
    }
}
