use std::mem::MaybeUninit;

use bytes::BytesMut;
use http::{HeaderName, HeaderValue, Request};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::{ParseError, PayloadSize, RequestHead};

const MAX_HEADER_NUM: usize = 64;
const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Decodes one request head: request line, header block, and the body
/// framing derived from it.
///
/// Stateless between calls; a partial header block leaves the buffer
/// untouched and returns `None` until more bytes arrive. A bare LF line
/// ending is tolerated on input (httparse accepts it); a CR not followed
/// by LF is a syntax error.
pub struct HeaderDecoder;

impl Decoder for HeaderDecoder {
    type Item = (RequestHead, PayloadSize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let mut req = httparse::Request::new(&mut []);
        let mut headers: [MaybeUninit<httparse::Header>; MAX_HEADER_NUM] =
            unsafe { MaybeUninit::uninit().assume_init() };

        let parsed = req.parse_with_uninit_headers(src, &mut headers).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
            e => ParseError::invalid_header(e.to_string()),
        });

        match parsed? {
            Status::Complete(head_len) => {
                trace!(head_len, "parsed request head");
                ensure!(head_len <= MAX_HEADER_BYTES, ParseError::too_large_header(head_len, MAX_HEADER_BYTES));

                // header name/value positions inside the raw block, so
                // values can share the frozen buffer without copying
                let mut header_index: [HeaderIndex; MAX_HEADER_NUM] = EMPTY_HEADER_INDEX_ARRAY;
                HeaderIndex::record(src, req.headers, &mut header_index);

                let version = match req.version {
                    Some(0) => http::Version::HTTP_10,
                    Some(1) => http::Version::HTTP_11,
                    v => return Err(ParseError::InvalidVersion(v)),
                };

                let mut builder = Request::builder()
                    .method(req.method.ok_or(ParseError::InvalidMethod)?)
                    .uri(req.path.ok_or(ParseError::InvalidUri)?)
                    .version(version);

                let header_count = req.headers.len();
                let headers = builder.headers_mut().ok_or(ParseError::InvalidUri)?;
                headers.reserve(header_count);

                let head_bytes = src.split_to(head_len).freeze();
                for index in &header_index[..header_count] {
                    // httparse validated the name as a legal token
                    let name = HeaderName::from_bytes(&head_bytes[index.name.0..index.name.1])
                        .map_err(|e| ParseError::invalid_header(e.to_string()))?;

                    // SAFETY: httparse only accepts visible ASCII and
                    // obs-text in field values, which from_maybe_shared
                    // would re-check
                    let value = unsafe {
                        HeaderValue::from_maybe_shared_unchecked(head_bytes.slice(index.value.0..index.value.1))
                    };

                    headers.append(name, value);
                }

                let head = RequestHead::from(builder.body(()).map_err(|_| ParseError::InvalidUri)?);
                let payload_size = parse_framing(&head)?;

                Ok(Some((head, payload_size)))
            }
            Status::Partial => {
                ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
                Ok(None)
            }
        }
    }
}

#[derive(Clone, Copy)]
struct HeaderIndex {
    name: (usize, usize),
    value: (usize, usize),
}

const EMPTY_HEADER_INDEX: HeaderIndex = HeaderIndex { name: (0, 0), value: (0, 0) };

const EMPTY_HEADER_INDEX_ARRAY: [HeaderIndex; MAX_HEADER_NUM] = [EMPTY_HEADER_INDEX; MAX_HEADER_NUM];

impl HeaderIndex {
    fn record(bytes: &[u8], headers: &[httparse::Header<'_>], indices: &mut [HeaderIndex]) {
        let bytes_ptr = bytes.as_ptr() as usize;
        for (header, index) in headers.iter().zip(indices.iter_mut()) {
            let name_start = header.name.as_ptr() as usize - bytes_ptr;
            index.name = (name_start, name_start + header.name.len());
            let value_start = header.value.as_ptr() as usize - bytes_ptr;
            index.value = (value_start, value_start + header.value.len());
        }
    }
}

/// Derives body framing from the message headers (RFC 7230 §3.3.3).
///
/// Content-Length wins when present and well-formed; chunked
/// Transfer-Encoding must be the final coding; both at once is the
/// request-smuggling combination and is rejected outright. Absent both,
/// the body is empty — whether that is acceptable for the method is the
/// connection's call (411).
fn parse_framing(head: &RequestHead) -> Result<PayloadSize, ParseError> {
    let te_header = head.headers().get(http::header::TRANSFER_ENCODING);
    let cl_header = head.headers().get(http::header::CONTENT_LENGTH);

    match (te_header, cl_header) {
        (None, None) => Ok(PayloadSize::Empty),

        (Some(_), None) => {
            if is_chunked(te_header) {
                Ok(PayloadSize::Chunked)
            } else {
                Err(ParseError::invalid_body("transfer-encoding without final chunked coding"))
            }
        }

        (None, Some(cl_value)) => {
            let cl_str = cl_value.to_str().map_err(|_| ParseError::invalid_content_length("value is not a string"))?;
            let cl_str = cl_str.trim();

            if !cl_str.bytes().all(|b| b.is_ascii_digit()) || cl_str.is_empty() {
                return Err(ParseError::invalid_content_length(format!("value {cl_str:?} is not a nonnegative integer")));
            }

            let length = cl_str
                .parse::<u64>()
                .map_err(|_| ParseError::invalid_content_length(format!("value {cl_str} overflows u64")))?;

            Ok(PayloadSize::Length(length))
        }

        (Some(_), Some(_)) => {
            Err(ParseError::invalid_content_length("transfer-encoding and content-length both present"))
        }
    }
}

fn is_chunked(header_value: Option<&HeaderValue>) -> bool {
    header_value
        .and_then(|value| value.to_str().ok())
        .and_then(|encodings| encodings.rsplit(',').next())
        .map(|last_encoding| last_encoding.trim() == "chunked")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, Method, Version};
    use indoc::indoc;

    #[test]
    fn check_is_chunked() {
        {
            let headers = HeaderMap::new();
            assert!(!is_chunked(headers.get(http::header::TRANSFER_ENCODING)))
        }

        {
            let mut headers = HeaderMap::new();
            headers.insert("Transfer-Encoding", "gzip, chunked".parse().unwrap());
            assert!(is_chunked(headers.get(http::header::TRANSFER_ENCODING)));
        }

        {
            let mut headers = HeaderMap::new();
            headers.insert("Transfer-Encoding", "chunked, gzip".parse().unwrap());
            assert!(!is_chunked(headers.get(http::header::TRANSFER_ENCODING)));
        }
    }

    #[test]
    fn consumes_exactly_the_head() {
        let str = indoc! {r##"
        GET /index.html HTTP/1.1
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: */*

        123"##};

        let mut bytes = BytesMut::from(str);
        let result = HeaderDecoder.decode(&mut bytes).unwrap();
        assert!(result.is_some());

        // the body bytes stay in the buffer
        assert_eq!(&bytes[..], &b"123"[..]);
    }

    #[test]
    fn from_curl() {
        let str = indoc! {r##"
        GET /index.html HTTP/1.1
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: */*

        "##};

        let mut buf = BytesMut::from(str);
        let (head, payload_size) = HeaderDecoder.decode(&mut buf).unwrap().unwrap();

        assert_eq!(payload_size, PayloadSize::Empty);
        assert_eq!(head.method(), &Method::GET);
        assert_eq!(head.version(), Version::HTTP_11);
        assert_eq!(head.uri().path(), "/index.html");
        assert_eq!(head.headers().len(), 3);
        assert_eq!(head.headers().get(http::header::HOST).unwrap(), "127.0.0.1:8080");
        assert_eq!(head.headers().get(http::header::USER_AGENT).unwrap(), "curl/7.79.1");
    }

    #[test]
    fn partial_head_asks_for_more() {
        let mut buf = BytesMut::from("GET /index.html HTTP/1.1\r\nHost: 127.0");
        assert!(HeaderDecoder.decode(&mut buf).unwrap().is_none());
        // nothing consumed
        assert_eq!(buf.len(), 38);
    }

    #[test]
    fn content_length_framing() {
        let mut buf = BytesMut::from("POST /x HTTP/1.1\r\nContent-Length: 42\r\n\r\n");
        let (_, payload_size) = HeaderDecoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(payload_size, PayloadSize::Length(42));
    }

    #[test]
    fn chunked_framing() {
        let mut buf = BytesMut::from("POST /x HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n");
        let (_, payload_size) = HeaderDecoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(payload_size, PayloadSize::Chunked);
    }

    #[test]
    fn rejects_smuggling_combination() {
        let mut buf =
            BytesMut::from("POST /x HTTP/1.1\r\nContent-Length: 5\r\nTransfer-Encoding: chunked\r\n\r\n");
        assert!(HeaderDecoder.decode(&mut buf).is_err());
    }

    #[test]
    fn rejects_bad_content_length() {
        for cl in ["-1", "abc", "18446744073709551616"] {
            let mut buf = BytesMut::from(format!("POST /x HTTP/1.1\r\nContent-Length: {cl}\r\n\r\n").as_str());
            assert!(HeaderDecoder.decode(&mut buf).is_err(), "content-length {cl} must be rejected");
        }
    }

    #[test]
    fn tolerates_bare_lf_line_endings() {
        let mut buf = BytesMut::from("GET /x HTTP/1.1\nHost: a\n\n");
        let (head, _) = HeaderDecoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(head.uri().path(), "/x");
    }

    #[test]
    fn rejects_stray_cr_in_request_line() {
        let mut buf = BytesMut::from("GET /x\rZ HTTP/1.1\r\n\r\n");
        assert!(HeaderDecoder.decode(&mut buf).is_err());
    }

    #[test]
    fn rejects_oversized_head() {
        let mut big = String::from("GET /x HTTP/1.1\r\n");
        for i in 0..40 {
            big.push_str(&format!("X-Filler-{i}: {}\r\n", "v".repeat(300)));
        }
        big.push_str("\r\n");

        let mut buf = BytesMut::from(big.as_str());
        assert!(HeaderDecoder.decode(&mut buf).is_err());
    }
}
