//! Response encoder: head first, then framed payload items.

use crate::codec::body::PayloadEncoder;
use crate::codec::header::HeaderEncoder;
use crate::protocol::{Message, PayloadSize, ResponseHead, SendError};
use bytes::{Buf, BytesMut};
use std::io;
use std::io::ErrorKind;
use tokio_util::codec::Encoder;
use tracing::error;

/// Encodes one response at a time: a `Header` message selects the
/// payload strategy from its framing, subsequent `Payload` messages run
/// through it until `Eof` resets the encoder for the next response.
pub struct ResponseEncoder {
    header_encoder: HeaderEncoder,
    payload_encoder: Option<PayloadEncoder>,
}

impl ResponseEncoder {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Default for ResponseEncoder {
    fn default() -> Self {
        Self { header_encoder: HeaderEncoder, payload_encoder: None }
    }
}

impl<D: Buf> Encoder<Message<(ResponseHead, PayloadSize), D>> for ResponseEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Message<(ResponseHead, PayloadSize), D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header((head, payload_size)) => {
                if self.payload_encoder.is_some() {
                    error!("expected payload item but received a response head");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                }

                self.payload_encoder = Some(payload_size.into());
                self.header_encoder.encode(head, dst)
            }

            Message::Payload(payload_item) => {
                let payload_encoder = match &mut self.payload_encoder {
                    Some(encoder) => encoder,
                    None => {
                        error!("expected response head but received a payload item");
                        return Err(io::Error::from(ErrorKind::InvalidInput).into());
                    }
                };

                let result = payload_encoder.encode(payload_item, dst);

                if payload_encoder.is_finish() {
                    self.payload_encoder.take();
                }

                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PayloadItem;
    use bytes::Bytes;
    use http::header::{HeaderValue, CONTENT_LENGTH, TRANSFER_ENCODING};
    use http::{StatusCode, Version};

    fn header_message(head: ResponseHead, size: PayloadSize) -> Message<(ResponseHead, PayloadSize)> {
        Message::Header((head, size))
    }

    #[test]
    fn fixed_length_response() {
        let mut head = ResponseHead::new(Version::HTTP_11, StatusCode::OK);
        head.headers.push(CONTENT_LENGTH, HeaderValue::from_static("2"));

        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(header_message(head, PayloadSize::Length(2)), &mut dst).unwrap();
        encoder.encode(Message::Payload(PayloadItem::Chunk(Bytes::from_static(b"Hi"))), &mut dst).unwrap();
        encoder.encode(Message::Payload(PayloadItem::<Bytes>::Eof), &mut dst).unwrap();

        assert_eq!(&dst[..], b"HTTP/1.1 200 Ok\r\ncontent-length: 2\r\n\r\nHi");
    }

    #[test]
    fn chunked_response_terminates_properly() {
        let mut head = ResponseHead::new(Version::HTTP_11, StatusCode::OK);
        head.headers.push(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));

        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(header_message(head, PayloadSize::Chunked), &mut dst).unwrap();
        encoder.encode(Message::Payload(PayloadItem::Chunk(Bytes::from_static(b"Hi"))), &mut dst).unwrap();
        encoder.encode(Message::Payload(PayloadItem::<Bytes>::Eof), &mut dst).unwrap();

        let text = std::str::from_utf8(&dst).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 Ok\r\n"));
        assert!(text.ends_with("\r\n\r\n2\r\nHi\r\n0\r\n\r\n"));
    }

    #[test]
    fn encoder_resets_after_eof_for_the_next_response() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        for _ in 0..2 {
            let mut head = ResponseHead::new(Version::HTTP_11, StatusCode::NO_CONTENT);
            head.headers.push(CONTENT_LENGTH, HeaderValue::from_static("0"));
            encoder.encode(header_message(head, PayloadSize::Empty), &mut dst).unwrap();
            encoder.encode(Message::Payload(PayloadItem::<Bytes>::Eof), &mut dst).unwrap();
        }

        let text = std::str::from_utf8(&dst).unwrap();
        assert_eq!(text.matches("HTTP/1.1 204 No Content\r\n").count(), 2);
    }

    #[test]
    fn head_after_head_is_rejected() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        let head = ResponseHead::new(Version::HTTP_11, StatusCode::OK);
        encoder.encode(header_message(head, PayloadSize::Chunked), &mut dst).unwrap();

        let head = ResponseHead::new(Version::HTTP_11, StatusCode::OK);
        let result: Result<(), SendError> = encoder.encode(header_message(head, PayloadSize::Chunked), &mut dst);
        assert!(result.is_err());
    }
}
