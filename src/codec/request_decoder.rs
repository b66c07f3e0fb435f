//! Two-phase request decoder.
//!
//! Phase one parses the head with [`HeaderDecoder`]; the framing it
//! derives instantiates a [`PayloadDecoder`] for phase two, which yields
//! body chunks and a terminating `Eof`, after which the decoder is back
//! in phase one for the next (possibly pipelined) message. Partial input
//! at any point returns `None` and is resumed when more bytes arrive —
//! the emitted message sequence does not depend on how the byte stream
//! was partitioned.

use crate::codec::body::PayloadDecoder;
use crate::codec::header::HeaderDecoder;
use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, RequestHead};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

pub struct RequestDecoder {
    header_decoder: HeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
}

impl RequestDecoder {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self { header_decoder: HeaderDecoder, payload_decoder: None }
    }
}

impl Decoder for RequestDecoder {
    type Item = Message<(RequestHead, PayloadSize)>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // mid-body: keep feeding the payload decoder
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let message = match payload_decoder.decode(src)? {
                Some(item @ PayloadItem::Chunk(_)) => Some(Message::Payload(item)),
                Some(item @ PayloadItem::Eof) => {
                    // body complete, next decode parses the next head
                    self.payload_decoder.take();
                    Some(Message::Payload(item))
                }
                None => None,
            };

            return Ok(message);
        }

        let message = match self.header_decoder.decode(src)? {
            Some((head, payload_size)) => {
                // bodyless messages skip the payload phase entirely, so
                // the next decode parses the next (pipelined) head
                if !matches!(payload_size, PayloadSize::Empty | PayloadSize::Length(0)) {
                    self.payload_decoder = Some(payload_size.into());
                }
                Some(Message::Header((head, payload_size)))
            }
            None => None,
        };

        Ok(message)
    }
}
