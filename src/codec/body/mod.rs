//! Body framing codecs: chunked transfer encoding, Content-Length
//! delimited, close-delimited (responses only), and bodyless.
//!
//! [`PayloadDecoder`] and [`PayloadEncoder`] dispatch to the concrete
//! strategy selected from a message's
//! [`PayloadSize`](crate::protocol::PayloadSize).

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;

pub use chunked_decoder::ChunkedDecoder;
pub use chunked_encoder::ChunkedEncoder;
pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
