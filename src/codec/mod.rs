//! Streaming HTTP/1.x codec.
//!
//! The read side is [`RequestDecoder`], a resumable two-phase decoder
//! (header block, then body framing) that can be fed arbitrary byte
//! partitions and yields the same message sequence regardless of how the
//! input was sliced. The write side is [`ResponseEncoder`], which
//! serializes a [`ResponseHead`](crate::protocol::ResponseHead) and then
//! frames payload chunks per the negotiated transfer encoding.
//!
//! Both plug into `tokio_util::codec::{FramedRead, FramedWrite}`.

mod body;
mod header;
mod request_decoder;
mod response_encoder;

pub use body::{PayloadDecoder, PayloadEncoder};
pub use request_decoder::RequestDecoder;
pub use response_encoder::ResponseEncoder;
