//! The per-exchange request object.
//!
//! One [`Request`] lives inside one connection's in-flight slot: created
//! when a message head is decoded, handed to the application handler,
//! serialized, and destroyed on keep-alive resume or close. It carries
//! the parsed request metadata, the mutable response side (status,
//! ordered header list, output source chain, filter chain), and the
//! lifecycle handlers the application may attach.

mod notes;
#[allow(clippy::module_inception)]
mod request;

pub use notes::Notes;
pub use request::{Request, SerializeContext};
