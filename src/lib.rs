//! Core of an HTTP/1.x server: the byte-to-message codec, the
//! per-connection request/response lifecycle, the response source chain
//! (buffers, files, byte ranges, filters), and the worker/listener shell
//! that binds accepted sockets to single-threaded event loops.
//!
//! The crate intentionally stops below routing: request handlers are
//! opaque callbacks registered on the [`server::Server`], and everything
//! a handler can observe or produce flows through [`request::Request`]
//! and [`source::BodySource`].

extern crate core;

pub mod codec;
pub mod connection;
pub mod fileinfo;
pub mod handler;
pub mod protocol;
pub mod request;
pub mod server;
pub mod source;

pub(crate) use help::ensure;

mod help {

    macro_rules! ensure {
        ($predicate:expr, $error:expr) => {
            if !$predicate {
                return Err($error);
            }
        };
    }
    pub(crate) use ensure;
}
