//! Per-connection request/response lifecycle.
//!
//! An [`HttpConnection`] owns one accepted stream's framed halves and
//! drives them through the full exchange: decode head, strict-mode
//! checks, handler dispatch with concurrent body streaming, response
//! serialization, source draining with backpressure, and the keep-alive
//! / pipelining resume loop. One connection is one async task on its
//! worker; destroying it is returning from [`HttpConnection::process`].

mod http_connection;
mod tcp_tuning;

pub use http_connection::{ConnectionContext, ConnectionState, HttpConnection};

pub(crate) use tcp_tuning::set_tcp_cork;
