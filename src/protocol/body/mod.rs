//! Request-body streaming between the connection and the handler.
//!
//! The connection cannot hand its framed reader to the handler — it
//! still owns the stream for the next pipelined message — so body bytes
//! flow through a bounded channel pair instead: the handler-side
//! [`ReqBody`] implements `http_body::Body` and requests chunks on
//! demand; the connection-side [`BodySender`] reads them off the framed
//! stream while the handler runs, and drains whatever the handler left
//! unread so the parser stays aligned for keep-alive.

mod body_channel;
mod req_body;

pub use req_body::ReqBody;
