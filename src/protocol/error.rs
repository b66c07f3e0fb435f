//! Error types for the request and response halves of a connection.
//!
//! [`HttpError`] is the boundary type: it wraps [`ParseError`] (anything
//! that goes wrong turning bytes into a request) and [`SendError`]
//! (anything that goes wrong turning a response into bytes). Protocol
//! violations that have an HTTP answer (400, 411, 416, ...) are not
//! errors at this level — they travel through the normal response path.
use std::io;
use thiserror::Error;

/// Top-level error for a connection's lifetime.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },
}

/// Errors raised while parsing an incoming request.
#[derive(Error, Debug)]
pub enum ParseError {
    /// Header block exceeds the configured byte limit.
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid http version: {0:?}")]
    InvalidVersion(Option<u8>),

    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid http uri")]
    InvalidUri,

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    /// Content-Length together with Transfer-Encoding, unknown framing
    /// for a body-carrying method, or a malformed chunk stream.
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    /// The peer closed the stream in the middle of a message.
    #[error("unexpected eof while reading a message")]
    UnexpectedEof,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// True when the error means the client went away rather than spoke
    /// the protocol wrongly; no response can or should be written.
    pub fn is_client_abort(&self) -> bool {
        match self {
            Self::UnexpectedEof => true,
            Self::Io { source } => matches!(
                source.kind(),
                io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

/// Errors raised while serializing and sending a response.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    /// The response body producer took longer than the write-idle limit.
    #[error("write timed out")]
    WriteTimeout,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}
