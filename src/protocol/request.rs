//! Parsed request head as produced by the header decoder.

use std::convert::Into;

use http::request::Parts;
use http::{HeaderMap, Method, Request, Uri, Version};

/// The request line and headers of one incoming message, before any
/// lifecycle state is attached.
///
/// Wraps `http::Request<()>` so the standard vocabulary types are used
/// for method, URI, version and header access.
#[derive(Debug)]
pub struct RequestHead {
    inner: Request<()>,
}

impl AsRef<Request<()>> for RequestHead {
    fn as_ref(&self) -> &Request<()> {
        &self.inner
    }
}

impl RequestHead {
    pub fn into_inner(self) -> Request<()> {
        self.inner
    }

    /// Attaches a body, turning the head into a full `Request<T>`.
    pub fn body<T>(self, body: T) -> Request<T> {
        self.inner.map(|_| body)
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Whether this request's method may carry a body at all.
    pub fn may_have_body(&self) -> bool {
        !matches!(
            self.method(),
            &Method::GET | &Method::HEAD | &Method::DELETE | &Method::OPTIONS | &Method::CONNECT
        )
    }

    /// Whether a body is mandatory for this method (411 material when no
    /// framing header names its length).
    pub fn requires_body(&self) -> bool {
        matches!(self.method(), &Method::POST | &Method::PUT)
    }
}

impl From<Parts> for RequestHead {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Request::from_parts(parts, ()) }
    }
}

impl From<Request<()>> for RequestHead {
    #[inline]
    fn from(inner: Request<()>) -> Self {
        Self { inner }
    }
}
