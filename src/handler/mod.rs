//! The application handler seam.
//!
//! A [`Handler`] terminates one exchange: it observes the
//! [`Request`](crate::request::Request), optionally consumes the
//! [`ReqBody`], writes sources, and finishes. Handler futures run to
//! completion on the owning worker thread and need not be `Send`.

use crate::protocol::body::ReqBody;
use crate::request::Request;
use futures::future::LocalBoxFuture;
use std::error::Error;

pub trait Handler: Send + Sync {
    type Error: Into<Box<dyn Error + Send + Sync>>;

    fn call<'a>(&'a self, request: &'a mut Request, body: ReqBody) -> LocalBoxFuture<'a, Result<(), Self::Error>>;
}

/// Adapts a plain closure into a [`Handler`].
#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

impl<F, Err> Handler for HandlerFn<F>
where
    F: for<'a> Fn(&'a mut Request, ReqBody) -> LocalBoxFuture<'a, Result<(), Err>> + Send + Sync,
    Err: Into<Box<dyn Error + Send + Sync>>,
{
    type Error = Err;

    fn call<'a>(&'a self, request: &'a mut Request, body: ReqBody) -> LocalBoxFuture<'a, Result<(), Err>> {
        (self.f)(request, body)
    }
}

/// Wraps `f` as a handler. The closure returns a boxed local future,
/// typically `Box::pin(async move { ... })`.
pub fn make_handler<F, Err>(f: F) -> HandlerFn<F>
where
    F: for<'a> Fn(&'a mut Request, ReqBody) -> LocalBoxFuture<'a, Result<(), Err>> + Send + Sync,
    Err: Into<Box<dyn Error + Send + Sync>>,
{
    HandlerFn { f }
}
