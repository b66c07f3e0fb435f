use crate::protocol::body::body_channel::{create_body_channel, BodyReceiver, BodySender};
use crate::protocol::{Message, ParseError, PayloadSize, RequestHead};
use bytes::Bytes;
use futures::Stream;
use http_body::{Body, Frame, SizeHint};
use http_body_util::BodyExt;
use std::pin::Pin;
use std::task::{Context, Poll};

/// The request body handed to a handler.
///
/// Implements [`http_body::Body`]; chunks are pulled from the
/// connection's framed reader on demand, so a handler that never touches
/// the body costs nothing and the connection drains leftovers itself.
pub struct ReqBody {
    inner: ReqBodyRepr,
}

enum ReqBodyRepr {
    Receiver(BodyReceiver),
    NoBody,
}

impl ReqBody {
    /// Splits one request's body into the handler-side `ReqBody` and the
    /// connection-side sender. Bodyless requests need no sender at all.
    ///
    /// `interest` (when given) fires on the handler's first poll of the
    /// body — the connection's cue to ack `Expect: 100-continue`.
    pub(crate) fn create<S>(
        payload_stream: &mut S,
        payload_size: PayloadSize,
        interest: Option<futures::channel::oneshot::Sender<()>>,
    ) -> (ReqBody, Option<BodySender<'_, S>>)
    where
        S: Stream<Item = Result<Message<(RequestHead, PayloadSize)>, ParseError>> + Unpin,
    {
        match payload_size {
            PayloadSize::Empty | PayloadSize::Length(0) => (ReqBody::no_body(), None),
            _ => {
                let (sender, receiver) = create_body_channel(payload_stream, payload_size, interest);
                (ReqBody { inner: ReqBodyRepr::Receiver(receiver) }, Some(sender))
            }
        }
    }

    pub(crate) fn no_body() -> Self {
        Self { inner: ReqBodyRepr::NoBody }
    }

    /// Collects the whole body into one buffer.
    pub async fn bytes(self) -> Result<Bytes, ParseError> {
        Ok(self.collect().await?.to_bytes())
    }
}

impl Body for ReqBody {
    type Data = Bytes;
    type Error = ParseError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match &mut this.inner {
            ReqBodyRepr::Receiver(receiver) => Pin::new(receiver).poll_frame(cx),
            ReqBodyRepr::NoBody => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.inner {
            ReqBodyRepr::NoBody => true,
            ReqBodyRepr::Receiver(receiver) => receiver.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.inner {
            ReqBodyRepr::NoBody => SizeHint::with_exact(0),
            ReqBodyRepr::Receiver(receiver) => receiver.size_hint(),
        }
    }
}
