use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, RequestHead};
use bytes::Bytes;
use futures::channel::oneshot;
use futures::{channel::mpsc, Sink, SinkExt, Stream, StreamExt};
use http_body::{Body, Frame, SizeHint};
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::error;

pub(crate) fn create_body_channel<S>(
    payload_stream: &mut S,
    payload_size: PayloadSize,
    interest: Option<oneshot::Sender<()>>,
) -> (BodySender<'_, S>, BodyReceiver)
where
    S: Stream<Item = Result<Message<(RequestHead, PayloadSize)>, ParseError>> + Unpin,
{
    let (pull_tx, pull_rx) = mpsc::channel(8);
    let (data_tx, data_rx) = mpsc::channel(8);

    (BodySender::new(payload_stream, pull_rx, data_tx), BodyReceiver::new(pull_tx, data_rx, payload_size, interest))
}

/// Handler-to-connection flow control message.
pub(crate) enum BodyPull {
    NextChunk,
    #[allow(dead_code)]
    Enough,
}

/// Connection-side half: pulls payload items off the framed stream when
/// the receiver asks for them.
///
/// Borrows the connection's framed reader for the duration of one
/// request, which statically prevents the next pipelined message from
/// being parsed while a body is still streaming.
pub(crate) struct BodySender<'conn, S> {
    payload_stream: &'conn mut S,
    pull_rx: mpsc::Receiver<BodyPull>,
    data_tx: mpsc::Sender<Result<PayloadItem, ParseError>>,
    eof: bool,
}

impl<'conn, S> BodySender<'conn, S>
where
    S: Stream<Item = Result<Message<(RequestHead, PayloadSize)>, ParseError>> + Unpin,
{
    fn new(
        payload_stream: &'conn mut S,
        pull_rx: mpsc::Receiver<BodyPull>,
        data_tx: mpsc::Sender<Result<PayloadItem, ParseError>>,
    ) -> Self {
        Self { payload_stream, pull_rx, data_tx, eof: false }
    }

    /// Serves chunk requests until the body is fully read, the receiver
    /// signals it has had enough, or the stream errors out.
    pub(crate) async fn run(&mut self) -> Result<(), ParseError> {
        if self.eof {
            return Ok(());
        }

        while let Some(pull) = self.pull_rx.next().await {
            match pull {
                BodyPull::NextChunk => {
                    let item = self.read_item().await;
                    match item {
                        Ok(payload_item) => {
                            self.eof = payload_item.is_eof();
                            if self.data_tx.send(Ok(payload_item)).await.is_err() {
                                // handler dropped the body mid-stream
                                break;
                            }
                            if self.eof {
                                return Ok(());
                            }
                        }
                        Err(e) => {
                            let fatal = matches!(e, ParseError::UnexpectedEof);
                            if self.data_tx.send(Err(e)).await.is_err() {
                                error!("failed to forward body error to handler");
                            }
                            if fatal {
                                return Err(ParseError::UnexpectedEof);
                            }
                            break;
                        }
                    }
                }
                BodyPull::Enough => break,
            }
        }

        self.drain().await
    }

    async fn read_item(&mut self) -> Result<PayloadItem, ParseError> {
        match self.payload_stream.next().await {
            Some(Ok(Message::Payload(payload_item))) => Ok(payload_item),
            Some(Ok(Message::Header(_))) => {
                error!("received a message head in the middle of a body");
                Err(ParseError::invalid_body("received a message head in the middle of a body"))
            }
            Some(Err(e)) => Err(e),
            // the peer closed the stream before the body completed
            None => Err(ParseError::UnexpectedEof),
        }
    }

    /// Reads and discards body items until end-of-message so the decoder
    /// is positioned at the next request.
    pub(crate) async fn drain(&mut self) -> Result<(), ParseError> {
        while !self.eof {
            match self.read_item().await? {
                item if item.is_eof() => self.eof = true,
                _chunk => {}
            }
        }
        Ok(())
    }
}

/// Handler-side half: an `http_body::Body` fed by the [`BodySender`].
#[derive(Debug)]
pub(crate) struct BodyReceiver {
    pull_tx: mpsc::Sender<BodyPull>,
    data_rx: mpsc::Receiver<Result<PayloadItem, ParseError>>,
    payload_size: PayloadSize,
    /// Fires the first time the handler polls for data; the connection
    /// uses it to emit the `100 Continue` interim response only once
    /// someone actually claims the body.
    interest: Option<oneshot::Sender<()>>,
    in_flight: bool,
    done: bool,
}

impl BodyReceiver {
    fn new(
        pull_tx: mpsc::Sender<BodyPull>,
        data_rx: mpsc::Receiver<Result<PayloadItem, ParseError>>,
        payload_size: PayloadSize,
        interest: Option<oneshot::Sender<()>>,
    ) -> Self {
        Self { pull_tx, data_rx, payload_size, interest, in_flight: false, done: false }
    }

    pub(crate) fn is_end_stream(&self) -> bool {
        self.done
    }
}

impl Body for BodyReceiver {
    type Data = Bytes;
    type Error = ParseError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        if this.done {
            return Poll::Ready(None);
        }

        if let Some(interest) = this.interest.take() {
            let _ = interest.send(());
        }

        // one pull request per frame, issued exactly once
        if !this.in_flight {
            match Pin::new(&mut this.pull_tx).poll_ready(cx) {
                Poll::Ready(Ok(())) => {
                    if Pin::new(&mut this.pull_tx).start_send(BodyPull::NextChunk).is_err() {
                        return Poll::Ready(Some(Err(ParseError::invalid_body("body channel closed"))));
                    }
                    this.in_flight = true;
                }
                Poll::Ready(Err(_)) => {
                    return Poll::Ready(Some(Err(ParseError::invalid_body("body channel closed"))));
                }
                Poll::Pending => return Poll::Pending,
            }
        }

        match this.data_rx.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(PayloadItem::Chunk(bytes)))) => {
                this.in_flight = false;
                Poll::Ready(Some(Ok(Frame::data(bytes))))
            }
            Poll::Ready(Some(Ok(PayloadItem::Eof))) => {
                this.in_flight = false;
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(e))) => {
                this.in_flight = false;
                this.done = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.in_flight = false;
                this.done = true;
                Poll::Ready(Some(Err(ParseError::invalid_body("body channel closed before end of stream"))))
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.done
    }

    fn size_hint(&self) -> SizeHint {
        match self.payload_size {
            PayloadSize::Length(length) => SizeHint::with_exact(length),
            PayloadSize::Empty => SizeHint::with_exact(0),
            PayloadSize::Chunked | PayloadSize::Unbounded => SizeHint::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::task::noop_waker_ref;
    use futures::FutureExt;

    #[tokio::test]
    async fn receiver_requests_one_chunk_at_a_time() {
        let (pull_tx, mut pull_rx) = mpsc::channel(8);
        let (mut data_tx, data_rx) = mpsc::channel(8);
        let mut receiver = BodyReceiver::new(pull_tx, data_rx, PayloadSize::Chunked, None);

        let mut cx = Context::from_waker(noop_waker_ref());

        assert!(matches!(Pin::new(&mut receiver).poll_frame(&mut cx), Poll::Pending));
        assert!(matches!(pull_rx.next().await, Some(BodyPull::NextChunk)));

        // a second poll must not issue a second pull
        assert!(matches!(Pin::new(&mut receiver).poll_frame(&mut cx), Poll::Pending));
        assert!(pull_rx.next().now_or_never().is_none());

        data_tx.try_send(Ok(PayloadItem::Chunk(Bytes::from_static(b"hello")))).expect("send chunk");

        match Pin::new(&mut receiver).poll_frame(&mut cx) {
            Poll::Ready(Some(Ok(frame))) => {
                assert_eq!(frame.into_data().expect("data frame"), Bytes::from_static(b"hello"));
            }
            other => panic!("unexpected poll result: {:?}", other),
        }

        assert!(matches!(Pin::new(&mut receiver).poll_frame(&mut cx), Poll::Pending));
        assert!(matches!(pull_rx.next().await, Some(BodyPull::NextChunk)));

        data_tx.try_send(Ok(PayloadItem::Eof)).expect("send eof");

        assert!(matches!(Pin::new(&mut receiver).poll_frame(&mut cx), Poll::Ready(None)));
        assert!(receiver.is_end_stream());
    }
}
