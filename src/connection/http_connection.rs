use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::channel::oneshot;
use futures::{FutureExt, SinkExt, StreamExt};
use http::header::{HeaderValue, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, DATE, EXPECT};
use http::{StatusCode, Version};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, warn};

use crate::codec::{RequestDecoder, ResponseEncoder};
use crate::connection::set_tcp_cork;
use crate::fileinfo::FileInfoCache;
use crate::handler::Handler;
use crate::protocol::body::ReqBody;
use crate::protocol::status::reason_phrase;
use crate::protocol::uri::{decode_target, DecodedTarget};
use crate::protocol::{HttpError, Message, ParseError, PayloadItem, PayloadSize, RequestHead, ResponseHead, SendError};
use crate::request::{Request, SerializeContext};
use crate::server::{DateHandle, Hooks, ServerConfig};

const INPUT_BUFFER_SIZE: usize = 8 * 1024;
const CONTINUE_LINE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

type OutMessage = Message<(ResponseHead, PayloadSize), Bytes>;

/// Connection lifecycle position, visible for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Undefined,
    ReadingRequest,
    ProcessingRequest,
    SendingReply,
    SendingReplyDone,
    KeepAliveRead,
}

/// Worker-scoped surroundings a connection operates in.
pub struct ConnectionContext {
    pub config: Arc<ServerConfig>,
    pub date: DateHandle,
    pub hooks: Arc<Hooks>,
    pub fileinfo: Rc<FileInfoCache>,
    pub local_port: u16,
    /// Raw descriptor for socket-option twiddling; `None` for streams
    /// without one (tests, in-memory transports).
    pub raw_fd: Option<i32>,
}

/// Drives one accepted stream through its requests.
///
/// At most one request object is live per connection at any time; it is
/// created when a head decodes and dropped on resume, close, or the
/// error path, before the next head is read.
pub struct HttpConnection<R, W> {
    framed_read: FramedRead<R, RequestDecoder>,
    framed_write: FramedWrite<W, ResponseEncoder>,
    context: Rc<ConnectionContext>,
    request_count: u64,
    state: ConnectionState,
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, context: Rc<ConnectionContext>) -> Self {
        Self {
            framed_read: FramedRead::with_capacity(reader, RequestDecoder::new(), INPUT_BUFFER_SIZE),
            framed_write: FramedWrite::new(writer, ResponseEncoder::new()),
            context,
            request_count: 0,
            state: ConnectionState::Undefined,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Runs the connection to completion: requests are read, dispatched
    /// and answered in order until the peer goes away, a timeout fires,
    /// keep-alive ends, or an error tears the stream down.
    pub async fn process<H>(mut self, handler: Arc<H>) -> Result<(), HttpError>
    where
        H: Handler,
    {
        loop {
            let idle = if self.request_count == 0 {
                self.state = ConnectionState::ReadingRequest;
                self.context.config.max_read_idle
            } else {
                // between requests on a persistent connection
                self.state = ConnectionState::KeepAliveRead;
                self.context.config.max_keep_alive_idle
            };

            let next = match maybe_timeout(idle, self.framed_read.next()).await {
                Err(_) => {
                    debug!(state = ?self.state, "idle timeout, closing connection");
                    return Ok(());
                }
                Ok(next) => next,
            };

            match next {
                Some(Ok(Message::Header((head, payload_size)))) => {
                    self.state = ConnectionState::ReadingRequest;
                    self.request_count += 1;
                    if !self.handle_request(head, payload_size, &handler).await? {
                        return Ok(());
                    }
                }

                Some(Ok(Message::Payload(_))) => {
                    error!("payload frame outside a message body");
                    self.send_error_response(StatusCode::BAD_REQUEST).await?;
                    return Err(ParseError::invalid_body("payload frame outside a message body").into());
                }

                Some(Err(e)) => {
                    if e.is_client_abort() {
                        debug!("client went away mid-request");
                        return Ok(());
                    }
                    warn!(error = %e, "bad request");
                    // best effort; the peer may be gone already
                    let _ = self.send_error_response(StatusCode::BAD_REQUEST).await;
                    return Err(e.into());
                }

                None => {
                    info!(requests = self.request_count, "peer closed the connection");
                    return Ok(());
                }
            }
        }
    }

    async fn handle_request<H>(
        &mut self,
        head: RequestHead,
        payload_size: PayloadSize,
        handler: &Arc<H>,
    ) -> Result<bool, HttpError>
    where
        H: Handler,
    {
        let raw_target: &[u8] = head.uri().path_and_query().map(|pq| pq.as_str().as_bytes()).unwrap_or(b"*");

        let body_mandatory = head.requires_body();
        let body_allowed = head.may_have_body();
        let has_content_length = head.headers().contains_key(CONTENT_LENGTH);

        let mut request = match decode_target(raw_target) {
            Ok(target) => Request::new(head, target, self.context.local_port),
            Err(e) => {
                info!(error = %e, "failed decoding request target");
                let empty = DecodedTarget { path: Vec::new(), query: None, depth: 0 };
                let mut request = Request::new(head, empty, self.context.local_port);
                request.set_status(StatusCode::BAD_REQUEST);
                request.finish();
                // the body, if any, was never read
                self.respond(request, false).await?;
                return Ok(false);
            }
        };
        request.set_fileinfo_cache(Rc::clone(&self.context.fileinfo));

        let body_is_empty = matches!(payload_size, PayloadSize::Empty | PayloadSize::Length(0));
        let mut dispatch = true;

        // strict checks before anything is dispatched
        if body_mandatory {
            if body_is_empty && !has_content_length {
                request.set_status(StatusCode::LENGTH_REQUIRED);
                request.finish();
                dispatch = false;
            }
        } else if !body_is_empty && !body_allowed {
            request.set_status(StatusCode::BAD_REQUEST);
            request.finish();
            dispatch = false;
        }

        if dispatch {
            if let Some(expect) = request.request_header(EXPECT) {
                let acceptable =
                    expect.as_bytes().eq_ignore_ascii_case(b"100-continue") && request.supports_protocol(1, 1);
                if acceptable {
                    request.set_expecting_continue(true);
                } else {
                    request.set_status(StatusCode::EXPECTATION_FAILED);
                    request.finish();
                    dispatch = false;
                }
            }
        }

        if dispatch {
            self.context.hooks.pre_process(&mut request);
            if request.is_finished() {
                dispatch = false;
            }
        }

        self.state = ConnectionState::ProcessingRequest;

        let mut client_aborted = false;
        let mut framing_broken = false;

        if dispatch {
            let interest_pair = if request.expecting_continue() {
                let (tx, rx) = oneshot::channel();
                (Some(tx), Some(rx))
            } else {
                (None, None)
            };
            let (interest_tx, mut interest_rx) = interest_pair;
            let mut awaiting_claim = interest_rx.is_some();

            let framed_read = &mut self.framed_read;
            let framed_write = &mut self.framed_write;

            let (req_body, mut sender) = ReqBody::create(&mut *framed_read, payload_size, interest_tx);

            let mut continue_sent = false;
            let handler_result;
            {
                let handler_future = handler.call(&mut request, req_body);
                tokio::pin!(handler_future);

                let body_future = async {
                    match sender.as_mut() {
                        Some(sender) => sender.run().await,
                        None => Ok(()),
                    }
                }
                .fuse();
                tokio::pin!(body_future);

                let claim_future = async {
                    match interest_rx.as_mut() {
                        Some(rx) => rx.await,
                        None => std::future::pending().await,
                    }
                };
                tokio::pin!(claim_future);

                handler_result = loop {
                    tokio::select! {
                        biased;

                        result = &mut handler_future => break result,

                        claimed = &mut claim_future, if awaiting_claim => {
                            awaiting_claim = false;
                            if claimed.is_ok() {
                                // the handler claimed the body it asked us
                                // to wait for; ack before any body bytes
                                // can flow
                                let io = framed_write.get_mut();
                                if io.write_all(CONTINUE_LINE).await.is_ok() && io.flush().await.is_ok() {
                                    continue_sent = true;
                                    debug!("sent 100 continue interim response");
                                }
                            }
                        }

                        body_result = &mut body_future => {
                            match body_result {
                                Ok(()) => {}
                                Err(e) if e.is_client_abort() => client_aborted = true,
                                Err(e) => {
                                    warn!(error = %e, "request body stream failed");
                                    framing_broken = true;
                                }
                            }
                        }
                    }
                };
            }

            if continue_sent {
                request.set_expecting_continue(false);
            }

            // whatever the handler left unread must be consumed, or the
            // decoder is misaligned for the next pipelined message
            if !client_aborted && !framing_broken {
                if let Some(sender) = sender.as_mut() {
                    match maybe_timeout(self.context.config.max_read_idle, sender.drain()).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) if e.is_client_abort() => client_aborted = true,
                        Ok(Err(e)) => {
                            warn!(error = %e, "failed draining request body");
                            framing_broken = true;
                        }
                        Err(_) => {
                            debug!("timed out draining request body");
                            framing_broken = true;
                        }
                    }
                }
            }

            if let Err(e) = handler_result {
                let e = e.into();
                error!(error = %e, "request handler failed");
                if !request.is_output_pending() && request.status().is_none() {
                    request.set_status(StatusCode::INTERNAL_SERVER_ERROR);
                }
            }
        }

        if client_aborted {
            request.set_aborted();
            debug!("client aborted during request processing");
            if let Some(abort_handler) = request.take_abort_handler() {
                abort_handler();
            }
            // no response can reach anyone
            return Ok(false);
        }

        request.finish();
        // an unread body means the parser is out of sync with the
        // stream; the connection cannot be reused
        let body_consumed = dispatch || body_is_empty;
        self.respond(request, body_consumed && !framing_broken).await
    }

    /// Serializes and streams the response, then finalizes the request.
    async fn respond(&mut self, mut request: Request, allow_keep_alive: bool) -> Result<bool, HttpError> {
        self.state = ConnectionState::SendingReply;
        let config = &self.context.config;

        request.prepare_default_content();
        self.context.hooks.post_process(&mut request);

        let keep_alive_wanted = allow_keep_alive && self.should_keep_alive(&request);
        let remaining_requests =
            config.max_keep_alive_requests.map(|max| max.saturating_sub(self.request_count));

        let server_tag = if config.advertise && !config.tag.is_empty() {
            HeaderValue::from_str(&config.tag).ok()
        } else {
            None
        };

        let (head, payload_size, keep_alive) = request.serialize(SerializeContext {
            date: self.context.date.current(),
            server_tag,
            keep_alive: keep_alive_wanted,
            keep_alive_timeout: config.max_keep_alive_idle,
            remaining_requests,
        });

        if config.tcp_cork {
            if let Some(fd) = self.context.raw_fd {
                set_tcp_cork(fd, true);
            }
        }

        self.framed_write.feed(OutMessage::Header((head, payload_size))).await?;

        let mut source = request.take_output();
        let mut transmitted = 0u64;

        let stream_result: Result<(), SendError> = loop {
            let chunk = match maybe_timeout(config.max_write_idle, source.next_chunk()).await {
                Err(_) => break Err(SendError::WriteTimeout),
                Ok(Err(e)) => break Err(e),
                Ok(Ok(None)) => break Ok(()),
                Ok(Ok(Some(chunk))) => chunk,
            };
            if chunk.is_empty() {
                continue;
            }

            transmitted += chunk.len() as u64;
            // send (not feed): each chunk flushes, so a slow client
            // exerts backpressure on the source
            match maybe_timeout(config.max_write_idle, self.framed_write.send(OutMessage::from(chunk))).await {
                Err(_) => break Err(SendError::WriteTimeout),
                Ok(Err(e)) => break Err(e),
                Ok(Ok(())) => {}
            }
        };

        match stream_result {
            Ok(()) => {
                self.framed_write.feed(OutMessage::Payload(PayloadItem::Eof)).await?;
                match maybe_timeout(config.max_write_idle, SinkExt::<OutMessage>::flush(&mut self.framed_write)).await {
                    Err(_) => return Err(SendError::WriteTimeout.into()),
                    Ok(result) => result?,
                }

                request.add_bytes_transmitted(transmitted);
                self.state = ConnectionState::SendingReplyDone;

                if let Some(write_complete) = request.take_write_complete() {
                    write_complete(Ok(transmitted));
                }
            }
            Err(e) => {
                request.add_bytes_transmitted(transmitted);
                if let Some(write_complete) = request.take_write_complete() {
                    write_complete(Err(send_error_to_io(&e)));
                }
                return Err(e.into());
            }
        }

        self.context.hooks.request_done(&mut request);
        request.finalize_cleanup();
        // request dropped here: the connection's in-flight slot is free

        if keep_alive {
            if config.tcp_cork {
                if let Some(fd) = self.context.raw_fd {
                    set_tcp_cork(fd, false);
                }
            }
            self.state = ConnectionState::KeepAliveRead;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Keep-alive wish derived from the request's `Connection` header
    /// and version defaults; server policy narrows it later.
    fn should_keep_alive(&self, request: &Request) -> bool {
        if !self.context.config.keep_alive {
            return false;
        }

        let default = request.supports_protocol(1, 1);
        match request.request_header(CONNECTION).and_then(|v| v.to_str().ok()) {
            Some(value) => {
                let mut verdict = default;
                for token in value.split(',') {
                    let token = token.trim();
                    if token.eq_ignore_ascii_case("close") {
                        verdict = false;
                    } else if token.eq_ignore_ascii_case("keep-alive") {
                        verdict = true;
                    }
                }
                verdict
            }
            None => default,
        }
    }

    /// Minimal response for failures where no request object exists
    /// (unparsable head). Always closes.
    async fn send_error_response(&mut self, status: StatusCode) -> Result<(), HttpError> {
        let reason = reason_phrase(status);
        let body = format!(
            "<html><head><title>{reason}</title></head><body><h1>{} {reason}</h1></body></html>\r\n",
            status.as_str()
        );

        let mut head = ResponseHead::new(Version::HTTP_11, status);
        head.headers.push(CONTENT_TYPE, HeaderValue::from_static("text/html"));
        head.headers.push(CONTENT_LENGTH, HeaderValue::from(body.len()));
        head.headers.push(DATE, self.context.date.current());
        head.headers.push(CONNECTION, HeaderValue::from_static("close"));

        let length = body.len() as u64;
        self.framed_write.feed(OutMessage::Header((head, PayloadSize::Length(length)))).await?;
        self.framed_write.feed(OutMessage::Payload(PayloadItem::Chunk(Bytes::from(body)))).await?;
        self.framed_write.feed(OutMessage::Payload(PayloadItem::Eof)).await?;
        SinkExt::<OutMessage>::flush(&mut self.framed_write).await?;
        Ok(())
    }
}

fn send_error_to_io(e: &SendError) -> std::io::Error {
    match e {
        SendError::Io { source } => std::io::Error::new(source.kind(), source.to_string()),
        SendError::WriteTimeout => std::io::Error::new(std::io::ErrorKind::TimedOut, "write timed out"),
        SendError::InvalidBody { reason } => std::io::Error::new(std::io::ErrorKind::InvalidData, reason.clone()),
    }
}

async fn maybe_timeout<F>(limit: Duration, future: F) -> Result<F::Output, tokio::time::error::Elapsed>
where
    F: std::future::Future,
{
    if limit.is_zero() {
        Ok(future.await)
    } else {
        tokio::time::timeout(limit, future).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::make_handler;
    use crate::request::Request;
    use futures::future::LocalBoxFuture;
    use std::convert::Infallible;
    use std::io::Write as _;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use tokio::io::{duplex, AsyncReadExt};

    type TestResult = Result<(), Infallible>;
    type TestFn = fn(&mut Request, ReqBody) -> LocalBoxFuture<'_, TestResult>;

    fn test_context(config: ServerConfig) -> Rc<ConnectionContext> {
        Rc::new(ConnectionContext {
            config: Arc::new(config),
            date: DateHandle::snapshot(),
            hooks: Hooks::new(),
            fileinfo: Rc::new(FileInfoCache::new(Duration::from_secs(1))),
            local_port: 8080,
            raw_fd: None,
        })
    }

    /// Feeds `input`, closes the write side, and collects everything the
    /// connection produced until it shut down.
    async fn one_shot(input: &[u8], f: TestFn) -> Vec<u8> {
        one_shot_with(ServerConfig::default(), input, f).await
    }

    async fn one_shot_with(config: ServerConfig, input: &[u8], f: TestFn) -> Vec<u8> {
        let input = input.to_vec();
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async move {
                let (client, server) = duplex(64 * 1024);
                let (server_read, server_write) = tokio::io::split(server);
                let connection = HttpConnection::new(server_read, server_write, test_context(config));
                let handler = Arc::new(make_handler(f));
                let task = tokio::task::spawn_local(async move {
                    let _ = connection.process(handler).await;
                });

                let (mut client_read, mut client_write) = tokio::io::split(client);
                client_write.write_all(&input).await.unwrap();
                client_write.shutdown().await.unwrap();

                let mut out = Vec::new();
                client_read.read_to_end(&mut out).await.unwrap();
                task.await.unwrap();
                out
            })
            .await
    }

    async fn read_until<R: AsyncRead + Unpin>(reader: &mut R, marker: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = reader.read(&mut buf).await.unwrap();
            assert_ne!(n, 0, "connection closed before marker was seen");
            out.extend_from_slice(&buf[..n]);
            if find_sub(&out, marker).is_some() {
                return out;
            }
        }
    }

    fn find_sub(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|window| window == needle)
    }

    fn response_text(bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }

    /// Splits a raw response at the blank line and returns (head, body).
    fn split_response(bytes: &[u8]) -> (String, Vec<u8>) {
        let at = find_sub(bytes, b"\r\n\r\n").expect("response has a header terminator");
        (String::from_utf8_lossy(&bytes[..at + 4]).into_owned(), bytes[at + 4..].to_vec())
    }

    fn header_value(head: &str, name: &str) -> Option<String> {
        head.lines()
            .filter_map(|line| line.split_once(": "))
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.trim().to_string())
    }

    // test handlers (plain functions so they coerce to `TestFn`)

    fn serve_hi(req: &mut Request, _body: ReqBody) -> LocalBoxFuture<'_, TestResult> {
        Box::pin(async move {
            req.write_buffer("Hi");
            req.finish();
            Ok(())
        })
    }

    fn serve_path(req: &mut Request, _body: ReqBody) -> LocalBoxFuture<'_, TestResult> {
        Box::pin(async move {
            let path = req.path().to_vec();
            req.write_buffer(path);
            req.finish();
            Ok(())
        })
    }

    fn serve_nothing(req: &mut Request, _body: ReqBody) -> LocalBoxFuture<'_, TestResult> {
        Box::pin(async move {
            req.finish();
            Ok(())
        })
    }

    fn echo_body(req: &mut Request, body: ReqBody) -> LocalBoxFuture<'_, TestResult> {
        Box::pin(async move {
            let bytes = body.bytes().await.expect("request body");
            req.response_headers_mut().push(CONTENT_LENGTH, HeaderValue::from(bytes.len()));
            req.write_buffer(bytes);
            req.finish();
            Ok(())
        })
    }

    fn serve_file(req: &mut Request, _body: ReqBody) -> LocalBoxFuture<'_, TestResult> {
        Box::pin(async move {
            req.set_document_root(std::env::temp_dir());
            let info = req.map_file();
            if req.test_directory_traversal() {
                return Ok(());
            }
            req.send_file(info);
            req.finish();
            Ok(())
        })
    }

    fn temp_file(name: &str, contents: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents).unwrap();
        path
    }

    #[tokio::test]
    async fn plain_get_keep_alive() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let (client, server) = duplex(64 * 1024);
                let (server_read, server_write) = tokio::io::split(server);
                let connection =
                    HttpConnection::new(server_read, server_write, test_context(ServerConfig::default()));
                let handler = Arc::new(make_handler(serve_hi as TestFn));
                let task = tokio::task::spawn_local(async move {
                    let _ = connection.process(handler).await;
                });

                let (mut client_read, mut client_write) = tokio::io::split(client);

                client_write.write_all(b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n").await.unwrap();
                let first = read_until(&mut client_read, b"0\r\n\r\n").await;
                let text = response_text(&first);

                assert!(text.starts_with("HTTP/1.1 200 Ok\r\n"), "status line: {text}");
                assert!(text.contains("connection: keep-alive\r\n"));
                assert!(text.contains("keep-alive: timeout="));
                assert!(text.contains("transfer-encoding: chunked\r\n"));
                assert!(text.contains("date: "));
                assert!(text.contains("server: keel/"));
                assert!(text.ends_with("2\r\nHi\r\n0\r\n\r\n"));

                // the connection is idle in keep-alive; a second request
                // on the same stream must be answered
                client_write.write_all(b"GET /again HTTP/1.1\r\nHost: x\r\n\r\n").await.unwrap();
                let second = read_until(&mut client_read, b"0\r\n\r\n").await;
                assert!(response_text(&second).starts_with("HTTP/1.1 200 Ok\r\n"));

                client_write.shutdown().await.unwrap();
                task.await.unwrap();
            })
            .await;
    }

    #[tokio::test]
    async fn pipelined_requests_answered_in_order() {
        let input = b"GET /first HTTP/1.1\r\nHost: x\r\n\r\nGET /second HTTP/1.1\r\nHost: x\r\n\r\n";
        let out = one_shot(input, serve_path).await;
        let text = response_text(&out);

        assert_eq!(text.matches("HTTP/1.1 200 Ok\r\n").count(), 2);
        let first = find_sub(&out, b"/first").unwrap();
        let second = find_sub(&out, b"/second").unwrap();
        assert!(first < second);
    }

    #[tokio::test]
    async fn encoded_traversal_gets_bad_request() {
        let out = one_shot(b"GET /%2e%2e/%2e%2e/etc HTTP/1.0\r\n\r\n", serve_file).await;
        let text = response_text(&out);

        assert!(text.starts_with("HTTP/1.0 400 Bad Request\r\n"), "got: {text}");
        assert!(text.contains("connection: close\r\n"));
        assert!(text.contains("<h1>400 Bad Request</h1>"));
    }

    #[tokio::test]
    async fn chunked_request_body_reaches_the_handler() {
        let input = b"POST /x HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nHello\r\n0\r\n\r\n";
        let out = one_shot(input, echo_body).await;
        let (head, body) = split_response(&out);

        assert!(head.starts_with("HTTP/1.1 200 Ok\r\n"));
        assert_eq!(header_value(&head, "content-length").as_deref(), Some("5"));
        assert_eq!(body, b"Hello");
    }

    #[tokio::test]
    async fn expect_continue_is_acked_before_the_response() {
        let input = b"POST /x HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\nExpect: 100-continue\r\n\r\nHello";
        let out = one_shot(input, echo_body).await;

        assert!(out.starts_with(b"HTTP/1.1 100 Continue\r\n\r\n"), "got: {}", response_text(&out));
        let rest = &out[b"HTTP/1.1 100 Continue\r\n\r\n".len()..];
        let (head, body) = split_response(rest);
        assert!(head.starts_with("HTTP/1.1 200 Ok\r\n"));
        assert_eq!(body, b"Hello");
    }

    #[tokio::test]
    async fn expect_on_http10_fails_the_expectation() {
        let input = b"POST /x HTTP/1.0\r\nHost: x\r\nContent-Length: 5\r\nExpect: 100-continue\r\n\r\nHello";
        let out = one_shot(input, echo_body).await;
        let text = response_text(&out);

        assert!(text.starts_with("HTTP/1.0 417 Expectation Failed\r\n"));
        assert!(text.contains("connection: close\r\n"));
    }

    #[tokio::test]
    async fn post_without_length_gets_411() {
        let out = one_shot(b"POST /x HTTP/1.1\r\nHost: x\r\n\r\n", serve_hi).await;
        let text = response_text(&out);

        assert!(text.starts_with("HTTP/1.1 411 Length Required\r\n"));
        assert!(text.contains("<h1>411 Length Required</h1>"));
    }

    #[tokio::test]
    async fn unhandled_request_becomes_404_with_default_page() {
        let out = one_shot(b"GET /nowhere HTTP/1.1\r\nHost: x\r\n\r\n", serve_nothing).await;
        let text = response_text(&out);

        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("content-type: text/html\r\n"));
        assert!(text.contains("<h1>404 Not Found</h1>"));
    }

    #[tokio::test]
    async fn full_file_is_served_with_validators() {
        let name = format!("keel-conn-full-{}.bin", std::process::id());
        let contents: Vec<u8> = (0u8..=99).collect();
        let path = temp_file(&name, &contents);

        let input = format!("GET /{name} HTTP/1.1\r\nHost: x\r\n\r\n");
        let out = one_shot(input.as_bytes(), serve_file).await;
        let (head, body) = split_response(&out);

        assert!(head.starts_with("HTTP/1.1 200 Ok\r\n"));
        assert_eq!(header_value(&head, "content-length").as_deref(), Some("100"));
        assert_eq!(header_value(&head, "accept-ranges").as_deref(), Some("bytes"));
        assert!(header_value(&head, "etag").is_some());
        assert!(header_value(&head, "last-modified").is_some());
        assert_eq!(body, contents);

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn single_range_is_a_partial_content_response() {
        let name = format!("keel-conn-single-{}.bin", std::process::id());
        let contents: Vec<u8> = (0u8..=99).collect();
        let path = temp_file(&name, &contents);

        let input = format!("GET /{name} HTTP/1.1\r\nHost: x\r\nRange: bytes=10-19\r\n\r\n");
        let out = one_shot(input.as_bytes(), serve_file).await;
        let (head, body) = split_response(&out);

        assert!(head.starts_with("HTTP/1.1 206 Partial Content\r\n"));
        assert_eq!(header_value(&head, "content-range").as_deref(), Some("bytes 10-19/100"));
        assert_eq!(header_value(&head, "content-length").as_deref(), Some("10"));
        assert_eq!(body, &contents[10..20]);

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn multi_range_builds_a_byteranges_multipart() {
        let name = format!("keel-conn-multi-{}.bin", std::process::id());
        let contents: Vec<u8> = (0u8..=99).collect();
        let path = temp_file(&name, &contents);

        let input = format!("GET /{name} HTTP/1.1\r\nHost: x\r\nRange: bytes=0-9,90-99\r\n\r\n");
        let out = one_shot(input.as_bytes(), serve_file).await;
        let (head, body) = split_response(&out);

        assert!(head.starts_with("HTTP/1.1 206 Partial Content\r\n"));

        let content_type = header_value(&head, "content-type").unwrap();
        let boundary = content_type
            .strip_prefix("multipart/byteranges; boundary=")
            .expect("multipart content type")
            .to_string();
        assert_eq!(boundary.len(), 16);

        // the advertised length is exact
        let content_length: usize = header_value(&head, "content-length").unwrap().parse().unwrap();
        assert_eq!(body.len(), content_length);

        // both ranges are present, framed by the boundary
        assert!(find_sub(&body, format!("--{boundary}").as_bytes()).is_some());
        assert!(find_sub(&body, b"Content-Range: bytes 0-9/100").is_some());
        assert!(find_sub(&body, b"Content-Range: bytes 90-99/100").is_some());
        assert!(find_sub(&body, &contents[0..10]).is_some());
        assert!(find_sub(&body, &contents[90..100]).is_some());
        assert!(response_text(&body).ends_with(&format!("--{boundary}--\r\n")));

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn inverted_range_is_unsatisfiable() {
        let name = format!("keel-conn-inverted-{}.bin", std::process::id());
        let contents: Vec<u8> = (0u8..=99).collect();
        let path = temp_file(&name, &contents);

        let input = format!("GET /{name} HTTP/1.1\r\nHost: x\r\nRange: bytes=90-10\r\n\r\n");
        let out = one_shot(input.as_bytes(), serve_file).await;
        let text = response_text(&out);

        assert!(text.contains("HTTP/1.1 416 Requested Range Not Satisfiable\r\n"), "got: {text}");

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn if_range_mismatch_serves_the_full_file() {
        let name = format!("keel-conn-ifrange-{}.bin", std::process::id());
        let contents: Vec<u8> = (0u8..=99).collect();
        let path = temp_file(&name, &contents);

        let input = format!("GET /{name} HTTP/1.1\r\nHost: x\r\nRange: bytes=0-9\r\nIf-Range: \"stale\"\r\n\r\n");
        let out = one_shot(input.as_bytes(), serve_file).await;
        let (head, body) = split_response(&out);

        assert!(head.starts_with("HTTP/1.1 200 Ok\r\n"));
        assert_eq!(body.len(), 100);

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn matching_etag_yields_not_modified() {
        let name = format!("keel-conn-etag-{}.bin", std::process::id());
        let path = temp_file(&name, b"cacheable");
        let etag = crate::fileinfo::FileInfo::stat(&path).etag().unwrap().to_string();

        let input = format!("GET /{name} HTTP/1.1\r\nHost: x\r\nIf-None-Match: {etag}\r\n\r\n");
        let out = one_shot(input.as_bytes(), serve_file).await;
        let (head, body) = split_response(&out);

        assert!(head.starts_with("HTTP/1.1 304 Not Modified\r\n"), "got: {head}");
        assert!(body.is_empty());

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn post_to_a_file_is_method_not_allowed() {
        let name = format!("keel-conn-post-{}.bin", std::process::id());
        let path = temp_file(&name, b"static");

        let input = format!("POST /{name} HTTP/1.1\r\nHost: x\r\nContent-Length: 0\r\n\r\n");
        let out = one_shot(input.as_bytes(), serve_file).await;
        let text = response_text(&out);

        assert!(text.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"));

        std::fs::remove_file(path).ok();
    }

    static WRITE_COMPLETE_BYTES: AtomicU64 = AtomicU64::new(0);

    fn serve_with_write_complete(req: &mut Request, _body: ReqBody) -> LocalBoxFuture<'_, TestResult> {
        Box::pin(async move {
            req.set_write_complete_handler(|result| {
                if let Ok(n) = result {
                    WRITE_COMPLETE_BYTES.store(n, Ordering::SeqCst);
                }
            });
            req.write_buffer("ten bytes!");
            req.finish();
            Ok(())
        })
    }

    #[tokio::test]
    async fn write_complete_reports_the_transmitted_bytes() {
        let out = one_shot(b"GET /x HTTP/1.1\r\nHost: x\r\n\r\n", serve_with_write_complete).await;
        assert!(response_text(&out).starts_with("HTTP/1.1 200 Ok\r\n"));
        assert_eq!(WRITE_COMPLETE_BYTES.load(Ordering::SeqCst), 10);
    }

    static ABORT_SEEN: AtomicBool = AtomicBool::new(false);

    fn serve_abort_aware(req: &mut Request, body: ReqBody) -> LocalBoxFuture<'_, TestResult> {
        Box::pin(async move {
            req.set_abort_handler(|| ABORT_SEEN.store(true, Ordering::SeqCst));
            let _ = body.bytes().await;
            req.write_buffer("never sent");
            req.finish();
            Ok(())
        })
    }

    #[tokio::test]
    async fn truncated_body_invokes_the_abort_handler() {
        // Content-Length promises 10 bytes, only 5 arrive before close
        let out = one_shot(b"POST /x HTTP/1.1\r\nHost: x\r\nContent-Length: 10\r\n\r\n12345", serve_abort_aware).await;

        assert!(out.is_empty(), "no response may be written after a client abort");
        assert!(ABORT_SEEN.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn keep_alive_idle_timeout_closes_the_connection() {
        let config = ServerConfig {
            max_keep_alive_idle: Duration::from_millis(50),
            ..ServerConfig::default()
        };

        let local = tokio::task::LocalSet::new();
        local
            .run_until(async move {
                let (client, server) = duplex(64 * 1024);
                let (server_read, server_write) = tokio::io::split(server);
                let connection = HttpConnection::new(server_read, server_write, test_context(config));
                let handler = Arc::new(make_handler(serve_hi as TestFn));
                let task = tokio::task::spawn_local(async move {
                    let _ = connection.process(handler).await;
                });

                let (mut client_read, mut client_write) = tokio::io::split(client);
                client_write.write_all(b"GET /x HTTP/1.1\r\nHost: x\r\n\r\n").await.unwrap();

                // without closing our write side, EOF on the client read
                // half can only come from the server's idle timeout
                let mut out = Vec::new();
                client_read.read_to_end(&mut out).await.unwrap();
                assert!(response_text(&out).starts_with("HTTP/1.1 200 Ok\r\n"));
                task.await.unwrap();
            })
            .await;
    }

    #[tokio::test]
    async fn http10_body_without_length_is_close_delimited() {
        let out = one_shot(b"GET /x HTTP/1.0\r\nHost: x\r\n\r\n", serve_hi).await;
        let (head, body) = split_response(&out);

        assert!(head.starts_with("HTTP/1.0 200 Ok\r\n"));
        assert!(!head.to_lowercase().contains("transfer-encoding"));
        assert!(head.contains("connection: close\r\n"));
        assert_eq!(body, b"Hi");
    }
}
