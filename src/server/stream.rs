//! Accepted-stream plumbing between listener and worker threads.
//!
//! The listener hands workers plain std sockets (effectively file
//! descriptors); each worker registers them with its own reactor via
//! `from_std`. A connection therefore never depends on the listener's
//! runtime staying alive.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// An accepted socket before it is bound to a worker's event loop.
pub enum AcceptedSocket {
    Tcp(std::net::TcpStream),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

/// One accepted connection plus what the hooks and the request object
/// want to know about it.
pub struct Accepted {
    pub socket: AcceptedSocket,
    pub remote: Option<String>,
    pub local_port: u16,
}

impl AcceptedSocket {
    pub fn set_nodelay(&self) {
        if let AcceptedSocket::Tcp(stream) = self {
            let _ = stream.set_nodelay(true);
        }
    }

    #[cfg(unix)]
    pub fn raw_fd(&self) -> i32 {
        use std::os::unix::io::AsRawFd;
        match self {
            AcceptedSocket::Tcp(stream) => stream.as_raw_fd(),
            AcceptedSocket::Unix(stream) => stream.as_raw_fd(),
        }
    }

    #[cfg(not(unix))]
    pub fn raw_fd(&self) -> i32 {
        -1
    }

    /// Registers the socket with the calling thread's reactor.
    pub fn into_async(self) -> io::Result<Stream> {
        match self {
            AcceptedSocket::Tcp(stream) => {
                stream.set_nonblocking(true)?;
                Ok(Stream::Tcp(tokio::net::TcpStream::from_std(stream)?))
            }
            #[cfg(unix)]
            AcceptedSocket::Unix(stream) => {
                stream.set_nonblocking(true)?;
                Ok(Stream::Unix(tokio::net::UnixStream::from_std(stream)?))
            }
        }
    }
}

/// A worker-bound transport stream.
pub enum Stream {
    Tcp(tokio::net::TcpStream),
    #[cfg(unix)]
    Unix(tokio::net::UnixStream),
}

impl AsyncRead for Stream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(unix)]
            Stream::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Stream::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(unix)]
            Stream::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(unix)]
            Stream::Unix(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(unix)]
            Stream::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}
