//! Bound accepting sockets.

use std::io;
use std::net::SocketAddr;
#[cfg(unix)]
use std::path::PathBuf;

use tokio::net::{TcpListener, TcpSocket};
use tracing::warn;

use crate::server::stream::{Accepted, AcceptedSocket};

/// Where a listener binds.
#[derive(Debug, Clone)]
pub enum ListenAddr {
    Tcp(SocketAddr),
    #[cfg(unix)]
    Unix(PathBuf),
}

impl From<SocketAddr> for ListenAddr {
    fn from(addr: SocketAddr) -> Self {
        ListenAddr::Tcp(addr)
    }
}

pub struct Listener {
    inner: ListenerKind,
    local_port: u16,
}

enum ListenerKind {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(tokio::net::UnixListener),
}

impl Listener {
    /// Opens a non-blocking, close-on-exec listening socket with the
    /// given backlog and starts accepting.
    pub fn open(addr: &ListenAddr, backlog: u32) -> io::Result<Listener> {
        match addr {
            ListenAddr::Tcp(addr) => {
                let socket = if addr.is_ipv4() { TcpSocket::new_v4()? } else { TcpSocket::new_v6()? };
                socket.set_reuseaddr(true)?;
                socket.bind(*addr)?;
                let listener = socket.listen(backlog)?;
                let local_port = listener.local_addr()?.port();
                Ok(Listener { inner: ListenerKind::Tcp(listener), local_port })
            }
            #[cfg(unix)]
            ListenAddr::Unix(path) => {
                // tokio fixes the unix backlog at 1024
                let listener = tokio::net::UnixListener::bind(path)?;
                Ok(Listener { inner: ListenerKind::Unix(listener), local_port: 0 })
            }
        }
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Accepts one connection and detaches it from this runtime so a
    /// worker can adopt it.
    pub async fn accept(&self, tcp_nodelay: bool) -> io::Result<Accepted> {
        match &self.inner {
            ListenerKind::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                let stream = stream.into_std()?;
                if tcp_nodelay {
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!(error = %e, "failed to set TCP_NODELAY");
                    }
                }
                Ok(Accepted {
                    socket: AcceptedSocket::Tcp(stream),
                    remote: Some(peer.to_string()),
                    local_port: self.local_port,
                })
            }
            #[cfg(unix)]
            ListenerKind::Unix(listener) => {
                let (stream, _) = listener.accept().await?;
                let stream = stream.into_std()?;
                Ok(Accepted { socket: AcceptedSocket::Unix(stream), remote: None, local_port: 0 })
            }
        }
    }
}
