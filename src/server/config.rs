//! Server-wide tunables.

use std::time::Duration;

/// Limits, timeouts and socket options shared by every worker.
///
/// A zero duration disables the corresponding timeout.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Worker threads; each runs one event loop.
    pub workers: usize,
    /// Listen backlog for TCP listeners.
    pub backlog: u32,

    /// Idle limit while receiving a request.
    pub max_read_idle: Duration,
    /// Idle limit between requests on a keep-alive connection.
    pub max_keep_alive_idle: Duration,
    /// Idle limit for the write side of a response.
    pub max_write_idle: Duration,

    /// Whether persistent connections are offered at all.
    pub keep_alive: bool,
    /// Requests served per connection before forcing close; `None` is
    /// unlimited.
    pub max_keep_alive_requests: Option<u64>,

    /// Set `TCP_NODELAY` on accepted sockets.
    pub tcp_nodelay: bool,
    /// Engage `TCP_CORK` while a response is being serialized.
    pub tcp_cork: bool,

    /// Advertise the server tag via `Server:` (or `Via:` when the
    /// application set its own `Server:` header).
    pub advertise: bool,
    pub tag: String,

    /// How long file metadata lookups stay cached per worker.
    pub fileinfo_ttl: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            backlog: 128,
            max_read_idle: Duration::from_secs(60),
            max_keep_alive_idle: Duration::from_secs(8),
            max_write_idle: Duration::from_secs(360),
            keep_alive: true,
            max_keep_alive_requests: None,
            tcp_nodelay: false,
            tcp_cork: false,
            advertise: true,
            tag: concat!("keel/", env!("CARGO_PKG_VERSION")).to_string(),
            fileinfo_ttl: Duration::from_secs(10),
        }
    }
}
