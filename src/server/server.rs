//! The server shell: builder, worker pool, listeners, admission.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{error, info};

use crate::handler::Handler;
use crate::server::config::ServerConfig;
use crate::server::date::{DateHandle, DateService};
use crate::server::hooks::Hooks;
use crate::server::listener::{ListenAddr, Listener};
use crate::server::worker::Worker;

/// Server-wide state every worker thread shares.
pub(crate) struct Shared {
    pub config: Arc<ServerConfig>,
    pub hooks: Arc<Hooks>,
    pub date: DateHandle,
}

pub struct ServerBuilder {
    config: ServerConfig,
    addresses: Vec<ListenAddr>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self { config: ServerConfig::default(), addresses: Vec::new() }
    }

    /// Adds a TCP listening address.
    pub fn address(mut self, addr: SocketAddr) -> Self {
        self.addresses.push(ListenAddr::Tcp(addr));
        self
    }

    /// Adds a unix-domain listening socket.
    #[cfg(unix)]
    pub fn unix_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.addresses.push(ListenAddr::Unix(path.into()));
        self
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers.max(1);
        self
    }

    pub fn build<H>(self, handler: H) -> Result<Server<H>, ServerBuildError>
    where
        H: Handler + 'static,
    {
        if self.addresses.is_empty() {
            return Err(ServerBuildError::MissingAddress);
        }

        Ok(Server {
            config: Arc::new(self.config),
            hooks: Hooks::new(),
            handler: Arc::new(handler),
            addresses: self.addresses,
        })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ServerBuildError {
    #[error("at least one listening address must be set")]
    MissingAddress,
}

pub struct Server<H> {
    config: Arc<ServerConfig>,
    hooks: Arc<Hooks>,
    handler: Arc<H>,
    addresses: Vec<ListenAddr>,
}

impl<H> Server<H>
where
    H: Handler + 'static,
{
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Registration point for connection and request lifecycle hooks.
    pub fn hooks(&self) -> &Arc<Hooks> {
        &self.hooks
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Binds the listeners, spawns the workers, and accepts until a
    /// listener fails. Blocks the calling thread.
    pub fn run(self) -> io::Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;

        runtime.block_on(async move {
            let date_service = DateService::start();

            let shared = Arc::new(Shared {
                config: Arc::clone(&self.config),
                hooks: Arc::clone(&self.hooks),
                date: date_service.handle(),
            });

            let mut workers = Vec::with_capacity(self.config.workers);
            for id in 0..self.config.workers.max(1) {
                workers.push(Worker::spawn(id, Arc::clone(&shared), Arc::clone(&self.handler))?);
            }
            let pool = WorkerPool { workers, next: AtomicUsize::new(0) };

            let mut listeners = Vec::with_capacity(self.addresses.len());
            for addr in &self.addresses {
                let listener = Listener::open(addr, self.config.backlog)?;
                info!(?addr, port = listener.local_port(), "listening");
                listeners.push(listener);
            }

            let accept_loops = listeners.iter().map(|listener| accept_loop(listener, &pool, &self.config));
            let result = futures::future::try_join_all(accept_loops).await.map(|_| ());

            // workers drain and join on drop
            drop(pool);
            result
        })
    }
}

struct WorkerPool {
    workers: Vec<Worker>,
    next: AtomicUsize,
}

impl WorkerPool {
    /// Admission policy: plain round-robin.
    fn select_worker(&self) -> &Worker {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        &self.workers[index]
    }
}

async fn accept_loop(listener: &Listener, pool: &WorkerPool, config: &ServerConfig) -> io::Result<()> {
    loop {
        match listener.accept(config.tcp_nodelay).await {
            Ok(accepted) => pool.select_worker().enqueue(accepted),
            Err(e) if is_transient_accept_error(&e) => {
                error!(error = %e, "transient accept failure");
            }
            Err(e) => return Err(e),
        }
    }
}

/// Per-connection accept errors (peer reset before accept, descriptor
/// pressure) must not take the listener down.
fn is_transient_accept_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    ) || e.raw_os_error() == Some(24) // EMFILE
        || e.raw_os_error() == Some(23) // ENFILE
}
