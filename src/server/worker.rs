//! Worker threads: one OS thread, one single-threaded runtime, one
//! local task set per worker.
//!
//! Accepted sockets arrive over an MPSC queue (FIFO per sender) and are
//! bound to the worker for the connection's whole lifetime — a
//! connection task never migrates threads, so per-worker state like the
//! file-metadata cache needs no synchronization.

use std::rc::Rc;
use std::sync::Arc;
use std::{io, thread};

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::connection::{ConnectionContext, HttpConnection};
use crate::fileinfo::FileInfoCache;
use crate::handler::Handler;
use crate::server::hooks::ConnectionInfo;
use crate::server::stream::Accepted;
use crate::server::Shared;

pub(crate) enum WorkerMessage {
    NewConnection(Accepted),
    /// Hold new connections (they queue) until `Resume`.
    Suspend,
    Resume,
    Exit,
}

/// Handle to one worker thread.
pub struct Worker {
    id: usize,
    queue: mpsc::UnboundedSender<WorkerMessage>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Worker {
    pub(crate) fn spawn<H>(id: usize, shared: Arc<Shared>, handler: Arc<H>) -> io::Result<Worker>
    where
        H: Handler + 'static,
    {
        let (queue, inbox) = mpsc::unbounded_channel();

        let thread = thread::Builder::new()
            .name(format!("keel-worker-{id}"))
            .spawn(move || run_worker(id, inbox, shared, handler))?;

        Ok(Worker { id, queue, thread: Some(thread) })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Thread-safe insertion from the listener thread.
    pub(crate) fn enqueue(&self, accepted: Accepted) {
        if self.queue.send(WorkerMessage::NewConnection(accepted)).is_err() {
            error!(worker = self.id, "worker queue is gone, dropping connection");
        }
    }

    /// Parks incoming connections until [`Self::resume`]; in-flight
    /// connections are unaffected.
    pub fn suspend(&self) {
        let _ = self.queue.send(WorkerMessage::Suspend);
    }

    pub fn resume(&self) {
        let _ = self.queue.send(WorkerMessage::Resume);
    }

    pub(crate) fn shutdown(&mut self) {
        let _ = self.queue.send(WorkerMessage::Exit);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker<H>(id: usize, mut inbox: mpsc::UnboundedReceiver<WorkerMessage>, shared: Arc<Shared>, handler: Arc<H>)
where
    H: Handler + 'static,
{
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(worker = id, error = %e, "failed to build worker runtime");
            return;
        }
    };

    let local = tokio::task::LocalSet::new();

    local.block_on(&runtime, async move {
        let fileinfo = Rc::new(FileInfoCache::new(shared.config.fileinfo_ttl));
        let mut suspended = false;
        let mut parked: Vec<Accepted> = Vec::new();
        debug!(worker = id, "worker loop running");

        while let Some(message) = inbox.recv().await {
            match message {
                WorkerMessage::NewConnection(accepted) if suspended => {
                    parked.push(accepted);
                }
                WorkerMessage::NewConnection(accepted) => {
                    launch_connection(accepted, &shared, &fileinfo, &handler);
                }
                WorkerMessage::Suspend => {
                    debug!(worker = id, "worker suspended");
                    suspended = true;
                }
                WorkerMessage::Resume => {
                    debug!(worker = id, parked = parked.len(), "worker resumed");
                    suspended = false;
                    for accepted in parked.drain(..) {
                        launch_connection(accepted, &shared, &fileinfo, &handler);
                    }
                }
                WorkerMessage::Exit => {
                    debug!(worker = id, "worker exiting");
                    break;
                }
            }
        }
    });
}

/// Binds one accepted socket to this worker's loop and runs it.
///
/// Must be called from within the worker's `LocalSet`.
fn launch_connection<H>(accepted: Accepted, shared: &Arc<Shared>, fileinfo: &Rc<FileInfoCache>, handler: &Arc<H>)
where
    H: Handler + 'static,
{
    let context = Rc::new(ConnectionContext {
        config: Arc::clone(&shared.config),
        date: shared.date.clone(),
        hooks: Arc::clone(&shared.hooks),
        fileinfo: Rc::clone(fileinfo),
        local_port: accepted.local_port,
        raw_fd: Some(accepted.socket.raw_fd()),
    });
    let info = ConnectionInfo { remote: accepted.remote.clone(), local_port: accepted.local_port };
    let hooks = Arc::clone(&shared.hooks);
    let handler = Arc::clone(handler);

    tokio::task::spawn_local(async move {
        let stream = match accepted.socket.into_async() {
            Ok(stream) => stream,
            Err(e) => {
                error!(error = %e, "failed to register accepted socket");
                return;
            }
        };

        hooks.connection_open(&info);

        let (reader, writer) = tokio::io::split(stream);
        let connection = HttpConnection::new(reader, writer, context);
        match connection.process(handler).await {
            Ok(()) => debug!("connection finished"),
            Err(e) => info!(error = %e, "connection closed with error"),
        }

        hooks.connection_close(&info);
    });
}
