//! Listener/server shell: configuration, hook registry, worker pool,
//! and the accept loop that hands sockets to workers.

mod config;
mod date;
pub mod hooks;
mod listener;
#[allow(clippy::module_inception)]
mod server;
mod stream;
mod worker;

pub use config::ServerConfig;
pub use date::{DateHandle, DateService};
pub use hooks::{ConnectionInfo, HookGuard, Hooks};
pub use listener::{ListenAddr, Listener};
pub use server::{Server, ServerBuildError, ServerBuilder};
pub use stream::{Accepted, AcceptedSocket, Stream};
pub use worker::Worker;

pub(crate) use server::Shared;
