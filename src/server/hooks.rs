//! Ordered hook registry.
//!
//! Hooks run in registration order; registering returns a [`HookGuard`]
//! whose drop unregisters. Request hooks may short-circuit the pipeline
//! by finishing the request — later hooks of the same stage are then
//! skipped. Callbacks are snapshotted out of the lock before they run,
//! so a hook may itself register or unregister hooks.

use crate::request::Request;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

pub type RequestHook = dyn Fn(&mut Request) + Send + Sync;
pub type ConnectionHook = dyn Fn(&ConnectionInfo) + Send + Sync;

/// What connection-level hooks get to see.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub remote: Option<String>,
    pub local_port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    ConnectionOpen,
    ConnectionClose,
    PreProcess,
    PostProcess,
    RequestDone,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    connection_open: Vec<(u64, Arc<ConnectionHook>)>,
    connection_close: Vec<(u64, Arc<ConnectionHook>)>,
    pre_process: Vec<(u64, Arc<RequestHook>)>,
    post_process: Vec<(u64, Arc<RequestHook>)>,
    request_done: Vec<(u64, Arc<RequestHook>)>,
}

#[derive(Default)]
pub struct Hooks {
    registry: Mutex<Registry>,
}

impl Hooks {
    pub fn new() -> Arc<Hooks> {
        Arc::new(Hooks::default())
    }

    pub fn on_connection_open(self: &Arc<Self>, hook: impl Fn(&ConnectionInfo) + Send + Sync + 'static) -> HookGuard {
        self.register_connection(Stage::ConnectionOpen, Arc::new(hook))
    }

    pub fn on_connection_close(self: &Arc<Self>, hook: impl Fn(&ConnectionInfo) + Send + Sync + 'static) -> HookGuard {
        self.register_connection(Stage::ConnectionClose, Arc::new(hook))
    }

    pub fn on_pre_process(self: &Arc<Self>, hook: impl Fn(&mut Request) + Send + Sync + 'static) -> HookGuard {
        self.register_request(Stage::PreProcess, Arc::new(hook))
    }

    pub fn on_post_process(self: &Arc<Self>, hook: impl Fn(&mut Request) + Send + Sync + 'static) -> HookGuard {
        self.register_request(Stage::PostProcess, Arc::new(hook))
    }

    pub fn on_request_done(self: &Arc<Self>, hook: impl Fn(&mut Request) + Send + Sync + 'static) -> HookGuard {
        self.register_request(Stage::RequestDone, Arc::new(hook))
    }

    fn register_connection(self: &Arc<Self>, stage: Stage, hook: Arc<ConnectionHook>) -> HookGuard {
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        match stage {
            Stage::ConnectionOpen => registry.connection_open.push((id, hook)),
            Stage::ConnectionClose => registry.connection_close.push((id, hook)),
            _ => unreachable!(),
        }
        HookGuard { hooks: Arc::downgrade(self), stage, id }
    }

    fn register_request(self: &Arc<Self>, stage: Stage, hook: Arc<RequestHook>) -> HookGuard {
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        match stage {
            Stage::PreProcess => registry.pre_process.push((id, hook)),
            Stage::PostProcess => registry.post_process.push((id, hook)),
            Stage::RequestDone => registry.request_done.push((id, hook)),
            _ => unreachable!(),
        }
        HookGuard { hooks: Arc::downgrade(self), stage, id }
    }

    fn unregister(&self, stage: Stage, id: u64) {
        let mut registry = self.registry.lock();
        match stage {
            Stage::ConnectionOpen => registry.connection_open.retain(|(hook_id, _)| *hook_id != id),
            Stage::ConnectionClose => registry.connection_close.retain(|(hook_id, _)| *hook_id != id),
            Stage::PreProcess => registry.pre_process.retain(|(hook_id, _)| *hook_id != id),
            Stage::PostProcess => registry.post_process.retain(|(hook_id, _)| *hook_id != id),
            Stage::RequestDone => registry.request_done.retain(|(hook_id, _)| *hook_id != id),
        }
    }

    pub(crate) fn connection_open(&self, info: &ConnectionInfo) {
        for hook in self.snapshot_connection(Stage::ConnectionOpen) {
            hook(info);
        }
    }

    pub(crate) fn connection_close(&self, info: &ConnectionInfo) {
        for hook in self.snapshot_connection(Stage::ConnectionClose) {
            hook(info);
        }
    }

    pub(crate) fn pre_process(&self, request: &mut Request) {
        for hook in self.snapshot_request(Stage::PreProcess) {
            hook(request);
            if request.is_finished() {
                break;
            }
        }
    }

    pub(crate) fn post_process(&self, request: &mut Request) {
        for hook in self.snapshot_request(Stage::PostProcess) {
            hook(request);
        }
    }

    pub(crate) fn request_done(&self, request: &mut Request) {
        for hook in self.snapshot_request(Stage::RequestDone) {
            hook(request);
        }
    }

    fn snapshot_connection(&self, stage: Stage) -> Vec<Arc<ConnectionHook>> {
        let registry = self.registry.lock();
        let list = match stage {
            Stage::ConnectionOpen => &registry.connection_open,
            Stage::ConnectionClose => &registry.connection_close,
            _ => unreachable!(),
        };
        list.iter().map(|(_, hook)| Arc::clone(hook)).collect()
    }

    fn snapshot_request(&self, stage: Stage) -> Vec<Arc<RequestHook>> {
        let registry = self.registry.lock();
        let list = match stage {
            Stage::PreProcess => &registry.pre_process,
            Stage::PostProcess => &registry.post_process,
            Stage::RequestDone => &registry.request_done,
            _ => unreachable!(),
        };
        list.iter().map(|(_, hook)| Arc::clone(hook)).collect()
    }
}

/// Keeps a hook registered; dropping it unregisters.
#[must_use = "dropping the guard unregisters the hook"]
pub struct HookGuard {
    hooks: Weak<Hooks>,
    stage: Stage,
    id: u64,
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        if let Some(hooks) = self.hooks.upgrade() {
            hooks.unregister(self.stage, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::uri::decode_target;
    use crate::protocol::RequestHead;
    use http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_request() -> Request {
        let head = RequestHead::from(http::Request::builder().method("GET").uri("/x").body(()).unwrap());
        Request::new(head, decode_target(b"/x").unwrap(), 80)
    }

    #[test]
    fn hooks_run_in_registration_order() {
        let hooks = Hooks::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o1 = order.clone();
        let _g1 = hooks.on_pre_process(move |_| o1.lock().push(1));
        let o2 = order.clone();
        let _g2 = hooks.on_pre_process(move |_| o2.lock().push(2));

        hooks.pre_process(&mut test_request());
        assert_eq!(*order.lock(), vec![1, 2]);
    }

    #[test]
    fn finishing_the_request_short_circuits() {
        let hooks = Hooks::new();
        let reached = Arc::new(AtomicUsize::new(0));

        let _g1 = hooks.on_pre_process(|req| {
            req.set_status(StatusCode::FORBIDDEN);
            req.finish();
        });
        let reached2 = reached.clone();
        let _g2 = hooks.on_pre_process(move |_| {
            reached2.fetch_add(1, Ordering::SeqCst);
        });

        let mut request = test_request();
        hooks.pre_process(&mut request);
        assert!(request.is_finished());
        assert_eq!(reached.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dropping_the_guard_unregisters() {
        let hooks = Hooks::new();
        let count = Arc::new(AtomicUsize::new(0));

        let count2 = count.clone();
        let guard = hooks.on_request_done(move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        });

        hooks.request_done(&mut test_request());
        assert_eq!(count.load(Ordering::SeqCst), 1);

        drop(guard);
        hooks.request_done(&mut test_request());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
