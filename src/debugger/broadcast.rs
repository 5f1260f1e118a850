use std::sync::{Arc, Mutex};

use crate::debugger::thread::ThreadId;

/// Receiver of debug events fanned out by the context.
///
/// The DAP server registers one listener per connection to translate these
/// into `stopped`/`thread` events on the wire.
pub trait EventListener: Send + Sync {
    fn on_thread_started(&self, _thread: ThreadId) {}
    fn on_thread_stepped(&self, _thread: ThreadId) {}
    fn on_line_breakpoint_hit(&self, _thread: ThreadId) {}
    fn on_function_breakpoint_hit(&self, _thread: ThreadId) {}
}

/// Multi-listener sink. Threads hold a handle so they can publish without
/// touching the context state lock.
pub(crate) struct Broadcast {
    listeners: Mutex<Vec<Arc<dyn EventListener>>>,
}

impl Broadcast {
    pub(crate) fn new() -> Broadcast {
        Broadcast {
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn add(&self, listener: Arc<dyn EventListener>) {
        self.listeners.lock().unwrap().push(listener);
    }

    pub(crate) fn remove(&self, listener: &Arc<dyn EventListener>) {
        self.listeners
            .lock()
            .unwrap()
            .retain(|registered| !Arc::ptr_eq(registered, listener));
    }

    pub(crate) fn thread_started(&self, thread: ThreadId) {
        for listener in self.snapshot() {
            listener.on_thread_started(thread);
        }
    }

    pub(crate) fn thread_stepped(&self, thread: ThreadId) {
        for listener in self.snapshot() {
            listener.on_thread_stepped(thread);
        }
    }

    pub(crate) fn line_breakpoint_hit(&self, thread: ThreadId) {
        for listener in self.snapshot() {
            listener.on_line_breakpoint_hit(thread);
        }
    }

    pub(crate) fn function_breakpoint_hit(&self, thread: ThreadId) {
        for listener in self.snapshot() {
            listener.on_function_breakpoint_hit(thread);
        }
    }

    fn snapshot(&self) -> Vec<Arc<dyn EventListener>> {
        self.listeners.lock().unwrap().clone()
    }
}
