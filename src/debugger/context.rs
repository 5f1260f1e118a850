//! Process-wide owner of the live debuggee model.
//!
//! All entity registries, breakpoint bookkeeping and pending-breakpoint
//! reconciliation live behind one coarse lock; entities themselves are
//! shared out as `Arc`s and guarded by their own finer mutexes.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use log::debug;

use crate::debugger::broadcast::{Broadcast, EventListener};
use crate::debugger::file::{File, FileId, Location};
use crate::debugger::id::IdSource;
use crate::debugger::thread::{Frame, FrameId, Scope, ScopeId, Thread, ThreadId};
use crate::debugger::variable::{ContainerId, VariableContainer};
use crate::debugger::weak_map::WeakMap;

pub struct Context {
    state: Mutex<ContextState>,
    broadcast: Arc<Broadcast>,
}

struct ContextState {
    // Host-thread binding holds the strong reference; every other registry
    // is weak and never extends entity lifetime.
    bound_threads: HashMap<thread::ThreadId, Arc<Thread>>,
    threads: WeakMap<Thread>,
    files: WeakMap<File>,
    frames: WeakMap<Frame>,
    scopes: WeakMap<Scope>,
    containers: WeakMap<VariableContainer>,

    function_breakpoints: HashSet<String>,
    // Source name -> line breakpoints targeting files not yet registered.
    pending_breakpoints: HashMap<String, Vec<i64>>,

    thread_ids: IdSource<Thread>,
    file_ids: IdSource<File>,
    frame_ids: IdSource<Frame>,
    scope_ids: IdSource<Scope>,
    container_ids: IdSource<VariableContainer>,
}

impl Context {
    pub fn new() -> Arc<Context> {
        Arc::new(Context {
            state: Mutex::new(ContextState {
                bound_threads: HashMap::new(),
                threads: WeakMap::new(),
                files: WeakMap::new(),
                frames: WeakMap::new(),
                scopes: WeakMap::new(),
                containers: WeakMap::new(),
                function_breakpoints: HashSet::new(),
                pending_breakpoints: HashMap::new(),
                thread_ids: IdSource::new(),
                file_ids: IdSource::new(),
                frame_ids: IdSource::new(),
                scope_ids: IdSource::new(),
                container_ids: IdSource::new(),
            }),
            broadcast: Arc::new(Broadcast::new()),
        })
    }

    /// Take the context lock. The returned handle carries every registry
    /// operation; pass it down (`Thread::enter`) instead of re-locking.
    pub fn lock(&self) -> ContextLock<'_> {
        ContextLock {
            state: self.state.lock().unwrap(),
        }
    }

    /// The [`Thread`] bound to the calling host thread, created lazily.
    /// Creation announces the thread to every listener.
    pub fn current_thread(&self) -> Arc<Thread> {
        let host_id = thread::current().id();
        let (thread, created) = {
            let mut state = self.state.lock().unwrap();
            if let Some(existing) = state.bound_threads.get(&host_id) {
                (Arc::clone(existing), false)
            } else {
                let id = state.thread_ids.next();
                let thread = Arc::new(Thread::new(
                    id,
                    format!("Thread {id}"),
                    Arc::clone(&self.broadcast),
                ));
                state.bound_threads.insert(host_id, Arc::clone(&thread));
                state.threads.add(id, &thread);
                debug!(target: "debugger", "thread {id} bound to host thread {host_id:?}");
                (thread, true)
            }
        };
        if created {
            self.broadcast.thread_started(thread.id);
        }
        thread
    }

    pub fn add_listener(&self, listener: Arc<dyn EventListener>) {
        self.broadcast.add(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn EventListener>) {
        self.broadcast.remove(listener);
    }
}

/// Scoped handle over the context state.
pub struct ContextLock<'a> {
    state: MutexGuard<'a, ContextState>,
}

impl ContextLock<'_> {
    /// Register an in-memory source unit. Pending breakpoints whose source
    /// name matches are installed before anyone can observe the file.
    pub fn create_virtual_file(&mut self, name: &str, source: &str) -> Arc<File> {
        let id = self.state.file_ids.next();
        let file = Arc::new(File::new_virtual(id, name, source));
        self.install(file)
    }

    /// Register an on-disk source unit. `path` is split on the last `/`.
    pub fn create_physical_file(&mut self, path: &str, source: Option<&str>) -> Arc<File> {
        let id = self.state.file_ids.next();
        let (dir, name) = match path.rsplit_once('/') {
            Some((dir, name)) => (dir, name),
            None => ("", path),
        };
        let file = Arc::new(File::new_physical(id, dir, name, source));
        self.install(file)
    }

    fn install(&mut self, file: Arc<File>) -> Arc<File> {
        if let Some(lines) = self.state.pending_breakpoints.remove(&file.name) {
            debug!(
                target: "debugger",
                "installing {} pending breakpoints into {}", lines.len(), file.name
            );
            file.set_breakpoints(lines);
        }
        self.state.files.add(file.id, &file);
        file
    }

    /// Allocate a frame with its three scopes, all registered for lookup.
    pub fn create_frame(&mut self, file: &Arc<File>, function: &str) -> Arc<Frame> {
        let frame_id = self.state.frame_ids.next();
        let arguments = self.create_scope(file);
        let locals = self.create_scope(file);
        let registers = self.create_scope(file);
        let frame = Arc::new(Frame::new(
            frame_id,
            function.to_string(),
            Location::new(Arc::clone(file), 0),
            arguments,
            locals,
            registers,
        ));
        self.state.frames.add(frame_id, &frame);
        frame
    }

    /// Allocate a standalone container, for publishing nested structures.
    pub fn create_variable_container(&mut self) -> Arc<VariableContainer> {
        let id = self.state.container_ids.next();
        let container = Arc::new(VariableContainer::new(id));
        self.state.containers.add(id, &container);
        container
    }

    fn create_scope(&mut self, file: &Arc<File>) -> Arc<Scope> {
        let container_id = self.state.container_ids.next();
        let container = Arc::new(VariableContainer::new(container_id));
        self.state.containers.add(container_id, &container);

        let scope_id = self.state.scope_ids.next();
        let scope = Arc::new(Scope::new(scope_id, Arc::clone(file), container));
        self.state.scopes.add(scope_id, &scope);
        scope
    }

    pub fn thread(&self, id: ThreadId) -> Option<Arc<Thread>> {
        self.state.threads.get(id)
    }

    pub fn file(&self, id: FileId) -> Option<Arc<File>> {
        self.state.files.get(id)
    }

    pub fn frame(&self, id: FrameId) -> Option<Arc<Frame>> {
        self.state.frames.get(id)
    }

    pub fn scope(&self, id: ScopeId) -> Option<Arc<Scope>> {
        self.state.scopes.get(id)
    }

    pub fn container(&self, id: ContainerId) -> Option<Arc<VariableContainer>> {
        self.state.containers.get(id)
    }

    /// Snapshot of all live threads in id order.
    pub fn threads(&self) -> Vec<Arc<Thread>> {
        let mut threads: Vec<_> = self.state.bound_threads.values().cloned().collect();
        threads.sort_by_key(|thread| thread.id);
        threads
    }

    /// Snapshot of all live files in id order.
    pub fn files(&self) -> Vec<Arc<File>> {
        self.state.files.live()
    }

    pub fn add_function_breakpoint(&mut self, function: &str) {
        self.state.function_breakpoints.insert(function.to_string());
    }

    /// Replace the whole function-breakpoint set.
    pub fn set_function_breakpoints(&mut self, functions: impl IntoIterator<Item = String>) {
        self.state.function_breakpoints = functions.into_iter().collect();
    }

    pub fn is_function_breakpoint(&self, function: &str) -> bool {
        self.state.function_breakpoints.contains(function)
    }

    /// Remember line breakpoints for a source that has no file yet; they are
    /// installed when a file with that name is registered.
    pub fn add_pending_breakpoints(&mut self, source_name: &str, lines: Vec<i64>) {
        self.state
            .pending_breakpoints
            .insert(source_name.to_string(), lines);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn file_ids_are_monotone_from_one() {
        let ctx = Context::new();
        let mut lock = ctx.lock();
        let a = lock.create_virtual_file("a.frag", "");
        let b = lock.create_virtual_file("b.frag", "");
        assert_eq!(a.id.raw(), 1);
        assert_eq!(b.id.raw(), 2);
    }

    #[test]
    fn registry_does_not_extend_lifetime() {
        let ctx = Context::new();
        let file = ctx.lock().create_virtual_file("a.frag", "");
        let id = file.id;
        assert!(ctx.lock().file(id).is_some());
        drop(file);
        assert!(ctx.lock().file(id).is_none());
    }

    #[test]
    fn pending_breakpoints_install_on_registration() {
        let ctx = Context::new();
        ctx.lock().add_pending_breakpoints("a.frag", vec![10, 20]);

        let file = ctx.lock().create_virtual_file("a.frag", "void main() {}");
        assert!(file.has_breakpoint(10));
        assert!(file.has_breakpoint(20));
        assert!(!file.has_breakpoint(15));

        // Pending entry is consumed: a second file with the same name starts
        // clean.
        let again = ctx.lock().create_virtual_file("a.frag", "");
        assert!(!again.has_breakpoint(10));
    }

    #[test]
    fn pending_breakpoints_only_match_by_name() {
        let ctx = Context::new();
        ctx.lock().add_pending_breakpoints("a.frag", vec![10]);
        let other = ctx.lock().create_virtual_file("b.frag", "");
        assert!(!other.has_breakpoint(10));
    }

    #[test]
    fn current_thread_is_created_once_per_host_thread() {
        let ctx = Context::new();
        let first = ctx.current_thread();
        let second = ctx.current_thread();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.id.raw(), 1);
        assert_eq!(ctx.lock().threads().len(), 1);
    }

    #[test]
    fn current_thread_announces_creation() {
        struct Started(mpsc::Sender<ThreadId>);
        impl EventListener for Started {
            fn on_thread_started(&self, thread: ThreadId) {
                let _ = self.0.send(thread);
            }
        }

        let ctx = Context::new();
        let (tx, rx) = mpsc::channel();
        ctx.add_listener(Arc::new(Started(tx)));

        let thread = ctx.current_thread();
        assert_eq!(rx.try_recv().unwrap(), thread.id);
        let _ = ctx.current_thread();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn function_breakpoints_replace_as_a_set() {
        let ctx = Context::new();
        let mut lock = ctx.lock();
        lock.add_function_breakpoint("main");
        assert!(lock.is_function_breakpoint("main"));

        lock.set_function_breakpoints(["shade".to_string()]);
        assert!(!lock.is_function_breakpoint("main"));
        assert!(lock.is_function_breakpoint("shade"));
    }

    #[test]
    fn create_frame_registers_scopes_and_containers() {
        let ctx = Context::new();
        let mut lock = ctx.lock();
        let file = lock.create_virtual_file("a.frag", "");
        let frame = lock.create_frame(&file, "main");

        assert_eq!(frame.function, "main");
        assert!(lock.frame(frame.id).is_some());
        assert!(lock.scope(frame.locals.id).is_some());
        assert!(
            lock.container(frame.locals.variables.id)
                .is_some_and(|c| Arc::ptr_eq(&c, &frame.locals.variables))
        );
    }

    #[test]
    fn physical_file_path_splitting() {
        let ctx = Context::new();
        let file = ctx
            .lock()
            .create_physical_file("shaders/fog.frag", None);
        assert_eq!(file.dir, "shaders");
        assert_eq!(file.name, "fog.frag");
        assert_eq!(file.path(), "shaders/fog.frag");

        let flat = ctx.lock().create_physical_file("fog.frag", None);
        assert_eq!(flat.dir, "");
        assert_eq!(flat.name, "fog.frag");
    }
}
