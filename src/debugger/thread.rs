//! Per-host-thread execution state and the cooperative pause machinery.
//!
//! A worker thread reports its position through [`Thread::update`], which is
//! the single suspension point: when the thread is paused the call blocks on
//! a condition variable until a debug client resumes or steps it. Stepping
//! granularity is encoded as a "pause at this or an outer frame" reference.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use crate::debugger::broadcast::Broadcast;
use crate::debugger::context::ContextLock;
use crate::debugger::file::{File, Location};
use crate::debugger::id::Id;
use crate::debugger::variable::VariableContainer;

pub type ThreadId = Id<Thread>;
pub type FrameId = Id<Frame>;
pub type ScopeId = Id<Scope>;

/// A named group of inspectable variables attached to a frame.
pub struct Scope {
    pub id: ScopeId,
    pub file: Arc<File>,
    pub variables: Arc<VariableContainer>,
}

impl Scope {
    pub(super) fn new(id: ScopeId, file: Arc<File>, variables: Arc<VariableContainer>) -> Scope {
        Scope {
            id,
            file,
            variables,
        }
    }
}

/// One activation record in a thread's call stack.
pub struct Frame {
    pub id: FrameId,
    pub function: String,
    location: Mutex<Location>,
    pub arguments: Arc<Scope>,
    pub locals: Arc<Scope>,
    pub registers: Arc<Scope>,
}

impl Frame {
    pub(super) fn new(
        id: FrameId,
        function: String,
        location: Location,
        arguments: Arc<Scope>,
        locals: Arc<Scope>,
        registers: Arc<Scope>,
    ) -> Frame {
        Frame {
            id,
            function,
            location: Mutex::new(location),
            arguments,
            locals,
            registers,
        }
    }

    pub fn location(&self) -> Location {
        self.location.lock().unwrap().clone()
    }

    fn set_location(&self, location: Location) {
        *self.location.lock().unwrap() = location;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Running,
    Stepping,
    Paused,
}

struct ThreadState {
    frames: Vec<Arc<Frame>>,
    fsm: State,
    /// Step granularity: `None` pauses at the very next update, otherwise
    /// only when the referenced frame is current again.
    pause_at: Option<Arc<Frame>>,
}

/// A host thread as visible to the debugger.
pub struct Thread {
    pub id: ThreadId,
    broadcast: Arc<Broadcast>,
    name: Mutex<String>,
    state: Mutex<ThreadState>,
    state_cv: Condvar,
}

impl Thread {
    pub(super) fn new(id: ThreadId, name: String, broadcast: Arc<Broadcast>) -> Thread {
        Thread {
            id,
            broadcast,
            name: Mutex::new(name),
            state: Mutex::new(ThreadState {
                frames: Vec::new(),
                fsm: State::Running,
                pause_at: None,
            }),
            state_cv: Condvar::new(),
        }
    }

    pub fn set_name(&self, name: &str) {
        *self.name.lock().unwrap() = name.to_string();
    }

    pub fn name(&self) -> String {
        self.name.lock().unwrap().clone()
    }

    /// Push a new frame for `function`. Pauses the thread (at its next
    /// update) when a function breakpoint matches the name.
    ///
    /// Takes the context lock handle because the frame and its scopes are
    /// registered there; the thread mutex is acquired strictly after.
    pub fn enter(&self, lock: &mut ContextLock<'_>, file: &Arc<File>, function: &str) {
        let frame = lock.create_frame(file, function);
        let function_breakpoint = lock.is_function_breakpoint(function);

        let mut state = self.state.lock().unwrap();
        state.frames.push(frame);
        if function_breakpoint {
            self.broadcast.function_breakpoint_hit(self.id);
            state.fsm = State::Paused;
        }
    }

    /// Pop the current frame. No state transition is implied.
    pub fn exit(&self) {
        let mut state = self.state.lock().unwrap();
        debug_assert!(!state.frames.is_empty(), "exit without matching enter");
        state.frames.pop();
    }

    /// Report the current location. This is the suspension point: the call
    /// does not return while the thread is paused.
    ///
    /// Must be called without holding the context lock, otherwise a client
    /// request that needs that lock could never resume this thread.
    pub fn update(&self, location: Location) {
        let mut state = self.state.lock().unwrap();
        let Some(top) = state.frames.last().cloned() else {
            debug_assert!(false, "update without an active frame");
            return;
        };
        top.set_location(location.clone());

        if state.fsm == State::Running && location.file.has_breakpoint(location.line) {
            self.broadcast.line_breakpoint_hit(self.id);
            state.fsm = State::Paused;
        }

        match state.fsm {
            State::Paused => {
                drop(self.block_while_paused(state));
            }
            State::Stepping => {
                let arrived = match &state.pause_at {
                    None => true,
                    Some(frame) => Arc::ptr_eq(frame, &top),
                };
                if arrived {
                    self.broadcast.thread_stepped(self.id);
                    state.fsm = State::Paused;
                    let mut state = self.block_while_paused(state);
                    state.pause_at = None;
                }
            }
            State::Running => {}
        }
    }

    fn block_while_paused<'a>(
        &self,
        mut state: MutexGuard<'a, ThreadState>,
    ) -> MutexGuard<'a, ThreadState> {
        while state.fsm == State::Paused {
            state = self.state_cv.wait(state).unwrap();
        }
        state
    }

    /// Snapshot of the call stack, innermost frame last.
    pub fn stack(&self) -> Vec<Arc<Frame>> {
        self.state.lock().unwrap().frames.clone()
    }

    pub fn state(&self) -> State {
        self.state.lock().unwrap().fsm
    }

    /// Variables of the innermost frame, if any frame is active.
    pub fn locals(&self) -> Option<Arc<VariableContainer>> {
        self.top_container(|frame| &frame.locals)
    }

    pub fn arguments(&self) -> Option<Arc<VariableContainer>> {
        self.top_container(|frame| &frame.arguments)
    }

    pub fn registers(&self) -> Option<Arc<VariableContainer>> {
        self.top_container(|frame| &frame.registers)
    }

    fn top_container(&self, pick: impl Fn(&Frame) -> &Arc<Scope>) -> Option<Arc<VariableContainer>> {
        let state = self.state.lock().unwrap();
        state
            .frames
            .last()
            .map(|frame| Arc::clone(&pick(frame).variables))
    }

    pub fn resume(&self) {
        let mut state = self.state.lock().unwrap();
        state.fsm = State::Running;
        drop(state);
        self.state_cv.notify_all();
    }

    /// Request a pause; the thread blocks at its next update.
    pub fn pause(&self) {
        self.state.lock().unwrap().fsm = State::Paused;
    }

    /// Pause at the very next reported location, in any frame.
    pub fn step_in(&self) {
        let mut state = self.state.lock().unwrap();
        state.fsm = State::Stepping;
        state.pause_at = None;
        drop(state);
        self.state_cv.notify_all();
    }

    /// Pause when the current frame is on top again, skipping over callees.
    pub fn step_over(&self) {
        let mut state = self.state.lock().unwrap();
        state.pause_at = state.frames.last().cloned();
        state.fsm = State::Stepping;
        drop(state);
        self.state_cv.notify_all();
    }

    /// Pause when control returns to the caller. With a single frame on the
    /// stack this degenerates to a step-in.
    pub fn step_out(&self) {
        let mut state = self.state.lock().unwrap();
        let depth = state.frames.len();
        state.pause_at = if depth > 1 {
            Some(Arc::clone(&state.frames[depth - 2]))
        } else {
            None
        };
        state.fsm = State::Stepping;
        drop(state);
        self.state_cv.notify_all();
    }
}
