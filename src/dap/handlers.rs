//! Binding from DAP requests to the debuggee model.

use std::sync::Arc;

use log::debug;

use crate::dap::server::Gate;
use crate::dap::session::{HandlerResult, Handlers, RequestError, SessionOutput};
use crate::dap::types::*;
use crate::dap::protocol::{EventBody, RequestArguments, ResponseBody};
use crate::debugger::{self, Context, ContextLock, Error};

pub struct DebugHandlers {
    ctx: Arc<Context>,
    output: Arc<SessionOutput>,
    configured: Arc<Gate>,
    /// Workaround mode for clients that mishandle '.' in names.
    client_is_visual_studio: bool,
    /// Events that must trail the response that caused them; flushed from
    /// the response-sent hook.
    deferred_events: Vec<EventBody>,
}

impl DebugHandlers {
    pub fn new(ctx: Arc<Context>, output: Arc<SessionOutput>, configured: Arc<Gate>) -> DebugHandlers {
        DebugHandlers {
            ctx,
            output,
            configured,
            client_is_visual_studio: false,
            deferred_events: Vec::new(),
        }
    }

    fn initialize(&mut self, args: InitializeRequestArguments) -> HandlerResult {
        self.client_is_visual_studio = args.client_id.as_deref() == Some("visualstudio");
        Ok(ResponseBody::initialize(Capabilities {
            supports_configuration_done_request: Some(true),
            supports_function_breakpoints: Some(true),
            ..Default::default()
        }))
    }

    fn set_breakpoints(&mut self, args: SetBreakpointsArguments) -> HandlerResult {
        let requested: Vec<i64> = args
            .breakpoints
            .unwrap_or_default()
            .iter()
            .map(|bp| bp.line)
            .collect();

        let mut lock = self.ctx.lock();
        let verified = match resolve_file(&lock, &args.source) {
            Some(file) => {
                file.set_breakpoints(requested.iter().copied());
                true
            }
            None => {
                if let Some(name) = &args.source.name {
                    debug!(target: "dap", "deferring {} breakpoints for {name}", requested.len());
                    lock.add_pending_breakpoints(name, requested.clone());
                }
                false
            }
        };

        let breakpoints = requested
            .into_iter()
            .map(|line| Breakpoint {
                verified,
                message: None,
                source: Some(args.source.clone()),
                line: Some(line),
            })
            .collect();
        Ok(ResponseBody::setBreakpoints(SetBreakpointsResponseBody {
            breakpoints,
        }))
    }

    fn set_function_breakpoints(&mut self, args: SetFunctionBreakpointsArguments) -> HandlerResult {
        let mut lock = self.ctx.lock();
        lock.set_function_breakpoints(args.breakpoints.iter().map(|bp| bp.name.clone()));
        let breakpoints = args.breakpoints.iter().map(|_| Breakpoint::default()).collect();
        Ok(ResponseBody::setFunctionBreakpoints(
            SetBreakpointsResponseBody { breakpoints },
        ))
    }

    fn threads(&mut self) -> HandlerResult {
        let lock = self.ctx.lock();
        let threads = lock
            .threads()
            .iter()
            .map(|thread| Thread {
                id: thread.id.raw(),
                name: self.sanitize(thread.name()),
            })
            .collect();
        Ok(ResponseBody::threads(ThreadsResponseBody { threads }))
    }

    fn stack_trace(&mut self, args: StackTraceArguments) -> HandlerResult {
        let lock = self.ctx.lock();
        let thread = lock
            .thread(args.thread_id.into())
            .ok_or(Error::ThreadNotFound(args.thread_id))?;
        let stack = thread.stack();
        let total = stack.len() as i64;

        let start = args.start_frame.unwrap_or(0).max(0) as usize;
        let levels = match args.levels {
            Some(levels) if levels > 0 => levels as usize,
            _ => stack.len(),
        };

        // Innermost frame first.
        let stack_frames = stack
            .iter()
            .rev()
            .skip(start)
            .take(levels)
            .map(|frame| {
                let location = frame.location();
                StackFrame {
                    id: frame.id.raw(),
                    name: frame.function.clone(),
                    source: Some(self.project_source(&location.file)),
                    line: location.line,
                    column: 0,
                }
            })
            .collect();
        Ok(ResponseBody::stackTrace(StackTraceResponseBody {
            stack_frames,
            total_frames: Some(total),
        }))
    }

    fn scopes(&mut self, args: ScopesArguments) -> HandlerResult {
        let lock = self.ctx.lock();
        let frame = lock
            .frame(args.frame_id.into())
            .ok_or(Error::FrameNotFound(args.frame_id))?;
        let scopes = vec![
            self.project_scope("locals", &frame.locals),
            self.project_scope("arguments", &frame.arguments),
            self.project_scope("registers", &frame.registers),
        ];
        Ok(ResponseBody::scopes(ScopesResponseBody { scopes }))
    }

    fn variables(&mut self, args: VariablesArguments) -> HandlerResult {
        let lock = self.ctx.lock();
        let container = lock
            .container(args.variables_reference.into())
            .ok_or(Error::VariablesReferenceNotFound(args.variables_reference))?;

        let start = args.start.unwrap_or(0).max(0) as usize;
        let count = match args.count {
            Some(count) if count > 0 => count as usize,
            _ => usize::MAX,
        };

        let variables = container
            .snapshot()
            .into_iter()
            .skip(start)
            .take(count)
            .map(|(name, value)| Variable {
                value: value.render(),
                type_: Some(value.kind().name().to_string()),
                variables_reference: value.container().map_or(0, |c| c.id.raw()),
                evaluate_name: Some(name.clone()),
                name,
            })
            .collect();
        Ok(ResponseBody::variables(VariablesResponseBody { variables }))
    }

    fn source(&mut self, args: SourceArguments) -> HandlerResult {
        let reference = if args.source_reference != 0 {
            args.source_reference
        } else {
            args.source
                .as_ref()
                .and_then(|source| source.source_reference)
                .unwrap_or(0)
        };

        let lock = self.ctx.lock();
        let file = lock
            .file(reference.into())
            .ok_or(Error::SourceNotFound(reference))?;
        Ok(ResponseBody::source(SourceResponseBody {
            content: file.source().unwrap_or_default().to_string(),
        }))
    }

    fn pause(&mut self, args: PauseArguments) -> HandlerResult {
        let lock = self.ctx.lock();
        let mut event = StoppedEventBody {
            reason: StoppedEventReason::Pause,
            description: None,
            thread_id: None,
            all_threads_stopped: None,
        };

        if let Some(thread) = lock.thread(args.thread_id.into()) {
            thread.pause();
            event.thread_id = Some(args.thread_id);
        } else {
            let threads = lock.threads();
            for thread in &threads {
                thread.pause();
            }
            event.all_threads_stopped = Some(true);
            event.thread_id = threads.first().map(|thread| thread.id.raw());
        }

        self.deferred_events.push(EventBody::stopped(event));
        Ok(ResponseBody::pause)
    }

    fn continue_(&mut self, args: ContinueArguments) -> HandlerResult {
        let lock = self.ctx.lock();
        let all_threads_continued = if let Some(thread) = lock.thread(args.thread_id.into()) {
            thread.resume();
            false
        } else {
            for thread in lock.threads() {
                thread.resume();
            }
            true
        };
        Ok(ResponseBody::continue_(ContinueResponseBody {
            all_threads_continued: Some(all_threads_continued),
        }))
    }

    fn with_thread(
        &self,
        thread_id: i64,
        f: impl FnOnce(&Arc<debugger::Thread>),
    ) -> Result<(), RequestError> {
        let lock = self.ctx.lock();
        let thread = lock
            .thread(thread_id.into())
            .ok_or(Error::ThreadNotFound(thread_id))?;
        f(&thread);
        Ok(())
    }

    fn evaluate(&mut self, args: EvaluateArguments) -> HandlerResult {
        let Some(frame_id) = args.frame_id else {
            return Err(Error::CouldNotEvaluate.into());
        };
        let lock = self.ctx.lock();
        let frame = lock
            .frame(frame_id.into())
            .ok_or(Error::FrameNotFound(frame_id))?;

        // Lookup precedence: locals shadow arguments shadow registers.
        for scope in [&frame.locals, &frame.arguments, &frame.registers] {
            if let Some(value) = scope.variables.find(&args.expression) {
                return Ok(ResponseBody::evaluate(EvaluateResponseBody {
                    result: value.render(),
                    type_: Some(value.kind().name().to_string()),
                    variables_reference: value.container().map_or(0, |c| c.id.raw()),
                }));
            }
        }
        Err(Error::CouldNotEvaluate.into())
    }

    fn sanitize(&self, name: String) -> String {
        if self.client_is_visual_studio {
            name.replace('.', "_")
        } else {
            name
        }
    }

    fn project_source(&self, file: &Arc<debugger::File>) -> Source {
        let name = Some(self.sanitize(file.name.clone()));
        if file.is_virtual() {
            Source {
                name,
                path: None,
                source_reference: Some(file.id.raw()),
            }
        } else {
            Source {
                name,
                path: Some(file.path()),
                source_reference: None,
            }
        }
    }

    fn project_scope(&self, label: &str, scope: &Arc<debugger::Scope>) -> Scope {
        Scope {
            name: label.to_string(),
            presentation_hint: Some(label.to_string()),
            variables_reference: scope.variables.id.raw(),
            expensive: false,
            source: Some(self.project_source(&scope.file)),
        }
    }
}

impl Handlers for DebugHandlers {
    fn request(&mut self, arguments: RequestArguments) -> HandlerResult {
        match arguments {
            RequestArguments::initialize(args) => self.initialize(args),
            RequestArguments::launch(_) => Ok(ResponseBody::launch),
            RequestArguments::configurationDone(_) => {
                self.configured.open();
                Ok(ResponseBody::configurationDone)
            }
            RequestArguments::setBreakpoints(args) => self.set_breakpoints(args),
            RequestArguments::setFunctionBreakpoints(args) => self.set_function_breakpoints(args),
            RequestArguments::setExceptionBreakpoints(_) => {
                // Accepted but not honored.
                Ok(ResponseBody::setExceptionBreakpoints)
            }
            RequestArguments::threads(_) => self.threads(),
            RequestArguments::stackTrace(args) => self.stack_trace(args),
            RequestArguments::scopes(args) => self.scopes(args),
            RequestArguments::variables(args) => self.variables(args),
            RequestArguments::source(args) => self.source(args),
            RequestArguments::pause(args) => self.pause(args),
            RequestArguments::continue_(args) => self.continue_(args),
            RequestArguments::next(args) => {
                self.with_thread(args.thread_id, |thread| thread.step_over())?;
                Ok(ResponseBody::next)
            }
            RequestArguments::stepIn(args) => {
                self.with_thread(args.thread_id, |thread| thread.step_in())?;
                Ok(ResponseBody::stepIn)
            }
            RequestArguments::stepOut(args) => {
                self.with_thread(args.thread_id, |thread| thread.step_out())?;
                Ok(ResponseBody::stepOut)
            }
            RequestArguments::evaluate(args) => self.evaluate(args),
            RequestArguments::disconnect(_) => Ok(ResponseBody::disconnect),
            RequestArguments::runInTerminal(_) => {
                Err(RequestError::new("unsupported command 'runInTerminal'"))
            }
        }
    }

    fn event(&mut self, event: EventBody) {
        debug!(target: "dap", "ignoring inbound event {event:?}");
    }

    fn response_sent(&mut self, body: &ResponseBody) {
        if matches!(body, ResponseBody::initialize(_))
            && let Err(err) = self.output.send_event(EventBody::initialized)
        {
            debug!(target: "dap", "failed to send initialized event: {err}");
        }
        for event in self.deferred_events.drain(..) {
            if let Err(err) = self.output.send_event(event) {
                debug!(target: "dap", "failed to send deferred event: {err}");
            }
        }
    }
}

/// Resolve a request's source to a registered file: by sourceReference, then
/// by path, then by name.
fn resolve_file(lock: &ContextLock<'_>, source: &Source) -> Option<Arc<debugger::File>> {
    if let Some(reference) = source.source_reference
        && let Some(file) = lock.file(reference.into())
    {
        return Some(file);
    }
    let files = lock.files();
    if let Some(path) = &source.path
        && let Some(file) = files.iter().find(|file| &file.path() == path)
    {
        return Some(Arc::clone(file));
    }
    if let Some(name) = &source.name
        && let Some(file) = files.iter().find(|file| &file.name == name)
    {
        return Some(Arc::clone(file));
    }
    None
}
