//! TCP listener owning one [`Session`] per accepted debugger connection.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{info, warn};

use crate::dap::handlers::DebugHandlers;
use crate::dap::protocol::EventBody;
use crate::dap::session::{Session, SessionOutput};
use crate::dap::types::{StoppedEventBody, StoppedEventReason, ThreadEventBody};
use crate::debugger::{Context, EventListener, ThreadId};

/// Default port the debugger extension connects to.
pub const DEFAULT_PORT: u16 = 19020;

/// How often the accept loop checks the shutdown flag.
const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// One-shot latch opened by the `configurationDone` request.
pub struct Gate {
    opened: Mutex<bool>,
    cv: Condvar,
}

impl Gate {
    pub fn new() -> Gate {
        Gate {
            opened: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    pub fn open(&self) {
        let mut opened = self.opened.lock().unwrap();
        *opened = true;
        self.cv.notify_all();
    }

    pub fn is_open(&self) -> bool {
        *self.opened.lock().unwrap()
    }

    /// Block until the gate opens. Returns false on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let opened = self.opened.lock().unwrap();
        let (opened, result) = self
            .cv
            .wait_timeout_while(opened, timeout, |opened| !*opened)
            .unwrap();
        drop(opened);
        !result.timed_out()
    }
}

impl Default for Gate {
    fn default() -> Self {
        Gate::new()
    }
}

/// Translates debuggee broadcasts into DAP events for one connection.
struct SessionListener {
    output: Arc<SessionOutput>,
}

impl SessionListener {
    fn stopped(&self, thread: ThreadId, reason: StoppedEventReason) {
        let event = EventBody::stopped(StoppedEventBody {
            reason,
            description: None,
            thread_id: Some(thread.raw()),
            all_threads_stopped: None,
        });
        if let Err(err) = self.output.send_event(event) {
            warn!(target: "dap", "failed to send stopped event: {err}");
        }
    }
}

impl EventListener for SessionListener {
    fn on_thread_started(&self, thread: ThreadId) {
        let event = EventBody::thread(ThreadEventBody {
            reason: "started".to_string(),
            thread_id: thread.raw(),
        });
        if let Err(err) = self.output.send_event(event) {
            warn!(target: "dap", "failed to send thread event: {err}");
        }
    }

    fn on_thread_stepped(&self, thread: ThreadId) {
        self.stopped(thread, StoppedEventReason::Step);
    }

    fn on_line_breakpoint_hit(&self, thread: ThreadId) {
        self.stopped(thread, StoppedEventReason::Breakpoint);
    }

    fn on_function_breakpoint_hit(&self, thread: ThreadId) {
        self.stopped(thread, StoppedEventReason::FunctionBreakpoint);
    }
}

struct Connection {
    session: Session,
    listener: Arc<dyn EventListener>,
}

/// Accepts debugger connections and owns their sessions. Dropping the server
/// (or calling [`DapServer::stop`]) closes everything and joins all threads.
pub struct DapServer {
    ctx: Arc<Context>,
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    configured: Arc<Gate>,
    connections: Arc<Mutex<Vec<Connection>>>,
    accept: Option<JoinHandle<()>>,
}

impl DapServer {
    /// Bind `addr` and start accepting connections. Every connection shares
    /// `ctx`.
    pub fn bind(ctx: Arc<Context>, addr: SocketAddr) -> std::io::Result<DapServer> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        info!(target: "dap", "listening on {local_addr}");

        let shutdown = Arc::new(AtomicBool::new(false));
        let configured = Arc::new(Gate::new());
        let connections = Arc::new(Mutex::new(Vec::new()));

        let accept = {
            let ctx = Arc::clone(&ctx);
            let shutdown = Arc::clone(&shutdown);
            let configured = Arc::clone(&configured);
            let connections = Arc::clone(&connections);
            std::thread::spawn(move || {
                run_accept(&listener, &ctx, &shutdown, &configured, &connections);
            })
        };

        Ok(DapServer {
            ctx,
            local_addr,
            shutdown,
            configured,
            connections,
            accept: Some(accept),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Block until some client finishes the configuration handshake.
    /// Returns false on timeout.
    pub fn wait_until_configured(&self, timeout: Duration) -> bool {
        self.configured.wait_timeout(timeout)
    }

    /// Stop accepting, close every session and join all worker threads.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(accept) = self.accept.take() {
            let _ = accept.join();
        }
        let mut connections = self.connections.lock().unwrap();
        for mut connection in connections.drain(..) {
            // Close the socket first so a listener mid-send is unblocked
            // before we detach it.
            connection.session.end();
            self.ctx.remove_listener(&connection.listener);
        }
    }
}

impl Drop for DapServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_accept(
    listener: &TcpListener,
    ctx: &Arc<Context>,
    shutdown: &AtomicBool,
    configured: &Arc<Gate>,
    connections: &Mutex<Vec<Connection>>,
) {
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                info!(target: "dap", "debugger connected from {peer}");
                match attach(ctx, configured, stream) {
                    Ok(connection) => connections.lock().unwrap().push(connection),
                    Err(err) => warn!(target: "dap", "failed to start session: {err}"),
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
            }
            Err(err) => {
                warn!(target: "dap", "accept failed: {err}");
                std::thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

fn attach(
    ctx: &Arc<Context>,
    configured: &Arc<Gate>,
    stream: TcpStream,
) -> std::io::Result<Connection> {
    let session = Session::start(stream, |output| {
        Box::new(DebugHandlers::new(
            Arc::clone(ctx),
            Arc::clone(output),
            Arc::clone(configured),
        ))
    })?;
    let listener: Arc<dyn EventListener> = Arc::new(SessionListener {
        output: session.output(),
    });
    ctx.add_listener(Arc::clone(&listener));
    Ok(Connection { session, listener })
}
