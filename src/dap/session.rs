//! Per-connection request/event/response routing.
//!
//! Each session runs two threads: the receive thread frames and parses
//! inbound messages, the dispatch thread executes handler payloads strictly
//! in arrival order. All outbound traffic is serialized by the send mutex
//! inside [`SessionOutput`], which also allocates the connection-wide `seq`.

use std::collections::HashMap;
use std::io::BufReader;
use std::net::{Shutdown, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use log::{debug, error, info, warn};

use crate::dap::chan::Chan;
use crate::dap::protocol::{
    Command, Event, EventBody, ProtocolMessage, Request, RequestArguments, Response, ResponseBody,
    ResponseResult, known_command,
};
use crate::dap::transport::{self, MessageReader, TransportError};

const INBOX_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("peer reported failure: {0}")]
    Remote(String),
    #[error("session closed")]
    Closed,
}

/// Error a request handler reports back to the client.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct RequestError(pub String);

impl RequestError {
    pub fn new(message: impl Into<String>) -> RequestError {
        RequestError(message.into())
    }
}

impl From<crate::debugger::Error> for RequestError {
    fn from(err: crate::debugger::Error) -> RequestError {
        RequestError(err.to_string())
    }
}

pub type HandlerResult = Result<ResponseBody, RequestError>;

/// Per-connection message handlers. All methods run serially on the
/// session's dispatch thread.
pub trait Handlers: Send {
    fn request(&mut self, arguments: RequestArguments) -> HandlerResult;

    /// Inbound events, routed symmetrically with requests.
    fn event(&mut self, _event: EventBody) {}

    /// Fires after a successful response has been written to the wire.
    fn response_sent(&mut self, _body: &ResponseBody) {}
}

/// Completion for a request we sent to the peer.
pub type ResponseCompletion = Box<dyn FnOnce(Result<ResponseBody, SessionError>) + Send>;

type Payload = Box<dyn FnOnce(&mut dyn Handlers) + Send>;

struct SendState {
    stream: TcpStream,
    next_seq: i64,
}

/// Shared outbound half of a session. Cheap to clone via `Arc`; safe to use
/// from any thread.
pub struct SessionOutput {
    send: Mutex<SendState>,
    in_flight: Mutex<HashMap<i64, ResponseCompletion>>,
}

impl SessionOutput {
    fn new(stream: TcpStream) -> SessionOutput {
        SessionOutput {
            send: Mutex::new(SendState {
                stream,
                next_seq: 1,
            }),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    fn send(&self, build: impl FnOnce(i64) -> ProtocolMessage) -> Result<(), SessionError> {
        let mut state = self.send.lock().unwrap();
        let seq = state.next_seq;
        state.next_seq += 1;
        let message = build(seq);
        let body = serde_json::to_vec(&message)?;
        debug!(target: "dap", "<-- {}", String::from_utf8_lossy(&body));
        transport::write_message(&mut state.stream, &body)?;
        Ok(())
    }

    pub fn send_event(&self, body: EventBody) -> Result<(), SessionError> {
        self.send(|seq| ProtocolMessage::Event(Event { seq, body }))
    }

    /// Send a request to the peer; `completion` fires when the matching
    /// response arrives (or the session dies).
    pub fn send_request(
        &self,
        arguments: RequestArguments,
        completion: ResponseCompletion,
    ) -> Result<(), SessionError> {
        let mut state = self.send.lock().unwrap();
        let seq = state.next_seq;
        state.next_seq += 1;
        self.in_flight.lock().unwrap().insert(seq, completion);

        let message = ProtocolMessage::Request(Request {
            seq,
            command: Command::Known(arguments),
        });
        let result = serde_json::to_vec(&message)
            .map_err(SessionError::from)
            .and_then(|body| {
                debug!(target: "dap", "<-- {}", String::from_utf8_lossy(&body));
                transport::write_message(&mut state.stream, &body).map_err(SessionError::from)
            });
        if result.is_err()
            && let Some(completion) = self.in_flight.lock().unwrap().remove(&seq)
        {
            completion(Err(SessionError::Closed));
        }
        result
    }

    pub fn respond_ok(&self, request_seq: i64, body: &ResponseBody) -> Result<(), SessionError> {
        self.send(|seq| {
            ProtocolMessage::Response(Response {
                seq,
                request_seq,
                success: true,
                result: ResponseResult::Success { body: body.clone() },
            })
        })
    }

    pub fn respond_err(
        &self,
        request_seq: i64,
        command: &str,
        message: &str,
    ) -> Result<(), SessionError> {
        self.send(|seq| {
            ProtocolMessage::Response(Response {
                seq,
                request_seq,
                success: false,
                result: ResponseResult::Error {
                    command: command.to_string(),
                    message: message.to_string(),
                },
            })
        })
    }

    fn take_in_flight(&self, request_seq: i64) -> Option<ResponseCompletion> {
        self.in_flight.lock().unwrap().remove(&request_seq)
    }

    fn fail_in_flight(&self) {
        let completions: Vec<_> = {
            let mut in_flight = self.in_flight.lock().unwrap();
            in_flight.drain().map(|(_, completion)| completion).collect()
        };
        for completion in completions {
            completion(Err(SessionError::Closed));
        }
    }
}

/// One accepted debugger connection.
pub struct Session {
    stream: TcpStream,
    output: Arc<SessionOutput>,
    inbox: Arc<Chan<Payload>>,
    receive: Option<JoinHandle<()>>,
    dispatch: Option<JoinHandle<()>>,
}

impl Session {
    /// Spin up the receive and dispatch threads for `stream`. The handler
    /// factory gets the shared output so handlers can emit events.
    pub fn start(
        stream: TcpStream,
        make_handlers: impl FnOnce(&Arc<SessionOutput>) -> Box<dyn Handlers>,
    ) -> std::io::Result<Session> {
        stream.set_nodelay(true)?;
        // The listener socket is non-blocking; this one must not be.
        stream.set_nonblocking(false)?;
        let output = Arc::new(SessionOutput::new(stream.try_clone()?));
        let mut handlers = make_handlers(&output);
        let inbox: Arc<Chan<Payload>> = Arc::new(Chan::new(INBOX_CAPACITY));

        let reader = MessageReader::new(BufReader::new(stream.try_clone()?));
        let receive = {
            let output = Arc::clone(&output);
            let inbox = Arc::clone(&inbox);
            std::thread::spawn(move || {
                run_receive(reader, &output, &inbox);
                // Unblock the dispatch thread and anyone waiting on a reply.
                inbox.close();
                output.fail_in_flight();
            })
        };

        let dispatch = {
            let inbox = Arc::clone(&inbox);
            std::thread::spawn(move || {
                while let Some(payload) = inbox.take() {
                    payload(&mut *handlers);
                }
            })
        };

        Ok(Session {
            stream,
            output,
            inbox,
            receive: Some(receive),
            dispatch: Some(dispatch),
        })
    }

    pub fn output(&self) -> Arc<SessionOutput> {
        Arc::clone(&self.output)
    }

    /// Close the socket and join both worker threads.
    pub fn end(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
        self.inbox.close();
        if let Some(receive) = self.receive.take() {
            let _ = receive.join();
        }
        if let Some(dispatch) = self.dispatch.take() {
            let _ = dispatch.join();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.end();
    }
}

fn run_receive(
    mut reader: MessageReader<BufReader<TcpStream>>,
    output: &Arc<SessionOutput>,
    inbox: &Arc<Chan<Payload>>,
) {
    loop {
        let raw = match reader.read_message() {
            Ok(raw) => raw,
            Err(TransportError::Closed) => {
                info!(target: "dap", "connection closed by peer");
                return;
            }
            Err(err) => {
                error!(target: "dap", "receive failed: {err}");
                return;
            }
        };
        debug!(target: "dap", "--> {raw}");

        let message: ProtocolMessage = match serde_json::from_str(&raw) {
            Ok(message) => message,
            Err(err) => {
                // Protocol-malformed input is fatal for the connection.
                error!(target: "dap", "malformed message, closing connection: {err}");
                return;
            }
        };

        match message {
            ProtocolMessage::Request(request) => {
                let request_seq = request.seq;
                match request.command {
                    Command::Known(arguments) => {
                        let output = Arc::clone(output);
                        let queued = inbox.put(Box::new(move |handlers| {
                            dispatch_request(&output, request_seq, arguments, handlers);
                        }));
                        if !queued {
                            return;
                        }
                    }
                    Command::Unknown { command } => {
                        warn!(target: "dap", "unhandled command '{command}'");
                        let message = if known_command(&command) {
                            format!("invalid arguments for command '{command}'")
                        } else {
                            format!("unknown command '{command}'")
                        };
                        let output = Arc::clone(output);
                        let queued = inbox.put(Box::new(move |_| {
                            if let Err(err) = output.respond_err(request_seq, &command, &message) {
                                warn!(target: "dap", "failed to send error response: {err}");
                            }
                        }));
                        if !queued {
                            return;
                        }
                    }
                }
            }
            ProtocolMessage::Response(response) => {
                let Some(completion) = output.take_in_flight(response.request_seq) else {
                    error!(
                        target: "dap",
                        "response for unknown request_seq {}, closing connection",
                        response.request_seq
                    );
                    return;
                };
                let result = match (response.success, response.result) {
                    (true, ResponseResult::Success { body }) => Ok(body),
                    (_, ResponseResult::Error { message, .. }) => {
                        Err(SessionError::Remote(message))
                    }
                    (false, ResponseResult::Success { .. }) => {
                        Err(SessionError::Remote("request failed".to_string()))
                    }
                };
                completion(result);
            }
            ProtocolMessage::Event(event) => {
                let queued = inbox.put(Box::new(move |handlers| handlers.event(event.body)));
                if !queued {
                    return;
                }
            }
        }
    }
}

fn dispatch_request(
    output: &SessionOutput,
    request_seq: i64,
    arguments: RequestArguments,
    handlers: &mut dyn Handlers,
) {
    let command = arguments.command();
    match handlers.request(arguments) {
        Ok(body) => {
            if let Err(err) = output.respond_ok(request_seq, &body) {
                warn!(target: "dap", "failed to send response: {err}");
                return;
            }
            handlers.response_sent(&body);
        }
        Err(err) => {
            debug!(target: "dap", "{command} failed: {err}");
            if let Err(err) = output.respond_err(request_seq, command, &err.0) {
                warn!(target: "dap", "failed to send error response: {err}");
            }
        }
    }
}
