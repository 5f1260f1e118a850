//! Minimal DAP client used by the integration tests. Messages are built and
//! inspected as plain `serde_json` values, so the tests exercise the wire
//! format without touching the crate's own protocol types.

use anyhow::{Context as _, bail, ensure};
use serde_json::{Value, json};
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use shaderdap::dap::DapServer;
use shaderdap::debugger::Context;

const CONNECT_WINDOW: Duration = Duration::from_secs(3);
const RETRY_PAUSE: Duration = Duration::from_millis(20);
const SOCKET_TIMEOUT: Duration = Duration::from_secs(5);
const FRAME_DEADLINE: Duration = Duration::from_secs(15);

fn retryable(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

pub struct DapClient {
    sock: TcpStream,
    input: BufReader<TcpStream>,
    seq: i64,
    parked_events: Vec<Value>,
}

impl DapClient {
    pub fn connect(addr: SocketAddr) -> anyhow::Result<DapClient> {
        let give_up = Instant::now() + CONNECT_WINDOW;
        let sock = loop {
            match TcpStream::connect(addr) {
                Ok(sock) => break sock,
                Err(err) => {
                    if Instant::now() >= give_up {
                        bail!("no DAP server at {addr}: {err}");
                    }
                    thread::sleep(RETRY_PAUSE);
                }
            }
        };
        sock.set_read_timeout(Some(SOCKET_TIMEOUT))
            .context("set read timeout")?;
        sock.set_write_timeout(Some(SOCKET_TIMEOUT))
            .context("set write timeout")?;
        let input = BufReader::new(sock.try_clone()?);
        Ok(DapClient {
            sock,
            input,
            seq: 0,
            parked_events: Vec::new(),
        })
    }

    pub fn send_request(&mut self, command: &str, arguments: Value) -> anyhow::Result<i64> {
        self.seq += 1;
        let seq = self.seq;
        self.post(&json!({
            "seq": seq,
            "type": "request",
            "command": command,
            "arguments": arguments,
        }))?;
        Ok(seq)
    }

    /// Send a request and wait for its response in one go.
    pub fn request(&mut self, command: &str, arguments: Value) -> anyhow::Result<Value> {
        let seq = self.send_request(command, arguments)?;
        self.read_response(seq)
    }

    pub fn read_response(&mut self, request_seq: i64) -> anyhow::Result<Value> {
        loop {
            let message = self.read_message()?;
            match message["type"].as_str() {
                Some("response") if message["request_seq"] == request_seq => return Ok(message),
                Some("event") => self.parked_events.push(message),
                _ => {}
            }
        }
    }

    pub fn read_event(&mut self) -> anyhow::Result<Value> {
        if self.parked_events.is_empty() {
            loop {
                let message = self.read_message()?;
                if message["type"] == "event" {
                    return Ok(message);
                }
            }
        }
        Ok(self.parked_events.remove(0))
    }

    pub fn wait_for_event(&mut self, name: &str) -> anyhow::Result<Value> {
        loop {
            let event = self.read_event()?;
            if event["event"] == name {
                return Ok(event);
            }
        }
    }

    /// Next framed message of any type, in arrival order.
    pub fn read_message(&mut self) -> anyhow::Result<Value> {
        let give_up = Instant::now() + FRAME_DEADLINE;
        let length = self.frame_length(give_up)?;
        let mut body = vec![0u8; length];
        let mut filled = 0;
        while filled < length {
            match self.input.read(&mut body[filled..]) {
                Ok(0) => bail!("server closed the stream mid-frame"),
                Ok(n) => filled += n,
                Err(err) if retryable(&err) => {
                    ensure!(
                        Instant::now() < give_up,
                        "gave up waiting for a {length}-byte frame body"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(serde_json::from_slice(&body)?)
    }

    /// Consume header lines until the blank separator, returning the
    /// announced body length.
    fn frame_length(&mut self, give_up: Instant) -> anyhow::Result<usize> {
        let mut length = None;
        loop {
            let mut header = String::new();
            loop {
                match self.input.read_line(&mut header) {
                    Ok(0) => bail!("server closed the stream"),
                    Ok(_) => break,
                    Err(err) if retryable(&err) => {
                        ensure!(Instant::now() < give_up, "gave up waiting for a frame header");
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            match header.trim() {
                "" => {
                    if let Some(length) = length {
                        return Ok(length);
                    }
                }
                line => {
                    if let Some(rest) = line.strip_prefix("Content-Length:") {
                        length = Some(rest.trim().parse()?);
                    }
                }
            }
        }
    }

    pub fn write_raw(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        self.sock.write_all(bytes)?;
        self.sock.flush()?;
        Ok(())
    }

    fn post(&mut self, message: &Value) -> anyhow::Result<()> {
        let frame = serde_json::to_vec(message)?;
        write!(self.sock, "Content-Length: {}\r\n\r\n", frame.len())?;
        self.sock.write_all(&frame)?;
        self.sock.flush()?;
        Ok(())
    }
}

/// An in-process server plus a connected client, torn down on drop.
pub struct TestSession {
    pub ctx: Arc<Context>,
    pub server: DapServer,
    pub client: DapClient,
}

impl TestSession {
    pub fn start() -> anyhow::Result<TestSession> {
        let ctx = Context::new();
        let server = DapServer::bind(Arc::clone(&ctx), "127.0.0.1:0".parse()?)?;
        let client = DapClient::connect(server.local_addr())?;
        Ok(TestSession {
            ctx,
            server,
            client,
        })
    }

    /// Run the initialize handshake and assert its shape.
    pub fn initialize(&mut self) -> anyhow::Result<()> {
        let response = self
            .client
            .request("initialize", json!({ "adapterID": "shaderdap" }))?;
        assert_response(&response, "initialize", true);
        let capabilities = &response["body"];
        assert_eq!(capabilities["supportsFunctionBreakpoints"], true);
        assert_eq!(capabilities["supportsConfigurationDoneRequest"], true);
        self.client.wait_for_event("initialized")?;
        Ok(())
    }
}

pub fn assert_response(response: &Value, command: &str, success: bool) {
    assert_eq!(
        response.get("type").and_then(Value::as_str),
        Some("response"),
        "not a response: {response}"
    );
    assert_eq!(
        response.get("command").and_then(Value::as_str),
        Some(command),
        "unexpected command: {response}"
    );
    assert_eq!(
        response.get("success").and_then(Value::as_bool),
        Some(success),
        "unexpected success flag: {response}"
    );
    assert!(
        response.get("seq").and_then(Value::as_i64).is_some(),
        "response without seq: {response}"
    );
}
