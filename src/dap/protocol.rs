//! DAP message envelopes and the typed command registry.
//!
//! The serde derives on [`RequestArguments`], [`ResponseBody`] and
//! [`EventBody`] are the single source of truth for the wire shape: the
//! `command`/`event` tag is the registry key, the adjacent `arguments`/`body`
//! field is the payload.

use serde::{Deserialize, Serialize};

use crate::dap::types::*;

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProtocolMessage {
    Request(Request),
    Response(Response),
    Event(Event),
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Request {
    pub seq: i64,
    #[serde(flatten)]
    pub command: Command,
}

/// A request command: either one we know how to decode, or the raw command
/// name when the registry has no entry (or the arguments did not parse).
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum Command {
    Known(RequestArguments),
    Unknown { command: String },
}

#[allow(non_camel_case_types)]
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "command", content = "arguments")]
pub enum RequestArguments {
    initialize(InitializeRequestArguments),
    launch(Option<LaunchRequestArguments>),
    configurationDone(Option<NoArguments>),
    setBreakpoints(SetBreakpointsArguments),
    setFunctionBreakpoints(SetFunctionBreakpointsArguments),
    setExceptionBreakpoints(SetExceptionBreakpointsArguments),
    threads(Option<NoArguments>),
    stackTrace(StackTraceArguments),
    scopes(ScopesArguments),
    variables(VariablesArguments),
    source(SourceArguments),
    pause(PauseArguments),
    #[serde(rename = "continue")]
    continue_(ContinueArguments),
    next(NextArguments),
    stepIn(StepInArguments),
    stepOut(StepOutArguments),
    evaluate(EvaluateArguments),
    disconnect(Option<DisconnectArguments>),
    // Reverse request, sent by the adapter to the client.
    runInTerminal(RunInTerminalRequestArguments),
}

impl RequestArguments {
    /// Wire name of the command, used when reporting handler errors.
    pub fn command(&self) -> &'static str {
        match self {
            RequestArguments::initialize(_) => "initialize",
            RequestArguments::launch(_) => "launch",
            RequestArguments::configurationDone(_) => "configurationDone",
            RequestArguments::setBreakpoints(_) => "setBreakpoints",
            RequestArguments::setFunctionBreakpoints(_) => "setFunctionBreakpoints",
            RequestArguments::setExceptionBreakpoints(_) => "setExceptionBreakpoints",
            RequestArguments::threads(_) => "threads",
            RequestArguments::stackTrace(_) => "stackTrace",
            RequestArguments::scopes(_) => "scopes",
            RequestArguments::variables(_) => "variables",
            RequestArguments::source(_) => "source",
            RequestArguments::pause(_) => "pause",
            RequestArguments::continue_(_) => "continue",
            RequestArguments::next(_) => "next",
            RequestArguments::stepIn(_) => "stepIn",
            RequestArguments::stepOut(_) => "stepOut",
            RequestArguments::evaluate(_) => "evaluate",
            RequestArguments::disconnect(_) => "disconnect",
            RequestArguments::runInTerminal(_) => "runInTerminal",
        }
    }
}

/// Whether `command` names a registered request type. Distinguishes an
/// unknown command from a known command with malformed arguments.
pub fn known_command(command: &str) -> bool {
    matches!(
        command,
        "initialize"
            | "launch"
            | "configurationDone"
            | "setBreakpoints"
            | "setFunctionBreakpoints"
            | "setExceptionBreakpoints"
            | "threads"
            | "stackTrace"
            | "scopes"
            | "variables"
            | "source"
            | "pause"
            | "continue"
            | "next"
            | "stepIn"
            | "stepOut"
            | "evaluate"
            | "disconnect"
            | "runInTerminal"
    )
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Response {
    pub seq: i64,
    pub request_seq: i64,
    pub success: bool,
    #[serde(flatten)]
    pub result: ResponseResult,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum ResponseResult {
    Success {
        #[serde(flatten)]
        body: ResponseBody,
    },
    Error {
        command: String,
        message: String,
    },
}

#[allow(non_camel_case_types)]
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "command", content = "body")]
pub enum ResponseBody {
    initialize(Capabilities),
    launch,
    configurationDone,
    setBreakpoints(SetBreakpointsResponseBody),
    setFunctionBreakpoints(SetBreakpointsResponseBody),
    setExceptionBreakpoints,
    threads(ThreadsResponseBody),
    stackTrace(StackTraceResponseBody),
    scopes(ScopesResponseBody),
    variables(VariablesResponseBody),
    source(SourceResponseBody),
    pause,
    #[serde(rename = "continue")]
    continue_(ContinueResponseBody),
    next,
    stepIn,
    stepOut,
    evaluate(EvaluateResponseBody),
    disconnect,
    runInTerminal(RunInTerminalResponseBody),
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Event {
    pub seq: i64,
    #[serde(flatten)]
    pub body: EventBody,
}

#[allow(non_camel_case_types)]
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "event", content = "body")]
pub enum EventBody {
    initialized,
    stopped(StoppedEventBody),
    thread(ThreadEventBody),
    output(OutputEventBody),
    terminated(Option<TerminatedEventBody>),
}

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! assert_matches {
        ($e:expr, $p:pat) => {
            let e = $e;
            assert!(matches!(e, $p), "{e:?} !~ {}", stringify!($p))
        };
    }

    fn parse(raw: &str) -> ProtocolMessage {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn parses_initialize_request() {
        let msg = parse(
            r#"{"seq":1,"type":"request","command":"initialize","arguments":{"clientID":"vscode","adapterID":"shaderdap","linesStartAt1":true}}"#,
        );
        let ProtocolMessage::Request(request) = msg else {
            panic!("not a request");
        };
        assert_eq!(request.seq, 1);
        let Command::Known(RequestArguments::initialize(args)) = request.command else {
            panic!("not initialize");
        };
        assert_eq!(args.client_id.as_deref(), Some("vscode"));
        assert_eq!(args.lines_start_at1, Some(true));
    }

    #[test]
    fn parses_continue_despite_keyword_name() {
        let msg = parse(
            r#"{"seq":4,"type":"request","command":"continue","arguments":{"threadId":2}}"#,
        );
        assert_matches!(
            msg,
            ProtocolMessage::Request(Request {
                command: Command::Known(RequestArguments::continue_(ContinueArguments {
                    thread_id: 2,
                    ..
                })),
                ..
            })
        );
    }

    #[test]
    fn request_without_arguments_parses_to_none() {
        let msg = parse(r#"{"seq":3,"type":"request","command":"configurationDone"}"#);
        assert_matches!(
            msg,
            ProtocolMessage::Request(Request {
                command: Command::Known(RequestArguments::configurationDone(None)),
                ..
            })
        );
    }

    #[test]
    fn unregistered_command_parses_as_unknown() {
        let msg = parse(r#"{"seq":9,"type":"request","command":"readMemory"}"#);
        let ProtocolMessage::Request(request) = msg else {
            panic!("not a request");
        };
        assert_matches!(request.command, Command::Unknown { .. });
    }

    #[test]
    fn known_command_with_bad_arguments_degrades_to_unknown() {
        let msg = parse(
            r#"{"seq":9,"type":"request","command":"variables","arguments":{"variablesReference":"oops"}}"#,
        );
        let ProtocolMessage::Request(request) = msg else {
            panic!("not a request");
        };
        let Command::Unknown { command } = request.command else {
            panic!("expected fallback to Unknown");
        };
        assert_eq!(command, "variables");
        assert!(known_command(&command));
        assert!(!known_command("readMemory"));
    }

    #[test]
    fn success_response_serializes_command_and_body() {
        let response = ProtocolMessage::Response(Response {
            seq: 5,
            request_seq: 2,
            success: true,
            result: ResponseResult::Success {
                body: ResponseBody::threads(ThreadsResponseBody {
                    threads: vec![Thread {
                        id: 1,
                        name: "lane.0".into(),
                    }],
                }),
            },
        });
        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(encoded["type"], "response");
        assert_eq!(encoded["command"], "threads");
        assert_eq!(encoded["body"]["threads"][0]["name"], "lane.0");
    }

    #[test]
    fn empty_body_response_has_no_body_field() {
        let response = ProtocolMessage::Response(Response {
            seq: 5,
            request_seq: 2,
            success: true,
            result: ResponseResult::Success {
                body: ResponseBody::pause,
            },
        });
        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(encoded["command"], "pause");
        assert!(encoded.get("body").is_none());
    }

    #[test]
    fn error_response_round_trips() {
        let raw = r#"{"seq":7,"type":"response","request_seq":3,"success":false,"command":"stackTrace","message":"Thread 9 not found"}"#;
        let msg = parse(raw);
        let ProtocolMessage::Response(response) = msg else {
            panic!("not a response");
        };
        assert!(!response.success);
        let ResponseResult::Error { command, message } = response.result else {
            panic!("not an error result");
        };
        assert_eq!(command, "stackTrace");
        assert_eq!(message, "Thread 9 not found");
    }

    #[test]
    fn reverse_request_response_parses_with_typed_body() {
        let raw = r#"{"seq":1,"type":"response","request_seq":1,"success":true,"command":"runInTerminal","body":{"processId":42}}"#;
        let ProtocolMessage::Response(response) = parse(raw) else {
            panic!("not a response");
        };
        assert_matches!(
            response.result,
            ResponseResult::Success {
                body: ResponseBody::runInTerminal(RunInTerminalResponseBody {
                    process_id: Some(42),
                    ..
                })
            }
        );
    }

    #[test]
    fn events_round_trip() {
        let msg = parse(r#"{"seq":2,"type":"event","event":"initialized"}"#);
        assert_matches!(
            msg,
            ProtocolMessage::Event(Event {
                body: EventBody::initialized,
                ..
            })
        );

        let stopped = ProtocolMessage::Event(Event {
            seq: 3,
            body: EventBody::stopped(StoppedEventBody {
                reason: StoppedEventReason::Breakpoint,
                description: None,
                thread_id: Some(1),
                all_threads_stopped: None,
            }),
        });
        let encoded = serde_json::to_value(&stopped).unwrap();
        assert_eq!(encoded["event"], "stopped");
        assert_eq!(encoded["body"]["reason"], "breakpoint");
        assert_eq!(encoded["body"]["threadId"], 1);
    }
}
