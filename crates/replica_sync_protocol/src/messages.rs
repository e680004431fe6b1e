//! Protocol messages for sync.

use crate::entry::Entry;
use replica_codec::{Cbor, CodecError, CodecResult, FromCbor, ToCbor};
use std::fmt;

fn code_field(item: &Cbor, name: &str) -> CodecResult<u8> {
    item.get(name)
        .and_then(Cbor::as_integer)
        .and_then(|code| u8::try_from(code).ok())
        .ok_or_else(|| CodecError::missing_field(name))
}

fn unknown_code(what: &str, code: u8) -> CodecError {
    CodecError::invalid_structure(format!("unknown {what} code {code}"))
}

/// Control actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    /// Liveness check.
    Ping,
    /// Cancel every active session on the receiver.
    Shutdown,
}

impl ControlAction {
    /// Returns the wire code.
    pub fn to_code(self) -> u8 {
        match self {
            ControlAction::Ping => 0,
            ControlAction::Shutdown => 1,
        }
    }

    /// Parses a wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ControlAction::Ping),
            1 => Some(ControlAction::Shutdown),
            _ => None,
        }
    }
}

/// Unary control request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlMessage {
    /// Requested action.
    pub action: ControlAction,
}

impl ControlMessage {
    /// A ping.
    pub fn ping() -> Self {
        Self {
            action: ControlAction::Ping,
        }
    }

    /// A shutdown request.
    pub fn shutdown() -> Self {
        Self {
            action: ControlAction::Shutdown,
        }
    }
}

impl ToCbor for ControlMessage {
    fn to_cbor(&self) -> Cbor {
        Cbor::text_map([("action", Cbor::from(self.action.to_code()))])
    }
}

impl FromCbor for ControlMessage {
    fn from_cbor(item: &Cbor) -> CodecResult<Self> {
        let code = code_field(item, "action")?;
        let action = ControlAction::from_code(code).ok_or_else(|| unknown_code("action", code))?;
        Ok(Self { action })
    }
}

/// Outcome of a control or push call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    /// Success.
    Ok,
    /// Failure; the reply message says why.
    Error,
}

impl ReplyStatus {
    /// Returns the wire code.
    pub fn to_code(self) -> u8 {
        match self {
            ReplyStatus::Ok => 0,
            ReplyStatus::Error => 1,
        }
    }

    /// Parses a wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ReplyStatus::Ok),
            1 => Some(ReplyStatus::Error),
            _ => None,
        }
    }
}

/// Reply to a control or push call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlReply {
    /// Status.
    pub status: ReplyStatus,
    /// Optional human-readable detail.
    pub message: Option<String>,
}

impl ControlReply {
    /// A successful reply.
    pub fn ok() -> Self {
        Self {
            status: ReplyStatus::Ok,
            message: None,
        }
    }

    /// A failed reply.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Error,
            message: Some(message.into()),
        }
    }

    /// Returns true for `Ok` replies.
    pub fn is_ok(&self) -> bool {
        self.status == ReplyStatus::Ok
    }
}

impl ToCbor for ControlReply {
    fn to_cbor(&self) -> Cbor {
        let mut pairs = vec![("status", Cbor::from(self.status.to_code()))];
        if let Some(message) = &self.message {
            pairs.push(("message", Cbor::from(message.as_str())));
        }
        Cbor::text_map(pairs)
    }
}

impl FromCbor for ControlReply {
    fn from_cbor(item: &Cbor) -> CodecResult<Self> {
        let code = code_field(item, "status")?;
        let status = ReplyStatus::from_code(code).ok_or_else(|| unknown_code("status", code))?;
        let message = item
            .get("message")
            .and_then(Cbor::as_text)
            .map(str::to_string);
        Ok(Self { status, message })
    }
}

/// What a pull call streams back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullMode {
    /// Changes since the last pull.
    Changes,
    /// Full state after a baseline reset.
    Init,
    /// The server's session settings.
    Settings,
}

impl PullMode {
    /// Returns the wire code.
    pub fn to_code(self) -> u8 {
        match self {
            PullMode::Changes => 0,
            PullMode::Init => 1,
            PullMode::Settings => 2,
        }
    }

    /// Parses a wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(PullMode::Changes),
            1 => Some(PullMode::Init),
            2 => Some(PullMode::Settings),
            _ => None,
        }
    }
}

/// Pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullRequest {
    /// Requested mode.
    pub mode: PullMode,
}

impl PullRequest {
    /// Creates a pull request.
    pub fn new(mode: PullMode) -> Self {
        Self { mode }
    }
}

impl ToCbor for PullRequest {
    fn to_cbor(&self) -> Cbor {
        Cbor::text_map([("mode", Cbor::from(self.mode.to_code()))])
    }
}

impl FromCbor for PullRequest {
    fn from_cbor(item: &Cbor) -> CodecResult<Self> {
        let code = code_field(item, "mode")?;
        let mode = PullMode::from_code(code).ok_or_else(|| unknown_code("mode", code))?;
        Ok(Self { mode })
    }
}

/// The four remote calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Unary control.
    Control,
    /// Server-streamed pull.
    Pull,
    /// Client-streamed push.
    Push,
    /// Bidirectional replication.
    PushPull,
}

impl CallKind {
    /// Returns the wire code.
    pub fn to_code(self) -> u8 {
        match self {
            CallKind::Control => 0,
            CallKind::Pull => 1,
            CallKind::Push => 2,
            CallKind::PushPull => 3,
        }
    }

    /// Parses a wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(CallKind::Control),
            1 => Some(CallKind::Pull),
            2 => Some(CallKind::Push),
            3 => Some(CallKind::PushPull),
            _ => None,
        }
    }
}

/// Status classification of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// The call was cancelled by either side.
    Canceled,
    /// The peer could not be reached.
    Unavailable,
    /// The call did not finish in time.
    DeadlineExceeded,
    /// The request was malformed or could not be applied.
    InvalidArgument,
    /// Anything else.
    Internal,
}

impl StatusCode {
    /// Returns the wire code.
    pub fn to_code(self) -> u8 {
        match self {
            StatusCode::Canceled => 1,
            StatusCode::Unavailable => 2,
            StatusCode::DeadlineExceeded => 3,
            StatusCode::InvalidArgument => 4,
            StatusCode::Internal => 5,
        }
    }

    /// Parses a wire code. Unknown codes map to `Internal`.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => StatusCode::Canceled,
            2 => StatusCode::Unavailable,
            3 => StatusCode::DeadlineExceeded,
            4 => StatusCode::InvalidArgument,
            _ => StatusCode::Internal,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusCode::Canceled => "canceled",
            StatusCode::Unavailable => "unavailable",
            StatusCode::DeadlineExceeded => "deadline exceeded",
            StatusCode::InvalidArgument => "invalid argument",
            StatusCode::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Envelope for stream transports.
///
/// A call opens with `Call`, then carries the call's request and stream frames.
/// Streams close with `End`; failures travel as `Status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Opens a call.
    Call(CallKind),
    /// Control request.
    Control(ControlMessage),
    /// Control or push reply.
    ControlReply(ControlReply),
    /// Pull request.
    Pull(PullRequest),
    /// One streamed change record.
    Entry(Entry),
    /// Clean end of a stream.
    End,
    /// Call failure.
    Status {
        /// Classification.
        code: StatusCode,
        /// Detail.
        message: String,
    },
}

impl Frame {
    /// Returns the frame type code.
    pub fn type_code(&self) -> u8 {
        match self {
            Frame::Call(_) => 1,
            Frame::Control(_) => 2,
            Frame::ControlReply(_) => 3,
            Frame::Pull(_) => 4,
            Frame::Entry(_) => 5,
            Frame::End => 6,
            Frame::Status { .. } => 7,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Frame::Call(_) => "call",
            Frame::Control(_) => "control",
            Frame::ControlReply(_) => "control_reply",
            Frame::Pull(_) => "pull",
            Frame::Entry(_) => "entry",
            Frame::End => "end",
            Frame::Status { .. } => "status",
        }
    }
}

impl ToCbor for Frame {
    fn to_cbor(&self) -> Cbor {
        let mut pairs = vec![("type", Cbor::from(self.type_code()))];
        match self {
            Frame::Call(kind) => pairs.push(("call", Cbor::from(kind.to_code()))),
            Frame::Control(message) => pairs.push(("body", message.to_cbor())),
            Frame::ControlReply(reply) => pairs.push(("body", reply.to_cbor())),
            Frame::Pull(request) => pairs.push(("body", request.to_cbor())),
            Frame::Entry(entry) => pairs.push(("body", entry.to_cbor())),
            Frame::End => {}
            Frame::Status { code, message } => {
                pairs.push(("code", Cbor::from(code.to_code())));
                pairs.push(("message", Cbor::from(message.as_str())));
            }
        }
        Cbor::text_map(pairs)
    }
}

impl FromCbor for Frame {
    fn from_cbor(item: &Cbor) -> CodecResult<Self> {
        let body = || {
            item.get("body")
                .ok_or_else(|| CodecError::missing_field("body"))
        };
        let frame = match code_field(item, "type")? {
            1 => {
                let code = code_field(item, "call")?;
                Frame::Call(CallKind::from_code(code).ok_or_else(|| unknown_code("call", code))?)
            }
            2 => Frame::Control(ControlMessage::from_cbor(body()?)?),
            3 => Frame::ControlReply(ControlReply::from_cbor(body()?)?),
            4 => Frame::Pull(PullRequest::from_cbor(body()?)?),
            5 => Frame::Entry(Entry::from_cbor(body()?)?),
            6 => Frame::End,
            7 => Frame::Status {
                code: StatusCode::from_code(code_field(item, "code")?),
                message: item
                    .get("message")
                    .and_then(Cbor::as_text)
                    .unwrap_or_default()
                    .to_string(),
            },
            other => return Err(unknown_code("frame type", other)),
        };
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Key;

    #[test]
    fn control_messages_round_trip() {
        for message in [ControlMessage::ping(), ControlMessage::shutdown()] {
            assert_eq!(ControlMessage::decode(&message.encode()).unwrap(), message);
        }
    }

    #[test]
    fn reply_message_is_optional() {
        let ok = ControlReply::ok();
        let decoded = ControlReply::decode(&ok.encode()).unwrap();
        assert!(decoded.is_ok());
        assert_eq!(decoded.message, None);

        let failed = ControlReply::error("2 entries failed");
        let decoded = ControlReply::decode(&failed.encode()).unwrap();
        assert_eq!(decoded.status, ReplyStatus::Error);
        assert_eq!(decoded.message.as_deref(), Some("2 entries failed"));
    }

    #[test]
    fn unknown_codes_are_rejected() {
        let bad = Cbor::text_map([("mode", Cbor::from(9u8))]);
        assert!(PullRequest::from_cbor(&bad).is_err());
        let bad = Cbor::text_map([("type", Cbor::from(42u8))]);
        assert!(Frame::from_cbor(&bad).is_err());
    }

    #[test]
    fn frames_round_trip() {
        let frames = vec![
            Frame::Call(CallKind::PushPull),
            Frame::Control(ControlMessage::ping()),
            Frame::ControlReply(ControlReply::error("nope")),
            Frame::Pull(PullRequest::new(PullMode::Settings)),
            Frame::Entry(Entry::set(vec![Key::new("Doc"), Key::new("n")], 7i64)),
            Frame::End,
            Frame::Status {
                code: StatusCode::Unavailable,
                message: "peer gone".into(),
            },
        ];
        for frame in frames {
            let decoded = Frame::decode(&frame.encode()).unwrap();
            assert_eq!(decoded.type_code(), frame.type_code());
            assert_eq!(decoded, frame);
        }
    }

    #[test]
    fn unknown_status_code_is_internal() {
        assert_eq!(StatusCode::from_code(200), StatusCode::Internal);
    }
}
