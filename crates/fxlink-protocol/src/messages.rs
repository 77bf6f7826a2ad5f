use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;

use crate::control::{ControlCommand, PolyControlCommand};
use crate::error::ProtocolError;
use crate::join::JoinPayload;
use crate::types::{IceCandidatePayload, JoinedPayload, SessionDescription};

/// WebSocket close codes used by the session
pub mod close_code {
    /// Regular end of session
    pub const NORMAL: u16 = 1000;
    /// Peer went away (page unload, server shutdown)
    pub const GOING_AWAY: u16 = 1001;
    /// Client-initiated abort, lets the server release resources immediately
    pub const CLIENT_ERROR: u16 = 4000;

    /// Whether a close code received from the server is an orderly closure
    pub fn is_normal(code: u16) -> bool {
        code == NORMAL || code == GOING_AWAY
    }
}

/// Raw `{kind, payload}` frame as it travels over the signaling socket
///
/// Outbound payloads are always JSON text. Inbound payloads may be JSON text
/// or an inline JSON value depending on the message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Envelope {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: None,
        }
    }

    /// Attach a text payload; empty text is left off the frame entirely
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        if !text.is_empty() {
            self.payload = Some(Value::String(text));
        }
        self
    }

    /// Decode the payload as `T`, unwrapping the inner JSON text if needed
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        let payload = self
            .payload
            .as_ref()
            .ok_or_else(|| ProtocolError::MissingPayload(self.kind.clone()))?;
        let result = match payload {
            Value::String(text) => serde_json::from_str(text),
            other => T::deserialize(other.clone()),
        };
        result.map_err(|source| ProtocolError::Payload {
            kind: self.kind.clone(),
            source,
        })
    }

    /// Payload as a JSON value for verbatim forwarding
    ///
    /// Text that is not itself JSON is returned as a JSON string.
    pub fn payload_value(&self) -> Option<Value> {
        match self.payload.as_ref()? {
            Value::String(text) => {
                Some(serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone())))
            }
            other => Some(other.clone()),
        }
    }
}

/// Error kinds the server may report, each forces the session down
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServerErrorKind {
    /// `error`
    Generic,
    /// `error-join`: the join payload was rejected
    Join,
    /// `error-duplicate`: this user is already connected to the interaction
    Duplicate,
    /// `error-full`: the interaction has no free seat
    Full,
    /// `error-peer-connection`: the server could not create its side of the transport
    PeerConnection,
    /// Any other `error`-prefixed kind, kept verbatim
    Other(String),
}

impl ServerErrorKind {
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            "error" => Some(ServerErrorKind::Generic),
            "error-join" => Some(ServerErrorKind::Join),
            "error-duplicate" => Some(ServerErrorKind::Duplicate),
            "error-full" => Some(ServerErrorKind::Full),
            "error-peer-connection" => Some(ServerErrorKind::PeerConnection),
            other if other.starts_with("error") => Some(ServerErrorKind::Other(other.to_string())),
            _ => None,
        }
    }

    /// Kind string exactly as the server sent it
    pub fn as_kind(&self) -> &str {
        match self {
            ServerErrorKind::Generic => "error",
            ServerErrorKind::Join => "error-join",
            ServerErrorKind::Duplicate => "error-duplicate",
            ServerErrorKind::Full => "error-full",
            ServerErrorKind::PeerConnection => "error-peer-connection",
            ServerErrorKind::Other(kind) => kind,
        }
    }

    /// Whether joining again with the same payload can succeed later
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ServerErrorKind::Join | ServerErrorKind::Duplicate)
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Join accepted, carries relay configuration
    Joined(JoinedPayload),
    /// Server offer, answered by the client
    Offer(SessionDescription),
    /// Remote transport candidate
    Candidate(IceCandidatePayload),
    /// Interaction started; payload is the remaining time in seconds
    Start { remaining_seconds: Option<f64> },
    /// Interaction is about to end
    Ending,
    /// Another participant joined
    OtherJoined(Option<Value>),
    /// Another participant left
    OtherLeft(Option<Value>),
    /// Recorded files notice
    Files(Option<Value>),
    /// Interaction finished, carries the recorded files
    End(Option<Value>),
    /// Server-side failure
    Error {
        kind: ServerErrorKind,
        payload: Option<Value>,
    },
    /// Kind this client does not know about
    Unknown { kind: String },
}

impl ServerMessage {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text).map_err(ProtocolError::Envelope)?;
        Self::from_envelope(envelope)
    }

    pub fn from_envelope(envelope: Envelope) -> Result<Self, ProtocolError> {
        let message = match envelope.kind.as_str() {
            "joined" => match envelope.payload {
                Some(_) => ServerMessage::Joined(envelope.decode_payload()?),
                None => ServerMessage::Joined(JoinedPayload::default()),
            },
            "offer" => ServerMessage::Offer(envelope.decode_payload()?),
            "candidate" => ServerMessage::Candidate(envelope.decode_payload()?),
            "start" => ServerMessage::Start {
                remaining_seconds: envelope.payload_value().and_then(|v| v.as_f64()),
            },
            "ending" => ServerMessage::Ending,
            "other_joined" => ServerMessage::OtherJoined(envelope.payload_value()),
            "other_left" => ServerMessage::OtherLeft(envelope.payload_value()),
            "files" => ServerMessage::Files(envelope.payload_value()),
            "end" => ServerMessage::End(envelope.payload_value()),
            kind => match ServerErrorKind::from_kind(kind) {
                Some(kind) => ServerMessage::Error {
                    kind,
                    payload: envelope.payload_value(),
                },
                None => ServerMessage::Unknown {
                    kind: kind.to_string(),
                },
            },
        };
        Ok(message)
    }

    pub fn kind(&self) -> &str {
        match self {
            ServerMessage::Joined(_) => "joined",
            ServerMessage::Offer(_) => "offer",
            ServerMessage::Candidate(_) => "candidate",
            ServerMessage::Start { .. } => "start",
            ServerMessage::Ending => "ending",
            ServerMessage::OtherJoined(_) => "other_joined",
            ServerMessage::OtherLeft(_) => "other_left",
            ServerMessage::Files(_) => "files",
            ServerMessage::End(_) => "end",
            ServerMessage::Error { kind, .. } => kind.as_kind(),
            ServerMessage::Unknown { kind } => kind,
        }
    }
}

/// A `client_*` diagnostic line reported to the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Name without the `client_` prefix
    pub name: String,
    pub detail: Option<String>,
}

impl Diagnostic {
    pub fn new(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            detail: Some(detail.into()),
        }
    }

    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            detail: None,
        }
    }
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// First and only unsolicited message
    Join(JoinPayload),
    /// Answer to the server offer, after post-processing
    Answer(SessionDescription),
    /// Local transport candidate
    Candidate(IceCandidatePayload),
    /// Numeric or text effect control
    Control(ControlCommand),
    /// Typed effect control with a stringified value
    PolyControl(PolyControlCommand),
    /// Release server resources before closing the socket
    Stop,
    /// Client-side telemetry and transport state
    Diagnostic(Diagnostic),
    /// Free-form line logged by the embedding host
    HostLog { kind: String, payload: Option<String> },
}

impl ClientMessage {
    pub fn kind(&self) -> Cow<'_, str> {
        match self {
            ClientMessage::Join(_) => Cow::Borrowed("join"),
            ClientMessage::Answer(_) => Cow::Borrowed("answer"),
            ClientMessage::Candidate(_) => Cow::Borrowed("candidate"),
            ClientMessage::Control(_) => Cow::Borrowed("client_control"),
            ClientMessage::PolyControl(_) => Cow::Borrowed("client_polycontrol"),
            ClientMessage::Stop => Cow::Borrowed("stop"),
            ClientMessage::Diagnostic(d) => Cow::Owned(format!("client_{}", d.name)),
            ClientMessage::HostLog { kind, .. } => Cow::Owned(format!("ext_{}", kind)),
        }
    }

    pub fn to_envelope(&self) -> Result<Envelope, ProtocolError> {
        let envelope = Envelope::new(self.kind());
        let payload = match self {
            ClientMessage::Join(payload) => Some(self.encode(payload)?),
            ClientMessage::Answer(desc) => Some(self.encode(desc)?),
            ClientMessage::Candidate(candidate) => Some(self.encode(candidate)?),
            ClientMessage::Control(cmd) => Some(self.encode(cmd)?),
            ClientMessage::PolyControl(cmd) => Some(self.encode(cmd)?),
            ClientMessage::Stop => None,
            ClientMessage::Diagnostic(d) => d.detail.clone(),
            ClientMessage::HostLog { payload, .. } => payload.clone(),
        };
        Ok(match payload {
            Some(text) => envelope.with_text(text),
            None => envelope,
        })
    }

    /// Serialize to the text frame sent over the socket
    pub fn to_text(&self) -> Result<String, ProtocolError> {
        let envelope = self.to_envelope()?;
        serde_json::to_string(&envelope).map_err(|source| ProtocolError::Encode {
            kind: envelope.kind.clone(),
            source,
        })
    }

    fn encode<T: Serialize>(&self, payload: &T) -> Result<String, ProtocolError> {
        serde_json::to_string(payload).map_err(|source| ProtocolError::Encode {
            kind: self.kind().into_owned(),
            source,
        })
    }
}
