//! Events delivered to the host
//!
//! Until the session reaches RUNNING only the local stream and errors get
//! through; everything else is dropped.

use crate::media::{CounterChange, LocalStream, RemoteTrack, StatsSample};
use fxlink_protocol::{JoinedPayload, ServerErrorKind};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Receiving end handed to the host; ends when the session is over
pub type EventStream = mpsc::UnboundedReceiver<SessionEvent>;

#[derive(Debug, Clone)]
pub enum SessionEvent {
    Joined(JoinedPayload),
    LocalStream(Arc<LocalStream>),
    Track(RemoteTrack),
    Start { remaining_seconds: Option<f64> },
    Ending,
    OtherJoined(Option<Value>),
    OtherLeft(Option<Value>),
    Files(Option<Value>),
    End(Option<Value>),
    Stats(StatsSample),
    Telemetry(CounterChange),
    Closed,
    Error(SessionFailure),
}

/// Why a session failed
#[derive(Debug, Clone, PartialEq)]
pub enum SessionFailure {
    /// Error reported by the server, forwarded verbatim
    Server {
        kind: ServerErrorKind,
        payload: Option<Value>,
    },
    /// Signaling closed by the server with an unexpected code
    Disconnection { code: Option<u16> },
    /// Stopped by the host with an abnormal close code
    Aborted { code: u16 },
    /// Signaling socket error
    Signaling(String),
    /// Local media could not be acquired or attached
    Media(String),
    /// Transport creation failed
    Transport(String),
    /// Offer could not be applied or answered
    Negotiation(String),
}

impl SessionFailure {
    pub fn kind(&self) -> &str {
        match self {
            SessionFailure::Server { kind, .. } => kind.as_kind(),
            SessionFailure::Disconnection { .. } => "error-disconnection",
            SessionFailure::Aborted { .. } => "error-aborted",
            SessionFailure::Signaling(_) => "error-signaling",
            SessionFailure::Media(_) => "error-media",
            SessionFailure::Transport(_) => "error-transport",
            SessionFailure::Negotiation(_) => "error-negotiation",
        }
    }
}

impl SessionEvent {
    pub fn kind(&self) -> &str {
        match self {
            SessionEvent::Joined(_) => "joined",
            SessionEvent::LocalStream(_) => "local-stream",
            SessionEvent::Track(_) => "track",
            SessionEvent::Start { .. } => "start",
            SessionEvent::Ending => "ending",
            SessionEvent::OtherJoined(_) => "other_joined",
            SessionEvent::OtherLeft(_) => "other_left",
            SessionEvent::Files(_) => "files",
            SessionEvent::End(_) => "end",
            SessionEvent::Stats(_) => "stats",
            SessionEvent::Telemetry(_) => "telemetry",
            SessionEvent::Closed => "closed",
            SessionEvent::Error(failure) => failure.kind(),
        }
    }

    /// Delivered even before the session is running
    pub fn is_forced(&self) -> bool {
        matches!(self, SessionEvent::LocalStream(_) | SessionEvent::Error(_))
    }
}

pub(crate) struct EventForwarder {
    tx: mpsc::UnboundedSender<SessionEvent>,
    open: bool,
}

impl EventForwarder {
    pub(crate) fn new(tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { tx, open: false }
    }

    /// Let every event through from now on
    pub(crate) fn open(&mut self) {
        self.open = true;
    }

    pub(crate) fn forward(&self, event: SessionEvent) -> bool {
        if !self.open && !event.is_forced() {
            tracing::trace!("Dropping {} event before start", event.kind());
            return false;
        }
        if self.tx.send(event).is_err() {
            tracing::debug!("Event stream dropped by host");
            return false;
        }
        true
    }
}
