//! fxlink client library
//!
//! Joins a live audio/video effects session: signaling over a WebSocket,
//! media over WebRTC, live effect controls and transport telemetry.
//! [`SessionBuilder`] is the entry point.

pub mod config;
pub mod error;
pub mod events;
pub mod media;
pub mod network;
pub mod session;

pub use config::{ClientConfig, SessionConfig};
pub use error::{SessionError, TransportError};
pub use events::{EventStream, SessionEvent, SessionFailure};
pub use session::{SessionBuilder, SessionHandle, SessionState};
