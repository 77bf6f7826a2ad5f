//! Signaling protocol shared between the fxlink client and the media server.
//!
//! Every frame on the signaling socket is a `{kind, payload}` envelope whose
//! payload is itself JSON text. This crate owns the typed view of those frames,
//! the join parameters and their normalization, and live effect controls.

pub mod control;
pub mod error;
pub mod join;
pub mod messages;
pub mod types;

pub use control::{ControlCommand, ControlValue, PolyControlCommand, PropertyKind};
pub use error::{ControlError, JoinError, ProtocolError};
pub use join::{JoinOptions, JoinPayload, RecordingMode, VideoFormat};
pub use messages::{
    close_code, ClientMessage, Diagnostic, Envelope, ServerErrorKind, ServerMessage,
};
pub use types::{IceCandidatePayload, IceServer, JoinedPayload, MediaKind, SdpType, SessionDescription};
