use fxlink_protocol::JoinError;
use thiserror::Error;

/// Errors surfaced synchronously when starting a session
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    InvalidOptions(#[from] JoinError),

    #[error("Signaling URL is not configured")]
    MissingSignalingUrl,

    #[error("Signaling connection failed: {0}")]
    Signaling(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

/// Errors from the media transport
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("WebRTC error: {0}")]
    WebRtc(#[from] webrtc::Error),

    #[error("Unsupported description type: {0}")]
    UnsupportedDescription(String),

    #[error("{0}")]
    Other(String),
}
