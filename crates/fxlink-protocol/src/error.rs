use thiserror::Error;

/// Failure to decode or encode a signaling frame
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed signaling envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("Missing payload for {0}")]
    MissingPayload(String),

    #[error("Invalid {kind} payload: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode {kind} message: {source}")]
    Encode {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Join options rejected before any connection is attempted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JoinError {
    #[error("invalid options: missing or invalid {0}")]
    InvalidField(&'static str),
}

/// Effect control rejected client-side
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("effect name must not be empty")]
    EmptyName,

    #[error("property must not be empty")]
    EmptyProperty,

    #[error("value must be a finite number or text")]
    InvalidValue,

    #[error("target user id must not be empty")]
    EmptyUserId,
}
