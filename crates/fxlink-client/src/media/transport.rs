//! Media transport seam
//!
//! The session drives negotiation through [`MediaTransport`] and learns about
//! the transport through [`TransportEvent`]s. `WebRtcTransport` is the
//! production implementation; tests script their own.

use super::source::LocalStream;
use super::stats::TransportStats;
use crate::error::TransportError;
use async_trait::async_trait;
use fxlink_protocol::{IceCandidatePayload, IceServer, MediaKind, SessionDescription, VideoFormat};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc::track::track_remote::TrackRemote;

/// Transport configuration derived from the `joined` acknowledgment
#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    pub ice_servers: Vec<IceServer>,
    /// Video codec to register first, when codec preference is enabled
    pub preferred_video: Option<VideoFormat>,
}

/// Remote track announced by the transport
#[derive(Clone)]
pub struct RemoteTrack {
    pub kind: MediaKind,
    pub track_id: String,
    pub stream_id: String,
    /// Underlying RTP track, absent for transports without one
    pub track: Option<Arc<TrackRemote>>,
}

impl fmt::Debug for RemoteTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTrack")
            .field("kind", &self.kind)
            .field("track_id", &self.track_id)
            .field("stream_id", &self.stream_id)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Local candidate to relay to the server
    LocalCandidate(IceCandidatePayload),
    RemoteTrack(RemoteTrack),
    ConnectionState(String),
    SignalingState(String),
    IceConnectionState(String),
    IceGatheringState(String),
    SelectedCandidatePair(String),
}

pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;

#[async_trait]
pub trait MediaTransport: Send + Sync {
    async fn add_local_tracks(&self, stream: Arc<LocalStream>) -> Result<(), TransportError>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), TransportError>;

    async fn create_answer(&self) -> Result<SessionDescription, TransportError>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), TransportError>;

    async fn add_ice_candidate(&self, candidate: IceCandidatePayload) -> Result<(), TransportError>;

    /// Cap the outbound bitrate of every local track of `kind`
    async fn set_max_bitrate(&self, kind: MediaKind, bps: u32) -> Result<(), TransportError>;

    async fn stats(&self) -> Result<TransportStats, TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}

/// Builds one transport per session
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(
        &self,
        config: TransportConfig,
        events: TransportEventSender,
    ) -> Result<Arc<dyn MediaTransport>, TransportError>;
}
