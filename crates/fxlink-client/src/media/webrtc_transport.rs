//! webrtc-rs transport
//!
//! Answers server offers with a single peer connection. Local tracks come
//! from the [`LocalStream`]; remote tracks and state changes are reported as
//! [`TransportEvent`]s.

use super::source::LocalStream;
use super::stats::{RtpDirection, RtpReport, TransportStats};
use super::transport::{
    MediaTransport, RemoteTrack, TransportConfig, TransportEvent, TransportEventSender,
    TransportFactory,
};
use crate::error::TransportError;
use async_trait::async_trait;
use fxlink_media::{opus_codec, prefer_codec, video_codecs};
use fxlink_protocol::{IceCandidatePayload, MediaKind, SdpType, SessionDescription};
use std::sync::Arc;
use tokio::sync::RwLock;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::stats::StatsReportType;

#[derive(Debug, Default, Clone, Copy)]
pub struct WebRtcTransportFactory;

#[async_trait]
impl TransportFactory for WebRtcTransportFactory {
    async fn create(
        &self,
        config: TransportConfig,
        events: TransportEventSender,
    ) -> Result<Arc<dyn MediaTransport>, TransportError> {
        Ok(Arc::new(WebRtcTransport::new(config, events).await?))
    }
}

pub struct WebRtcTransport {
    peer_connection: Arc<RTCPeerConnection>,
    local_stream: RwLock<Option<Arc<LocalStream>>>,
}

impl WebRtcTransport {
    pub async fn new(config: TransportConfig, events: TransportEventSender) -> Result<Self, TransportError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_codec(opus_codec(), RTPCodecType::Audio)?;

        let codecs = match config.preferred_video {
            Some(format) => prefer_codec(&video_codecs(), format.as_str()),
            None => video_codecs(),
        };
        for codec in codecs {
            media_engine.register_codec(codec, RTPCodecType::Video)?;
        }

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers: Vec<RTCIceServer> = config
            .ice_servers
            .into_iter()
            .map(|server| RTCIceServer {
                urls: server.urls,
                username: server.username.unwrap_or_default(),
                credential: server.credential.unwrap_or_default(),
                ..Default::default()
            })
            .collect();
        tracing::debug!("Creating peer connection with {} ICE servers", ice_servers.len());

        let peer_connection = Arc::new(
            api.new_peer_connection(RTCConfiguration {
                ice_servers,
                ..Default::default()
            })
            .await?,
        );

        Self::bind_events(&peer_connection, events);

        Ok(Self {
            peer_connection,
            local_stream: RwLock::new(None),
        })
    }

    fn bind_events(peer_connection: &RTCPeerConnection, events: TransportEventSender) {
        let tx = events.clone();
        peer_connection.on_ice_candidate(Box::new(move |candidate| {
            let tx = tx.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    return;
                };
                match candidate.to_json() {
                    Ok(json) => {
                        let _ = tx.send(TransportEvent::LocalCandidate(IceCandidatePayload {
                            candidate: json.candidate,
                            sdp_mid: json.sdp_mid,
                            sdp_mline_index: json.sdp_mline_index,
                            username_fragment: json.username_fragment,
                        }));
                    }
                    Err(e) => tracing::warn!("Failed to serialize local candidate: {}", e),
                }
            })
        }));

        let tx = events.clone();
        peer_connection.on_track(Box::new(move |track, _receiver, _transceiver| {
            let kind = match track.kind() {
                RTPCodecType::Audio => Some(MediaKind::Audio),
                RTPCodecType::Video => Some(MediaKind::Video),
                _ => None,
            };
            tracing::info!(
                "Remote track {} in stream {}, kind {:?}",
                track.id(),
                track.stream_id(),
                kind
            );
            if let Some(kind) = kind {
                let _ = tx.send(TransportEvent::RemoteTrack(RemoteTrack {
                    kind,
                    track_id: track.id().to_string(),
                    stream_id: track.stream_id().to_string(),
                    track: Some(track),
                }));
            }
            Box::pin(async {})
        }));

        let tx = events.clone();
        peer_connection.on_peer_connection_state_change(Box::new(move |state| {
            let _ = tx.send(TransportEvent::ConnectionState(state.to_string()));
            Box::pin(async {})
        }));

        let tx = events.clone();
        peer_connection.on_signaling_state_change(Box::new(move |state| {
            let _ = tx.send(TransportEvent::SignalingState(state.to_string()));
            Box::pin(async {})
        }));

        let tx = events.clone();
        peer_connection.on_ice_connection_state_change(Box::new(move |state| {
            let _ = tx.send(TransportEvent::IceConnectionState(state.to_string()));
            Box::pin(async {})
        }));

        let tx = events.clone();
        peer_connection.on_ice_gathering_state_change(Box::new(move |state| {
            let _ = tx.send(TransportEvent::IceGatheringState(state.to_string()));
            Box::pin(async {})
        }));

        let tx = events;
        peer_connection
            .sctp()
            .transport()
            .ice_transport()
            .on_selected_candidate_pair_change(Box::new(move |pair| {
                let _ = tx.send(TransportEvent::SelectedCandidatePair(pair.to_string()));
                Box::pin(async {})
            }));
    }
}

fn to_rtc(description: SessionDescription) -> Result<RTCSessionDescription, TransportError> {
    match description.sdp_type {
        SdpType::Offer => Ok(RTCSessionDescription::offer(description.sdp)?),
        SdpType::Answer => Ok(RTCSessionDescription::answer(description.sdp)?),
        SdpType::Pranswer => Ok(RTCSessionDescription::pranswer(description.sdp)?),
        SdpType::Rollback => Err(TransportError::UnsupportedDescription("rollback".to_string())),
    }
}

#[async_trait]
impl MediaTransport for WebRtcTransport {
    async fn add_local_tracks(&self, stream: Arc<LocalStream>) -> Result<(), TransportError> {
        for track in stream.tracks() {
            let sender = self.peer_connection.add_track(track.track()).await?;
            tracing::debug!("Added local {} track {}", track.kind(), track.id());

            // Drain RTCP so interceptors keep receiving feedback
            tokio::spawn(async move {
                let mut buf = vec![0u8; 1500];
                while sender.read(&mut buf).await.is_ok() {}
            });
        }
        *self.local_stream.write().await = Some(stream);
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), TransportError> {
        self.peer_connection
            .set_remote_description(to_rtc(description)?)
            .await?;
        Ok(())
    }

    async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        let answer = self.peer_connection.create_answer(None).await?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), TransportError> {
        self.peer_connection
            .set_local_description(to_rtc(description)?)
            .await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidatePayload) -> Result<(), TransportError> {
        self.peer_connection
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_mline_index,
                username_fragment: candidate.username_fragment,
            })
            .await?;
        Ok(())
    }

    async fn set_max_bitrate(&self, kind: MediaKind, bps: u32) -> Result<(), TransportError> {
        let guard = self.local_stream.read().await;
        let Some(stream) = guard.as_ref() else {
            return Err(TransportError::Other("no local tracks attached".to_string()));
        };
        for track in stream.tracks_of(kind) {
            track.set_bitrate_cap(bps);
        }
        Ok(())
    }

    async fn stats(&self) -> Result<TransportStats, TransportError> {
        let report = self.peer_connection.get_stats().await;
        let mut reports = Vec::new();

        for entry in report.reports.values() {
            match entry {
                StatsReportType::OutboundRTP(s) => {
                    if let Some(kind) = MediaKind::from_kind(&s.kind) {
                        reports.push(RtpReport {
                            pli_count: s.pli_count,
                            fir_count: s.fir_count,
                            ..RtpReport::outbound(kind, s.bytes_sent)
                        });
                    }
                }
                StatsReportType::InboundRTP(s) => {
                    if let Some(kind) = MediaKind::from_kind(&s.kind) {
                        reports.push(RtpReport {
                            pli_count: s.pli_count,
                            fir_count: s.fir_count,
                            ..RtpReport::inbound(kind, s.bytes_received)
                        });
                    }
                }
                StatsReportType::RemoteInboundRTP(s) => {
                    if let Some(kind) = MediaKind::from_kind(&s.kind) {
                        reports.push(RtpReport {
                            packets_lost: Some(s.packets_lost),
                            round_trip_time: s.round_trip_time,
                            ..RtpReport::new(RtpDirection::RemoteInbound, kind, 0)
                        });
                    }
                }
                _ => {}
            }
        }

        Ok(TransportStats { reports })
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.peer_connection.close().await?;
        tracing::info!("Peer connection closed");
        Ok(())
    }
}
