//! Codec utilities
//!
//! Registration order in the media engine is the order codecs appear in our
//! descriptions, so codec preference is expressed by reordering the list
//! before it is registered.

use fxlink_protocol::VideoFormat;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTCRtpCodecParameters};
use webrtc::rtp_transceiver::RTCPFeedback;

/// Baseline profile, level 3.1, packetization mode 1
const H264_FMTP: &str = "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f";

fn video_feedback() -> Vec<RTCPFeedback> {
    vec![
        RTCPFeedback {
            typ: "goog-remb".to_string(),
            parameter: String::new(),
        },
        RTCPFeedback {
            typ: "ccm".to_string(),
            parameter: "fir".to_string(),
        },
        RTCPFeedback {
            typ: "nack".to_string(),
            parameter: String::new(),
        },
        RTCPFeedback {
            typ: "nack".to_string(),
            parameter: "pli".to_string(),
        },
    ]
}

/// Capability used for a local track of the given format
pub fn video_capability(format: VideoFormat) -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: format.mime_type().to_string(),
        clock_rate: 90000,
        channels: 0,
        sdp_fmtp_line: match format {
            VideoFormat::Vp8 => String::new(),
            VideoFormat::H264 => H264_FMTP.to_string(),
        },
        rtcp_feedback: video_feedback(),
    }
}

pub fn opus_capability() -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: "audio/opus".to_string(),
        clock_rate: 48000,
        channels: 2,
        sdp_fmtp_line: "minptime=10;useinbandfec=1".to_string(),
        rtcp_feedback: vec![],
    }
}

pub fn opus_codec() -> RTCRtpCodecParameters {
    RTCRtpCodecParameters {
        capability: opus_capability(),
        payload_type: 111,
        ..Default::default()
    }
}

/// Video codecs we can negotiate, in default order
pub fn video_codecs() -> Vec<RTCRtpCodecParameters> {
    vec![
        RTCRtpCodecParameters {
            capability: video_capability(VideoFormat::Vp8),
            payload_type: 96,
            ..Default::default()
        },
        RTCRtpCodecParameters {
            capability: video_capability(VideoFormat::H264),
            payload_type: 102,
            ..Default::default()
        },
    ]
}

/// Move codecs whose mime type contains `preferred` to the front
///
/// Matching is case-insensitive. Both groups keep their original relative
/// order, so this is a partial reordering rather than a sort.
pub fn prefer_codec(
    codecs: &[RTCRtpCodecParameters],
    preferred: &str,
) -> Vec<RTCRtpCodecParameters> {
    let needle = preferred.to_ascii_lowercase();
    let (mut matching, rest): (Vec<_>, Vec<_>) = codecs
        .iter()
        .cloned()
        .partition(|c| c.capability.mime_type.to_ascii_lowercase().contains(&needle));

    tracing::debug!(
        "Codec preference {}: {} matching of {}",
        preferred,
        matching.len(),
        codecs.len()
    );
    matching.extend(rest);
    matching
}
