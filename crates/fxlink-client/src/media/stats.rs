//! Transport statistics
//!
//! Each poll turns a transport snapshot into per-direction throughput and a
//! list of counter changes since the previous poll.

use chrono::{DateTime, Utc};
use fxlink_protocol::{Diagnostic, MediaKind};
use serde::Serialize;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RtpDirection {
    Outbound,
    Inbound,
    RemoteInbound,
}

/// One RTP stream entry of a transport snapshot
///
/// Counters the transport does not report stay `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpReport {
    pub direction: RtpDirection,
    pub kind: MediaKind,
    /// Bytes sent for outbound streams, received for inbound ones
    pub bytes: u64,
    pub frame_width: Option<u32>,
    pub frame_height: Option<u32>,
    pub frames_per_second: Option<f64>,
    pub pli_count: Option<u64>,
    pub fir_count: Option<u64>,
    pub key_frames_encoded: Option<u64>,
    pub key_frames_decoded: Option<u64>,
    pub packets_lost: Option<i64>,
    pub round_trip_time: Option<f64>,
}

impl RtpReport {
    pub fn new(direction: RtpDirection, kind: MediaKind, bytes: u64) -> Self {
        Self {
            direction,
            kind,
            bytes,
            frame_width: None,
            frame_height: None,
            frames_per_second: None,
            pli_count: None,
            fir_count: None,
            key_frames_encoded: None,
            key_frames_decoded: None,
            packets_lost: None,
            round_trip_time: None,
        }
    }

    pub fn outbound(kind: MediaKind, bytes_sent: u64) -> Self {
        Self::new(RtpDirection::Outbound, kind, bytes_sent)
    }

    pub fn inbound(kind: MediaKind, bytes_received: u64) -> Self {
        Self::new(RtpDirection::Inbound, kind, bytes_received)
    }
}

/// Snapshot returned by the transport
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransportStats {
    pub reports: Vec<RtpReport>,
}

/// Throughput since the previous poll, forwarded to the host as a `stats` event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSample {
    pub timestamp: DateTime<Utc>,
    /// Outbound audio in kbps
    pub audio_up: f64,
    pub audio_down: f64,
    pub video_up: f64,
    pub video_down: f64,
    pub reports: Vec<RtpReport>,
}

/// A monitored counter that moved since the previous poll
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "counter", rename_all = "snake_case")]
pub enum CounterChange {
    VideoResolution { width: u32, height: u32 },
    VideoFps { fps: f64 },
    PliReceived { count: u64 },
    FirReceived { count: u64 },
    KeyframeEncoded { count: u64 },
    KeyframeDecoded { count: u64 },
}

impl CounterChange {
    /// Diagnostic line reported to the server for this change
    pub fn diagnostic(&self) -> Diagnostic {
        match self {
            CounterChange::VideoResolution { width, height } => {
                Diagnostic::new("video_resolution_updated", format!("{}x{}", width, height))
            }
            CounterChange::VideoFps { fps } => Diagnostic::new("video_fps_updated", fps.to_string()),
            CounterChange::PliReceived { count } => {
                Diagnostic::new("pli_received_count_updated", count.to_string())
            }
            CounterChange::FirReceived { count } => {
                Diagnostic::new("fir_received_count_updated", count.to_string())
            }
            CounterChange::KeyframeEncoded { count } => {
                Diagnostic::new("keyframe_encoded_count_updated", count.to_string())
            }
            CounterChange::KeyframeDecoded { count } => {
                Diagnostic::new("keyframe_decoded_count_updated", count.to_string())
            }
        }
    }
}

/// Result of one poll
#[derive(Debug, Clone)]
pub struct StatsPoll {
    pub sample: StatsSample,
    pub changes: Vec<CounterChange>,
}

/// Throughput in kbps, rounded to one decimal
pub fn kbps(bytes: u64, seconds: f64) -> f64 {
    if seconds <= 0.0 {
        return 0.0;
    }
    let value = 8.0 * bytes as f64 / seconds / 1024.0;
    (value * 10.0).round() / 10.0
}

#[derive(Debug, Default, Clone, Copy)]
struct ByteCounters {
    audio_sent: u64,
    audio_received: u64,
    video_sent: u64,
    video_received: u64,
}

/// Last known value of each monitored counter
#[derive(Debug, Clone, PartialEq)]
struct VideoCounters {
    resolution: Option<(u32, u32)>,
    fps: Option<f64>,
    pli: Option<u64>,
    fir: Option<u64>,
    key_frames_encoded: Option<u64>,
    key_frames_decoded: Option<u64>,
}

impl Default for VideoCounters {
    /// Event counters start at zero so a zero count is never reported
    fn default() -> Self {
        Self {
            resolution: None,
            fps: None,
            pli: Some(0),
            fir: Some(0),
            key_frames_encoded: Some(0),
            key_frames_decoded: Some(0),
        }
    }
}

pub struct StatsCollector {
    last_poll: Instant,
    bytes: ByteCounters,
    video: VideoCounters,
}

impl StatsCollector {
    pub fn new(now: Instant) -> Self {
        Self {
            last_poll: now,
            bytes: ByteCounters::default(),
            video: VideoCounters::default(),
        }
    }

    pub fn poll(&mut self, stats: &TransportStats, now: Instant) -> StatsPoll {
        let elapsed = now.saturating_duration_since(self.last_poll).as_secs_f64();
        let bytes = Self::byte_counters(stats);
        let video = Self::video_counters(stats, &self.video);

        let sample = StatsSample {
            timestamp: Utc::now(),
            audio_up: kbps(bytes.audio_sent.saturating_sub(self.bytes.audio_sent), elapsed),
            audio_down: kbps(bytes.audio_received.saturating_sub(self.bytes.audio_received), elapsed),
            video_up: kbps(bytes.video_sent.saturating_sub(self.bytes.video_sent), elapsed),
            video_down: kbps(bytes.video_received.saturating_sub(self.bytes.video_received), elapsed),
            reports: stats.reports.clone(),
        };
        let changes = self.diff(&video);

        self.last_poll = now;
        self.bytes = bytes;
        self.video = video;
        StatsPoll { sample, changes }
    }

    fn byte_counters(stats: &TransportStats) -> ByteCounters {
        let mut counters = ByteCounters::default();
        for report in &stats.reports {
            let slot = match (report.direction, report.kind) {
                (RtpDirection::Outbound, MediaKind::Audio) => &mut counters.audio_sent,
                (RtpDirection::Inbound, MediaKind::Audio) => &mut counters.audio_received,
                (RtpDirection::Outbound, MediaKind::Video) => &mut counters.video_sent,
                (RtpDirection::Inbound, MediaKind::Video) => &mut counters.video_received,
                (RtpDirection::RemoteInbound, _) => continue,
            };
            *slot += report.bytes;
        }
        counters
    }

    /// Counters missing from this snapshot keep their previous value
    fn video_counters(stats: &TransportStats, previous: &VideoCounters) -> VideoCounters {
        let mut counters = VideoCounters {
            resolution: None,
            fps: None,
            pli: None,
            fir: None,
            key_frames_encoded: None,
            key_frames_decoded: None,
        };
        for report in stats.reports.iter().filter(|r| r.kind == MediaKind::Video) {
            match report.direction {
                RtpDirection::Outbound => {
                    if let (Some(w), Some(h)) = (report.frame_width, report.frame_height) {
                        counters.resolution = Some((w, h));
                    }
                    counters.fps = report.frames_per_second.or(counters.fps);
                    counters.pli = report.pli_count.or(counters.pli);
                    counters.fir = report.fir_count.or(counters.fir);
                    counters.key_frames_encoded = report.key_frames_encoded.or(counters.key_frames_encoded);
                }
                RtpDirection::Inbound => {
                    counters.key_frames_decoded = report.key_frames_decoded.or(counters.key_frames_decoded);
                }
                RtpDirection::RemoteInbound => {}
            }
        }
        VideoCounters {
            resolution: counters.resolution.or(previous.resolution),
            fps: counters.fps.or(previous.fps),
            pli: counters.pli.or(previous.pli),
            fir: counters.fir.or(previous.fir),
            key_frames_encoded: counters.key_frames_encoded.or(previous.key_frames_encoded),
            key_frames_decoded: counters.key_frames_decoded.or(previous.key_frames_decoded),
        }
    }

    fn diff(&self, current: &VideoCounters) -> Vec<CounterChange> {
        let previous = &self.video;
        let mut changes = Vec::new();

        if let Some((width, height)) = current.resolution.filter(|r| Some(*r) != previous.resolution) {
            changes.push(CounterChange::VideoResolution { width, height });
        }
        if let Some(fps) = current.fps.filter(|f| Some(*f) != previous.fps) {
            changes.push(CounterChange::VideoFps { fps });
        }
        if let Some(count) = current.pli.filter(|c| Some(*c) != previous.pli) {
            changes.push(CounterChange::PliReceived { count });
        }
        if let Some(count) = current.fir.filter(|c| Some(*c) != previous.fir) {
            changes.push(CounterChange::FirReceived { count });
        }
        if let Some(count) = current
            .key_frames_encoded
            .filter(|c| Some(*c) != previous.key_frames_encoded)
        {
            changes.push(CounterChange::KeyframeEncoded { count });
        }
        if let Some(count) = current
            .key_frames_decoded
            .filter(|c| Some(*c) != previous.key_frames_decoded)
        {
            changes.push(CounterChange::KeyframeDecoded { count });
        }
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn video_out(bytes: u64, width: u32, pli: u64) -> RtpReport {
        RtpReport {
            frame_width: Some(width),
            frame_height: Some(width * 3 / 4),
            pli_count: Some(pli),
            ..RtpReport::outbound(MediaKind::Video, bytes)
        }
    }

    #[test]
    fn test_kbps_rounding() {
        assert_eq!(kbps(1024, 1.0), 8.0);
        assert_eq!(kbps(1000, 1.0), 7.8);
        assert_eq!(kbps(0, 1.0), 0.0);
        assert_eq!(kbps(1024, 0.0), 0.0);
    }

    #[test]
    fn test_rates_use_deltas() {
        let start = Instant::now();
        let mut collector = StatsCollector::new(start);

        let first = TransportStats {
            reports: vec![
                RtpReport::outbound(MediaKind::Audio, 1024),
                RtpReport::inbound(MediaKind::Video, 2048),
            ],
        };
        let poll = collector.poll(&first, start + Duration::from_secs(1));
        assert_eq!(poll.sample.audio_up, 8.0);
        assert_eq!(poll.sample.video_down, 16.0);
        assert_eq!(poll.sample.video_up, 0.0);

        let second = TransportStats {
            reports: vec![
                RtpReport::outbound(MediaKind::Audio, 1024 + 2048),
                RtpReport::inbound(MediaKind::Video, 2048),
            ],
        };
        let poll = collector.poll(&second, start + Duration::from_secs(3));
        assert_eq!(poll.sample.audio_up, 8.0);
        assert_eq!(poll.sample.video_down, 0.0);
    }

    #[test]
    fn test_counter_changes_reported_once() {
        let start = Instant::now();
        let mut collector = StatsCollector::new(start);

        let stats = TransportStats {
            reports: vec![video_out(10, 640, 0)],
        };
        let poll = collector.poll(&stats, start + Duration::from_secs(1));
        assert_eq!(
            poll.changes,
            vec![CounterChange::VideoResolution { width: 640, height: 480 }]
        );

        let poll = collector.poll(&stats, start + Duration::from_secs(2));
        assert!(poll.changes.is_empty());

        let stats = TransportStats {
            reports: vec![video_out(20, 640, 2)],
        };
        let poll = collector.poll(&stats, start + Duration::from_secs(3));
        assert_eq!(poll.changes, vec![CounterChange::PliReceived { count: 2 }]);

        // A snapshot without video reports changes nothing
        let poll = collector.poll(&TransportStats::default(), start + Duration::from_secs(4));
        assert!(poll.changes.is_empty());
        let poll = collector.poll(&stats, start + Duration::from_secs(5));
        assert!(poll.changes.is_empty());
    }

    #[test]
    fn test_zero_counters_not_reported() {
        let start = Instant::now();
        let mut collector = StatsCollector::new(start);
        let report = RtpReport {
            fir_count: Some(0),
            key_frames_encoded: Some(0),
            pli_count: Some(0),
            ..RtpReport::outbound(MediaKind::Video, 100)
        };
        let inbound = RtpReport {
            key_frames_decoded: Some(0),
            ..RtpReport::inbound(MediaKind::Video, 100)
        };
        let stats = TransportStats {
            reports: vec![report, inbound],
        };
        let poll = collector.poll(&stats, start + Duration::from_secs(1));
        assert!(poll.changes.is_empty());
    }

    #[test]
    fn test_change_diagnostics() {
        let change = CounterChange::VideoResolution { width: 800, height: 600 };
        let diagnostic = change.diagnostic();
        assert_eq!(diagnostic.name, "video_resolution_updated");
        assert_eq!(diagnostic.detail.as_deref(), Some("800x600"));
        assert_eq!(
            CounterChange::KeyframeDecoded { count: 4 }.diagnostic().name,
            "keyframe_decoded_count_updated"
        );
    }
}
