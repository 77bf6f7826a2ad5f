//! Local media
//!
//! Capture belongs to the host. A [`MediaSource`] turns constraints into a
//! [`LocalStream`] of sample-fed tracks; the session only attaches, gates,
//! caps and stops them.

use anyhow::Result;
use async_trait::async_trait;
use fxlink_media::{opus_capability, video_capability, MediaConstraints};
use fxlink_protocol::{MediaKind, VideoFormat};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;
use webrtc::media::Sample;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

type StopHook = Box<dyn Fn() + Send + Sync>;

/// Host-supplied capture
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn acquire(&self, constraints: &MediaConstraints) -> Result<LocalStream>;
}

/// A local track the host writes encoded samples into
pub struct LocalTrack {
    kind: MediaKind,
    track: Arc<TrackLocalStaticSample>,
    enabled: AtomicBool,
    stopped: AtomicBool,
    /// Outbound cap in bits per second, read by the host encoder
    bitrate_cap: watch::Sender<Option<u32>>,
    on_stop: Option<StopHook>,
}

impl LocalTrack {
    pub fn new(kind: MediaKind, track: Arc<TrackLocalStaticSample>) -> Self {
        let (bitrate_cap, _) = watch::channel(None);
        Self {
            kind,
            track,
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            bitrate_cap,
            on_stop: None,
        }
    }

    /// Run `hook` when the track is stopped, e.g. to release the capture device
    pub fn with_stop_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_stop = Some(Box::new(hook));
        self
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        self.track.id()
    }

    pub fn track(&self) -> Arc<TrackLocalStaticSample> {
        self.track.clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn set_bitrate_cap(&self, bps: u32) {
        self.bitrate_cap.send_replace(Some(bps));
    }

    pub fn bitrate_cap(&self) -> Option<u32> {
        *self.bitrate_cap.borrow()
    }

    /// Follow cap changes from an encoder task
    pub fn subscribe_bitrate_cap(&self) -> watch::Receiver<Option<u32>> {
        self.bitrate_cap.subscribe()
    }

    /// Write an encoded sample; dropped while the track is disabled or stopped
    pub async fn write_sample(&self, sample: &Sample) -> Result<()> {
        if !self.is_enabled() || self.is_stopped() {
            return Ok(());
        }
        self.track.write_sample(sample).await?;
        Ok(())
    }

    /// Stop the track, returns false if it was already stopped
    pub fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return false;
        }
        if let Some(hook) = &self.on_stop {
            hook();
        }
        true
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTrack")
            .field("kind", &self.kind)
            .field("id", &self.id())
            .field("enabled", &self.is_enabled())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

#[derive(Debug)]
pub struct LocalStream {
    id: String,
    tracks: Vec<Arc<LocalTrack>>,
}

impl LocalStream {
    pub fn new(id: impl Into<String>, tracks: Vec<LocalTrack>) -> Self {
        Self {
            id: id.into(),
            tracks: tracks.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[Arc<LocalTrack>] {
        &self.tracks
    }

    pub fn tracks_of(&self, kind: MediaKind) -> impl Iterator<Item = &Arc<LocalTrack>> {
        self.tracks.iter().filter(move |t| t.kind() == kind)
    }

    pub fn set_enabled(&self, enabled: bool) {
        for track in &self.tracks {
            track.set_enabled(enabled);
        }
    }

    /// Stop every track, returns how many were still running
    pub fn stop(&self) -> usize {
        self.tracks.iter().filter(|t| t.stop()).count()
    }
}

/// Creates sample-fed Opus and VP8/H264 tracks for the host to write into
pub struct SampleTrackSource {
    video_format: VideoFormat,
}

impl SampleTrackSource {
    pub fn new(video_format: VideoFormat) -> Self {
        Self { video_format }
    }
}

impl Default for SampleTrackSource {
    fn default() -> Self {
        Self::new(VideoFormat::Vp8)
    }
}

#[async_trait]
impl MediaSource for SampleTrackSource {
    async fn acquire(&self, constraints: &MediaConstraints) -> Result<LocalStream> {
        let stream_id = format!("fxlink-{}", Uuid::new_v4());

        let mut tracks = vec![LocalTrack::new(
            MediaKind::Audio,
            Arc::new(TrackLocalStaticSample::new(
                opus_capability(),
                "audio".to_string(),
                stream_id.clone(),
            )),
        )];

        if let Some(video) = &constraints.video {
            tracing::debug!(
                "Creating {} track {}x{}@{}",
                self.video_format.as_str(),
                video.width,
                video.height,
                video.frame_rate
            );
            tracks.push(LocalTrack::new(
                MediaKind::Video,
                Arc::new(TrackLocalStaticSample::new(
                    video_capability(self.video_format),
                    "video".to_string(),
                    stream_id.clone(),
                )),
            ));
        }

        Ok(LocalStream::new(stream_id, tracks))
    }
}
