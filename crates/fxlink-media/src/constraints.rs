//! Capture constraints
//!
//! The host owns capture. We only merge its overrides over fixed defaults and
//! pass the result through unmodified to the media source.

use fxlink_protocol::JoinPayload;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConstraints {
    pub sample_size: u32,
    pub channel_count: u32,
    pub auto_gain_control: bool,
    /// Target capture latency in seconds
    pub latency: f64,
    pub noise_suppression: bool,
    pub echo_cancellation: bool,
    pub device_id: Option<String>,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            sample_size: 16,
            channel_count: 1,
            auto_gain_control: false,
            latency: 0.003,
            noise_suppression: false,
            echo_cancellation: true,
            device_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoConstraints {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub facing_mode: String,
    pub device_id: Option<String>,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            frame_rate: 25,
            facing_mode: "user".to_string(),
            device_id: None,
        }
    }
}

/// Host overrides for audio capture, unset fields keep the default
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioOverrides {
    pub sample_size: Option<u32>,
    pub channel_count: Option<u32>,
    pub auto_gain_control: Option<bool>,
    pub latency: Option<f64>,
    pub noise_suppression: Option<bool>,
    pub echo_cancellation: Option<bool>,
    pub device_id: Option<String>,
}

/// Host overrides for video capture, unset fields keep the default
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoOverrides {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<u32>,
    pub facing_mode: Option<String>,
    pub device_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub audio: AudioConstraints,
    /// Absent for audio-only sessions
    pub video: Option<VideoConstraints>,
}

impl MediaConstraints {
    /// Build the constraints for a join
    ///
    /// Echo cancellation is on unless the participant is alone (mirror mode),
    /// where hearing yourself back is the point.
    pub fn for_join(payload: &JoinPayload, audio: &AudioOverrides, video: &VideoOverrides) -> Self {
        let mut audio_constraints = AudioConstraints {
            echo_cancellation: !payload.is_mirror(),
            ..Default::default()
        };
        audio.apply(&mut audio_constraints);

        let video_constraints = (!payload.is_audio_only()).then(|| {
            let mut constraints = VideoConstraints::default();
            video.apply(&mut constraints);
            constraints
        });

        Self {
            audio: audio_constraints,
            video: video_constraints,
        }
    }
}

impl AudioOverrides {
    fn apply(&self, target: &mut AudioConstraints) {
        if let Some(v) = self.sample_size {
            target.sample_size = v;
        }
        if let Some(v) = self.channel_count {
            target.channel_count = v;
        }
        if let Some(v) = self.auto_gain_control {
            target.auto_gain_control = v;
        }
        if let Some(v) = self.latency {
            target.latency = v;
        }
        if let Some(v) = self.noise_suppression {
            target.noise_suppression = v;
        }
        if let Some(v) = self.echo_cancellation {
            target.echo_cancellation = v;
        }
        if let Some(v) = &self.device_id {
            target.device_id = Some(v.clone());
        }
    }
}

impl VideoOverrides {
    fn apply(&self, target: &mut VideoConstraints) {
        if let Some(v) = self.width {
            target.width = v;
        }
        if let Some(v) = self.height {
            target.height = v;
        }
        if let Some(v) = self.frame_rate {
            target.frame_rate = v;
        }
        if let Some(v) = &self.facing_mode {
            target.facing_mode = v.clone();
        }
        if let Some(v) = &self.device_id {
            target.device_id = Some(v.clone());
        }
    }
}
