//! Outbound bitrate ramp
//!
//! Once the interaction starts, the video cap climbs linearly to its maximum
//! in a fixed number of steps. Audio is capped once on the first step. The
//! ramp belongs to a single session and is driven from its event loop, so
//! dropping it cancels any remaining steps.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RampConfig {
    pub steps: u32,
    /// Time from the start of the interaction to the final step
    pub duration_ms: u64,
    /// Video cap in bits per second reached on the final step
    pub max_video_bitrate: u32,
    /// Audio cap in bits per second, applied on the first step
    pub max_audio_bitrate: u32,
}

impl Default for RampConfig {
    fn default() -> Self {
        Self {
            steps: 8,
            duration_ms: 3000,
            max_video_bitrate: 1_500_000,
            max_audio_bitrate: 64_000,
        }
    }
}

impl RampConfig {
    fn step_count(&self) -> u32 {
        self.steps.max(1)
    }

    pub fn step_interval(&self) -> Duration {
        Duration::from_millis(self.duration_ms / u64::from(self.step_count()))
    }

    /// Caps to apply at `step`, counted from 1
    pub fn caps(&self, step: u32) -> RampStep {
        let steps = self.step_count();
        let step = step.clamp(1, steps);
        let video = u64::from(self.max_video_bitrate) * u64::from(step) / u64::from(steps);
        RampStep {
            step,
            video: video as u32,
            audio: (step == 1).then_some(self.max_audio_bitrate),
            is_final: step == steps,
        }
    }
}

/// Bitrate caps for one step of the ramp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampStep {
    pub step: u32,
    pub video: u32,
    pub audio: Option<u32>,
    pub is_final: bool,
}

pub struct BitrateRamp {
    config: RampConfig,
    interval: Interval,
    next_step: u32,
}

impl BitrateRamp {
    /// Start a ramp whose first step fires one interval from now
    pub fn new(config: RampConfig) -> Self {
        let period = config.step_interval().max(Duration::from_millis(1));
        Self {
            config,
            interval: interval_at(Instant::now() + period, period),
            next_step: 1,
        }
    }

    /// Wait for the next step, `None` once the final step was returned
    pub async fn tick(&mut self) -> Option<RampStep> {
        if self.next_step > self.config.step_count() {
            return None;
        }
        self.interval.tick().await;
        let step = self.config.caps(self.next_step);
        self.next_step += 1;
        Some(step)
    }

    pub fn is_finished(&self) -> bool {
        self.next_step > self.config.step_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caps_climb_linearly() {
        let config = RampConfig::default();
        let caps: Vec<u32> = (1..=8).map(|k| config.caps(k).video).collect();
        assert_eq!(
            caps,
            vec![187_500, 375_000, 562_500, 750_000, 937_500, 1_125_000, 1_312_500, 1_500_000]
        );
        assert_eq!(config.caps(1).audio, Some(64_000));
        assert!((2..=8).all(|k| config.caps(k).audio.is_none()));
        assert!(config.caps(8).is_final);
    }

    #[test]
    fn test_zero_steps_behaves_as_one() {
        let config = RampConfig {
            steps: 0,
            ..Default::default()
        };
        let step = config.caps(1);
        assert_eq!(step.video, 1_500_000);
        assert!(step.is_final);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ramp_timing() {
        let start = Instant::now();
        let mut ramp = BitrateRamp::new(RampConfig::default());

        let first = ramp.tick().await.unwrap();
        assert_eq!(first.step, 1);
        assert_eq!(start.elapsed(), Duration::from_millis(375));

        let mut last = first;
        while let Some(step) = ramp.tick().await {
            last = step;
        }
        assert_eq!(last.step, 8);
        assert_eq!(last.video, 1_500_000);
        assert_eq!(start.elapsed(), Duration::from_millis(3000));
        assert!(ramp.is_finished());
    }
}
