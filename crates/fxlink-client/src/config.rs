//! Client configuration
//!
//! Layered from an optional `config.toml` in the user config directory, an
//! optional explicit file, then `FXLINK__*` environment variables
//! (`FXLINK__SESSION__LOG_LEVEL=2`, `FXLINK__JOIN__USERID=u1`).

use crate::error::SessionError;
use crate::media::RampConfig;
use fxlink_media::{AudioOverrides, Engine, SdpFixes, VideoOverrides};
use fxlink_protocol::JoinOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_VERSION: u32 = 1;

/// Session feature flags and tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub version: u32,
    /// Forward a `stats` event on every poll
    pub stats: bool,
    /// 0 = quiet, 1 = counter telemetry, 2 = transport state diagnostics too
    pub log_level: u8,
    /// Register the join's video format first
    pub codec_preference: bool,
    /// Keep local tracks disabled until the interaction starts
    pub gate_tracks_until_start: bool,
    /// After this long without an open socket an error is logged; the attempt continues
    pub connect_timeout_ms: u64,
    pub stats_interval_ms: u64,
    pub ramp: RampConfig,
    pub sdp: SdpFixes,
    /// User agent of the embedding engine, enables engine-specific SDP fixes
    pub user_agent: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            stats: false,
            log_level: 1,
            codec_preference: true,
            gate_tracks_until_start: false,
            connect_timeout_ms: 10_000,
            stats_interval_ms: 1000,
            ramp: RampConfig::default(),
            sdp: SdpFixes::default(),
            user_agent: None,
        }
    }
}

impl SessionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms.max(1))
    }

    /// Whether the stats poller runs once the interaction starts
    pub fn polls_stats(&self) -> bool {
        self.stats || self.log_level >= 1
    }

    /// Configured fixes plus those the reported engine needs
    pub fn sdp_fixes(&self) -> SdpFixes {
        let mut fixes = self.sdp;
        if let Some(user_agent) = &self.user_agent {
            if Engine::from_user_agent(user_agent).needs_msid_semantic_fix() {
                fixes.bundle_msid_semantic = true;
            }
        }
        fixes
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket endpoint of the signaling server
    pub signaling_url: String,
    /// Correlation token sent as `?href=`, defaults to the client name
    pub origin: Option<String>,
    pub join: JoinOptions,
    pub audio: AudioOverrides,
    pub video: VideoOverrides,
    pub session: SessionConfig,
}

impl ClientConfig {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("fxlink").join("config.toml"))
    }

    pub fn load(path: Option<&Path>) -> Result<Self, SessionError> {
        let mut builder = config::Config::builder();

        if let Some(default_path) = Self::config_path() {
            builder = builder.add_source(config::File::from(default_path).required(false));
        }
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("FXLINK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: ClientConfig = settings.try_deserialize()?;
        if config.session.version != CONFIG_VERSION {
            tracing::warn!(
                "Config version {} differs from supported version {}",
                config.session.version,
                CONFIG_VERSION
            );
        }
        Ok(config)
    }
}
