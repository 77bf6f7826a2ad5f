//! Session orchestration
//!
//! [`SessionBuilder::start`] validates the join options, then spawns one
//! actor task that owns the signaling socket, the transport and every timer
//! of the session. [`SessionHandle`] talks to it over a channel.

mod actor;
mod state;

pub use state::SessionState;

use crate::config::{ClientConfig, SessionConfig};
use crate::error::SessionError;
use crate::events::{EventForwarder, EventStream};
use crate::media::{MediaSource, SampleTrackSource, TransportFactory, WebRtcTransportFactory};
use actor::{Command, SessionActor};
use fxlink_media::{AudioOverrides, MediaConstraints, VideoOverrides};
use fxlink_protocol::{close_code, ControlCommand, JoinOptions, JoinPayload, PolyControlCommand, VideoFormat};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

const DEFAULT_ORIGIN: &str = "fxlink";

pub struct SessionBuilder {
    signaling_url: String,
    origin: String,
    options: JoinOptions,
    config: SessionConfig,
    audio: AudioOverrides,
    video: VideoOverrides,
    media_source: Option<Arc<dyn MediaSource>>,
    transport_factory: Option<Arc<dyn TransportFactory>>,
}

impl SessionBuilder {
    pub fn new(signaling_url: impl Into<String>, options: JoinOptions) -> Self {
        Self {
            signaling_url: signaling_url.into(),
            origin: DEFAULT_ORIGIN.to_string(),
            options,
            config: SessionConfig::default(),
            audio: AudioOverrides::default(),
            video: VideoOverrides::default(),
            media_source: None,
            transport_factory: None,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        let mut builder = Self::new(config.signaling_url.clone(), config.join.clone())
            .config(config.session.clone())
            .audio(config.audio.clone())
            .video(config.video.clone());
        if let Some(origin) = &config.origin {
            builder = builder.origin(origin.clone());
        }
        builder
    }

    /// Correlation token the server logs with the connection
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn audio(mut self, overrides: AudioOverrides) -> Self {
        self.audio = overrides;
        self
    }

    pub fn video(mut self, overrides: VideoOverrides) -> Self {
        self.video = overrides;
        self
    }

    pub fn media_source(mut self, source: Arc<dyn MediaSource>) -> Self {
        self.media_source = Some(source);
        self
    }

    pub fn transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.transport_factory = Some(factory);
        self
    }

    /// Validate the options and spawn the session
    ///
    /// Must be called from within a tokio runtime. Nothing is connected when
    /// this returns an error.
    pub fn start(self) -> Result<(SessionHandle, EventStream), SessionError> {
        let payload = JoinPayload::normalize(&self.options)?;
        if self.signaling_url.trim().is_empty() {
            return Err(SessionError::MissingSignalingUrl);
        }

        let id = Uuid::new_v4();
        let constraints = MediaConstraints::for_join(&payload, &self.audio, &self.video);
        let media_source = self.media_source.unwrap_or_else(|| {
            Arc::new(SampleTrackSource::new(
                payload.video_format.unwrap_or(VideoFormat::Vp8),
            ))
        });
        let transport_factory = self
            .transport_factory
            .unwrap_or_else(|| Arc::new(WebRtcTransportFactory));

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);

        tracing::info!(
            "Starting session {} for {} in {}",
            id,
            payload.user_id,
            payload.interaction_name
        );

        let actor = SessionActor::new(
            id,
            self.signaling_url,
            self.origin,
            payload,
            constraints,
            self.config,
            media_source,
            transport_factory,
            EventForwarder::new(event_tx),
            state_tx,
        );
        tokio::spawn(actor.run(command_rx));

        Ok((
            SessionHandle {
                id,
                commands: command_tx,
                state: state_rx,
            },
            event_rx,
        ))
    }
}

/// Control surface of a running session
///
/// Every command is fire-and-forget; commands sent after the session ended
/// are ignored.
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Stop with the normal close code
    pub fn stop(&self) {
        self.stop_with_code(close_code::NORMAL);
    }

    pub fn stop_with_code(&self, code: u16) {
        self.send(Command::Stop(code));
    }

    /// Set an effect property; invalid commands are dropped
    pub fn control_fx(&self, command: ControlCommand) {
        match command.validated() {
            Ok(command) => self.send(Command::Control(command)),
            Err(e) => tracing::debug!("Dropping control command: {}", e),
        }
    }

    pub fn poly_control_fx(&self, command: PolyControlCommand) {
        match command.validated() {
            Ok(command) => self.send(Command::PolyControl(command)),
            Err(e) => tracing::debug!("Dropping control command: {}", e),
        }
    }

    /// Cancel the bitrate ramp and cap video at `max_kbps`
    pub fn limit(&self, max_kbps: u32) {
        self.send(Command::Limit(max_kbps));
    }

    /// Log a line in the server's session log as `ext_<kind>`
    pub fn server_log(&self, kind: impl Into<String>, payload: Option<String>) {
        self.send(Command::ServerLog {
            kind: kind.into(),
            payload,
        });
    }

    /// Wait until the session reaches a terminal state
    pub async fn closed(&self) -> SessionState {
        let mut state = self.state.clone();
        // Err means the actor is gone; its last state is still readable
        let _ = state.wait_for(|s| s.is_terminal()).await;
        let current = *state.borrow();
        current
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!("Session {} already finished", self.id);
        }
    }
}
