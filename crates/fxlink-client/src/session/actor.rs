use super::state::SessionState;
use crate::config::SessionConfig;
use crate::error::TransportError;
use crate::events::{EventForwarder, SessionEvent, SessionFailure};
use crate::media::{
    BitrateRamp, CandidateQueue, LocalStream, MediaSource, MediaTransport, RampStep,
    StatsCollector, TransportConfig, TransportEvent, TransportFactory,
};
use crate::network::{signaling_url, SignalingEvent, SignalingSocket};
use fxlink_media::{MediaConstraints, SdpFixes};
use fxlink_protocol::{
    close_code, ClientMessage, ControlCommand, Diagnostic, IceCandidatePayload, JoinPayload,
    JoinedPayload, MediaKind, PolyControlCommand, ProtocolError, ServerMessage, SessionDescription,
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use uuid::Uuid;

#[derive(Debug)]
pub(crate) enum Command {
    Stop(u16),
    Control(ControlCommand),
    PolyControl(PolyControlCommand),
    Limit(u32),
    ServerLog { kind: String, payload: Option<String> },
}

/// Owns everything a session touches; all handlers run on its task
pub(crate) struct SessionActor {
    id: Uuid,
    signaling_url: String,
    origin: String,
    payload: JoinPayload,
    constraints: MediaConstraints,
    config: SessionConfig,
    sdp_fixes: SdpFixes,
    media_source: Arc<dyn MediaSource>,
    transport_factory: Arc<dyn TransportFactory>,
    events: EventForwarder,
    state: SessionState,
    state_tx: watch::Sender<SessionState>,
    socket: Option<SignalingSocket>,
    transport: Option<Arc<dyn MediaTransport>>,
    transport_tx: mpsc::UnboundedSender<TransportEvent>,
    transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    stream: Option<Arc<LocalStream>>,
    candidates: CandidateQueue<IceCandidatePayload>,
    /// Offer received before `joined`, latest wins
    pending_offer: Option<SessionDescription>,
    ramp: Option<BitrateRamp>,
    stats_timer: Option<Interval>,
    stats: Option<StatsCollector>,
}

impl SessionActor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: Uuid,
        signaling_url: String,
        origin: String,
        payload: JoinPayload,
        constraints: MediaConstraints,
        config: SessionConfig,
        media_source: Arc<dyn MediaSource>,
        transport_factory: Arc<dyn TransportFactory>,
        events: EventForwarder,
        state_tx: watch::Sender<SessionState>,
    ) -> Self {
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let sdp_fixes = config.sdp_fixes();
        Self {
            id,
            signaling_url,
            origin,
            payload,
            constraints,
            config,
            sdp_fixes,
            media_source,
            transport_factory,
            events,
            state: SessionState::Idle,
            state_tx,
            socket: None,
            transport: None,
            transport_tx,
            transport_rx,
            stream: None,
            candidates: CandidateQueue::new(),
            pending_offer: None,
            ramp: None,
            stats_timer: None,
            stats: None,
        }
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        self.transition(SessionState::Connecting);

        let url = signaling_url(&self.signaling_url, &self.origin);
        let (signal_tx, mut signals) = mpsc::unbounded_channel();
        let connect = SignalingSocket::connect(&url, self.config.connect_timeout(), signal_tx);
        tokio::pin!(connect);
        let mut commands_open = true;

        let connected = loop {
            tokio::select! {
                result = &mut connect => break result,
                command = commands.recv(), if commands_open => match command {
                    Some(Command::Stop(code)) => {
                        self.stop(code).await;
                        return;
                    }
                    Some(other) => tracing::debug!("Dropping {:?} before signaling is open", other),
                    None => commands_open = false,
                },
            }
        };

        match connected {
            Ok(socket) => {
                socket.send(ClientMessage::Join(self.payload.clone()));
                self.socket = Some(socket);
                self.transition(SessionState::JoinSent);
            }
            Err(e) => {
                tracing::error!("Session {} could not open signaling: {}", self.id, e);
                self.fail(SessionFailure::Signaling(e.to_string())).await;
                return;
            }
        }

        while !self.state.is_terminal() {
            tokio::select! {
                command = commands.recv(), if commands_open => match command {
                    Some(command) => self.handle_command(command).await,
                    None => commands_open = false,
                },
                signal = signals.recv() => match signal {
                    Some(signal) => self.handle_signal(signal).await,
                    None => self.on_disconnected(None).await,
                },
                Some(event) = self.transport_rx.recv() => self.handle_transport_event(event),
                Some(step) = next_ramp_step(&mut self.ramp) => self.apply_ramp_step(step).await,
                _ = next_stats_tick(&mut self.stats_timer) => self.poll_stats().await,
            }
        }

        tracing::info!("Session {} finished in state {}", self.id, self.state);
    }

    /// Returns false when the state machine refuses the move
    fn transition(&mut self, next: SessionState) -> bool {
        if !self.state.can_transition(next) {
            tracing::trace!("Ignoring transition {} -> {}", self.state, next);
            return false;
        }
        tracing::debug!("Session {}: {} -> {}", self.id, self.state, next);
        self.state = next;
        self.state_tx.send_replace(next);
        true
    }

    fn send(&self, msg: ClientMessage) {
        match &self.socket {
            Some(socket) => {
                if !socket.send(msg) {
                    tracing::debug!("Signaling writer is gone");
                }
            }
            None => tracing::debug!("Signaling not open, dropping {}", msg.kind()),
        }
    }

    /// Send transport state lines when verbose diagnostics are on
    fn diagnose(&self, diagnostic: Diagnostic) {
        if self.config.log_level >= 2 {
            self.send(ClientMessage::Diagnostic(diagnostic));
        }
    }

    // Commands

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Stop(code) => self.stop(code).await,
            Command::Control(command) => self.send(ClientMessage::Control(command)),
            Command::PolyControl(command) => self.send(ClientMessage::PolyControl(command)),
            Command::Limit(max_kbps) => self.limit(max_kbps).await,
            Command::ServerLog { kind, payload } => self.send(ClientMessage::HostLog { kind, payload }),
        }
    }

    async fn stop(&mut self, code: u16) {
        tracing::info!("Session {} stopped by host with code {}", self.id, code);
        if close_code::is_normal(code) {
            self.events.forward(SessionEvent::Closed);
            self.teardown(SessionState::Closed, Some(code)).await;
        } else {
            self.events
                .forward(SessionEvent::Error(SessionFailure::Aborted { code }));
            self.teardown(SessionState::Error, Some(code)).await;
        }
    }

    async fn limit(&mut self, max_kbps: u32) {
        if self.ramp.take().is_some() {
            tracing::debug!("Bitrate ramp cancelled by limit");
        }
        let Some(transport) = &self.transport else {
            tracing::debug!("No transport to limit yet");
            return;
        };
        let bps = max_kbps.saturating_mul(1000);
        if let Err(e) = transport.set_max_bitrate(MediaKind::Video, bps).await {
            tracing::warn!("Failed to limit video bitrate: {}", e);
        }
    }

    // Signaling

    async fn handle_signal(&mut self, signal: SignalingEvent) {
        match signal {
            SignalingEvent::Message(msg) => self.handle_server_message(msg).await,
            SignalingEvent::Malformed(err) => self.on_malformed(err).await,
            SignalingEvent::Closed { code } => self.on_disconnected(code).await,
            SignalingEvent::Failed(reason) => self.fail(SessionFailure::Signaling(reason)).await,
        }
    }

    async fn handle_server_message(&mut self, msg: ServerMessage) {
        tracing::trace!("Received {}", msg.kind());
        match msg {
            ServerMessage::Joined(joined) => self.on_joined(joined).await,
            ServerMessage::Offer(offer) => self.on_offer(offer).await,
            ServerMessage::Candidate(candidate) => self.on_remote_candidate(candidate).await,
            ServerMessage::Start { remaining_seconds } => self.on_start(remaining_seconds),
            ServerMessage::Ending => {
                self.transition(SessionState::Ending);
                self.events.forward(SessionEvent::Ending);
            }
            ServerMessage::OtherJoined(payload) => {
                self.events.forward(SessionEvent::OtherJoined(payload));
            }
            ServerMessage::OtherLeft(payload) => {
                self.events.forward(SessionEvent::OtherLeft(payload));
            }
            ServerMessage::Files(payload) => {
                self.events.forward(SessionEvent::Files(payload));
            }
            ServerMessage::End(files) => {
                tracing::info!("Session {} ended by server", self.id);
                self.events.forward(SessionEvent::End(files));
                self.events.forward(SessionEvent::Closed);
                self.teardown(SessionState::Closed, Some(close_code::NORMAL)).await;
            }
            ServerMessage::Error { kind, payload } => {
                tracing::error!(
                    "Server reported {} (retryable: {})",
                    kind.as_kind(),
                    kind.is_retryable()
                );
                self.fail(SessionFailure::Server { kind, payload }).await;
            }
            ServerMessage::Unknown { kind } => {
                tracing::debug!("Ignoring unknown message kind {}", kind);
            }
        }
    }

    /// A session cannot proceed without a usable `joined` or `offer`
    async fn on_malformed(&mut self, err: ProtocolError) {
        let fatal = match &err {
            ProtocolError::Payload { kind, .. } | ProtocolError::MissingPayload(kind) => {
                matches!(kind.as_str(), "joined" | "offer")
            }
            _ => false,
        };
        if fatal {
            self.fail(SessionFailure::Negotiation(err.to_string())).await;
        } else {
            tracing::warn!("Ignoring malformed signaling message: {}", err);
        }
    }

    async fn on_disconnected(&mut self, code: Option<u16>) {
        if self.state.is_terminal() {
            return;
        }
        match code {
            Some(code) if close_code::is_normal(code) => {
                tracing::info!("Session {} closed by server", self.id);
                self.events.forward(SessionEvent::Closed);
                self.teardown(SessionState::Closed, None).await;
            }
            code => {
                tracing::warn!("Session {} lost signaling, code {:?}", self.id, code);
                self.events
                    .forward(SessionEvent::Error(SessionFailure::Disconnection { code }));
                self.teardown(SessionState::Error, None).await;
            }
        }
    }

    async fn on_joined(&mut self, joined: JoinedPayload) {
        if self.transport.is_some() {
            tracing::warn!("Ignoring repeated joined acknowledgment");
            return;
        }
        tracing::info!(
            "Session {} joined, {} ICE servers",
            self.id,
            joined.ice_servers.len()
        );
        self.events.forward(SessionEvent::Joined(joined.clone()));

        let config = TransportConfig {
            ice_servers: joined.ice_servers,
            preferred_video: if self.config.codec_preference {
                self.payload.video_format
            } else {
                None
            },
        };
        let transport = match self
            .transport_factory
            .create(config, self.transport_tx.clone())
            .await
        {
            Ok(transport) => transport,
            Err(e) => {
                self.fail(SessionFailure::Transport(e.to_string())).await;
                return;
            }
        };
        self.transport = Some(transport.clone());

        let stream = match self.media_source.acquire(&self.constraints).await {
            Ok(stream) => Arc::new(stream),
            Err(e) => {
                self.fail(SessionFailure::Media(e.to_string())).await;
                return;
            }
        };
        if self.config.gate_tracks_until_start {
            stream.set_enabled(false);
        }
        self.stream = Some(stream.clone());

        if let Err(e) = transport.add_local_tracks(stream.clone()).await {
            self.fail(SessionFailure::Media(e.to_string())).await;
            return;
        }
        self.events.forward(SessionEvent::LocalStream(stream));
        self.transition(SessionState::Negotiating);

        if let Some(offer) = self.pending_offer.take() {
            tracing::debug!("Answering offer received before joined");
            self.on_offer(offer).await;
        }
    }

    async fn on_offer(&mut self, offer: SessionDescription) {
        let Some(transport) = self.transport.clone() else {
            if self.pending_offer.replace(offer).is_some() {
                tracing::debug!("Replacing buffered offer");
            } else {
                tracing::debug!("Buffering offer until joined");
            }
            return;
        };

        match self.answer_offer(transport, offer).await {
            Ok(answer) => {
                self.send(ClientMessage::Answer(answer));
                self.transition(SessionState::Connected);
            }
            Err(e) => {
                tracing::error!("Negotiation failed: {}", e);
                self.fail(SessionFailure::Negotiation(e.to_string())).await;
            }
        }
    }

    async fn answer_offer(
        &mut self,
        transport: Arc<dyn MediaTransport>,
        offer: SessionDescription,
    ) -> Result<SessionDescription, TransportError> {
        let offer = SessionDescription {
            sdp_type: offer.sdp_type,
            sdp: self.sdp_fixes.process_offer(&offer.sdp),
        };
        transport.set_remote_description(offer).await?;

        let pending = self.candidates.take_pending();
        if !pending.is_empty() {
            tracing::debug!("Applying {} queued candidates", pending.len());
        }
        for candidate in pending {
            if let Err(e) = transport.add_ice_candidate(candidate).await {
                tracing::warn!("Failed to apply queued candidate: {}", e);
            }
        }

        let answer = transport.create_answer().await?;
        let answer = SessionDescription::answer(self.sdp_fixes.process_answer(&answer.sdp));
        transport.set_local_description(answer.clone()).await?;
        Ok(answer)
    }

    async fn on_remote_candidate(&mut self, candidate: IceCandidatePayload) {
        let Some(candidate) = self.candidates.push(candidate) else {
            tracing::trace!("Queued remote candidate ({} pending)", self.candidates.len());
            return;
        };
        if let Some(transport) = &self.transport {
            if let Err(e) = transport.add_ice_candidate(candidate).await {
                tracing::warn!("Failed to apply remote candidate: {}", e);
            }
        }
    }

    fn on_start(&mut self, remaining_seconds: Option<f64>) {
        tracing::info!(
            "Session {} starting, {:?}s remaining",
            self.id,
            remaining_seconds
        );
        if !self.transition(SessionState::Running) {
            tracing::warn!("Ignoring start in state {}", self.state);
            return;
        }
        self.events.open();

        self.ramp = Some(BitrateRamp::new(self.config.ramp));

        if self.config.gate_tracks_until_start {
            if let Some(stream) = &self.stream {
                stream.set_enabled(true);
            }
        }

        if self.config.polls_stats() {
            let period = self.config.stats_interval();
            let mut timer = interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.stats_timer = Some(timer);
            self.stats = Some(StatsCollector::new(Instant::now()));
        }

        self.events.forward(SessionEvent::Start { remaining_seconds });
    }

    // Transport

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::LocalCandidate(candidate) => {
                self.send(ClientMessage::Candidate(candidate));
            }
            TransportEvent::RemoteTrack(track) => {
                tracing::info!("Remote {} track {}", track.kind, track.track_id);
                self.events.forward(SessionEvent::Track(track));
            }
            TransportEvent::ConnectionState(state) => {
                if state == "failed" {
                    tracing::warn!("Session {} transport failed", self.id);
                } else {
                    tracing::debug!("Connection state {}", state);
                }
                self.diagnose(Diagnostic::new("connection_state_changed", state));
            }
            TransportEvent::SignalingState(state) => {
                self.diagnose(Diagnostic::new("signaling_state_changed", state));
            }
            TransportEvent::IceConnectionState(state) => {
                self.diagnose(Diagnostic::bare(format!("ice_connection_state_{}", state)));
            }
            TransportEvent::IceGatheringState(state) => {
                self.diagnose(Diagnostic::new("ice_gathering_state_changed", state));
            }
            TransportEvent::SelectedCandidatePair(pair) => {
                self.diagnose(Diagnostic::new("selected_candidate_pair", pair));
            }
        }
    }

    async fn apply_ramp_step(&mut self, step: RampStep) {
        if step.is_final {
            self.ramp = None;
        }
        let Some(transport) = &self.transport else {
            return;
        };
        tracing::trace!("Ramp step {}: video {} bps", step.step, step.video);
        if let Err(e) = transport.set_max_bitrate(MediaKind::Video, step.video).await {
            tracing::warn!("Failed to cap video bitrate: {}", e);
        }
        if let Some(audio) = step.audio {
            if let Err(e) = transport.set_max_bitrate(MediaKind::Audio, audio).await {
                tracing::warn!("Failed to cap audio bitrate: {}", e);
            }
        }
    }

    async fn poll_stats(&mut self) {
        let Some(transport) = self.transport.clone() else {
            return;
        };
        let stats = match transport.stats().await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::debug!("Stats unavailable: {}", e);
                return;
            }
        };
        let Some(collector) = self.stats.as_mut() else {
            return;
        };
        let poll = collector.poll(&stats, Instant::now());

        if self.config.log_level >= 1 {
            for change in poll.changes {
                self.send(ClientMessage::Diagnostic(change.diagnostic()));
                self.events.forward(SessionEvent::Telemetry(change));
            }
        }
        if self.config.stats {
            self.events.forward(SessionEvent::Stats(poll.sample));
        }
    }

    // Teardown

    async fn fail(&mut self, failure: SessionFailure) {
        if self.state.is_terminal() {
            return;
        }
        tracing::error!("Session {} failed: {}", self.id, failure.kind());
        self.events.forward(SessionEvent::Error(failure));
        self.teardown(SessionState::Error, Some(close_code::CLIENT_ERROR)).await;
    }

    /// Release everything once; later calls are no-ops
    ///
    /// With a close code the server is told to stop before the socket closes.
    async fn teardown(&mut self, final_state: SessionState, close: Option<u16>) {
        if self.state.is_terminal() {
            return;
        }
        if let (Some(socket), Some(code)) = (&self.socket, close) {
            socket.send(ClientMessage::Stop);
            socket.close(code);
        }

        self.ramp = None;
        self.stats_timer = None;
        self.stats = None;
        self.pending_offer = None;

        if let Some(stream) = &self.stream {
            let stopped = stream.stop();
            tracing::debug!("Stopped {} local tracks", stopped);
        }
        if let Some(transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                tracing::warn!("Failed to close transport: {}", e);
            }
        }

        self.transition(final_state);
    }
}

async fn next_ramp_step(ramp: &mut Option<BitrateRamp>) -> Option<RampStep> {
    match ramp {
        Some(ramp) => ramp.tick().await,
        None => std::future::pending().await,
    }
}

async fn next_stats_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}
