pub mod candidates;
pub mod ramp;
pub mod source;
pub mod stats;
pub mod transport;
pub mod webrtc_transport;

pub use candidates::CandidateQueue;
pub use ramp::{BitrateRamp, RampConfig, RampStep};
pub use source::{LocalStream, LocalTrack, MediaSource, SampleTrackSource};
pub use stats::{CounterChange, RtpDirection, RtpReport, StatsCollector, StatsSample, TransportStats};
pub use transport::{
    MediaTransport, RemoteTrack, TransportConfig, TransportEvent, TransportEventSender,
    TransportFactory,
};
pub use webrtc_transport::{WebRtcTransport, WebRtcTransportFactory};
