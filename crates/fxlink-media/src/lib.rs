//! Media helpers for fxlink
//!
//! This crate holds the pure, I/O-free parts of media negotiation:
//! - SDP post-processing applied before descriptions are sent or set
//! - Codec registration order and codec preference
//! - Capture constraints with defaults and host overrides
//! - Browser engine detection used to gate interoperability fixes

pub mod codec;
pub mod constraints;
pub mod engine;
pub mod sdp;

pub use codec::{opus_capability, opus_codec, prefer_codec, video_capability, video_codecs};
pub use constraints::{
    AudioConstraints, AudioOverrides, MediaConstraints, VideoConstraints, VideoOverrides,
};
pub use engine::Engine;
pub use sdp::SdpFixes;
