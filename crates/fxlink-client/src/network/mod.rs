mod websocket;

pub use websocket::{signaling_url, SignalingEvent, SignalingSocket};
