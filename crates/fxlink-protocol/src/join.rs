//! Join parameters
//!
//! [`JoinOptions`] is whatever the host hands us (form fields, config files,
//! environment), so every field is optional and numbers/flags are accepted
//! loosely. [`JoinPayload`] is the normalized record sent verbatim as the
//! `join` message. It only carries the keys that survived validation and
//! serializes in a fixed key order, so identical input always produces an
//! identical wire payload.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::JoinError;

/// Video codec the server should use for this participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VideoFormat {
    #[serde(rename = "VP8")]
    Vp8,
    #[serde(rename = "H264")]
    H264,
}

impl VideoFormat {
    /// Whitelisted codec names, matched exactly
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "VP8" => Some(VideoFormat::Vp8),
            "H264" => Some(VideoFormat::H264),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VideoFormat::Vp8 => "VP8",
            VideoFormat::H264 => "H264",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            VideoFormat::Vp8 => "video/VP8",
            VideoFormat::H264 => "video/H264",
        }
    }
}

/// How the server records the interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingMode {
    Muxed,
    Split,
    Passthrough,
    #[serde(rename = "none")]
    Disabled,
}

impl RecordingMode {
    pub fn parse(mode: &str) -> Option<Self> {
        match mode {
            "muxed" => Some(RecordingMode::Muxed),
            "split" => Some(RecordingMode::Split),
            "passthrough" => Some(RecordingMode::Passthrough),
            "none" => Some(RecordingMode::Disabled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingMode::Muxed => "muxed",
            RecordingMode::Split => "split",
            RecordingMode::Passthrough => "passthrough",
            RecordingMode::Disabled => "none",
        }
    }
}

/// Raw join options supplied by the host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JoinOptions {
    #[serde(alias = "room", alias = "roomId", alias = "interactionname")]
    pub interaction_name: Option<String>,
    #[serde(alias = "userid")]
    pub user_id: Option<String>,
    /// Display name
    pub name: Option<String>,
    /// Session duration in seconds
    #[serde(deserialize_with = "loose_number")]
    pub duration: Option<f64>,
    #[serde(deserialize_with = "loose_flag", alias = "audioonly")]
    pub audio_only: Option<bool>,
    /// Number of participants in the interaction (1 = mirror mode)
    #[serde(deserialize_with = "loose_number")]
    pub size: Option<f64>,
    #[serde(deserialize_with = "loose_number")]
    pub width: Option<f64>,
    #[serde(deserialize_with = "loose_number")]
    pub height: Option<f64>,
    #[serde(deserialize_with = "loose_number", alias = "frameRate")]
    pub framerate: Option<f64>,
    #[serde(alias = "audiofx")]
    pub audio_fx: Option<String>,
    #[serde(alias = "videofx")]
    pub video_fx: Option<String>,
    pub namespace: Option<String>,
    #[serde(alias = "videoformat")]
    pub video_format: Option<String>,
    #[serde(alias = "recordingmode")]
    pub recording_mode: Option<String>,
    #[serde(deserialize_with = "loose_flag")]
    pub gpu: Option<bool>,
    #[serde(deserialize_with = "loose_flag")]
    pub overlay: Option<bool>,
}

/// Normalized join payload, the first message sent on the signaling channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinPayload {
    pub interaction_name: String,
    pub user_id: String,
    pub name: String,
    pub duration: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framerate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_fx: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_fx: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_format: Option<VideoFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_mode: Option<RecordingMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay: Option<bool>,
}

impl JoinPayload {
    /// Validate required fields and drop every optional field that does not pass
    pub fn normalize(options: &JoinOptions) -> Result<Self, JoinError> {
        let interaction_name = required_text(&options.interaction_name)
            .ok_or(JoinError::InvalidField("interactionName"))?;
        let user_id = required_text(&options.user_id).ok_or(JoinError::InvalidField("userId"))?;
        let name = required_text(&options.name).ok_or(JoinError::InvalidField("name"))?;
        let duration = options
            .duration
            .filter(|d| d.is_finite() && *d >= 0.0)
            .ok_or(JoinError::InvalidField("duration"))? as u64;

        Ok(Self {
            interaction_name,
            user_id,
            name,
            duration,
            audio_only: truthy(options.audio_only),
            size: positive_integer(options.size),
            width: positive_integer(options.width),
            height: positive_integer(options.height),
            framerate: positive_integer(options.framerate),
            audio_fx: required_text(&options.audio_fx),
            video_fx: required_text(&options.video_fx),
            namespace: required_text(&options.namespace),
            video_format: options.video_format.as_deref().and_then(VideoFormat::parse),
            recording_mode: options.recording_mode.as_deref().and_then(RecordingMode::parse),
            gpu: truthy(options.gpu),
            overlay: truthy(options.overlay),
        })
    }

    /// Mirror mode: the participant is alone and hears itself back
    pub fn is_mirror(&self) -> bool {
        self.size == Some(1)
    }

    pub fn is_audio_only(&self) -> bool {
        self.audio_only.unwrap_or(false)
    }
}

impl TryFrom<&JoinOptions> for JoinPayload {
    type Error = JoinError;

    fn try_from(options: &JoinOptions) -> Result<Self, Self::Error> {
        JoinPayload::normalize(options)
    }
}

impl From<&JoinPayload> for JoinOptions {
    fn from(payload: &JoinPayload) -> Self {
        Self {
            interaction_name: Some(payload.interaction_name.clone()),
            user_id: Some(payload.user_id.clone()),
            name: Some(payload.name.clone()),
            duration: Some(payload.duration as f64),
            audio_only: payload.audio_only,
            size: payload.size.map(f64::from),
            width: payload.width.map(f64::from),
            height: payload.height.map(f64::from),
            framerate: payload.framerate.map(f64::from),
            audio_fx: payload.audio_fx.clone(),
            video_fx: payload.video_fx.clone(),
            namespace: payload.namespace.clone(),
            video_format: payload.video_format.map(|f| f.as_str().to_string()),
            recording_mode: payload.recording_mode.map(|m| m.as_str().to_string()),
            gpu: payload.gpu,
            overlay: payload.overlay,
        }
    }
}

fn required_text(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn positive_integer(value: Option<f64>) -> Option<u32> {
    value
        .filter(|v| v.is_finite() && *v >= 1.0 && *v <= u32::MAX as f64)
        .map(|v| v as u32)
}

fn truthy(flag: Option<bool>) -> Option<bool> {
    flag.filter(|f| *f)
}

/// Numbers may arrive as JSON numbers or as numeric text; anything else reads as NaN
fn loose_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => Some(s.trim().parse::<f64>().unwrap_or(f64::NAN)),
        Some(_) => Some(f64::NAN),
    })
}

/// Flags follow truthiness: non-zero numbers and non-empty text count as set
fn loose_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::Bool(b)) => Some(b),
        Some(Value::Number(n)) => Some(n.as_f64().is_some_and(|v| v != 0.0 && !v.is_nan())),
        Some(Value::String(s)) => Some(!s.is_empty()),
        Some(_) => Some(true),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(value: serde_json::Value) -> JoinOptions {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_minimal_payload_has_exactly_required_keys() {
        let opts = options(json!({"room": "r1", "userId": "u1", "name": "Alice", "duration": 30}));
        let payload = JoinPayload::normalize(&opts).unwrap();
        let value = serde_json::to_value(&payload).unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 4);
        assert_eq!(value["interactionName"], "r1");
        assert_eq!(value["userId"], "u1");
        assert_eq!(value["name"], "Alice");
        assert_eq!(value["duration"], 30);
    }

    #[test]
    fn test_missing_required_fields_fail() {
        let cases = [
            (json!({"userId": "u1", "name": "A", "duration": 30}), "interactionName"),
            (json!({"room": "r1", "name": "A", "duration": 30}), "userId"),
            (json!({"room": "r1", "userId": "u1", "duration": 30}), "name"),
            (json!({"room": "r1", "userId": "u1", "name": "A"}), "duration"),
            (json!({"room": "r1", "userId": "u1", "name": "A", "duration": "soon"}), "duration"),
            (json!({"room": "", "userId": "u1", "name": "A", "duration": 30}), "interactionName"),
        ];
        for (input, field) in cases {
            let err = JoinPayload::normalize(&options(input)).unwrap_err();
            assert_eq!(err, JoinError::InvalidField(field));
        }
    }

    #[test]
    fn test_invalid_optional_fields_are_dropped() {
        let opts = options(json!({
            "room": "r1", "userId": "u1", "name": "Alice", "duration": 30,
            "videoFormat": "AV1",
            "recordingMode": "everything",
            "width": "wide",
            "height": 480,
            "framerate": "30",
            "gpu": false,
            "overlay": 1,
            "audioFx": "",
        }));
        let payload = JoinPayload::normalize(&opts).unwrap();
        assert_eq!(payload.video_format, None);
        assert_eq!(payload.recording_mode, None);
        assert_eq!(payload.width, None);
        assert_eq!(payload.height, Some(480));
        assert_eq!(payload.framerate, Some(30));
        assert_eq!(payload.gpu, None);
        assert_eq!(payload.overlay, Some(true));
        assert_eq!(payload.audio_fx, None);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let opts = options(json!({
            "interactionName": "room-7", "userId": "u9", "name": "Bob", "duration": 120.7,
            "size": 2, "width": 800, "height": 600, "framerate": 25,
            "videoFormat": "H264", "recordingMode": "split", "namespace": "study",
            "audioFx": "pitch pitch=0.8", "audioOnly": true, "gpu": true,
        }));
        let once = JoinPayload::normalize(&opts).unwrap();
        let twice = JoinPayload::normalize(&JoinOptions::from(&once)).unwrap();
        assert_eq!(once, twice);
        assert_eq!(
            serde_json::to_string(&once).unwrap(),
            serde_json::to_string(&twice).unwrap()
        );
    }

    #[test]
    fn test_normalize_does_not_mutate_input() {
        let opts = options(json!({"room": "r1", "userId": "u1", "name": "A", "duration": 5, "videoFormat": "AV1"}));
        let before = opts.clone();
        let _ = JoinPayload::normalize(&opts);
        assert_eq!(opts, before);
    }
}
