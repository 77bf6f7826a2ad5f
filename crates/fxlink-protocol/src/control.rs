//! Live effect controls
//!
//! Controls are fire-and-forget: there is no acknowledgment, and a later
//! command on the same property supersedes an earlier one.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ControlError;

/// Value of an effect property. Older servers only accept numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for ControlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlValue::Number(n) => write!(f, "{}", n),
            ControlValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for ControlValue {
    fn from(value: f64) -> Self {
        ControlValue::Number(value)
    }
}

impl From<f32> for ControlValue {
    fn from(value: f32) -> Self {
        ControlValue::Number(value as f64)
    }
}

impl From<i32> for ControlValue {
    fn from(value: i32) -> Self {
        ControlValue::Number(value as f64)
    }
}

impl From<&str> for ControlValue {
    fn from(value: &str) -> Self {
        ControlValue::Text(value.to_string())
    }
}

impl From<String> for ControlValue {
    fn from(value: String) -> Self {
        ControlValue::Text(value)
    }
}

/// Adjust a property of a running effect (`client_control`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlCommand {
    /// Effect name as declared in the join payload's fx descriptors
    pub name: String,
    pub property: String,
    pub value: ControlValue,
    /// Interpolation duration in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    /// Apply to another participant's stream instead of our own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl ControlCommand {
    pub fn new(
        name: impl Into<String>,
        property: impl Into<String>,
        value: impl Into<ControlValue>,
    ) -> Self {
        Self {
            name: name.into(),
            property: property.into(),
            value: value.into(),
            duration: None,
            user_id: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u32) -> Self {
        self.duration = Some(duration_ms);
        self
    }

    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Check the command and strip optional fields that carry no information
    ///
    /// A zero duration is the same as no interpolation and is omitted from the wire.
    pub fn validated(mut self) -> Result<Self, ControlError> {
        check_target(&self.name, &self.property)?;
        if let ControlValue::Number(n) = self.value {
            if !n.is_finite() {
                return Err(ControlError::InvalidValue);
            }
        }
        if self.duration == Some(0) {
            self.duration = None;
        }
        if let Some(user_id) = &self.user_id {
            if user_id.trim().is_empty() {
                return Err(ControlError::EmptyUserId);
            }
        }
        Ok(self)
    }
}

/// Declared type of a property set through `client_polycontrol`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    Int,
    Float,
    String,
}

impl PropertyKind {
    /// Infer the kind from a textual value: numbers with a dot are floats
    pub fn infer(value: &str) -> Self {
        if value.trim().parse::<f64>().is_ok() {
            if value.contains('.') {
                PropertyKind::Float
            } else {
                PropertyKind::Int
            }
        } else {
            PropertyKind::String
        }
    }
}

/// Set a property of any type, the value always travels as text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolyControlCommand {
    pub name: String,
    pub property: String,
    pub kind: PropertyKind,
    pub value: String,
}

impl PolyControlCommand {
    pub fn new(
        name: impl Into<String>,
        property: impl Into<String>,
        kind: PropertyKind,
        value: impl Into<ControlValue>,
    ) -> Self {
        Self {
            name: name.into(),
            property: property.into(),
            kind,
            value: value.into().to_string(),
        }
    }

    pub fn validated(self) -> Result<Self, ControlError> {
        check_target(&self.name, &self.property)?;
        if self.kind != PropertyKind::String && self.value.trim().parse::<f64>().is_err() {
            return Err(ControlError::InvalidValue);
        }
        Ok(self)
    }
}

fn check_target(name: &str, property: &str) -> Result<(), ControlError> {
    if name.trim().is_empty() {
        return Err(ControlError::EmptyName);
    }
    if property.trim().is_empty() {
        return Err(ControlError::EmptyProperty);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_serialization_omits_unset_fields() {
        let cmd = ControlCommand::new("pitch", "pitch", 1.2).validated().unwrap();
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json, serde_json::json!({"name": "pitch", "property": "pitch", "value": 1.2}));
    }

    #[test]
    fn test_control_with_duration_and_user() {
        let cmd = ControlCommand::new("spectrum", "shift", 0.5)
            .with_duration(250)
            .for_user("u2")
            .validated()
            .unwrap();
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["duration"], 250);
        assert_eq!(json["userId"], "u2");
    }

    #[test]
    fn test_zero_duration_is_dropped() {
        let cmd = ControlCommand::new("pitch", "pitch", 1.0)
            .with_duration(0)
            .validated()
            .unwrap();
        assert_eq!(cmd.duration, None);
    }

    #[test]
    fn test_invalid_controls_rejected() {
        assert_eq!(
            ControlCommand::new("", "pitch", 1.0).validated().unwrap_err(),
            ControlError::EmptyName
        );
        assert_eq!(
            ControlCommand::new("pitch", " ", 1.0).validated().unwrap_err(),
            ControlError::EmptyProperty
        );
        assert_eq!(
            ControlCommand::new("pitch", "pitch", f64::NAN).validated().unwrap_err(),
            ControlError::InvalidValue
        );
        assert_eq!(
            ControlCommand::new("pitch", "pitch", 1.0).for_user("").validated().unwrap_err(),
            ControlError::EmptyUserId
        );
    }

    #[test]
    fn test_poly_control_stringifies_value() {
        let cmd = PolyControlCommand::new("mozza", "deform", PropertyKind::Float, 0.25)
            .validated()
            .unwrap();
        assert_eq!(cmd.value, "0.25");
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["kind"], "float");
    }

    #[test]
    fn test_poly_control_numeric_kind_requires_number() {
        let cmd = PolyControlCommand::new("mozza", "shape", PropertyKind::Int, "smile");
        assert_eq!(cmd.validated().unwrap_err(), ControlError::InvalidValue);
    }

    #[test]
    fn test_property_kind_inference() {
        assert_eq!(PropertyKind::infer("3"), PropertyKind::Int);
        assert_eq!(PropertyKind::infer("0.5"), PropertyKind::Float);
        assert_eq!(PropertyKind::infer("smile"), PropertyKind::String);
    }
}
