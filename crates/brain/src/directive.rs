//! The reasoning service's structured output.

use serde::{Deserialize, Serialize};

use crate::{BrainError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Happy,
    Sad,
    Surprised,
    #[default]
    Neutral,
    Thinking,
    Angry,
}

impl Emotion {
    /// Lenient parse: unknown values fall back to neutral.
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "happy" => Emotion::Happy,
            "sad" => Emotion::Sad,
            "surprised" => Emotion::Surprised,
            "thinking" => Emotion::Thinking,
            "angry" => Emotion::Angry,
            _ => Emotion::Neutral,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Surprised => "surprised",
            Emotion::Neutral => "neutral",
            Emotion::Thinking => "thinking",
            Emotion::Angry => "angry",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Motion {
    #[default]
    Idle,
    Nod,
    Shake,
    Wave,
    Jump,
}

impl Motion {
    /// Lenient parse: unknown values fall back to idle.
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "nod" => Motion::Nod,
            "shake" => Motion::Shake,
            "wave" => Motion::Wave,
            "jump" => Motion::Jump,
            _ => Motion::Idle,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Motion::Idle => "idle",
            Motion::Nod => "nod",
            Motion::Shake => "shake",
            Motion::Wave => "wave",
            Motion::Jump => "jump",
        }
    }
}

/// One completed decision: what to say, how to look, how to move.
/// Produced once per decision-loop call and fanned out to the renderer
/// and the speech synthesizer; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    pub text: String,
    pub emotion: Emotion,
    pub motion: Motion,
}

/// Parse a directive from the service's JSON object. Missing or unknown
/// emotion/motion default; missing text is a recoverable error, not a
/// crash.
pub fn parse_directive(value: &serde_json::Value) -> Result<Directive> {
    if !value.is_object() {
        return Err(BrainError::Malformed(format!(
            "expected object, got {value}"
        )));
    }

    let text = value
        .get("text")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .trim()
        .to_string();
    if text.is_empty() {
        return Err(BrainError::MissingText);
    }

    let emotion = value
        .get("emotion")
        .and_then(|v| v.as_str())
        .map(Emotion::parse)
        .unwrap_or_default();
    let motion = value
        .get("motion")
        .and_then(|v| v.as_str())
        .map(Motion::parse)
        .unwrap_or_default();

    Ok(Directive {
        text,
        emotion,
        motion,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_directive() {
        let directive = parse_directive(&json!({
            "text": "Hello there!",
            "emotion": "happy",
            "motion": "wave"
        }))
        .unwrap();
        assert_eq!(directive.text, "Hello there!");
        assert_eq!(directive.emotion, Emotion::Happy);
        assert_eq!(directive.motion, Motion::Wave);
    }

    #[test]
    fn test_missing_fields_default() {
        let directive = parse_directive(&json!({"text": "hi"})).unwrap();
        assert_eq!(directive.emotion, Emotion::Neutral);
        assert_eq!(directive.motion, Motion::Idle);
    }

    #[test]
    fn test_unknown_enum_values_default() {
        let directive = parse_directive(&json!({
            "text": "hi",
            "emotion": "ecstatic",
            "motion": "backflip"
        }))
        .unwrap();
        assert_eq!(directive.emotion, Emotion::Neutral);
        assert_eq!(directive.motion, Motion::Idle);
    }

    #[test]
    fn test_missing_text_is_recoverable_error() {
        assert!(matches!(
            parse_directive(&json!({"emotion": "happy"})),
            Err(BrainError::MissingText)
        ));
        assert!(matches!(
            parse_directive(&json!({"text": "   "})),
            Err(BrainError::MissingText)
        ));
    }

    #[test]
    fn test_non_object_is_malformed() {
        assert!(matches!(
            parse_directive(&json!("just a string")),
            Err(BrainError::Malformed(_))
        ));
    }

    #[test]
    fn test_enum_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Emotion::Thinking).unwrap(), "\"thinking\"");
        assert_eq!(serde_json::to_string(&Motion::Nod).unwrap(), "\"nod\"");
    }
}
