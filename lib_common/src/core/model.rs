//! Event record types and the validation boundary.
//!
//! An [`EventRecord`] is one ingested machine-cycle observation: which stroke
//! the press performed, its timing offset, and optional vibration amplitudes.
//! Transports hand raw JSON to [`EventRecord::from_value`]; only records that
//! pass it may enter the pipeline, so everything downstream can rely on the
//! required fields being present and well typed.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Stroke phase of a press cycle. Closed set; anything else is rejected at
/// the validation boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrokeEvent {
    /// The press reached its top position.
    Top,
    /// The press reached its base position.
    Base,
}

impl StrokeEvent {
    /// Wire/label form of the event name.
    pub fn as_str(&self) -> &'static str {
        match self {
            StrokeEvent::Top => "top",
            StrokeEvent::Base => "base",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "top" => Some(StrokeEvent::Top),
            "base" => Some(StrokeEvent::Base),
            _ => None,
        }
    }
}

impl fmt::Display for StrokeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deviation verdict attached to a record when a spec entry exists for its
/// `(topic, event)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    /// Configured target timing (ms).
    pub ideal_ms: f64,
    /// Allowed absolute deviation (ms).
    pub tolerance_ms: f64,
    /// Signed difference between observed and target timing (ms).
    pub deviation_ms: f64,
    /// Whether `|deviation_ms| <= tolerance_ms` (inclusive boundary).
    pub in_spec: bool,
}

/// One ingested machine-cycle observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Logical machine/line identifier. Never empty.
    pub topic: String,
    /// Stroke phase.
    pub event: StrokeEvent,
    /// Timing offset in milliseconds. Always finite; non-negative under
    /// strict validation.
    pub t_ms: f64,
    /// RMS vibration amplitude (g), when the producer supplied a usable value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v_rms_g: Option<f64>,
    /// Peak vibration amplitude (g), when the producer supplied a usable value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v_peak_g: Option<f64>,
    /// Deviation verdict; attached by the ingestor, never by producers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Analysis>,
}

/// Why a raw input failed structural validation. Reported to the producer;
/// the record never reaches the pipeline.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The input was not a JSON object.
    #[error("payload must be a JSON object")]
    NotAnObject,
    /// A required field was missing entirely.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    /// `topic` was present but not a non-empty string.
    #[error("`topic` must be a non-empty string")]
    InvalidTopic,
    /// `event` was present but outside the closed set.
    #[error("`event` must be one of `top`, `base`")]
    InvalidEvent,
    /// `t_ms` was present but not an acceptable number.
    #[error("`t_ms` must be a non-negative finite number")]
    InvalidTiming,
}

/// Validation variant. The source system shipped both over its revisions;
/// strict is the reference behavior, lenient merely lifts the non-negativity
/// requirement on `t_ms` (it must still be a finite number).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// `t_ms` must be finite and non-negative.
    Strict,
    /// `t_ms` must be finite; negative offsets are accepted.
    Lenient,
}

impl EventRecord {
    /// Validates a raw JSON value into an [`EventRecord`].
    ///
    /// Required fields (`topic`, `event`, `t_ms`) are checked strictly and a
    /// failure rejects the whole input. Optional numeric fields are read
    /// leniently: a number or a numeric string is accepted, anything else is
    /// treated as absent rather than invalid. Unknown extra fields are
    /// tolerated and dropped. The `analysis` field is never taken from the
    /// producer.
    pub fn from_value(value: &Value, mode: ValidationMode) -> Result<Self, ValidationError> {
        let obj = value.as_object().ok_or(ValidationError::NotAnObject)?;

        let topic = match obj.get("topic") {
            None | Some(Value::Null) => return Err(ValidationError::MissingField("topic")),
            Some(v) => v
                .as_str()
                .filter(|s| !s.is_empty())
                .ok_or(ValidationError::InvalidTopic)?
                .to_string(),
        };

        let event = match obj.get("event") {
            None | Some(Value::Null) => return Err(ValidationError::MissingField("event")),
            Some(v) => v
                .as_str()
                .and_then(StrokeEvent::parse)
                .ok_or(ValidationError::InvalidEvent)?,
        };

        let t_ms = match obj.get("t_ms") {
            None | Some(Value::Null) => return Err(ValidationError::MissingField("t_ms")),
            Some(v) => as_number(v)
                .filter(|t| t.is_finite())
                .ok_or(ValidationError::InvalidTiming)?,
        };
        if mode == ValidationMode::Strict && t_ms < 0.0 {
            return Err(ValidationError::InvalidTiming);
        }

        Ok(EventRecord {
            topic,
            event,
            t_ms,
            v_rms_g: obj.get("v_rms_g").and_then(amplitude),
            v_peak_g: obj.get("v_peak_g").and_then(amplitude),
            analysis: None,
        })
    }
}

/// Reads a JSON value as a number, accepting numeric strings the way the
/// producers actually send them.
fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Lenient read of an optional vibration amplitude: usable iff numeric,
/// finite and non-negative; absent otherwise. Never coerced to zero.
fn amplitude(v: &Value) -> Option<f64> {
    as_number(v).filter(|x| x.is_finite() && *x >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_minimal_strict_record() {
        let raw = json!({"topic": "press-01", "event": "top", "t_ms": 880.5});
        let rec = EventRecord::from_value(&raw, ValidationMode::Strict).unwrap();
        assert_eq!(rec.topic, "press-01");
        assert_eq!(rec.event, StrokeEvent::Top);
        assert_eq!(rec.t_ms, 880.5);
        assert_eq!(rec.v_rms_g, None);
        assert_eq!(rec.v_peak_g, None);
        assert!(rec.analysis.is_none());
    }

    #[test]
    fn rejects_missing_required_fields() {
        let cases = [
            (json!({"event": "top", "t_ms": 1.0}), ValidationError::MissingField("topic")),
            (json!({"topic": "p", "t_ms": 1.0}), ValidationError::MissingField("event")),
            (json!({"topic": "p", "event": "base"}), ValidationError::MissingField("t_ms")),
        ];
        for (raw, expected) in cases {
            assert_eq!(
                EventRecord::from_value(&raw, ValidationMode::Strict).unwrap_err(),
                expected
            );
        }
    }

    #[test]
    fn rejects_event_outside_closed_set() {
        let raw = json!({"topic": "p", "event": "middle", "t_ms": 1.0});
        assert_eq!(
            EventRecord::from_value(&raw, ValidationMode::Strict).unwrap_err(),
            ValidationError::InvalidEvent
        );
    }

    #[test]
    fn rejects_negative_timing_in_strict_mode_only() {
        let raw = json!({"topic": "p", "event": "top", "t_ms": -5.0});
        assert_eq!(
            EventRecord::from_value(&raw, ValidationMode::Strict).unwrap_err(),
            ValidationError::InvalidTiming
        );
        let rec = EventRecord::from_value(&raw, ValidationMode::Lenient).unwrap();
        assert_eq!(rec.t_ms, -5.0);
    }

    #[test]
    fn rejects_non_finite_timing_in_both_modes() {
        let raw = json!({"topic": "p", "event": "top", "t_ms": "NaN"});
        for mode in [ValidationMode::Strict, ValidationMode::Lenient] {
            assert_eq!(
                EventRecord::from_value(&raw, mode).unwrap_err(),
                ValidationError::InvalidTiming
            );
        }
    }

    #[test]
    fn accepts_numeric_string_timing() {
        let raw = json!({"topic": "p", "event": "base", "t_ms": "912.25"});
        let rec = EventRecord::from_value(&raw, ValidationMode::Strict).unwrap();
        assert_eq!(rec.t_ms, 912.25);
    }

    #[test]
    fn non_numeric_optional_fields_are_absent_not_invalid() {
        let raw = json!({
            "topic": "p",
            "event": "top",
            "t_ms": 10.0,
            "v_rms_g": "not a number",
            "v_peak_g": {"g": 1.0}
        });
        let rec = EventRecord::from_value(&raw, ValidationMode::Strict).unwrap();
        assert_eq!(rec.v_rms_g, None);
        assert_eq!(rec.v_peak_g, None);
    }

    #[test]
    fn negative_optional_amplitude_is_absent() {
        let raw = json!({"topic": "p", "event": "top", "t_ms": 10.0, "v_rms_g": -0.2});
        let rec = EventRecord::from_value(&raw, ValidationMode::Strict).unwrap();
        assert_eq!(rec.v_rms_g, None);
    }

    #[test]
    fn optional_amplitudes_accept_numbers_and_numeric_strings() {
        let raw = json!({
            "topic": "p",
            "event": "base",
            "t_ms": 10.0,
            "v_rms_g": 0.41,
            "v_peak_g": "1.9"
        });
        let rec = EventRecord::from_value(&raw, ValidationMode::Strict).unwrap();
        assert_eq!(rec.v_rms_g, Some(0.41));
        assert_eq!(rec.v_peak_g, Some(1.9));
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let raw = json!({"topic": "p", "event": "top", "t_ms": 1.0, "firmware": "2.1.0"});
        assert!(EventRecord::from_value(&raw, ValidationMode::Strict).is_ok());
    }

    #[test]
    fn producer_supplied_analysis_is_ignored() {
        let raw = json!({
            "topic": "p", "event": "top", "t_ms": 1.0,
            "analysis": {"ideal_ms": 1.0, "tolerance_ms": 1.0, "deviation_ms": 0.0, "in_spec": true}
        });
        let rec = EventRecord::from_value(&raw, ValidationMode::Strict).unwrap();
        assert!(rec.analysis.is_none());
    }

    #[test]
    fn serialized_shape_omits_absent_optionals() {
        let rec = EventRecord {
            topic: "press-01".into(),
            event: StrokeEvent::Base,
            t_ms: 903.0,
            v_rms_g: None,
            v_peak_g: None,
            analysis: None,
        };
        let text = serde_json::to_string(&rec).unwrap();
        assert_eq!(text, r#"{"topic":"press-01","event":"base","t_ms":903.0}"#);
    }
}
