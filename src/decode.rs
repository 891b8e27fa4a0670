//! ==============================================================================
//! decode.rs - payload decoder and zero-value classifier
//! ==============================================================================
//!
//! purpose:
//!     sensor firmware on the shared broker does not agree on a payload
//!     convention. some nodes publish `{"valor": 42}`, some publish a bare
//!     number, some publish free text. `decode` accepts all three without
//!     per-sensor parsing code and never fails.
//!
//!     `is_zero_like` recognises the "no reading" sentinel (an oximeter with
//!     no finger inserted publishes `0`, `"0"` or `"0.0"`).
//!
//! relationships:
//!     - used by: transport.rs (decode), store.rs (is_zero_like)
//!
//! ==============================================================================

use crate::domain::SensorValue;
use serde_json::Value;

/// field carrying the reading in structured payloads
const VALUE_FIELD: &str = "valor";

/// decode a raw message body, first match wins:
/// structured object with `valor`, then base-10 number (blank is 0), then raw text
pub fn decode(raw: &str) -> SensorValue {
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(raw) {
        if let Some(v) = obj.get(VALUE_FIELD) {
            return from_json(v);
        }
    }

    // an empty body is the numeric zero, as the sensor clients read it
    if raw.trim().is_empty() {
        return SensorValue::Numeric(0.0);
    }

    match parse_number(raw) {
        Some(n) => SensorValue::Numeric(n),
        None => SensorValue::Text(raw.to_string()),
    }
}

/// true when the value means "sensor has no reading"
pub fn is_zero_like(value: &SensorValue) -> bool {
    match value {
        SensorValue::Numeric(n) => *n == 0.0,
        SensorValue::Text(s) => {
            let trimmed = s.trim();
            // blank text counts as an empty reading
            if trimmed.is_empty() {
                return true;
            }
            match parse_number(trimmed) {
                Some(n) => n == 0.0,
                None => trimmed == "0",
            }
        }
    }
}

fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    // f64::from_str also takes "inf" and "NaN"; those stay text
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn from_json(v: &Value) -> SensorValue {
    match v {
        Value::Number(n) => n
            .as_f64()
            .map(SensorValue::Numeric)
            .unwrap_or_else(|| SensorValue::Text(n.to_string())),
        Value::String(s) => SensorValue::Text(s.clone()),
        other => SensorValue::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_payload_wins() {
        assert_eq!(decode(r#"{"valor": 42}"#), SensorValue::Numeric(42.0));
        assert_eq!(decode(r#"{"valor": "98", "unit": "%"}"#), SensorValue::Text("98".into()));
    }

    #[test]
    fn object_without_valor_falls_through_to_text() {
        let raw = r#"{"value": 42}"#;
        assert_eq!(decode(raw), SensorValue::Text(raw.into()));
    }

    #[test]
    fn bare_numbers() {
        assert_eq!(decode("17.5"), SensorValue::Numeric(17.5));
        assert_eq!(decode(" 78 "), SensorValue::Numeric(78.0));
        assert_eq!(decode("-3"), SensorValue::Numeric(-3.0));
    }

    #[test]
    fn blank_body_is_numeric_zero() {
        assert_eq!(decode(""), SensorValue::Numeric(0.0));
        assert_eq!(decode("  \n"), SensorValue::Numeric(0.0));
        assert!(is_zero_like(&decode("")));
    }

    #[test]
    fn text_fallback() {
        assert_eq!(decode("abc"), SensorValue::Text("abc".into()));
        assert_eq!(decode("NaN"), SensorValue::Text("NaN".into()));
        assert_eq!(decode("inf"), SensorValue::Text("inf".into()));
    }

    #[test]
    fn non_scalar_valor_is_kept_as_text() {
        assert_eq!(decode(r#"{"valor": true}"#), SensorValue::Text("true".into()));
        assert_eq!(decode(r#"{"valor": null}"#), SensorValue::Text("null".into()));
    }

    #[test]
    fn zero_encodings() {
        assert!(is_zero_like(&decode("0")));
        assert!(is_zero_like(&decode("0.0")));
        assert!(is_zero_like(&SensorValue::Text(" 0.00 ".into())));
        assert!(is_zero_like(&SensorValue::Text("-0".into())));
        assert!(is_zero_like(&SensorValue::Numeric(0.0)));
        assert!(is_zero_like(&decode(r#"{"valor": "0"}"#)));
    }

    #[test]
    fn non_zero_values() {
        assert!(!is_zero_like(&SensorValue::Numeric(0.1)));
        assert!(!is_zero_like(&SensorValue::Text("abc".into())));
        assert!(!is_zero_like(&SensorValue::Text("00a".into())));
    }
}
