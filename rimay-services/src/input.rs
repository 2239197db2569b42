//! Loose input coercion shared by the API-facing services.
//!
//! Mobile clients send coordinates as JSON numbers or as numeric strings,
//! and optional text as missing, null, or empty.

use serde_json::Value;

use rimay_core::error::FieldErrors;

/// Message for a required field left blank.
pub const REQUIRED: &str = "Este campo es obligatorio.";

/// A coordinate as received from a client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Coordinate {
    Missing,
    NotNumeric,
    Value(f64),
}

impl Coordinate {
    pub fn parse(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => Coordinate::Missing,
            Some(Value::Number(n)) => n.as_f64().map_or(Coordinate::NotNumeric, Coordinate::Value),
            Some(Value::String(s)) if s.trim().is_empty() => Coordinate::NotNumeric,
            Some(Value::String(s)) => match s.trim().parse::<f64>() {
                Ok(v) if v.is_finite() => Coordinate::Value(v),
                _ => Coordinate::NotNumeric,
            },
            Some(_) => Coordinate::NotNumeric,
        }
    }

    pub fn value(self) -> Option<f64> {
        match self {
            Coordinate::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// Trimmed, non-empty text or `None`.
pub fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Record a required-field error when blank; returns the trimmed value.
pub fn required<'a>(errors: &mut FieldErrors, field: &str, value: &'a Option<String>) -> &'a str {
    match non_blank(value) {
        Some(v) => v,
        None => {
            errors.add(field, REQUIRED);
            ""
        }
    }
}

/// Record a length error when `value` exceeds `max` characters.
pub fn max_len(errors: &mut FieldErrors, field: &str, value: &str, max: usize) {
    let len = value.chars().count();
    if len > max {
        errors.add(
            field,
            format!("Asegúrese de que este valor tenga como máximo {max} caracteres (tiene {len})."),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coordinate_forms() {
        assert_eq!(Coordinate::parse(None), Coordinate::Missing);
        assert_eq!(Coordinate::parse(Some(&Value::Null)), Coordinate::Missing);
        assert_eq!(Coordinate::parse(Some(&json!(0.0))), Coordinate::Value(0.0));
        assert_eq!(Coordinate::parse(Some(&json!("-0.18"))), Coordinate::Value(-0.18));
        assert_eq!(Coordinate::parse(Some(&json!("abc"))), Coordinate::NotNumeric);
        assert_eq!(Coordinate::parse(Some(&json!(""))), Coordinate::NotNumeric);
        assert_eq!(Coordinate::parse(Some(&json!([1]))), Coordinate::NotNumeric);
    }

    #[test]
    fn test_required_and_max_len() {
        let mut errors = FieldErrors::new();
        assert_eq!(required(&mut errors, "dni", &Some("  ".into())), "");
        assert_eq!(required(&mut errors, "email", &Some(" a@b.co ".into())), "a@b.co");
        max_len(&mut errors, "token", &"x".repeat(256), 255);
        assert!(errors.contains("dni"));
        assert!(!errors.contains("email"));
        assert!(errors.contains("token"));
    }
}
