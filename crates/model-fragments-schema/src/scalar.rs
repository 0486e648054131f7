//! Primitive attribute values and the transforms that move them between JSON
//! payloads and their typed in-memory form.
//!
//! | transform | accepted JSON                         | in memory         |
//! |-----------|---------------------------------------|-------------------|
//! | `string`  | any scalar (numbers/bools stringified) | `Scalar::String`  |
//! | `number`  | numbers, numeric strings              | `Scalar::Number`  |
//! | `boolean` | bools, `"true"`/`"t"`/`"1"`, `1`        | `Scalar::Bool`    |
//! | `date`    | RFC 3339 / `YYYY-MM-DD`, epoch millis | `Scalar::Date`    |
//! | `raw`     | anything                              | passthrough       |
//!
//! `null` is accepted by every transform and stays `Scalar::Null`.

use std::fmt;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::error::SchemaError;

/// A primitive attribute value.
///
/// Equality compares numbers by value, so `1`, `1.0` and a `"1.00"` payload
/// run through the number transform are all equal.
#[derive(Debug, Clone, Default)]
pub enum Scalar {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Date(DateTime<Utc>),
    /// Untyped JSON kept verbatim (the `raw` transform).
    Json(Value),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Scalar::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// JSON view of the value. Dates use millisecond RFC 3339 with a `Z`
    /// suffix, the same shape `Date#toISOString` produces.
    pub fn to_json(&self) -> Value {
        match self {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Number(n) => Value::Number(n.clone()),
            Scalar::String(s) => Value::String(s.clone()),
            Scalar::Date(d) => Value::String(d.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Scalar::Json(v) => v.clone(),
        }
    }

    /// Untyped conversion used by arrays declared without an item type.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Scalar::Null,
            Value::Bool(b) => Scalar::Bool(*b),
            Value::Number(n) => Scalar::Number(n.clone()),
            Value::String(s) => Scalar::String(s.clone()),
            other => Scalar::Json(other.clone()),
        }
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Scalar::Null, Scalar::Null) => true,
            (Scalar::Bool(a), Scalar::Bool(b)) => a == b,
            (Scalar::Number(a), Scalar::Number(b)) => numbers_equal(a, b),
            (Scalar::String(a), Scalar::String(b)) => a == b,
            (Scalar::Date(a), Scalar::Date(b)) => a == b,
            (Scalar::Json(a), Scalar::Json(b)) => a == b,
            _ => false,
        }
    }
}

fn numbers_equal(a: &Number, b: &Number) -> bool {
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        return a == b;
    }
    if let (Some(a), Some(b)) = (a.as_u64(), b.as_u64()) {
        return a == b;
    }
    a.as_f64() == b.as_f64()
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::String(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::String(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Number(value.into())
    }
}

impl From<u64> for Scalar {
    fn from(value: u64) -> Self {
        Scalar::Number(value.into())
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Scalar::Number(value.into())
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        // NaN and infinities have no JSON form.
        Number::from_f64(value)
            .map(Scalar::Number)
            .unwrap_or(Scalar::Null)
    }
}

impl From<DateTime<Utc>> for Scalar {
    fn from(value: DateTime<Utc>) -> Self {
        Scalar::Date(value)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Scalar::Null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transform {
    String,
    Number,
    Boolean,
    Date,
    #[default]
    Raw,
}

impl Transform {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Raw => "raw",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "date" => Some(Self::Date),
            "raw" => Some(Self::Raw),
            _ => None,
        }
    }

    /// Converts a payload value into its in-memory form.
    pub fn deserialize(self, value: &Value) -> Result<Scalar, SchemaError> {
        if value.is_null() {
            return Ok(Scalar::Null);
        }
        let mismatch = || SchemaError::TransformMismatch {
            transform: self,
            value: value.clone(),
        };
        match self {
            Self::Raw => Ok(Scalar::from_json(value)),
            Self::String => match value {
                Value::String(s) => Ok(Scalar::String(s.clone())),
                Value::Number(n) => Ok(Scalar::String(n.to_string())),
                Value::Bool(b) => Ok(Scalar::String(b.to_string())),
                _ => Err(mismatch()),
            },
            Self::Number => match value {
                Value::Number(n) => Ok(Scalar::Number(n.clone())),
                Value::String(s) if s.trim().is_empty() => Ok(Scalar::Null),
                Value::String(s) => parse_number(s.trim()).ok_or_else(mismatch),
                _ => Err(mismatch()),
            },
            Self::Boolean => match value {
                Value::Bool(b) => Ok(Scalar::Bool(*b)),
                Value::String(s) => Ok(Scalar::Bool(matches!(
                    s.to_ascii_lowercase().as_str(),
                    "true" | "t" | "1"
                ))),
                Value::Number(n) => Ok(Scalar::Bool(n.as_f64() == Some(1.0))),
                _ => Err(mismatch()),
            },
            Self::Date => match value {
                Value::String(s) => parse_date(s).map(Scalar::Date),
                Value::Number(n) => n
                    .as_i64()
                    .and_then(DateTime::from_timestamp_millis)
                    .map(Scalar::Date)
                    .ok_or_else(|| SchemaError::InvalidDate(n.to_string())),
                _ => Err(mismatch()),
            },
        }
    }

    pub fn serialize(self, scalar: &Scalar) -> Value {
        scalar.to_json()
    }

    /// Coerces a value assigned from code. Values already in the transform's
    /// in-memory form are kept as-is.
    pub fn normalize(self, scalar: Scalar) -> Result<Scalar, SchemaError> {
        match (self, &scalar) {
            (_, Scalar::Null)
            | (Self::Raw, _)
            | (Self::String, Scalar::String(_))
            | (Self::Number, Scalar::Number(_))
            | (Self::Boolean, Scalar::Bool(_))
            | (Self::Date, Scalar::Date(_)) => Ok(scalar),
            _ => self.deserialize(&scalar.to_json()),
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn parse_number(raw: &str) -> Option<Scalar> {
    if let Ok(i) = raw.parse::<i64>() {
        return Some(Scalar::Number(i.into()));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Scalar::Number)
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>, SchemaError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| SchemaError::InvalidDate(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_transform_stringifies_scalars() {
        assert_eq!(
            Transform::String.deserialize(&json!(12)).unwrap(),
            Scalar::String("12".into())
        );
        assert_eq!(
            Transform::String.deserialize(&json!(false)).unwrap(),
            Scalar::String("false".into())
        );
        assert!(Transform::String.deserialize(&json!({"a": 1})).is_err());
    }

    #[test]
    fn number_transform_parses_numeric_strings() {
        assert_eq!(
            Transform::Number.deserialize(&json!("42")).unwrap(),
            Scalar::Number(42.into())
        );
        assert_eq!(Transform::Number.deserialize(&json!("")).unwrap(), Scalar::Null);
        assert!(Transform::Number.deserialize(&json!("forty")).is_err());
    }

    #[test]
    fn numbers_compare_by_value() {
        let parsed = Transform::Number.deserialize(&json!("1.00")).unwrap();
        assert_eq!(parsed, Scalar::from(1));
        assert_eq!(Scalar::from(1.0), Scalar::from(1u64));
        assert_eq!(Scalar::from(-2i64), Scalar::from(-2.0));
        assert_ne!(Scalar::from(1.5), Scalar::from(1));
        assert_ne!(Scalar::from(1), Scalar::from("1"));
    }

    #[test]
    fn boolean_transform_accepts_truthy_strings() {
        assert_eq!(
            Transform::Boolean.deserialize(&json!("T")).unwrap(),
            Scalar::Bool(true)
        );
        assert_eq!(
            Transform::Boolean.deserialize(&json!(0)).unwrap(),
            Scalar::Bool(false)
        );
    }

    #[test]
    fn date_transform_reads_iso_and_millis() {
        let iso = Transform::Date
            .deserialize(&json!("2015-03-01T10:00:00.000Z"))
            .unwrap();
        let millis = Transform::Date.deserialize(&json!(1_425_204_000_000i64)).unwrap();
        assert_eq!(iso, millis);
        assert_eq!(iso.to_json(), json!("2015-03-01T10:00:00.000Z"));

        let day = Transform::Date.deserialize(&json!("2015-03-01")).unwrap();
        assert_eq!(day.to_json(), json!("2015-03-01T00:00:00.000Z"));
        assert!(matches!(
            Transform::Date.deserialize(&json!("yesterday")),
            Err(SchemaError::InvalidDate(_))
        ));
    }

    #[test]
    fn null_passes_every_transform() {
        for t in [
            Transform::String,
            Transform::Number,
            Transform::Boolean,
            Transform::Date,
            Transform::Raw,
        ] {
            assert_eq!(t.deserialize(&Value::Null).unwrap(), Scalar::Null);
        }
    }

    #[test]
    fn normalize_keeps_matching_values() {
        let s = Scalar::from("Ser");
        assert_eq!(Transform::String.normalize(s.clone()).unwrap(), s);
        assert_eq!(
            Transform::String.normalize(Scalar::from(3)).unwrap(),
            Scalar::from("3")
        );
    }
}
