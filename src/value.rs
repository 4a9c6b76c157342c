//! Bound parameter values and conversions between JSON, Rust and SQLite.
use crate::core::{FeedbaseError, Result};
use crate::schema::{schema, FieldDef, ScalarType};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use serde_json::Value as JsonValue;

/// A value bound to a statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(DateTime<Utc>),
    Json(JsonValue),
}

/// Formats a timestamp the way it is stored: RFC 3339, UTC, milliseconds.
/// Fixed width keeps lexical and chronological order identical.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now() -> DateTime<Utc> {
    // truncate to stored precision so values read back compare equal
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Converts an untyped JSON value, as used for raw query parameters.
    pub fn from_json(json: &JsonValue) -> Value {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            JsonValue::String(s) => Value::Text(s.clone()),
            other => Value::Json(other.clone()),
        }
    }

    /// Renders the value as JSON output.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::Text(s) => JsonValue::String(s.clone()),
            Value::DateTime(dt) => JsonValue::String(format_datetime(dt)),
            Value::Json(j) => j.clone(),
        }
    }

    /// Checks that a value built in Rust can be stored in the given field.
    pub fn conforms_to(&self, field: &FieldDef) -> bool {
        match (self, field.ty) {
            (Value::Null, _) => field.nullable,
            (Value::Bool(_), ScalarType::Boolean) => true,
            (Value::Int(_), ScalarType::Int | ScalarType::Float) => true,
            (Value::Float(_), ScalarType::Float) => true,
            (Value::Text(_), ScalarType::String) => true,
            (Value::Text(s), ScalarType::Enum(name)) => schema()
                .enum_def(name)
                .map(|e| e.contains(s))
                .unwrap_or(false),
            (Value::Text(s), ScalarType::DateTime) => DateTime::parse_from_rfc3339(s).is_ok(),
            (Value::DateTime(_), ScalarType::DateTime) => true,
            (_, ScalarType::Json) => true,
            _ => false,
        }
    }

    /// Normalises a conforming value to its stored representation. Text
    /// timestamps are re-rendered in the fixed-width stored format.
    pub fn normalize(self, field: &FieldDef) -> Value {
        match (self, field.ty) {
            (Value::Text(s), ScalarType::DateTime) => match DateTime::parse_from_rfc3339(&s) {
                Ok(dt) => Value::DateTime(dt.with_timezone(&Utc)),
                Err(_) => Value::Text(s),
            },
            (Value::Int(i), ScalarType::Float) => Value::Float(i as f64),
            (v @ Value::Null, _) => v,
            (v @ Value::Json(_), _) => v,
            (v, ScalarType::Json) => Value::Json(v.to_json()),
            (v, _) => v,
        }
    }
}

/// Validates a JSON input value against a field's declared type.
pub fn coerce(model: &str, field: &FieldDef, json: &JsonValue) -> Result<Value> {
    let invalid = |expected: &str| {
        FeedbaseError::Validation(format!(
            "Invalid value for argument `{}` on model `{}`: expected {}, provided {}",
            field.name, model, expected, json
        ))
    };

    if json.is_null() {
        return if field.nullable {
            Ok(Value::Null)
        } else {
            Err(FeedbaseError::Validation(format!(
                "Argument `{}` on model `{}` must not be null",
                field.name, model
            )))
        };
    }

    match field.ty {
        ScalarType::String => json
            .as_str()
            .map(|s| Value::Text(s.to_string()))
            .ok_or_else(|| invalid("String")),
        ScalarType::Boolean => json.as_bool().map(Value::Bool).ok_or_else(|| invalid("Boolean")),
        ScalarType::Int => json.as_i64().map(Value::Int).ok_or_else(|| invalid("Int")),
        ScalarType::Float => json.as_f64().map(Value::Float).ok_or_else(|| invalid("Float")),
        ScalarType::DateTime => json
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| Value::DateTime(dt.with_timezone(&Utc)))
            .ok_or_else(|| invalid("DateTime in RFC 3339 format")),
        ScalarType::Json => Ok(Value::Json(json.clone())),
        ScalarType::Enum(name) => {
            let def = schema()
                .enum_def(name)
                .ok_or_else(|| FeedbaseError::Schema(format!("Unknown enum `{}`", name)))?;
            match json.as_str() {
                Some(s) if def.contains(s) => Ok(Value::Text(s.to_string())),
                _ => Err(invalid(&format!("{} ({})", name, def.values.join(" | ")))),
            }
        }
    }
}

/// Converts a stored column back to JSON output according to the field type.
pub fn decode(field: &FieldDef, value: ValueRef<'_>) -> JsonValue {
    match (field.ty, value) {
        (_, ValueRef::Null) => JsonValue::Null,
        (ScalarType::Boolean, ValueRef::Integer(i)) => JsonValue::Bool(i != 0),
        (ScalarType::Float, ValueRef::Integer(i)) => float_json(i as f64),
        (ScalarType::Json, ValueRef::Text(t)) => {
            let text = String::from_utf8_lossy(t);
            serde_json::from_str(&text).unwrap_or(JsonValue::String(text.into_owned()))
        }
        (_, other) => decode_any(other),
    }
}

/// Converts a column without schema information, as for raw queries.
pub fn decode_any(value: ValueRef<'_>) -> JsonValue {
    match value {
        ValueRef::Null => JsonValue::Null,
        ValueRef::Integer(i) => JsonValue::from(i),
        ValueRef::Real(f) => float_json(f),
        ValueRef::Text(t) => JsonValue::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => JsonValue::Array(b.iter().map(|byte| JsonValue::from(*byte)).collect()),
    }
}

fn float_json(f: f64) -> JsonValue {
    serde_json::Number::from_f64(f)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Bool(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
            Value::Int(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Float(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::DateTime(dt) => ToSqlOutput::Owned(SqlValue::Text(format_datetime(dt))),
            Value::Json(j) => ToSqlOutput::Owned(SqlValue::Text(j.to_string())),
        })
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Text(s.clone())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::DateTime(dt)
    }
}

impl From<JsonValue> for Value {
    fn from(j: JsonValue) -> Self {
        Value::Json(j)
    }
}

impl From<SqlValue> for Value {
    fn from(v: SqlValue) -> Self {
        match v {
            SqlValue::Null => Value::Null,
            SqlValue::Integer(i) => Value::Int(i),
            SqlValue::Real(f) => Value::Float(f),
            SqlValue::Text(s) => Value::Text(s),
            SqlValue::Blob(b) => Value::Text(String::from_utf8_lossy(&b).into_owned()),
        }
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(model: &str, name: &str) -> &'static FieldDef {
        schema().model(model).unwrap().field(name).unwrap()
    }

    #[test]
    fn test_coerce_enum_values() {
        let status = field("Feedback", "status");
        assert_eq!(
            coerce("Feedback", status, &json!("OPEN")).unwrap(),
            Value::Text("OPEN".to_string())
        );
        let err = coerce("Feedback", status, &json!("DONE")).unwrap_err();
        assert!(err.to_string().contains("FeedbackStatus"));
    }

    #[test]
    fn test_coerce_rejects_null_on_required_field() {
        let email = field("User", "email");
        assert!(matches!(
            coerce("User", email, &JsonValue::Null),
            Err(FeedbaseError::Validation(_))
        ));
        let image = field("User", "image");
        assert_eq!(coerce("User", image, &JsonValue::Null).unwrap(), Value::Null);
    }

    #[test]
    fn test_coerce_datetime_normalises_offset() {
        let expires = field("Session", "expiresAt");
        let value = coerce("Session", expires, &json!("2024-03-01T10:00:00+02:00")).unwrap();
        assert_eq!(value.to_json(), json!("2024-03-01T08:00:00.000Z"));
    }

    #[test]
    fn test_conforms_to_checks_enum_membership() {
        let role = field("OrganizationMember", "role");
        assert!(Value::from("ADMIN").conforms_to(role));
        assert!(!Value::from("GUEST").conforms_to(role));
        assert!(!Value::Null.conforms_to(role));
    }

    #[test]
    fn test_decode_booleans_and_json() {
        let verified = field("User", "emailVerified");
        assert_eq!(decode(verified, ValueRef::Integer(1)), json!(true));

        let metadata = field("Feedback", "metadata");
        let text = br#"{"browser":"firefox"}"#;
        assert_eq!(decode(metadata, ValueRef::Text(text)), json!({"browser": "firefox"}));
    }

    #[test]
    fn test_datetime_binds_as_fixed_width_text() {
        let dt = DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let stored: String = conn
            .query_row("SELECT ?1", [Value::DateTime(dt)], |row| row.get(0))
            .unwrap();
        assert_eq!(stored, "2024-01-02T03:04:05.000Z");
    }
}
