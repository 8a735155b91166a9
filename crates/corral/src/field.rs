//! Per-column value codecs.
//!
//! A [`FieldType`] describes how one column's values convert between the
//! domain representation handed to callers and the storage representation
//! written to SQL, and whether literals of the column need quoting.
//!
//! Datetime columns use an epoch-seconds domain value and a formatted UTC
//! text storage value.

use crate::error::{OrmError, OrmResult};
use crate::value::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Storage codec for one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Passthrough text, quoted.
    Text,
    /// Passthrough numeric, unquoted.
    Numeric,
    /// Stored as 0/1, unquoted.
    Bool,
    /// Epoch seconds ↔ `YYYY-MM-DD HH:MM:SS` (UTC), quoted.
    DateTime,
    /// Epoch seconds ↔ `YYYY-MM-DD` (UTC), quoted.
    Date,
}

impl FieldType {
    /// Whether SQL literals of this column must be quoted.
    pub fn requires_quoting(&self) -> bool {
        match self {
            FieldType::Text | FieldType::DateTime | FieldType::Date => true,
            FieldType::Numeric | FieldType::Bool => false,
        }
    }

    /// Whether this column stores only a truth bit.
    pub fn is_binary_only(&self) -> bool {
        matches!(self, FieldType::Bool)
    }

    fn date_format(&self) -> Option<&'static str> {
        match self {
            FieldType::DateTime => Some(DATETIME_FORMAT),
            FieldType::Date => Some(DATE_FORMAT),
            _ => None,
        }
    }

    /// Convert a domain value into its storage representation.
    ///
    /// NULL passes through untouched. Date-typed columns require a numeric
    /// epoch value.
    pub fn convert_to_database(&self, value: &Value) -> OrmResult<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        if self.is_binary_only() {
            return Ok(Value::Int(if truthiness(value) { 1 } else { 0 }));
        }
        if let Some(format) = self.date_format() {
            let epoch = value.as_int().ok_or_else(|| {
                OrmError::validation(format!(
                    "invalid date value (expecting numeric epoch seconds): {value}"
                ))
            })?;
            let when: DateTime<Utc> = Utc
                .timestamp_opt(epoch, 0)
                .single()
                .ok_or_else(|| OrmError::validation(format!("epoch out of range: {epoch}")))?;
            return Ok(Value::Text(when.format(format).to_string()));
        }
        Ok(value.clone())
    }

    /// Convert a storage value back to its domain representation.
    pub fn convert_from_database(&self, value: &Value) -> OrmResult<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        if self.is_binary_only() {
            return Ok(Value::Bool(truthiness(value)));
        }
        match self {
            FieldType::DateTime => {
                let text = storage_text(value)?;
                let parsed = NaiveDateTime::parse_from_str(&text, DATETIME_FORMAT)
                    .map_err(|e| {
                        OrmError::validation(format!("unparseable datetime '{text}': {e}"))
                    })?;
                Ok(Value::Int(parsed.and_utc().timestamp()))
            }
            FieldType::Date => {
                let text = storage_text(value)?;
                let parsed = NaiveDate::parse_from_str(&text, DATE_FORMAT).map_err(|e| {
                    OrmError::validation(format!("unparseable date '{text}': {e}"))
                })?;
                let midnight = parsed.and_hms_opt(0, 0, 0).ok_or_else(|| {
                    OrmError::validation(format!("date out of range: '{text}'"))
                })?;
                Ok(Value::Int(midnight.and_utc().timestamp()))
            }
            _ => Ok(value.clone()),
        }
    }
}

fn truthiness(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Int(n) => *n != 0,
        Value::Float(f) => *f != 0.0,
        Value::Text(s) => !s.is_empty() && s != "0",
    }
}

fn storage_text(value: &Value) -> OrmResult<String> {
    match value {
        Value::Text(s) => Ok(s.clone()),
        other => Err(OrmError::validation(format!(
            "expected text storage value, got {other:?}"
        ))),
    }
}
