//! Stream payload model.
//!
//! Every event received on the upstream stream is one JSON object. It is
//! resolved once, when it arrives, into either an image record (a base64 PNG
//! screenshot with a caption) or a generic record whose fields are listed as
//! `key: value` lines.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ConsoleError, Result};

/// A parsed log entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    /// Screenshot with its caption
    Image { img: String, message: String },
    /// Any other object, fields in payload order
    Generic { fields: Map<String, Value> },
}

/// One `key: value` line of a generic record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldLine {
    pub key: String,
    pub value: String,
}

impl Record {
    /// Decode one event payload.
    ///
    /// Returns the payload re-serialized to its canonical JSON text together
    /// with the resolved record.
    pub fn decode(data: &str) -> Result<(String, Record)> {
        let value: Value = serde_json::from_str(data)
            .map_err(|e| ConsoleError::Payload(format!("not JSON: {e}")))?;
        let record = Record::from_value(&value)?;
        let raw = serde_json::to_string(&value)?;
        Ok((raw, record))
    }

    pub fn from_value(value: &Value) -> Result<Record> {
        let Value::Object(obj) = value else {
            return Err(ConsoleError::Payload(format!(
                "expected a JSON object, got {}",
                kind_of(value)
            )));
        };

        match obj.get("img") {
            Some(Value::String(img)) if !img.is_empty() => {
                if STANDARD.decode(img).is_err() {
                    return Err(ConsoleError::Payload("`img` is not valid base64".to_string()));
                }
                let message = match obj.get("message") {
                    None | Some(Value::Null) => String::new(),
                    Some(v) => display_value(v),
                };
                Ok(Record::Image { img: img.clone(), message })
            }
            _ => Ok(Record::Generic { fields: obj.clone() }),
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Record::Image { .. })
    }

    /// Field lines of a generic record; empty for image records.
    pub fn lines(&self) -> Vec<FieldLine> {
        match self {
            Record::Image { .. } => Vec::new(),
            Record::Generic { fields } => fields
                .iter()
                .map(|(key, value)| FieldLine { key: key.clone(), value: display_value(value) })
                .collect(),
        }
    }
}

/// String form of a field value: nested values as compact JSON, scalars as
/// plain text.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (_, Some(u), _) => u.to_string(),
            (_, _, Some(f)) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e21 => {
                format!("{f:.0}")
            }
            _ => n.to_string(),
        },
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
