//! Logical <-> wire conversion for field kinds
//!
//! Logical values are JSON:
//! - timestamp: RFC 3339 text, millisecond precision, UTC (epoch millis accepted on encode)
//! - uuid: lowercase hyphenated text
//! - decimal: canonical text (numbers accepted on encode)
//! - blob: standard base64 text
//! - map: object whose keys are parsed through the key kind
//!
//! Null collections normalize to empty collections in both directions.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Number, Value};
use std::str::FromStr;
use uuid::Uuid;

use super::errors::{SchemaError, SchemaResult};
use super::types::FieldKind;
use super::value::CqlValue;

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn mismatch(kind: &FieldKind, value: &Value) -> SchemaError {
    SchemaError::type_mismatch("", kind.type_name(), json_type_name(value))
}

fn wire_mismatch(kind: &FieldKind, value: &CqlValue) -> SchemaError {
    SchemaError::type_mismatch("", kind.type_name(), value.type_name())
}

impl FieldKind {
    /// Converts a logical value into its wire form.
    pub fn encode(&self, value: &Value) -> SchemaResult<CqlValue> {
        if value.is_null() {
            return Ok(self.empty_wire());
        }

        match self {
            FieldKind::Text => match value {
                Value::String(s) => Ok(CqlValue::Text(s.clone())),
                other => Err(mismatch(self, other)),
            },
            FieldKind::Int => {
                let n = integer_of(self, value)?;
                i32::try_from(n)
                    .map(CqlValue::Int)
                    .map_err(|_| SchemaError::type_mismatch("", "int", n.to_string()))
            }
            FieldKind::BigInt => integer_of(self, value).map(CqlValue::BigInt),
            FieldKind::Float => {
                let n = float_of(self, value)?;
                let narrowed = n as f32;
                if narrowed.is_finite() {
                    Ok(CqlValue::Float(narrowed))
                } else {
                    Err(SchemaError::type_mismatch("", "float", n.to_string()))
                }
            }
            FieldKind::Double => float_of(self, value).map(CqlValue::Double),
            FieldKind::Boolean => match value {
                Value::Bool(b) => Ok(CqlValue::Boolean(*b)),
                Value::String(s) if s == "true" => Ok(CqlValue::Boolean(true)),
                Value::String(s) if s == "false" => Ok(CqlValue::Boolean(false)),
                other => Err(mismatch(self, other)),
            },
            FieldKind::Timestamp => encode_timestamp(value).map(CqlValue::Timestamp),
            FieldKind::Uuid => match value {
                Value::String(s) => Uuid::parse_str(s)
                    .map(CqlValue::Uuid)
                    .map_err(|_| SchemaError::type_mismatch("", "uuid", format!("'{}'", s))),
                other => Err(mismatch(self, other)),
            },
            FieldKind::Decimal { precision, scale } => {
                encode_decimal(value, *precision, *scale).map(CqlValue::Decimal)
            }
            FieldKind::Blob { max_len } => {
                let bytes = match value {
                    Value::String(s) => STANDARD
                        .decode(s)
                        .map_err(|_| SchemaError::type_mismatch("", "blob", "non-base64 text"))?,
                    other => return Err(mismatch(self, other)),
                };
                match max_len {
                    Some(max) if bytes.len() > *max => Err(SchemaError::type_mismatch(
                        "",
                        format!("blob of at most {} bytes", max),
                        format!("{} bytes", bytes.len()),
                    )),
                    _ => Ok(CqlValue::Blob(bytes)),
                }
            }
            FieldKind::List(elem) => {
                let items = array_of(self, value)?;
                Ok(CqlValue::List(encode_elements(elem, items)?))
            }
            FieldKind::Set(elem) => {
                let items = array_of(self, value)?;
                let mut unique: Vec<CqlValue> = Vec::with_capacity(items.len());
                for encoded in encode_elements(elem, items)? {
                    if !unique.contains(&encoded) {
                        unique.push(encoded);
                    }
                }
                Ok(CqlValue::Set(unique))
            }
            FieldKind::Map(key_kind, value_kind) => {
                let object = match value {
                    Value::Object(o) => o,
                    other => return Err(mismatch(self, other)),
                };
                let mut entries = Vec::with_capacity(object.len());
                for (k, v) in object {
                    let key = key_kind
                        .encode(&Value::String(k.clone()))
                        .map_err(|e| e.at_field(&format!("[{}]", k)))?;
                    let val = value_kind
                        .encode(v)
                        .map_err(|e| e.at_field(&format!("[{}]", k)))?;
                    entries.push((key, val));
                }
                Ok(CqlValue::Map(entries))
            }
        }
    }

    /// Converts a wire value back into its logical form.
    pub fn decode(&self, value: &CqlValue) -> SchemaResult<Value> {
        if value.is_null() {
            return Ok(self.empty_logical());
        }

        match (self, value) {
            (FieldKind::Text, CqlValue::Text(s)) => Ok(Value::String(s.clone())),
            (FieldKind::Int, CqlValue::Int(n)) => Ok(Value::from(*n)),
            (FieldKind::BigInt, CqlValue::BigInt(n)) => Ok(Value::from(*n)),
            (FieldKind::BigInt, CqlValue::Int(n)) => Ok(Value::from(i64::from(*n))),
            (FieldKind::Float, CqlValue::Float(n)) => float_value(widen(*n), self, value),
            (FieldKind::Double, CqlValue::Double(n)) => float_value(*n, self, value),
            (FieldKind::Double, CqlValue::Float(n)) => float_value(widen(*n), self, value),
            (FieldKind::Boolean, CqlValue::Boolean(b)) => Ok(Value::Bool(*b)),
            (FieldKind::Timestamp, CqlValue::Timestamp(ts)) => Ok(Value::String(
                ts.to_rfc3339_opts(SecondsFormat::Millis, true),
            )),
            (FieldKind::Uuid, CqlValue::Uuid(u)) => Ok(Value::String(u.hyphenated().to_string())),
            (FieldKind::Decimal { .. }, CqlValue::Decimal(d)) => Ok(Value::String(d.to_string())),
            (FieldKind::Blob { .. }, CqlValue::Blob(bytes)) => {
                Ok(Value::String(STANDARD.encode(bytes)))
            }
            (FieldKind::List(elem) | FieldKind::Set(elem), CqlValue::List(items))
            | (FieldKind::List(elem) | FieldKind::Set(elem), CqlValue::Set(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    out.push(elem.decode(item).map_err(|e| e.at_field(&format!("[{}]", i)))?);
                }
                Ok(Value::Array(out))
            }
            (FieldKind::Map(key_kind, value_kind), CqlValue::Map(entries)) => {
                let mut out = Map::new();
                for (k, v) in entries {
                    let key = match key_kind.decode(k)? {
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                    let val = value_kind.decode(v).map_err(|e| e.at_field(&format!("[{}]", key)))?;
                    out.insert(key, val);
                }
                Ok(Value::Object(out))
            }
            (kind, other) => Err(wire_mismatch(kind, other)),
        }
    }

    /// Wire value for an absent field
    pub fn empty_wire(&self) -> CqlValue {
        match self {
            FieldKind::List(_) => CqlValue::List(Vec::new()),
            FieldKind::Set(_) => CqlValue::Set(Vec::new()),
            FieldKind::Map(_, _) => CqlValue::Map(Vec::new()),
            _ => CqlValue::Null,
        }
    }

    /// Logical value for an absent field
    pub fn empty_logical(&self) -> Value {
        match self {
            FieldKind::List(_) | FieldKind::Set(_) => Value::Array(Vec::new()),
            FieldKind::Map(_, _) => Value::Object(Map::new()),
            _ => Value::Null,
        }
    }
}

fn encode_elements(elem: &FieldKind, items: &[Value]) -> SchemaResult<Vec<CqlValue>> {
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        // Null elements are not storable inside a collection
        if item.is_null() {
            return Err(SchemaError::type_mismatch(format!("[{}]", i), elem.type_name(), "null"));
        }
        out.push(elem.encode(item).map_err(|e| e.at_field(&format!("[{}]", i)))?);
    }
    Ok(out)
}

fn array_of<'v>(kind: &FieldKind, value: &'v Value) -> SchemaResult<&'v Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(mismatch(kind, other)),
    }
}

fn integer_of(kind: &FieldKind, value: &Value) -> SchemaResult<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| SchemaError::type_mismatch("", kind.type_name(), n.to_string())),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| SchemaError::type_mismatch("", kind.type_name(), format!("'{}'", s))),
        other => Err(mismatch(kind, other)),
    }
}

fn float_of(kind: &FieldKind, value: &Value) -> SchemaResult<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        other => return Err(mismatch(kind, other)),
    };
    parsed
        .filter(|n| n.is_finite())
        .ok_or_else(|| SchemaError::type_mismatch("", kind.type_name(), value.to_string()))
}

fn float_value(n: f64, kind: &FieldKind, wire: &CqlValue) -> SchemaResult<Value> {
    Number::from_f64(n)
        .map(Value::Number)
        .ok_or_else(|| wire_mismatch(kind, wire))
}

fn encode_timestamp(value: &Value) -> SchemaResult<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| SchemaError::type_mismatch("", "timestamp", format!("'{}'", s))),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .ok_or_else(|| SchemaError::type_mismatch("", "timestamp", n.to_string())),
        other => Err(SchemaError::type_mismatch(
            "",
            "timestamp",
            json_type_name(other),
        )),
    }
}

fn encode_decimal(value: &Value, precision: u32, scale: u32) -> SchemaResult<Decimal> {
    let parsed = match value {
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        other => {
            return Err(SchemaError::type_mismatch(
                "",
                "decimal",
                json_type_name(other),
            ))
        }
    };
    let decimal =
        parsed.ok_or_else(|| SchemaError::type_mismatch("", "decimal", value.to_string()))?;

    // bounds are checked on the normalized form; the stored value keeps its scale
    let normalized = decimal.normalize();
    let integer_digits = digit_count(normalized.trunc());
    let max_integer_digits = precision.saturating_sub(scale);
    if normalized.scale() > scale || integer_digits > max_integer_digits {
        return Err(SchemaError::type_mismatch(
            "",
            format!("decimal({}, {})", precision, scale),
            decimal.to_string(),
        ));
    }
    Ok(decimal)
}

/// Widens through the shortest decimal form so 0.1f32 reads back as 0.1.
fn widen(n: f32) -> f64 {
    n.to_string().parse::<f64>().unwrap_or(f64::from(n))
}

fn digit_count(integer: Decimal) -> u32 {
    let mantissa = integer.mantissa().unsigned_abs();
    if mantissa == 0 {
        0
    } else {
        mantissa.to_string().len() as u32
    }
}
