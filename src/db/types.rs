//! PostgreSQL to JSON value mapping.
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Per-category decoders handle the actual value extraction
//!
//! Rows from parameterless statements arrive in text format, the rest in
//! binary format; every decoder handles both.

use crate::models::Row as JsonRow;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::Value as JsonValue;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueFormat, PgValueRef, Postgres};
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Oid,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Array,
    Unknown,
}

/// Classify a PostgreSQL type name (as reported by the driver) into a logical category.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let lower = type_name.to_lowercase();
    if lower.ends_with("[]") {
        return TypeCategory::Array;
    }
    match lower.as_str() {
        "int2" | "int4" | "int8" | "smallint" | "integer" | "bigint" | "serial" | "bigserial"
        | "smallserial" => TypeCategory::Integer,
        "oid" => TypeCategory::Oid,
        "float4" | "float8" | "real" | "double precision" => TypeCategory::Float,
        "numeric" | "decimal" | "money" => TypeCategory::Decimal,
        "bool" | "boolean" => TypeCategory::Boolean,
        "text" | "varchar" | "bpchar" | "char" | "\"char\"" | "name" | "character varying"
        | "character" | "citext" => TypeCategory::Text,
        "bytea" => TypeCategory::Binary,
        "json" | "jsonb" => TypeCategory::Json,
        "uuid" => TypeCategory::Uuid,
        "date" => TypeCategory::Date,
        "time" => TypeCategory::Time,
        "timestamp" => TypeCategory::Timestamp,
        "timestamptz" => TypeCategory::TimestampTz,
        _ => TypeCategory::Unknown,
    }
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// NUMERIC rendered as its exact decimal string.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name == "numeric" || name == "decimal"
    }
}

impl<'r> Decode<'r, Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        match value.format() {
            PgValueFormat::Text => Ok(RawDecimal(value.as_str()?.to_string())),
            PgValueFormat::Binary => Ok(RawDecimal(numeric_from_binary(value.as_bytes()?)?)),
        }
    }
}

/// Render PostgreSQL's binary NUMERIC (base-10000 digits) as a decimal string.
pub fn numeric_from_binary(bytes: &[u8]) -> Result<String, sqlx::error::BoxDynError> {
    let word = |i: usize| -> Result<u16, sqlx::error::BoxDynError> {
        bytes
            .get(i * 2..i * 2 + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .ok_or_else(|| "truncated NUMERIC value".into())
    };

    let ndigits = word(0)? as usize;
    let weight = word(1)? as i16 as i32;
    let sign = word(2)?;
    let dscale = word(3)? as usize;
    let digits = (0..ndigits)
        .map(|i| word(4 + i))
        .collect::<Result<Vec<u16>, _>>()?;

    match sign {
        0xC000 => return Ok("NaN".to_string()),
        0xD000 => return Ok("Infinity".to_string()),
        0xF000 => return Ok("-Infinity".to_string()),
        _ => {}
    }
    let digit_at = |index: i32| -> u16 {
        usize::try_from(index)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == 0x4000 {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        for index in 0..=weight {
            if index == 0 {
                out.push_str(&digit_at(index).to_string());
            } else {
                out.push_str(&format!("{:04}", digit_at(index)));
            }
        }
    }
    if dscale > 0 {
        let mut frac = String::with_capacity(dscale + 4);
        let mut index = weight + 1;
        while frac.len() < dscale {
            frac.push_str(&format!("{:04}", digit_at(index)));
            index += 1;
        }
        frac.truncate(dscale);
        out.push('.');
        out.push_str(&frac);
    }
    Ok(out)
}

// =============================================================================
// Fallback
// =============================================================================

/// Raw column bytes for types without a dedicated decoder.
#[derive(Debug)]
struct RawValue(Vec<u8>);

impl Type<Postgres> for RawValue {
    fn type_info() -> PgTypeInfo {
        <String as Type<Postgres>>::type_info()
    }

    fn compatible(_ty: &PgTypeInfo) -> bool {
        true
    }
}

impl<'r> Decode<'r, Postgres> for RawValue {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        Ok(RawValue(value.as_bytes()?.to_vec()))
    }
}

// =============================================================================
// Binary Encoding
// =============================================================================

/// Binary data as base64.
pub fn encode_binary_value(bytes: &[u8]) -> JsonValue {
    JsonValue::String(STANDARD.encode(bytes))
}

// =============================================================================
// Row to JSON Trait
// =============================================================================

/// Trait for converting database rows to JSON maps.
pub trait RowToJson {
    fn to_json_map(&self) -> JsonRow;
}

impl RowToJson for PgRow {
    fn to_json_map(&self) -> JsonRow {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let value = decode_column(self, idx, type_name, categorize_type(type_name));
                (col.name().to_string(), value)
            })
            .collect()
    }
}

// =============================================================================
// Decoders
// =============================================================================

fn decode_column(row: &PgRow, idx: usize, type_name: &str, category: TypeCategory) -> JsonValue {
    match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return JsonValue::Null,
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(column = idx, error = %e, "Failed to read column");
            return JsonValue::Null;
        }
    }

    let decoded = match category {
        TypeCategory::Integer => decode_integer(row, idx),
        TypeCategory::Oid => row.try_get::<Oid, _>(idx).ok().map(|v| JsonValue::from(v.0)),
        TypeCategory::Float => decode_float(row, idx),
        TypeCategory::Decimal => row
            .try_get::<RawDecimal, _>(idx)
            .ok()
            .map(|v| JsonValue::String(v.0)),
        TypeCategory::Boolean => row.try_get::<bool, _>(idx).ok().map(JsonValue::Bool),
        TypeCategory::Text => row.try_get::<String, _>(idx).ok().map(JsonValue::String),
        TypeCategory::Binary => row
            .try_get::<Vec<u8>, _>(idx)
            .ok()
            .map(|v| encode_binary_value(&v)),
        TypeCategory::Json => row.try_get::<JsonValue, _>(idx).ok(),
        TypeCategory::Uuid => row
            .try_get::<uuid::Uuid, _>(idx)
            .ok()
            .map(|v| JsonValue::String(v.to_string())),
        TypeCategory::Date => row
            .try_get::<chrono::NaiveDate, _>(idx)
            .ok()
            .map(|v| JsonValue::String(v.to_string())),
        TypeCategory::Time => row
            .try_get::<chrono::NaiveTime, _>(idx)
            .ok()
            .map(|v| JsonValue::String(v.to_string())),
        TypeCategory::Timestamp => row
            .try_get::<chrono::NaiveDateTime, _>(idx)
            .ok()
            .map(|v| JsonValue::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        TypeCategory::TimestampTz => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(idx)
            .ok()
            .map(|v| JsonValue::String(v.to_rfc3339())),
        TypeCategory::Array => decode_array(row, idx),
        TypeCategory::Unknown => None,
    };

    decoded.unwrap_or_else(|| decode_fallback(row, idx, type_name))
}

fn decode_integer(row: &PgRow, idx: usize) -> Option<JsonValue> {
    if let Ok(v) = row.try_get::<i16, _>(idx) {
        return Some(v.into());
    }
    if let Ok(v) = row.try_get::<i32, _>(idx) {
        return Some(v.into());
    }
    row.try_get::<i64, _>(idx).ok().map(JsonValue::from)
}

fn float_to_json(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

fn decode_float(row: &PgRow, idx: usize) -> Option<JsonValue> {
    if let Ok(v) = row.try_get::<f64, _>(idx) {
        return Some(float_to_json(v));
    }
    row.try_get::<f32, _>(idx)
        .ok()
        .map(|v| float_to_json(v as f64))
}

fn decode_array(row: &PgRow, idx: usize) -> Option<JsonValue> {
    fn to_json<T: Into<JsonValue>>(items: Vec<Option<T>>) -> JsonValue {
        JsonValue::Array(
            items
                .into_iter()
                .map(|v| v.map(Into::into).unwrap_or(JsonValue::Null))
                .collect(),
        )
    }

    if let Ok(v) = row.try_get::<Vec<Option<i16>>, _>(idx) {
        return Some(to_json(v));
    }
    if let Ok(v) = row.try_get::<Vec<Option<i32>>, _>(idx) {
        return Some(to_json(v));
    }
    if let Ok(v) = row.try_get::<Vec<Option<i64>>, _>(idx) {
        return Some(to_json(v));
    }
    if let Ok(v) = row.try_get::<Vec<Option<bool>>, _>(idx) {
        return Some(to_json(v));
    }
    if let Ok(v) = row.try_get::<Vec<Option<f64>>, _>(idx) {
        return Some(JsonValue::Array(
            v.into_iter()
                .map(|x| x.map(float_to_json).unwrap_or(JsonValue::Null))
                .collect(),
        ));
    }
    row.try_get::<Vec<Option<String>>, _>(idx)
        .ok()
        .map(to_json)
}

/// Text-format values and text-like binary values (enums, domains over text)
/// come out as strings; anything else as base64.
fn decode_fallback(row: &PgRow, idx: usize, type_name: &str) -> JsonValue {
    match row.try_get::<RawValue, _>(idx) {
        Ok(RawValue(bytes)) => match String::from_utf8(bytes) {
            Ok(s) => JsonValue::String(s),
            Err(e) => encode_binary_value(e.as_bytes()),
        },
        Err(e) => {
            tracing::warn!(column = idx, type_name, error = %e, "Failed to decode column");
            JsonValue::Null
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(ndigits: u16, weight: i16, sign: u16, dscale: u16, digits: &[u16]) -> Vec<u8> {
        let mut out = Vec::new();
        for w in [ndigits, weight as u16, sign, dscale] {
            out.extend_from_slice(&w.to_be_bytes());
        }
        for d in digits {
            out.extend_from_slice(&d.to_be_bytes());
        }
        out
    }

    #[test]
    fn test_categorize_type() {
        assert_eq!(categorize_type("INT4"), TypeCategory::Integer);
        assert_eq!(categorize_type("INT8"), TypeCategory::Integer);
        assert_eq!(categorize_type("NUMERIC"), TypeCategory::Decimal);
        assert_eq!(categorize_type("TIMESTAMPTZ"), TypeCategory::TimestampTz);
        assert_eq!(categorize_type("TEXT[]"), TypeCategory::Array);
        assert_eq!(categorize_type("JSONB"), TypeCategory::Json);
        assert_eq!(categorize_type("NAME"), TypeCategory::Text);
    }

    #[test]
    fn test_categorize_does_not_match_substrings() {
        assert_eq!(categorize_type("INTERVAL"), TypeCategory::Unknown);
        assert_eq!(categorize_type("POINT"), TypeCategory::Unknown);
        assert_eq!(categorize_type("mood"), TypeCategory::Unknown);
    }

    #[test]
    fn test_numeric_from_binary() {
        assert_eq!(
            numeric_from_binary(&numeric(2, 0, 0, 2, &[123, 4500])).unwrap(),
            "123.45"
        );
        assert_eq!(
            numeric_from_binary(&numeric(1, -1, 0, 3, &[10])).unwrap(),
            "0.001"
        );
        assert_eq!(
            numeric_from_binary(&numeric(1, 1, 0, 0, &[1])).unwrap(),
            "10000"
        );
        assert_eq!(
            numeric_from_binary(&numeric(2, 1, 0x4000, 1, &[12, 3456])).unwrap(),
            "-123456.0"
        );
        assert_eq!(numeric_from_binary(&numeric(0, 0, 0, 0, &[])).unwrap(), "0");
        assert_eq!(
            numeric_from_binary(&numeric(0, 0, 0xC000, 0, &[])).unwrap(),
            "NaN"
        );
    }

    #[test]
    fn test_numeric_truncated_input() {
        assert!(numeric_from_binary(&[0, 2, 0, 0]).is_err());
        assert!(numeric_from_binary(&numeric(2, 0, 0, 0, &[1])).is_err());
    }

    #[test]
    fn test_encode_binary_value() {
        assert_eq!(
            encode_binary_value(b"hello world"),
            JsonValue::String("aGVsbG8gd29ybGQ=".to_string())
        );
        assert_eq!(
            encode_binary_value(&[0xFF, 0xFE, 0x00, 0x01]),
            JsonValue::String("//4AAQ==".to_string())
        );
    }
}
