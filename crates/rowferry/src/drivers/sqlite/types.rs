//! SQLite value and type mapping.
//!
//! SQLite is dynamically typed, so the declared column type only decides how
//! a stored value is presented. Values that do not fit the declared type are
//! passed through in their storage class.

use std::borrow::Cow;

use rusqlite::types::{Value, ValueRef};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::core::convert::{parse_text, to_text};
use crate::core::{SqlType, SqlValue};

/// Map a declared column type to the canonical type set.
///
/// Follows SQLite's affinity rules (substring matches, in order), refined
/// for the date, time, boolean and uuid names people actually declare.
pub fn sql_type_for(decl: Option<&str>) -> SqlType {
    let decl = match decl {
        Some(d) if !d.trim().is_empty() => d.to_ascii_uppercase(),
        _ => return SqlType::Text,
    };

    if decl.contains("BOOL") {
        SqlType::Bool
    } else if decl.contains("SMALLINT") || decl.contains("TINYINT") || decl.contains("INT2") {
        SqlType::I16
    } else if decl.contains("INT") {
        SqlType::I64
    } else if decl.contains("UUID") || decl.contains("GUID") {
        SqlType::Uuid
    } else if decl.contains("TIMESTAMPTZ") || decl.contains("WITH TIME ZONE") {
        SqlType::DateTimeOffset
    } else if decl.contains("DATETIME") || decl.contains("TIMESTAMP") {
        SqlType::DateTime
    } else if decl.contains("DATE") {
        SqlType::Date
    } else if decl.contains("TIME") {
        SqlType::Time
    } else if decl.contains("CHAR") || decl.contains("CLOB") || decl.contains("TEXT") {
        SqlType::Text
    } else if decl.contains("BLOB") || decl.contains("BINARY") || decl.contains("BYTEA") {
        SqlType::Bytes
    } else if decl.contains("REAL") || decl.contains("FLOA") || decl.contains("DOUB") {
        SqlType::F64
    } else if decl.contains("DEC") || decl.contains("NUMERIC") || decl.contains("MONEY") {
        SqlType::Decimal
    } else {
        SqlType::Text
    }
}

/// Precision and scale from a declaration like `DECIMAL(10,2)`.
pub fn precision_scale(decl: &str) -> (u32, u32) {
    let inner = match (decl.find('('), decl.rfind(')')) {
        (Some(open), Some(close)) if open < close => &decl[open + 1..close],
        _ => return (0, 0),
    };
    let mut parts = inner.split(',').map(|p| p.trim().parse::<u32>().unwrap_or(0));
    (parts.next().unwrap_or(0), parts.next().unwrap_or(0))
}

/// Present a stored value according to the declared column type.
pub fn from_sqlite(value: ValueRef<'_>, ty: SqlType) -> SqlValue<'static> {
    match value {
        ValueRef::Null => SqlValue::Null(ty),
        ValueRef::Integer(i) => match ty {
            SqlType::Bool => SqlValue::Bool(i != 0),
            SqlType::I16 => i16::try_from(i).map_or(SqlValue::I64(i), SqlValue::I16),
            SqlType::I32 => i32::try_from(i).map_or(SqlValue::I64(i), SqlValue::I32),
            SqlType::F32 | SqlType::F64 => SqlValue::F64(i as f64),
            SqlType::Decimal => SqlValue::Decimal(Decimal::from(i)),
            _ => SqlValue::I64(i),
        },
        ValueRef::Real(f) => match ty {
            SqlType::Decimal => Decimal::from_f64(f).map_or(SqlValue::F64(f), SqlValue::Decimal),
            _ => SqlValue::F64(f),
        },
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            match ty {
                SqlType::Text => SqlValue::Text(Cow::Owned(text.into_owned())),
                _ => parse_text(&text, ty)
                    .unwrap_or_else(|_| SqlValue::Text(Cow::Owned(text.into_owned()))),
            }
        }
        ValueRef::Blob(bytes) => match ty {
            SqlType::Uuid if bytes.len() == 16 => uuid::Uuid::from_slice(bytes)
                .map_or_else(|_| SqlValue::bytes_owned(bytes.to_vec()), SqlValue::Uuid),
            _ => SqlValue::bytes_owned(bytes.to_vec()),
        },
    }
}

/// Storage value for a bound parameter.
///
/// Decimals, uuids and temporal values are stored in their canonical text
/// form so they read back unchanged.
pub fn to_sqlite(value: &SqlValue<'_>) -> Value {
    match value {
        SqlValue::Null(_) => Value::Null,
        SqlValue::Bool(b) => Value::Integer(i64::from(*b)),
        SqlValue::I16(i) => Value::Integer(i64::from(*i)),
        SqlValue::I32(i) => Value::Integer(i64::from(*i)),
        SqlValue::I64(i) => Value::Integer(*i),
        SqlValue::F32(f) => Value::Real(f64::from(*f)),
        SqlValue::F64(f) => Value::Real(*f),
        SqlValue::Text(s) => Value::Text(s.to_string()),
        SqlValue::Bytes(b) => Value::Blob(b.to_vec()),
        other => match to_text(other) {
            Some(text) => Value::Text(text.into_owned()),
            None => Value::Null,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_affinity_mapping() {
        assert_eq!(sql_type_for(Some("INTEGER")), SqlType::I64);
        assert_eq!(sql_type_for(Some("smallint")), SqlType::I16);
        assert_eq!(sql_type_for(Some("VARCHAR(40)")), SqlType::Text);
        assert_eq!(sql_type_for(Some("DECIMAL(10,2)")), SqlType::Decimal);
        assert_eq!(sql_type_for(Some("DOUBLE PRECISION")), SqlType::F64);
        assert_eq!(sql_type_for(Some("DATETIME")), SqlType::DateTime);
        assert_eq!(sql_type_for(Some("TIMESTAMP WITH TIME ZONE")), SqlType::DateTimeOffset);
        assert_eq!(sql_type_for(Some("DATE")), SqlType::Date);
        assert_eq!(sql_type_for(Some("TIME")), SqlType::Time);
        assert_eq!(sql_type_for(Some("BLOB")), SqlType::Bytes);
        assert_eq!(sql_type_for(Some("BOOLEAN")), SqlType::Bool);
        assert_eq!(sql_type_for(None), SqlType::Text);
    }

    #[test]
    fn test_precision_scale() {
        assert_eq!(precision_scale("DECIMAL(10, 2)"), (10, 2));
        assert_eq!(precision_scale("VARCHAR(40)"), (40, 0));
        assert_eq!(precision_scale("TEXT"), (0, 0));
    }

    #[test]
    fn test_text_presented_as_declared_type() {
        let value = from_sqlite(ValueRef::Text(b"2024-03-01"), SqlType::Date);
        assert_eq!(
            value,
            SqlValue::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
        // Values that do not parse stay text
        let value = from_sqlite(ValueRef::Text(b"soon"), SqlType::Date);
        assert_eq!(value, SqlValue::from("soon"));
    }

    #[test]
    fn test_null_keeps_column_type() {
        assert_eq!(
            from_sqlite(ValueRef::Null, SqlType::Bytes),
            SqlValue::Null(SqlType::Bytes)
        );
        assert_eq!(to_sqlite(&SqlValue::Null(SqlType::I64)), Value::Null);
    }
}
