//! PostgreSQL type mapping and parameter binding.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::Row;
use uuid::Uuid;

use crate::core::convert::{coerce, to_text};
use crate::core::{SqlType, SqlValue};
use crate::error::{Result, TransferError, ValueError};

/// A parameter ready to bind.
pub type Param = Box<dyn ToSql + Sync + Send>;

/// Map a PostgreSQL type to the canonical type set.
pub fn sql_type_for(ty: &Type) -> SqlType {
    match *ty {
        Type::BOOL => SqlType::Bool,
        Type::INT2 => SqlType::I16,
        Type::INT4 => SqlType::I32,
        Type::INT8 | Type::OID => SqlType::I64,
        Type::FLOAT4 => SqlType::F32,
        Type::FLOAT8 => SqlType::F64,
        Type::NUMERIC => SqlType::Decimal,
        Type::BYTEA => SqlType::Bytes,
        Type::UUID => SqlType::Uuid,
        Type::DATE => SqlType::Date,
        Type::TIME => SqlType::Time,
        Type::TIMESTAMP => SqlType::DateTime,
        Type::TIMESTAMPTZ => SqlType::DateTimeOffset,
        _ => SqlType::Text,
    }
}

/// Map an `information_schema.columns.udt_name` to the canonical type set.
pub fn sql_type_for_udt(udt: &str) -> SqlType {
    match udt {
        "bool" => SqlType::Bool,
        "int2" => SqlType::I16,
        "int4" => SqlType::I32,
        "int8" | "oid" => SqlType::I64,
        "float4" => SqlType::F32,
        "float8" => SqlType::F64,
        "numeric" | "money" => SqlType::Decimal,
        "bytea" => SqlType::Bytes,
        "uuid" => SqlType::Uuid,
        "date" => SqlType::Date,
        "time" => SqlType::Time,
        "timestamp" => SqlType::DateTime,
        "timestamptz" => SqlType::DateTimeOffset,
        _ => SqlType::Text,
    }
}

fn is_json(ty: &Type) -> bool {
    *ty == Type::JSON || *ty == Type::JSONB
}

/// Convert a value to a parameter of the statement's declared type.
///
/// NULLs must be typed too: the wire format rejects a text NULL for an
/// integer parameter.
pub fn to_param(value: &SqlValue<'_>, ty: &Type) -> std::result::Result<Param, ValueError> {
    if is_json(ty) {
        return match to_text(value) {
            None => Ok(Box::new(None::<serde_json::Value>)),
            Some(text) => serde_json::from_str::<serde_json::Value>(&text)
                .map(|v| Box::new(Some(v)) as Param)
                .map_err(|e| ValueError::conversion(format!("invalid json: {}", e))),
        };
    }

    let target = sql_type_for(ty);
    let value = coerce(value.reborrow(), target)?;
    let param: Param = match (target, value) {
        (SqlType::Bool, SqlValue::Bool(v)) => Box::new(Some(v)),
        (SqlType::Bool, _) => Box::new(None::<bool>),
        (SqlType::I16, SqlValue::I16(v)) => Box::new(Some(v)),
        (SqlType::I16, _) => Box::new(None::<i16>),
        (SqlType::I32, SqlValue::I32(v)) => Box::new(Some(v)),
        (SqlType::I32, _) => Box::new(None::<i32>),
        // OID binds as u32
        (SqlType::I64, SqlValue::I64(v)) if *ty == Type::OID => Box::new(Some(
            u32::try_from(v).map_err(|_| ValueError::conversion(format!("{} is not an oid", v)))?,
        )),
        (SqlType::I64, _) if *ty == Type::OID => Box::new(None::<u32>),
        (SqlType::I64, SqlValue::I64(v)) => Box::new(Some(v)),
        (SqlType::I64, _) => Box::new(None::<i64>),
        (SqlType::F32, SqlValue::F32(v)) => Box::new(Some(v)),
        (SqlType::F32, _) => Box::new(None::<f32>),
        (SqlType::F64, SqlValue::F64(v)) => Box::new(Some(v)),
        (SqlType::F64, _) => Box::new(None::<f64>),
        (SqlType::Decimal, SqlValue::Decimal(v)) => Box::new(Some(v)),
        (SqlType::Decimal, _) => Box::new(None::<Decimal>),
        (SqlType::Bytes, SqlValue::Bytes(v)) => Box::new(Some(v.into_owned())),
        (SqlType::Bytes, _) => Box::new(None::<Vec<u8>>),
        (SqlType::Uuid, SqlValue::Uuid(v)) => Box::new(Some(v)),
        (SqlType::Uuid, _) => Box::new(None::<Uuid>),
        (SqlType::Date, SqlValue::Date(v)) => Box::new(Some(v)),
        (SqlType::Date, _) => Box::new(None::<NaiveDate>),
        (SqlType::Time, SqlValue::Time(v)) => Box::new(Some(v)),
        (SqlType::Time, _) => Box::new(None::<NaiveTime>),
        (SqlType::DateTime, SqlValue::DateTime(v)) => Box::new(Some(v)),
        (SqlType::DateTime, _) => Box::new(None::<NaiveDateTime>),
        (SqlType::DateTimeOffset, SqlValue::DateTimeOffset(v)) => Box::new(Some(v)),
        (SqlType::DateTimeOffset, _) => Box::new(None::<DateTime<FixedOffset>>),
        (SqlType::Text, SqlValue::Text(v)) => Box::new(Some(v.into_owned())),
        (SqlType::Text, _) => Box::new(None::<String>),
    };
    Ok(param)
}

/// Read column `idx` of a row.
pub fn from_row(row: &Row, idx: usize, ty: &Type) -> Result<SqlValue<'static>> {
    let target = sql_type_for(ty);
    let value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(SqlValue::Bool),
        Type::INT2 => row.try_get::<_, Option<i16>>(idx)?.map(SqlValue::I16),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx)?.map(SqlValue::I32),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(SqlValue::I64),
        Type::OID => row
            .try_get::<_, Option<u32>>(idx)?
            .map(|v| SqlValue::I64(i64::from(v))),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(idx)?.map(SqlValue::F32),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map(SqlValue::F64),
        Type::NUMERIC => row.try_get::<_, Option<Decimal>>(idx)?.map(SqlValue::Decimal),
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(SqlValue::bytes_owned),
        Type::UUID => row.try_get::<_, Option<Uuid>>(idx)?.map(SqlValue::Uuid),
        Type::DATE => row.try_get::<_, Option<NaiveDate>>(idx)?.map(SqlValue::Date),
        Type::TIME => row.try_get::<_, Option<NaiveTime>>(idx)?.map(SqlValue::Time),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(SqlValue::DateTime),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<FixedOffset>>>(idx)?
            .map(SqlValue::DateTimeOffset),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<serde_json::Value>>(idx)?
            .map(|v| SqlValue::text_owned(v.to_string())),
        _ => match row.try_get::<_, Option<String>>(idx) {
            Ok(v) => v.map(SqlValue::text_owned),
            Err(_) => {
                return Err(TransferError::Value(ValueError::unsupported(format!(
                    "column {} has unsupported type {}",
                    row.columns()[idx].name(),
                    ty
                ))))
            }
        },
    };
    Ok(value.unwrap_or(SqlValue::Null(target)))
}
