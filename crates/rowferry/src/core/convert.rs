//! Value coercion and canonical text forms.
//!
//! Text is the lingua franca between codecs and drivers: every value has one
//! canonical text rendering ([`to_text`]) and every type can be parsed back
//! from it ([`parse_text`]). Binary data is rendered as standard base64.

use std::borrow::Cow;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::value::{SqlType, SqlValue};
use crate::error::ValueError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S%.f";
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

type ConvertResult<T> = std::result::Result<T, ValueError>;

/// Render a value in its canonical text form. NULL has no text form.
pub fn to_text<'v>(value: &'v SqlValue<'_>) -> Option<Cow<'v, str>> {
    let text = match value {
        SqlValue::Null(_) => return None,
        SqlValue::Text(s) => return Some(Cow::Borrowed(s.as_ref())),
        SqlValue::Bool(v) => v.to_string(),
        SqlValue::I16(v) => v.to_string(),
        SqlValue::I32(v) => v.to_string(),
        SqlValue::I64(v) => v.to_string(),
        SqlValue::F32(v) => v.to_string(),
        SqlValue::F64(v) => v.to_string(),
        SqlValue::Decimal(v) => v.to_string(),
        SqlValue::Bytes(b) => BASE64.encode(b),
        SqlValue::Uuid(v) => v.to_string(),
        SqlValue::Date(v) => v.format(DATE_FORMAT).to_string(),
        SqlValue::Time(v) => v.format(TIME_FORMAT).to_string(),
        SqlValue::DateTime(v) => v.format(DATETIME_FORMAT).to_string(),
        SqlValue::DateTimeOffset(v) => v.to_rfc3339(),
    };
    Some(Cow::Owned(text))
}

/// Parse canonical text into a value of the given type.
pub fn parse_text(s: &str, ty: SqlType) -> ConvertResult<SqlValue<'static>> {
    let fail = || ValueError::conversion(format!("cannot parse {:?} as {}", s, ty));
    let trimmed = s.trim();
    let value = match ty {
        SqlType::Text => SqlValue::Text(Cow::Owned(s.to_string())),
        SqlType::Bool => SqlValue::Bool(parse_bool(trimmed).ok_or_else(fail)?),
        SqlType::I16 => SqlValue::I16(trimmed.parse().map_err(|_| fail())?),
        SqlType::I32 => SqlValue::I32(trimmed.parse().map_err(|_| fail())?),
        SqlType::I64 => SqlValue::I64(trimmed.parse().map_err(|_| fail())?),
        SqlType::F32 => SqlValue::F32(trimmed.parse().map_err(|_| fail())?),
        SqlType::F64 => SqlValue::F64(trimmed.parse().map_err(|_| fail())?),
        SqlType::Decimal => SqlValue::Decimal(
            trimmed
                .parse::<Decimal>()
                .or_else(|_| Decimal::from_scientific(trimmed))
                .map_err(|_| fail())?,
        ),
        SqlType::Bytes => SqlValue::Bytes(Cow::Owned(BASE64.decode(trimmed).map_err(|_| fail())?)),
        SqlType::Uuid => SqlValue::Uuid(Uuid::parse_str(trimmed).map_err(|_| fail())?),
        SqlType::Date => SqlValue::Date(
            NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
                .or_else(|_| parse_datetime(trimmed).map(|dt| dt.date()).ok_or(()))
                .map_err(|_| fail())?,
        ),
        SqlType::Time => SqlValue::Time(
            NaiveTime::parse_from_str(trimmed, TIME_FORMAT).map_err(|_| fail())?,
        ),
        SqlType::DateTime => SqlValue::DateTime(parse_datetime(trimmed).ok_or_else(fail)?),
        SqlType::DateTimeOffset => SqlValue::DateTimeOffset(
            DateTime::parse_from_rfc3339(trimmed)
                .or_else(|_| DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f%:z"))
                .map_err(|_| fail())?,
        ),
    };
    Ok(value)
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Some(true),
        "false" | "f" | "0" | "no" | "n" => Some(false),
        _ => None,
    }
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| NaiveDate::parse_from_str(s, DATE_FORMAT).map(|d| d.and_time(NaiveTime::MIN)))
        .ok()
}

/// Convert a value to the requested type.
///
/// NULL of any type becomes NULL of the requested type. Text is parsed with
/// [`parse_text`]; anything can be rendered as text.
pub fn coerce<'a>(value: SqlValue<'a>, target: SqlType) -> ConvertResult<SqlValue<'a>> {
    if value.sql_type() == target {
        return Ok(match value {
            SqlValue::Null(_) => SqlValue::Null(target),
            other => other,
        });
    }

    match value {
        SqlValue::Null(_) => Ok(SqlValue::Null(target)),
        SqlValue::Text(s) => parse_text(&s, target),
        other if target == SqlType::Text => match to_text(&other) {
            Some(text) => Ok(SqlValue::Text(Cow::Owned(text.into_owned()))),
            None => Ok(SqlValue::Null(SqlType::Text)),
        },
        other => coerce_non_text(other, target),
    }
}

fn coerce_non_text<'a>(value: SqlValue<'a>, target: SqlType) -> ConvertResult<SqlValue<'a>> {
    let unsupported = |from: SqlType| {
        ValueError::unsupported(format!("no conversion from {} to {}", from, target))
    };
    let from = value.sql_type();

    if let Some(int) = integral(&value) {
        if !is_numeric(target) {
            return Err(unsupported(from));
        }
        return from_integer(int, target)
            .ok_or_else(|| ValueError::conversion(format!("{} does not fit in {}", int, target)));
    }

    match (value, target) {
        (SqlValue::F32(v), SqlType::F64) => Ok(SqlValue::F64(f64::from(v))),
        (SqlValue::F64(v), SqlType::F32) => Ok(SqlValue::F32(v as f32)),
        (SqlValue::F32(v), t) if is_numeric(t) => {
            from_float(f64::from(v), t).ok_or_else(|| lossy(v, t))
        }
        (SqlValue::F64(v), t) if is_numeric(t) => from_float(v, t).ok_or_else(|| lossy(v, t)),
        (SqlValue::Decimal(d), SqlType::F32) => {
            d.to_f32().map(SqlValue::F32).ok_or_else(|| lossy(d, target))
        }
        (SqlValue::Decimal(d), SqlType::F64) => {
            d.to_f64().map(SqlValue::F64).ok_or_else(|| lossy(d, target))
        }
        (SqlValue::Decimal(d), t) if is_numeric(t) => {
            if d.fract().is_zero() {
                d.to_i64()
                    .and_then(|i| from_integer(i, t))
                    .ok_or_else(|| lossy(d, t))
            } else {
                Err(lossy(d, t))
            }
        }
        (SqlValue::Bytes(b), SqlType::Uuid) => Uuid::from_slice(&b)
            .map(SqlValue::Uuid)
            .map_err(|_| ValueError::conversion(format!("{} bytes is not a uuid", b.len()))),
        (SqlValue::Uuid(u), SqlType::Bytes) => {
            Ok(SqlValue::Bytes(Cow::Owned(u.as_bytes().to_vec())))
        }
        (SqlValue::DateTime(dt), SqlType::Date) => Ok(SqlValue::Date(dt.date())),
        (SqlValue::DateTime(dt), SqlType::Time) => Ok(SqlValue::Time(dt.time())),
        (SqlValue::DateTime(dt), SqlType::DateTimeOffset) => {
            Ok(SqlValue::DateTimeOffset(dt.and_utc().fixed_offset()))
        }
        (SqlValue::Date(d), SqlType::DateTime) => {
            Ok(SqlValue::DateTime(d.and_time(NaiveTime::MIN)))
        }
        (SqlValue::Date(d), SqlType::DateTimeOffset) => Ok(SqlValue::DateTimeOffset(
            d.and_time(NaiveTime::MIN).and_utc().fixed_offset(),
        )),
        (SqlValue::DateTimeOffset(dt), SqlType::DateTime) => {
            Ok(SqlValue::DateTime(dt.with_timezone(&Utc).naive_utc()))
        }
        (SqlValue::DateTimeOffset(dt), SqlType::Date) => {
            Ok(SqlValue::Date(dt.with_timezone(&Utc).date_naive()))
        }
        _ => Err(unsupported(from)),
    }
}

fn is_numeric(ty: SqlType) -> bool {
    matches!(
        ty,
        SqlType::Bool
            | SqlType::I16
            | SqlType::I32
            | SqlType::I64
            | SqlType::F32
            | SqlType::F64
            | SqlType::Decimal
    )
}

fn lossy(v: impl std::fmt::Display, target: SqlType) -> ValueError {
    ValueError::conversion(format!("{} cannot be represented as {}", v, target))
}

fn integral(value: &SqlValue<'_>) -> Option<i64> {
    match value {
        SqlValue::Bool(v) => Some(i64::from(*v)),
        SqlValue::I16(v) => Some(i64::from(*v)),
        SqlValue::I32(v) => Some(i64::from(*v)),
        SqlValue::I64(v) => Some(*v),
        _ => None,
    }
}

fn from_integer(v: i64, target: SqlType) -> Option<SqlValue<'static>> {
    match target {
        SqlType::Bool => match v {
            0 => Some(SqlValue::Bool(false)),
            1 => Some(SqlValue::Bool(true)),
            _ => None,
        },
        SqlType::I16 => i16::try_from(v).ok().map(SqlValue::I16),
        SqlType::I32 => i32::try_from(v).ok().map(SqlValue::I32),
        SqlType::I64 => Some(SqlValue::I64(v)),
        SqlType::F32 => Some(SqlValue::F32(v as f32)),
        SqlType::F64 => Some(SqlValue::F64(v as f64)),
        SqlType::Decimal => Some(SqlValue::Decimal(Decimal::from(v))),
        _ => None,
    }
}

fn from_float(v: f64, target: SqlType) -> Option<SqlValue<'static>> {
    match target {
        SqlType::Decimal => Decimal::from_f64(v).map(SqlValue::Decimal),
        SqlType::Bool | SqlType::I16 | SqlType::I32 | SqlType::I64 => {
            if v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64 {
                from_integer(v as i64, target)
            } else {
                None
            }
        }
        _ => None,
    }
}
