//! Driver error mapping and row materialization.

use deadpool_postgres::PoolError;
use quarry_core::{DatabaseError, Row};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Number, Value};
use std::error::Error as StdError;
use tokio_postgres::types::{FromSql, Type};

type BoxError = Box<dyn StdError + Sync + Send>;

/// Map a driver error, keeping the SQLSTATE when the server sent one.
pub fn driver_error(err: &tokio_postgres::Error) -> DatabaseError {
    if let Some(db) = err.as_db_error() {
        return DatabaseError::driver(Some(db.code().code()), db.message());
    }
    if err.is_closed() || io_source(err) {
        return DatabaseError::ConnectionUnavailable {
            reason: err.to_string(),
        };
    }
    DatabaseError::driver(err.code().map(|c| c.code()), err.to_string())
}

fn io_source(err: &tokio_postgres::Error) -> bool {
    let mut source = err.source();
    while let Some(inner) = source {
        if inner.is::<std::io::Error>() {
            return true;
        }
        source = inner.source();
    }
    false
}

/// Map a pool checkout failure.
pub fn pool_error(err: PoolError) -> DatabaseError {
    tracing::error!(error = ?err, "connection pool error");
    match err {
        PoolError::Timeout(_) => DatabaseError::PoolExhausted,
        PoolError::Backend(e) => driver_error(&e),
        PoolError::Closed => DatabaseError::ConnectionUnavailable {
            reason: "Database connection pool is closed".to_string(),
        },
        other => DatabaseError::ConnectionUnavailable {
            reason: other.to_string(),
        },
    }
}

/// Convert one typed row into a JSON object keyed by column name.
pub fn row_to_json(row: &tokio_postgres::Row) -> Result<Row, DatabaseError> {
    let mut out = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = column_value(row, idx, column.type_()).map_err(|e| {
            DatabaseError::driver(
                None::<String>,
                format!("cannot decode column {}: {}", column.name(), e),
            )
        })?;
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

fn column_value(row: &tokio_postgres::Row, idx: usize, ty: &Type) -> Result<Value, tokio_postgres::Error> {
    let value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(Value::Bool),
        Type::INT2 => row.try_get::<_, Option<i16>>(idx)?.map(Value::from),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx)?.map(Value::from),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(Value::from),
        Type::OID => row.try_get::<_, Option<u32>>(idx)?.map(Value::from),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)?
            .map(|f| float_value(f64::from(f))),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map(float_value),
        // NaN, infinities and values beyond 28 digits have no Decimal form.
        Type::NUMERIC => match row.try_get::<_, Option<Decimal>>(idx) {
            Ok(value) => value.map(numeric_value),
            Err(e) => {
                tracing::debug!(error = %e, "numeric value not representable");
                None
            }
        },
        Type::JSON | Type::JSONB => row.try_get::<_, Option<Value>>(idx)?,
        Type::UUID => row
            .try_get::<_, Option<uuid::Uuid>>(idx)?
            .map(|u| Value::String(u.to_string())),
        Type::TIMESTAMP => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(idx)?
            .map(|t| Value::String(t.format("%Y-%m-%d %H:%M:%S%.f").to_string())),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)?
            .map(|t| Value::String(t.to_rfc3339())),
        Type::DATE => row
            .try_get::<_, Option<chrono::NaiveDate>>(idx)?
            .map(|d| Value::String(d.to_string())),
        Type::TIME => row
            .try_get::<_, Option<chrono::NaiveTime>>(idx)?
            .map(|t| Value::String(t.to_string())),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY => row
            .try_get::<_, Option<Vec<Option<String>>>>(idx)?
            .map(|items| Value::Array(items.into_iter().map(|s| s.map_or(Value::Null, Value::String)).collect())),
        Type::INT4_ARRAY => row
            .try_get::<_, Option<Vec<Option<i32>>>>(idx)?
            .map(|items| Value::Array(items.into_iter().map(|i| i.map_or(Value::Null, Value::from)).collect())),
        Type::INT8_ARRAY => row
            .try_get::<_, Option<Vec<Option<i64>>>>(idx)?
            .map(|items| Value::Array(items.into_iter().map(|i| i.map_or(Value::Null, Value::from)).collect())),
        _ => row.try_get::<_, Option<AnyText>>(idx)?.and_then(|t| t.0).map(Value::String),
    };
    Ok(value.unwrap_or(Value::Null))
}

fn float_value(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

/// Integral values that fit `i64` become integers, values `f64` holds
/// exactly become floats, anything else keeps its decimal text.
fn numeric_value(d: Decimal) -> Value {
    if d.fract().is_zero() {
        if let Ok(i) = i64::try_from(d) {
            return Value::from(i);
        }
    }
    match d.to_f64() {
        Some(f) if Decimal::try_from(f).is_ok_and(|back| back == d) => float_value(f),
        _ => Value::String(d.normalize().to_string()),
    }
}

/// Fallback for types without a dedicated mapping. Binary encodings of
/// enums and text-like domains are their UTF-8 label; anything else
/// becomes null.
struct AnyText(Option<String>);

impl<'a> FromSql<'a> for AnyText {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        Ok(AnyText(std::str::from_utf8(raw).ok().map(str::to_string)))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}
