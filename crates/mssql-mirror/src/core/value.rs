//! SQL values read from source rows and their T-SQL literal rendering.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::identifier::string_literal;

/// The null literal.
pub const NULL_LITERAL: &str = "NULL";

/// Epoch literal used to backfill temporal columns.
pub const EPOCH_LITERAL: &str = "'1970-01-01 00:00:00.000'";

/// A single decoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL, or a value category this crate does not render.
    Null,

    /// Boolean value (bit).
    Bool(bool),

    /// 16-bit signed integer (tinyint, smallint).
    I16(i16),

    /// 32-bit signed integer (int).
    I32(i32),

    /// 64-bit signed integer (bigint).
    I64(i64),

    /// 32-bit floating point (real).
    F32(f32),

    /// 64-bit floating point (float).
    F64(f64),

    /// Character data.
    Text(String),

    /// Binary data.
    Bytes(Vec<u8>),

    /// uniqueidentifier.
    Uuid(Uuid),

    /// decimal, numeric, money, smallmoney.
    Decimal(Decimal),

    /// datetime, datetime2, smalldatetime.
    DateTime(NaiveDateTime),

    /// datetimeoffset.
    DateTimeOffset(DateTime<FixedOffset>),

    /// date.
    Date(NaiveDate),

    /// time.
    Time(NaiveTime),
}

impl SqlValue {
    /// Render as a T-SQL literal.
    ///
    /// Booleans become `0`/`1`, numbers their numeral text, text is
    /// single-quoted with embedded quotes doubled, and temporal values are
    /// cast from a string with millisecond precision. Binary data and
    /// non-finite floats render as `NULL`. Finite floats are always written
    /// in exponent form.
    pub fn to_literal(&self) -> String {
        match self {
            SqlValue::Null | SqlValue::Bytes(_) => NULL_LITERAL.to_string(),
            SqlValue::Bool(v) => (if *v { "1" } else { "0" }).to_string(),
            SqlValue::I16(v) => v.to_string(),
            SqlValue::I32(v) => v.to_string(),
            SqlValue::I64(v) => v.to_string(),
            SqlValue::F32(v) if v.is_finite() => format!("{:E}", v),
            SqlValue::F64(v) if v.is_finite() => format!("{:E}", v),
            SqlValue::F32(_) | SqlValue::F64(_) => NULL_LITERAL.to_string(),
            SqlValue::Decimal(v) => v.to_string(),
            SqlValue::Text(v) => string_literal(v),
            SqlValue::Uuid(v) => string_literal(&v.to_string()),
            SqlValue::DateTime(v) => format!(
                "CAST(N'{}' AS DATETIME2)",
                v.format("%Y-%m-%d %H:%M:%S%.3f")
            ),
            SqlValue::Date(v) => format!(
                "CAST(N'{}' AS DATETIME2)",
                v.and_time(NaiveTime::MIN).format("%Y-%m-%d %H:%M:%S%.3f")
            ),
            SqlValue::Time(v) => format!("CAST(N'{}' AS TIME)", v.format("%H:%M:%S%.3f")),
            SqlValue::DateTimeOffset(v) => format!(
                "CAST(N'{}' AS DATETIMEOFFSET)",
                v.format("%Y-%m-%d %H:%M:%S%.3f %:z")
            ),
        }
    }
}

/// Broad family of a SQL Server data type, used for backfill defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Numeric,
    Temporal,
    Other,
}

impl TypeCategory {
    pub fn of(data_type: &str) -> Self {
        match data_type.to_lowercase().as_str() {
            "bit" | "tinyint" | "smallint" | "int" | "bigint" | "decimal" | "numeric"
            | "smallmoney" | "money" | "float" | "real" => TypeCategory::Numeric,
            "datetime" | "datetime2" | "smalldatetime" | "date" | "time" | "datetimeoffset" => {
                TypeCategory::Temporal
            }
            _ => TypeCategory::Other,
        }
    }

    /// Literal written into existing rows when a NOT NULL column is added.
    pub fn default_literal(self) -> &'static str {
        match self {
            TypeCategory::Numeric => "0",
            TypeCategory::Temporal => EPOCH_LITERAL,
            TypeCategory::Other => "''",
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I32(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_text_doubles_quotes() {
        assert_eq!(SqlValue::from("O'Brien").to_literal(), "'O''Brien'");
    }

    #[test]
    fn test_bool_and_null() {
        assert_eq!(SqlValue::Bool(true).to_literal(), "1");
        assert_eq!(SqlValue::Bool(false).to_literal(), "0");
        assert_eq!(SqlValue::Null.to_literal(), "NULL");
        assert_eq!(SqlValue::from(None::<i32>).to_literal(), "NULL");
    }

    #[test]
    fn test_numbers() {
        assert_eq!(SqlValue::I64(-42).to_literal(), "-42");
        assert_eq!(
            SqlValue::Decimal(Decimal::from_str("19.90").unwrap()).to_literal(),
            "19.90"
        );
        assert_eq!(SqlValue::F64(1.5).to_literal(), "1.5E0");
        assert_eq!(SqlValue::F64(f64::NAN).to_literal(), "NULL");
    }

    #[test]
    fn test_extreme_floats_stay_short() {
        assert_eq!(SqlValue::F64(1e300).to_literal(), "1E300");
        assert_eq!(SqlValue::F64(1e-50).to_literal(), "1E-50");
        assert_eq!(SqlValue::F64(-2.5e-7).to_literal(), "-2.5E-7");
        assert_eq!(SqlValue::F32(3.0e38).to_literal(), "3E38");
        assert!(SqlValue::F64(f64::MAX).to_literal().len() <= 40);
    }

    #[test]
    fn test_temporal_casts_keep_milliseconds() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_milli_opt(14, 5, 6, 789)
            .unwrap();
        assert_eq!(
            SqlValue::DateTime(at).to_literal(),
            "CAST(N'2024-03-09 14:05:06.789' AS DATETIME2)"
        );
        assert_eq!(
            SqlValue::Date(at.date()).to_literal(),
            "CAST(N'2024-03-09 00:00:00.000' AS DATETIME2)"
        );
        assert_eq!(
            SqlValue::Time(at.time()).to_literal(),
            "CAST(N'14:05:06.789' AS TIME)"
        );
    }

    #[test]
    fn test_unrendered_categories_are_null() {
        assert_eq!(SqlValue::Bytes(vec![0xde, 0xad]).to_literal(), "NULL");
    }

    #[test]
    fn test_type_category_defaults() {
        assert_eq!(TypeCategory::of("bit").default_literal(), "0");
        assert_eq!(TypeCategory::of("DECIMAL").default_literal(), "0");
        assert_eq!(TypeCategory::of("datetime2").default_literal(), EPOCH_LITERAL);
        assert_eq!(TypeCategory::of("nvarchar").default_literal(), "''");
        assert_eq!(TypeCategory::of("uniqueidentifier"), TypeCategory::Other);
    }
}
