// ABOUTME: Dynamically typed MySQL values for table-agnostic row copying
// ABOUTME: Decodes any result-set column by its wire type and rebinds it as a parameter

use chrono::{NaiveDate, NaiveDateTime};
use sqlx::mysql::types::MySqlTime;
use sqlx::mysql::{MySql, MySqlArguments, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, Row, TypeInfo, ValueRef};

/// A single column value read from the source.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    /// Character data, plus DECIMAL, JSON, ENUM and SET, which travel as text.
    /// Zero dates also land here as their literal form.
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    /// A TIME interval, which may be negative or exceed 24 hours.
    Time(MySqlTime),
    DateTime(NaiveDateTime),
}

/// How a column's wire type is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Int,
    UInt,
    Float,
    Double,
    Text,
    Bytes,
    Date,
    Time,
    DateTime,
}

impl ValueKind {
    /// Classify a type name as reported by `MySqlTypeInfo::name()`
    /// (e.g. `BIGINT UNSIGNED`, `VARCHAR`, `DATETIME`).
    pub fn from_type_name(name: &str) -> Self {
        let upper = name.to_ascii_uppercase();
        let base = upper.split_whitespace().next().unwrap_or("");
        let unsigned = upper.ends_with("UNSIGNED");

        match base {
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" if unsigned => {
                ValueKind::UInt
            }
            "BOOLEAN" | "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT"
            | "YEAR" => ValueKind::Int,
            "FLOAT" => ValueKind::Float,
            "DOUBLE" | "REAL" => ValueKind::Double,
            "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
            | "GEOMETRY" => ValueKind::Bytes,
            "DATE" => ValueKind::Date,
            "TIME" => ValueKind::Time,
            "DATETIME" | "TIMESTAMP" => ValueKind::DateTime,
            _ => ValueKind::Text,
        }
    }
}

/// Decode every column of `row` in result-set order.
pub fn decode_row(row: &MySqlRow) -> Result<Vec<SqlValue>, sqlx::Error> {
    row.columns()
        .iter()
        .map(|col| {
            decode_column(
                row,
                col.ordinal(),
                ValueKind::from_type_name(col.type_info().name()),
            )
        })
        .collect()
}

fn decode_column(row: &MySqlRow, idx: usize, kind: ValueKind) -> Result<SqlValue, sqlx::Error> {
    if row.try_get_raw(idx)?.is_null() {
        return Ok(SqlValue::Null);
    }

    // Unchecked decoding: the driver's compatibility table is stricter than the
    // wire format (e.g. DECIMAL arrives as text but is not declared String-compatible).
    let value = match kind {
        ValueKind::Int => SqlValue::Int(row.try_get_unchecked::<i64, _>(idx)?),
        ValueKind::UInt => SqlValue::UInt(row.try_get_unchecked::<u64, _>(idx)?),
        ValueKind::Float => SqlValue::Float(row.try_get_unchecked::<f32, _>(idx)?),
        ValueKind::Double => SqlValue::Double(row.try_get_unchecked::<f64, _>(idx)?),
        ValueKind::Text => SqlValue::Text(row.try_get_unchecked::<String, _>(idx)?),
        ValueKind::Bytes => SqlValue::Bytes(row.try_get_unchecked::<Vec<u8>, _>(idx)?),
        ValueKind::Time => SqlValue::Time(row.try_get::<MySqlTime, _>(idx)?),
        ValueKind::Date | ValueKind::DateTime => decode_calendar(row, idx, kind)?,
    };
    Ok(value)
}

/// DATE, DATETIME and TIMESTAMP as chrono values, falling back to the
/// literal for values chrono cannot hold (`0000-00-00`, zero month or day).
fn decode_calendar(row: &MySqlRow, idx: usize, kind: ValueKind) -> Result<SqlValue, sqlx::Error> {
    let date_only = kind == ValueKind::Date;
    let decoded = if date_only {
        row.try_get::<NaiveDate, _>(idx).map(SqlValue::Date)
    } else {
        row.try_get::<NaiveDateTime, _>(idx).map(SqlValue::DateTime)
    };

    let err = match decoded {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };
    let raw = row.try_get_unchecked::<Vec<u8>, _>(idx)?;
    match calendar_literal(&raw, date_only) {
        Some(literal) => {
            tracing::debug!("Column {} holds {}, copying it as a literal", idx, literal);
            Ok(SqlValue::Text(literal))
        }
        None => Err(err),
    }
}

/// Payload sizes of a binary-protocol DATE/DATETIME value.
const BINARY_CALENDAR_LENGTHS: [usize; 4] = [0, 4, 7, 11];

/// Render a raw DATE/DATETIME column as `YYYY-MM-DD[ HH:MM:SS[.ffffff]]`.
///
/// Accepts the text protocol form as is, and the binary form with or
/// without its leading length byte.
pub(crate) fn calendar_literal(raw: &[u8], date_only: bool) -> Option<String> {
    if raw.len() >= 10 && raw[4] == b'-' && raw[7] == b'-' {
        return std::str::from_utf8(raw).ok().map(str::to_string);
    }

    let payload = match raw.split_first() {
        Some((&len, rest))
            if len as usize == rest.len() && BINARY_CALENDAR_LENGTHS.contains(&rest.len()) =>
        {
            rest
        }
        _ if BINARY_CALENDAR_LENGTHS.contains(&raw.len()) => raw,
        _ => return None,
    };

    let mut fields = [0u8; 11];
    fields[..payload.len()].copy_from_slice(payload);
    let year = u16::from_le_bytes([fields[0], fields[1]]);
    let date = format!("{:04}-{:02}-{:02}", year, fields[2], fields[3]);
    if date_only {
        return Some(date);
    }

    let mut literal = format!(
        "{} {:02}:{:02}:{:02}",
        date, fields[4], fields[5], fields[6]
    );
    if payload.len() == 11 {
        let micros = u32::from_le_bytes([fields[7], fields[8], fields[9], fields[10]]);
        literal.push_str(&format!(".{:06}", micros));
    }
    Some(literal)
}

/// Bind `value` as the next positional parameter of `query`.
pub fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: SqlValue,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Int(v) => query.bind(v),
        SqlValue::UInt(v) => query.bind(v),
        SqlValue::Float(v) => query.bind(v),
        SqlValue::Double(v) => query.bind(v),
        SqlValue::Text(v) => query.bind(v),
        SqlValue::Bytes(v) => query.bind(v),
        SqlValue::Date(v) => query.bind(v),
        SqlValue::Time(v) => query.bind(v),
        SqlValue::DateTime(v) => query.bind(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::mysql::types::MySqlTimeSign;

    #[test]
    fn test_integer_kinds_respect_signedness() {
        assert_eq!(ValueKind::from_type_name("BIGINT"), ValueKind::Int);
        assert_eq!(ValueKind::from_type_name("BIGINT UNSIGNED"), ValueKind::UInt);
        assert_eq!(ValueKind::from_type_name("TINYINT UNSIGNED"), ValueKind::UInt);
        assert_eq!(ValueKind::from_type_name("BOOLEAN"), ValueKind::Int);
        assert_eq!(ValueKind::from_type_name("YEAR"), ValueKind::Int);
    }

    #[test]
    fn test_textual_kinds() {
        for name in ["VARCHAR", "CHAR", "TEXT", "LONGTEXT", "DECIMAL", "JSON", "ENUM", "SET"] {
            assert_eq!(ValueKind::from_type_name(name), ValueKind::Text, "{}", name);
        }
    }

    #[test]
    fn test_binary_and_temporal_kinds() {
        assert_eq!(ValueKind::from_type_name("VARBINARY"), ValueKind::Bytes);
        assert_eq!(ValueKind::from_type_name("LONGBLOB"), ValueKind::Bytes);
        assert_eq!(ValueKind::from_type_name("BIT"), ValueKind::Bytes);
        assert_eq!(ValueKind::from_type_name("DATETIME"), ValueKind::DateTime);
        assert_eq!(ValueKind::from_type_name("TIMESTAMP"), ValueKind::DateTime);
        assert_eq!(ValueKind::from_type_name("DATE"), ValueKind::Date);
        assert_eq!(ValueKind::from_type_name("TIME"), ValueKind::Time);
    }

    #[test]
    fn test_floating_kinds() {
        assert_eq!(ValueKind::from_type_name("FLOAT"), ValueKind::Float);
        assert_eq!(ValueKind::from_type_name("DOUBLE"), ValueKind::Double);
    }

    #[test]
    fn test_unknown_type_falls_back_to_text() {
        assert_eq!(ValueKind::from_type_name("NULL"), ValueKind::Text);
        assert_eq!(ValueKind::from_type_name(""), ValueKind::Text);
    }

    #[test]
    fn test_zero_datetime_becomes_literal() {
        // binary protocol sends a zero date as an empty payload behind its length byte
        assert_eq!(
            calendar_literal(&[0], false).as_deref(),
            Some("0000-00-00 00:00:00")
        );
        assert_eq!(calendar_literal(&[], false).as_deref(), Some("0000-00-00 00:00:00"));
        assert_eq!(calendar_literal(&[0], true).as_deref(), Some("0000-00-00"));
    }

    #[test]
    fn test_zero_month_and_day_keep_year() {
        // 2020-00-00, year little-endian
        let raw = [4, 0xE4, 0x07, 0, 0];
        assert_eq!(calendar_literal(&raw, true).as_deref(), Some("2020-00-00"));
        assert_eq!(
            calendar_literal(&raw, false).as_deref(),
            Some("2020-00-00 00:00:00")
        );
    }

    #[test]
    fn test_binary_datetime_with_microseconds() {
        let micros = 1500u32.to_le_bytes();
        let raw = [
            11, 0xE4, 0x07, 0, 0, 13, 5, 9, micros[0], micros[1], micros[2], micros[3],
        ];
        assert_eq!(
            calendar_literal(&raw, false).as_deref(),
            Some("2020-00-00 13:05:09.001500")
        );
    }

    #[test]
    fn test_text_protocol_zero_date_passes_through() {
        assert_eq!(
            calendar_literal(b"0000-00-00 00:00:00", false).as_deref(),
            Some("0000-00-00 00:00:00")
        );
    }

    #[test]
    fn test_unrecognized_calendar_bytes_are_rejected() {
        assert_eq!(calendar_literal(&[1, 2, 3], false), None);
        assert_eq!(calendar_literal(&[9, 1, 2], true), None);
    }

    #[test]
    fn test_time_beyond_one_day_is_representable() {
        let time = MySqlTime::new(MySqlTimeSign::Negative, 838, 59, 59, 0).unwrap();
        let value = SqlValue::Time(time);
        assert_eq!(value.clone(), SqlValue::Time(time));
        let _query = bind_value(sqlx::query("SELECT ?"), value);
    }

    #[tokio::test]
    #[ignore]
    async fn test_decode_out_of_range_time() {
        let url = std::env::var("TEST_SOURCE_URL").unwrap();
        let pool = crate::mysql::connect("source", &url).await.unwrap();

        let row = sqlx::query("SELECT CAST('-838:59:59' AS TIME) AS t")
            .fetch_one(&pool)
            .await
            .unwrap();
        let values = decode_row(&row).unwrap();
        let expected = MySqlTime::new(MySqlTimeSign::Negative, 838, 59, 59, 0).unwrap();
        assert_eq!(values, vec![SqlValue::Time(expected)]);
    }
}
