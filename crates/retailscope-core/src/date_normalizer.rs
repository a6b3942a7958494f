use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::types::{datetime_dtype, DATE_COLUMNS};

const DATETIME_FORMATS: [&str; 14] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m-%d-%Y %H:%M:%S",
    "%m-%d-%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
];

/// Ambiguous dash dates read month-first; day-first only when the month would be out of range.
const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%m-%d-%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
];

/// Parses one textual date or date-time; the error carries the last parser message.
pub fn parse_date_text(text: &str) -> std::result::Result<NaiveDateTime, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err("empty date value".to_string());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.naive_utc());
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            if let Some(dt) = date.and_hms_opt(0, 0, 0) {
                return Ok(dt);
            }
        }
    }

    let mut last_error = String::new();
    for format in DATETIME_FORMATS {
        match NaiveDateTime::parse_from_str(trimmed, format) {
            Ok(dt) => return Ok(dt),
            Err(err) => last_error = err.to_string(),
        }
    }

    Err(format!("unknown date format '{trimmed}' ({last_error})"))
}

/// Converts `Order Date` and `Ship Date` to `Datetime(ms)` columns.
///
/// Already-normalized columns pass through unchanged, so calling this twice is a no-op.
pub fn normalize_dates(df: &DataFrame) -> Result<DataFrame> {
    let mut output = df.clone();

    for name in DATE_COLUMNS {
        let column = df.column(name)?;
        if column.dtype() == &datetime_dtype() {
            continue;
        }

        let normalized = normalize_column(name, column)?;
        output.with_column(normalized)?;
        debug!(column = name, rows = df.height(), "normalized date column");
    }

    Ok(output)
}

fn normalize_column(name: &str, column: &Column) -> Result<Series> {
    match column.dtype() {
        DataType::Date | DataType::Datetime(_, _) => Ok(column
            .cast(&datetime_dtype())?
            .as_materialized_series()
            .clone()),
        DataType::String => {
            let values = column.str()?;
            let mut millis: Vec<Option<i64>> = Vec::with_capacity(values.len());
            for (row, value) in values.into_iter().enumerate() {
                match value {
                    None => millis.push(None),
                    Some(text) => {
                        let parsed =
                            parse_date_text(text).map_err(|message| PipelineError::DateConversion {
                                column: name.to_string(),
                                row: row + 1,
                                message,
                            })?;
                        millis.push(Some(parsed.and_utc().timestamp_millis()));
                    }
                }
            }
            Ok(Series::new(name.into(), millis).cast(&datetime_dtype())?)
        }
        other if column.null_count() == column.len() => {
            debug!(column = name, dtype = %other, "date column has no values");
            Ok(Series::new(name.into(), vec![None::<i64>; column.len()]).cast(&datetime_dtype())?)
        }
        other => Err(PipelineError::DateConversion {
            column: name.to_string(),
            row: 1,
            message: format!("column has dtype {other}, expected text or dates"),
        }),
    }
}
