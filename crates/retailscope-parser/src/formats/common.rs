use std::collections::HashMap;

use chrono::NaiveDateTime;
use polars::prelude::*;

use crate::errors::ParserError;
use crate::model::Cell;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Number,
    Bool,
    DateTime,
    Text,
}

/// Assembles decoded rows into a DataFrame, inferring one dtype per column.
///
/// Rows shorter than the header are padded with empty cells; longer rows are rejected.
pub(crate) fn build_dataframe(
    parser: &'static str,
    headers: Vec<String>,
    rows: Vec<Vec<Cell>>,
) -> Result<DataFrame, ParserError> {
    if headers.is_empty() {
        return Err(ParserError::InvalidHeader {
            parser,
            message: "header row has no columns".to_string(),
        });
    }

    let names = dedupe_headers(headers);
    let width = names.len();

    let mut columns: Vec<Vec<Cell>> = (0..width)
        .map(|_| Vec::with_capacity(rows.len()))
        .collect();

    for (row_idx, row) in rows.into_iter().enumerate() {
        if row.len() > width {
            // Trailing empty cells are common in spreadsheet exports; only real values count.
            if row[width..].iter().any(|cell| !cell.is_empty()) {
                return Err(ParserError::DataRow {
                    parser,
                    line_index: row_idx + 2,
                    message: format!("expected {} fields, found {}", width, row.len()),
                });
            }
        }

        let mut cells = row.into_iter();
        for column in columns.iter_mut() {
            column.push(cells.next().unwrap_or(Cell::Empty));
        }
    }

    let mut frame_columns: Vec<Column> = Vec::with_capacity(width);
    for (name, cells) in names.iter().zip(columns) {
        frame_columns.push(build_series(name, cells)?.into());
    }

    Ok(DataFrame::new(frame_columns)?)
}

/// Blank headers become `Unnamed: <idx>` and repeats gain a `.<n>` suffix.
fn dedupe_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut names = Vec::with_capacity(headers.len());

    for (idx, header) in headers.into_iter().enumerate() {
        let base = if header.trim().is_empty() {
            format!("Unnamed: {idx}")
        } else {
            header
        };

        let count = seen.entry(base.clone()).or_insert(0);
        let name = if *count == 0 {
            base.clone()
        } else {
            format!("{base}.{count}")
        };
        *count += 1;
        names.push(name);
    }

    names
}

fn infer_kind(cells: &[Cell]) -> ColumnKind {
    let mut kind: Option<ColumnKind> = None;

    for cell in cells {
        let cell_kind = match cell {
            Cell::Empty => continue,
            Cell::Number(_) => ColumnKind::Number,
            Cell::Bool(_) => ColumnKind::Bool,
            Cell::DateTime(_) => ColumnKind::DateTime,
            Cell::Text(_) => return ColumnKind::Text,
        };

        match kind {
            None => kind = Some(cell_kind),
            Some(existing) if existing != cell_kind => return ColumnKind::Text,
            Some(_) => {}
        }
    }

    kind.unwrap_or(ColumnKind::Number)
}

fn build_series(name: &str, cells: Vec<Cell>) -> Result<Series, ParserError> {
    let series = match infer_kind(&cells) {
        ColumnKind::Number => {
            let values: Vec<Option<f64>> = cells
                .iter()
                .map(|cell| match cell {
                    Cell::Number(value) if value.is_finite() => Some(*value),
                    _ => None,
                })
                .collect();
            Series::new(name.into(), values)
        }
        ColumnKind::Bool => {
            let values: Vec<Option<bool>> = cells
                .iter()
                .map(|cell| match cell {
                    Cell::Bool(value) => Some(*value),
                    _ => None,
                })
                .collect();
            Series::new(name.into(), values)
        }
        ColumnKind::DateTime => {
            let values: Vec<Option<i64>> = cells
                .iter()
                .map(|cell| match cell {
                    Cell::DateTime(dt) => Some(dt.and_utc().timestamp_millis()),
                    _ => None,
                })
                .collect();
            Series::new(name.into(), values)
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?
        }
        ColumnKind::Text => {
            let values: Vec<Option<String>> = cells.into_iter().map(cell_to_text).collect();
            Series::new(name.into(), values)
        }
    };

    Ok(series)
}

fn cell_to_text(cell: Cell) -> Option<String> {
    match cell {
        Cell::Empty => None,
        Cell::Text(text) => Some(text),
        Cell::Number(value) => Some(format_number(value)),
        Cell::Bool(value) => Some(if value { "True" } else { "False" }.to_string()),
        Cell::DateTime(dt) => Some(dt.format(DATETIME_FORMAT).to_string()),
    }
}

/// Renders a numeric cell the way it was typed: whole numbers without a trailing `.0`.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Parses ISO-8601 style text emitted by some workbook writers for date cells.
pub(crate) fn parse_text_datetime(text: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

    let trimmed = text.trim();
    for format in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt);
        }
    }

    chrono::NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}
