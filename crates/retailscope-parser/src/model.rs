use std::fmt;

use chrono::NaiveDateTime;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    Workbook,
    Csv,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::Workbook => "workbook",
            SourceFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single spreadsheet cell after format-specific decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }
}

/// The first sheet (or the whole CSV body) of an upload, one polars column per header.
///
/// Column dtypes are inferred from the cells: all-numeric columns become `Float64`,
/// all-boolean columns `Boolean`, all-datetime columns `Datetime(ms)`, and anything
/// mixed falls back to `String`. Columns with no values at all are `Float64` nulls.
#[derive(Debug, Clone)]
pub struct ParsedTable {
    pub format: SourceFormat,
    pub sheet_name: Option<String>,
    pub df: DataFrame,
}

impl ParsedTable {
    pub fn height(&self) -> usize {
        self.df.height()
    }
}
