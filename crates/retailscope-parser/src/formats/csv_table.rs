use csv::ReaderBuilder;

use super::build_dataframe;
use crate::errors::ParserError;
use crate::model::{Cell, ParsedTable, SourceFormat};
use crate::registry::SpreadsheetParser;

const PARSER_NAME: &str = "csv";
const UTF8_BOM: &str = "\u{feff}";
const NA_VALUES: [&str; 6] = ["nan", "na", "n/a", "null", "none", "#n/a"];

/// Comma-separated text with a header row.
pub struct CsvParser;

impl SpreadsheetParser for CsvParser {
    fn name(&self) -> &'static str {
        PARSER_NAME
    }

    fn parse(&self, contents: &[u8]) -> Result<ParsedTable, ParserError> {
        let Ok(text) = std::str::from_utf8(contents) else {
            return Err(ParserError::FormatMismatch {
                parser: PARSER_NAME,
                reason: "file contents were not valid UTF-8".to_string(),
            });
        };
        let text = text.strip_prefix(UTF8_BOM).unwrap_or(text);

        if text.contains('\0') {
            return Err(ParserError::FormatMismatch {
                parser: PARSER_NAME,
                reason: "file contains NUL bytes".to_string(),
            });
        }
        if text.trim().is_empty() {
            return Err(ParserError::EmptyData {
                parser: PARSER_NAME,
            });
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|source| ParserError::Csv {
                parser: PARSER_NAME,
                source,
            })?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|source| ParserError::Csv {
                parser: PARSER_NAME,
                source,
            })?;
            let cells: Vec<Cell> = record.iter().map(decode_field).collect();
            if cells.iter().all(Cell::is_empty) {
                continue;
            }
            rows.push(cells);
        }

        let df = build_dataframe(PARSER_NAME, headers, rows)?;

        Ok(ParsedTable {
            format: SourceFormat::Csv,
            sheet_name: None,
            df,
        })
    }
}

fn decode_field(raw: &str) -> Cell {
    let value = raw.trim();
    if value.is_empty() || NA_VALUES.contains(&value.to_ascii_lowercase().as_str()) {
        return Cell::Empty;
    }

    if let Ok(number) = value.parse::<f64>() {
        if number.is_finite() {
            return Cell::Number(number);
        }
    }

    match value {
        "True" | "TRUE" | "true" => Cell::Bool(true),
        "False" | "FALSE" | "false" => Cell::Bool(false),
        _ => Cell::Text(value.to_string()),
    }
}
