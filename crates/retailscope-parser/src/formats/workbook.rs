use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};

use super::{build_dataframe, parse_text_datetime};
use crate::errors::ParserError;
use crate::model::{Cell, ParsedTable, SourceFormat};
use crate::registry::SpreadsheetParser;

const PARSER_NAME: &str = "workbook";

// Zip container (xlsx, xlsm, xlsb, ods) and OLE compound document (legacy xls).
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Reads the first worksheet of an Excel/OpenDocument workbook.
pub struct WorkbookParser;

impl SpreadsheetParser for WorkbookParser {
    fn name(&self) -> &'static str {
        PARSER_NAME
    }

    fn parse(&self, contents: &[u8]) -> Result<ParsedTable, ParserError> {
        if !contents.starts_with(ZIP_MAGIC) && !contents.starts_with(OLE_MAGIC) {
            return Err(ParserError::FormatMismatch {
                parser: PARSER_NAME,
                reason: "content is not a zip or OLE workbook container".to_string(),
            });
        }

        let mut workbook = open_workbook_auto_from_rs(Cursor::new(contents.to_vec())).map_err(
            |err| ParserError::Workbook {
                parser: PARSER_NAME,
                message: err.to_string(),
            },
        )?;

        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or(ParserError::EmptyData {
                parser: PARSER_NAME,
            })?;

        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|err| ParserError::Workbook {
                parser: PARSER_NAME,
                message: format!("sheet '{sheet_name}': {err}"),
            })?;

        let mut rows = range.rows();
        let header_row = rows.next().ok_or(ParserError::EmptyData {
            parser: PARSER_NAME,
        })?;
        let headers: Vec<String> = header_row.iter().map(header_text).collect();

        let body: Vec<Vec<Cell>> = rows
            .map(|row| row.iter().map(decode_cell).collect::<Vec<_>>())
            .filter(|cells| cells.iter().any(|cell| !cell.is_empty()))
            .collect();

        let df = build_dataframe(PARSER_NAME, headers, body)?;

        Ok(ParsedTable {
            format: SourceFormat::Workbook,
            sheet_name: Some(sheet_name),
            df,
        })
    }
}

fn header_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn decode_cell(cell: &Data) -> Cell {
    match cell {
        Data::Empty => Cell::Empty,
        Data::String(text) if text.trim().is_empty() => Cell::Empty,
        Data::String(text) => Cell::Text(text.clone()),
        Data::Float(value) => Cell::Number(*value),
        Data::Int(value) => Cell::Number(*value as f64),
        Data::Bool(value) => Cell::Bool(*value),
        Data::DateTime(value) => match value.as_datetime() {
            Some(dt) => Cell::DateTime(dt),
            None => Cell::Number(value.as_f64()),
        },
        Data::DateTimeIso(text) => match parse_text_datetime(text) {
            Some(dt) => Cell::DateTime(dt),
            None => Cell::Text(text.clone()),
        },
        Data::DurationIso(text) => Cell::Text(text.clone()),
        Data::Error(err) => Cell::Text(err.to_string()),
    }
}
