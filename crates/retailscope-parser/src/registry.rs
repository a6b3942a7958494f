use crate::errors::{ParserAttempt, ParserError};
use crate::formats::{CsvParser, WorkbookParser};
use crate::model::ParsedTable;

pub trait SpreadsheetParser {
    fn name(&self) -> &'static str;
    fn parse(&self, contents: &[u8]) -> Result<ParsedTable, ParserError>;
}

pub fn parse_spreadsheet(contents: &[u8]) -> Result<ParsedTable, ParserError> {
    let workbook = WorkbookParser;
    let csv = CsvParser;
    let parsers: [&dyn SpreadsheetParser; 2] = [&workbook, &csv];
    parse_with_parsers(contents, &parsers)
}

pub fn parse_with_parsers(
    contents: &[u8],
    parsers: &[&dyn SpreadsheetParser],
) -> Result<ParsedTable, ParserError> {
    let mut attempts = Vec::new();

    for parser in parsers {
        match parser.parse(contents) {
            Ok(parsed) => return Ok(parsed),
            Err(ParserError::FormatMismatch { reason, .. }) => {
                attempts.push(ParserAttempt::new(parser.name(), reason));
            }
            Err(err) => return Err(err),
        }
    }

    Err(ParserError::NoMatchingParser { attempts })
}
