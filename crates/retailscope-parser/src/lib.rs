pub mod errors;
pub mod formats;
pub mod model;
mod registry;

pub use errors::{ParserAttempt, ParserError};
pub use model::{Cell, ParsedTable, SourceFormat};
pub use registry::{parse_spreadsheet, parse_with_parsers, SpreadsheetParser};
