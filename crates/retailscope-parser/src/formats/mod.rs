mod common;
mod csv_table;
mod workbook;

pub use csv_table::CsvParser;
pub use workbook::WorkbookParser;

pub use common::format_number;
pub(crate) use common::{build_dataframe, parse_text_datetime};
