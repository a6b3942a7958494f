use polars::prelude::*;
use tracing::debug;

use crate::error::Result;
use crate::filters::FilterCriteria;
use crate::types::DatasetView;

pub const EXPORT_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Serializes the view as CSV with every uploaded column, newest order first.
///
/// Rows sharing an order date keep their source order.
pub fn export_csv(view: &DatasetView<'_>) -> Result<Vec<u8>> {
    let rows = view.dataset().rows();
    let mut positions: Vec<usize> = view.indices().to_vec();
    positions.sort_by(|&a, &b| rows[b].order_date.cmp(&rows[a].order_date));

    let take: Vec<IdxSize> = positions.iter().map(|&idx| idx as IdxSize).collect();
    let take = IdxCa::from_vec("take".into(), take);
    let mut df = view.dataset().frame().take(&take)?;

    let mut buffer = Vec::new();
    CsvWriter::new(&mut buffer)
        .include_header(true)
        .with_separator(b',')
        .with_datetime_format(Some(EXPORT_DATETIME_FORMAT.to_string()))
        .finish(&mut df)?;

    debug!(rows = df.height(), bytes = buffer.len(), "exported view as CSV");
    Ok(buffer)
}

pub fn export_file_name(criteria: &FilterCriteria) -> String {
    format!(
        "retail_data_{}_{}.csv",
        criteria.start().format("%Y-%m-%d"),
        criteria.end().format("%Y-%m-%d")
    )
}
