use blake3::Hasher;
use polars::prelude::DataFrame;
use retailscope_parser::{parse_spreadsheet, ParsedTable};
use tracing::{debug, info, warn};

use crate::date_normalizer::normalize_dates;
use crate::error::Result;
use crate::types::{Dataset, DatasetSummary, REQUIRED_COLUMNS};
use crate::validation::{SchemaValidator, TransactionSchemaValidator};

#[derive(Debug, Clone)]
pub struct UploadedFile<'a> {
    pub file_name: &'a str,
    pub contents: &'a [u8],
}

#[derive(Debug, Clone)]
pub struct LoadedDataset {
    pub dataset: Dataset,
    pub summary: DatasetSummary,
}

/// Parses, validates and normalizes one upload.
///
/// Each stage fails fast: nothing is returned unless the table passed validation and
/// both date columns converted.
pub fn load_dataset(file: UploadedFile<'_>) -> Result<LoadedDataset> {
    load_dataset_with(file, &TransactionSchemaValidator)
}

pub fn load_dataset_with(
    file: UploadedFile<'_>,
    validator: &dyn SchemaValidator,
) -> Result<LoadedDataset> {
    let content_hash = compute_hash(file.contents);
    debug!(file = file.file_name, bytes = file.contents.len(), hash = %content_hash, "received upload");

    let table = parse_spreadsheet(file.contents).map_err(|err| {
        warn!(file = file.file_name, error = %err, "upload could not be read");
        err
    })?;
    debug!(
        file = file.file_name,
        format = %table.format,
        rows = table.height(),
        "parsed upload"
    );

    let report = validator.validate(&table.df);
    if !report.ok {
        warn!(file = file.file_name, reason = %report.message, "upload failed validation");
    }
    report.into_result()?;

    let normalized = normalize_dates(&table.df)?;
    let extra_columns = extra_columns(&normalized);
    let dataset = Dataset::from_frame(normalized)?;
    let summary = summarize(file.file_name, content_hash, &table, &dataset, extra_columns);

    info!(
        file = file.file_name,
        records = summary.total_records,
        categories = summary.category_count,
        "dataset loaded"
    );

    Ok(LoadedDataset { dataset, summary })
}

fn summarize(
    file_name: &str,
    content_hash: String,
    table: &ParsedTable,
    dataset: &Dataset,
    extra_columns: Vec<String>,
) -> DatasetSummary {
    let range = dataset.order_date_range();
    DatasetSummary {
        file_name: file_name.to_string(),
        content_hash,
        source_format: table.format.as_str().to_string(),
        total_records: dataset.len(),
        first_order_date: range.map(|(first, _)| first),
        last_order_date: range.map(|(_, last)| last),
        category_count: dataset.categories().len(),
        categories: dataset.categories().to_vec(),
        extra_columns,
    }
}

fn extra_columns(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .filter(|name| !REQUIRED_COLUMNS.contains(&name.as_str()))
        .map(|name| name.to_string())
        .collect()
}

fn compute_hash(contents: &[u8]) -> String {
    let mut hasher = Hasher::new();
    hasher.update(contents);
    hasher.finalize().to_hex().to_string()
}
