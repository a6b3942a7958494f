// In crates/retailscope-core/src/validation.rs

use polars::prelude::*;
use serde::Serialize;

use crate::date_normalizer::parse_date_text;
use crate::error::{PipelineError, Result};
use crate::types::{whole_number, DATE_COLUMNS, NUMERIC_COLUMNS, QUANTITY, REQUIRED_COLUMNS};

pub const VALIDATION_SUCCESS: &str = "Dataset validation successful";
pub const INVALID_DATES: &str = "Order Date and Ship Date must be valid date formats";

/// Outcome of inspecting an uploaded table; never mutates the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub ok: bool,
    pub message: String,
}

impl ValidationReport {
    fn success() -> Self {
        Self {
            ok: true,
            message: VALIDATION_SUCCESS.to_string(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }

    pub fn into_result(self) -> Result<()> {
        if self.ok {
            Ok(())
        } else {
            Err(PipelineError::SchemaValidation(self.message))
        }
    }
}

pub trait SchemaValidator {
    fn required_columns(&self) -> &'static [&'static str];
    fn validate(&self, df: &DataFrame) -> ValidationReport;
}

/// Validator for the nine-column retail transactions layout.
pub struct TransactionSchemaValidator;

impl SchemaValidator for TransactionSchemaValidator {
    fn required_columns(&self) -> &'static [&'static str] {
        &REQUIRED_COLUMNS
    }

    /// Runs the checks in order and stops at the first failure.
    fn validate(&self, df: &DataFrame) -> ValidationReport {
        let missing = self.missing_columns(df);
        if !missing.is_empty() {
            return ValidationReport::failure(format!(
                "Missing required columns: {}",
                missing.join(", ")
            ));
        }

        if !DATE_COLUMNS
            .iter()
            .all(|name| Self::column_parses_as_dates(df, name))
        {
            return ValidationReport::failure(INVALID_DATES);
        }

        if let Some(column) = NUMERIC_COLUMNS
            .iter()
            .find(|name| !Self::column_is_numeric(df, name))
        {
            return ValidationReport::failure(format!(
                "Column '{column}' must contain numeric values"
            ));
        }

        if !Self::column_is_whole(df, QUANTITY) {
            return ValidationReport::failure(format!(
                "Column '{QUANTITY}' must contain whole numbers"
            ));
        }

        if let Some(column) = self
            .required_columns()
            .iter()
            .find(|name| Self::column_has_nulls(df, name))
        {
            return ValidationReport::failure(format!("Column '{column}' contains empty values"));
        }

        ValidationReport::success()
    }
}

// Column checks. Each one receives a column name already known to exist.
impl TransactionSchemaValidator {
    fn missing_columns(&self, df: &DataFrame) -> Vec<&'static str> {
        self.required_columns()
            .iter()
            .copied()
            .filter(|name| df.column(name).is_err())
            .collect()
    }

    fn column_parses_as_dates(df: &DataFrame, name: &str) -> bool {
        let Ok(column) = df.column(name) else {
            return false;
        };

        match column.dtype() {
            DataType::Date | DataType::Datetime(_, _) => true,
            DataType::String => match column.str() {
                Ok(values) => values
                    .into_iter()
                    .flatten()
                    .all(|text| parse_date_text(text).is_ok()),
                Err(_) => false,
            },
            _ => column.null_count() == column.len(),
        }
    }

    /// A column with no values cannot hold a non-numeric one, so it passes.
    fn column_is_numeric(df: &DataFrame, name: &str) -> bool {
        let Ok(column) = df.column(name) else {
            return false;
        };
        is_numeric_dtype(column.dtype()) || column.null_count() == column.len()
    }

    fn column_is_whole(df: &DataFrame, name: &str) -> bool {
        let Ok(column) = df.column(name) else {
            return false;
        };
        let Ok(cast) = column.cast(&DataType::Float64) else {
            return false;
        };
        match cast.f64() {
            Ok(values) => values
                .into_iter()
                .flatten()
                .all(|value| whole_number(value).is_some()),
            Err(_) => false,
        }
    }

    fn column_has_nulls(df: &DataFrame, name: &str) -> bool {
        df.column(name)
            .map(|column| column.null_count() > 0)
            .unwrap_or(true)
    }
}

pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Validates against the transactions layout.
pub fn validate_dataset(df: &DataFrame) -> ValidationReport {
    TransactionSchemaValidator.validate(df)
}
