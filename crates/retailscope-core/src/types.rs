// crates/retailscope-core/src/types.rs

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use retailscope_parser::formats::format_number;

use crate::error::{PipelineError, Result};

pub const ORDER_DATE: &str = "Order Date";
pub const SHIP_DATE: &str = "Ship Date";
pub const CATEGORY: &str = "Category";
pub const SUB_CATEGORY: &str = "Sub-Category";
pub const PRODUCT_NAME: &str = "Product Name";
pub const SALES: &str = "Sales";
pub const DISCOUNT: &str = "Discount";
pub const PROFIT: &str = "Profit";
pub const QUANTITY: &str = "Quantity";

/// Columns every upload must carry, in the order they are checked and reported.
pub const REQUIRED_COLUMNS: [&str; 9] = [
    ORDER_DATE,
    SHIP_DATE,
    CATEGORY,
    SUB_CATEGORY,
    PRODUCT_NAME,
    SALES,
    DISCOUNT,
    PROFIT,
    QUANTITY,
];

pub const DATE_COLUMNS: [&str; 2] = [ORDER_DATE, SHIP_DATE];
pub const NUMERIC_COLUMNS: [&str; 4] = [SALES, DISCOUNT, PROFIT, QUANTITY];
pub const TEXT_COLUMNS: [&str; 3] = [CATEGORY, SUB_CATEGORY, PRODUCT_NAME];

pub fn datetime_dtype() -> DataType {
    DataType::Datetime(TimeUnit::Milliseconds, None)
}

/// One sale record; identity is its position in the uploaded table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRow {
    pub order_date: NaiveDateTime,
    pub ship_date: NaiveDateTime,
    pub category: String,
    pub sub_category: String,
    pub product_name: String,
    pub sales: f64,
    pub discount: f64,
    pub profit: f64,
    pub quantity: i64,
}

impl TransactionRow {
    pub fn order_day(&self) -> NaiveDate {
        self.order_date.date()
    }
}

/// A validated, date-normalized upload held for the lifetime of a session.
///
/// The typed rows drive every aggregation; the normalized frame is kept alongside so
/// exports can include columns beyond the nine required ones.
#[derive(Debug, Clone)]
pub struct Dataset {
    rows: Vec<TransactionRow>,
    frame: DataFrame,
    categories: Vec<String>,
}

impl Dataset {
    /// Builds typed rows from a frame whose date columns are already `Datetime(ms)`.
    ///
    /// Text columns that arrived as numbers (SKU-style product names, numeric codes) are
    /// rewritten as text first, so `10001` stays `10001` in rankings and exports.
    pub fn from_frame(frame: DataFrame) -> Result<Self> {
        let frame = numeric_text_columns_as_strings(frame)?;
        let height = frame.height();

        let order_col = frame.column(ORDER_DATE)?.cast(&datetime_dtype())?;
        let ship_col = frame.column(SHIP_DATE)?.cast(&datetime_dtype())?;
        let category_col = frame.column(CATEGORY)?.cast(&DataType::String)?;
        let sub_category_col = frame.column(SUB_CATEGORY)?.cast(&DataType::String)?;
        let product_col = frame.column(PRODUCT_NAME)?.cast(&DataType::String)?;
        let sales_col = frame.column(SALES)?.cast(&DataType::Float64)?;
        let discount_col = frame.column(DISCOUNT)?.cast(&DataType::Float64)?;
        let profit_col = frame.column(PROFIT)?.cast(&DataType::Float64)?;
        let quantity_col = frame.column(QUANTITY)?.cast(&DataType::Float64)?;

        let order_dates = order_col.datetime()?;
        let ship_dates = ship_col.datetime()?;
        let categories = category_col.str()?;
        let sub_categories = sub_category_col.str()?;
        let products = product_col.str()?;
        let sales = sales_col.f64()?;
        let discounts = discount_col.f64()?;
        let profits = profit_col.f64()?;
        let quantities = quantity_col.f64()?;

        let mut rows = Vec::with_capacity(height);
        for idx in 0..height {
            let quantity = required(quantities.get(idx), QUANTITY, idx)?;
            let Some(quantity) = whole_number(quantity) else {
                return Err(PipelineError::SchemaValidation(format!(
                    "Column '{QUANTITY}' must contain whole numbers"
                )));
            };

            rows.push(TransactionRow {
                order_date: millis_to_datetime(
                    required(order_dates.get(idx), ORDER_DATE, idx)?,
                    ORDER_DATE,
                    idx,
                )?,
                ship_date: millis_to_datetime(
                    required(ship_dates.get(idx), SHIP_DATE, idx)?,
                    SHIP_DATE,
                    idx,
                )?,
                category: required(categories.get(idx), CATEGORY, idx)?.to_string(),
                sub_category: required(sub_categories.get(idx), SUB_CATEGORY, idx)?.to_string(),
                product_name: required(products.get(idx), PRODUCT_NAME, idx)?.to_string(),
                sales: required(sales.get(idx), SALES, idx)?,
                discount: required(discounts.get(idx), DISCOUNT, idx)?,
                profit: required(profits.get(idx), PROFIT, idx)?,
                quantity,
            });
        }

        let categories = distinct_categories(&rows);
        Ok(Self {
            rows,
            frame,
            categories,
        })
    }

    /// Builds a dataset from typed rows, synthesizing the nine-column frame.
    pub fn from_rows(rows: Vec<TransactionRow>) -> Result<Self> {
        let order_dates: Vec<i64> = rows
            .iter()
            .map(|row| datetime_to_millis(row.order_date))
            .collect();
        let ship_dates: Vec<i64> = rows
            .iter()
            .map(|row| datetime_to_millis(row.ship_date))
            .collect();
        let text = |name: &str, values: Vec<&str>| -> Column { Series::new(name.into(), values).into() };
        let number = |name: &str, values: Vec<f64>| -> Column { Series::new(name.into(), values).into() };

        let columns: Vec<Column> = vec![
            Series::new(ORDER_DATE.into(), order_dates)
                .cast(&datetime_dtype())?
                .into(),
            Series::new(SHIP_DATE.into(), ship_dates)
                .cast(&datetime_dtype())?
                .into(),
            text(CATEGORY, rows.iter().map(|row| row.category.as_str()).collect()),
            text(SUB_CATEGORY, rows.iter().map(|row| row.sub_category.as_str()).collect()),
            text(PRODUCT_NAME, rows.iter().map(|row| row.product_name.as_str()).collect()),
            number(SALES, rows.iter().map(|row| row.sales).collect()),
            number(DISCOUNT, rows.iter().map(|row| row.discount).collect()),
            number(PROFIT, rows.iter().map(|row| row.profit).collect()),
            Series::new(
                QUANTITY.into(),
                rows.iter().map(|row| row.quantity).collect::<Vec<i64>>(),
            )
            .into(),
        ];
        let frame = DataFrame::new(columns)?;

        let categories = distinct_categories(&rows);
        Ok(Self {
            rows,
            frame,
            categories,
        })
    }

    pub fn rows(&self) -> &[TransactionRow] {
        &self.rows
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct categories in first-encounter order.
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn order_date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.rows.first()?.order_day();
        Some(self.rows.iter().fold((first, first), |(min, max), row| {
            let day = row.order_day();
            (min.min(day), max.max(day))
        }))
    }

    /// A view over every row, in source order.
    pub fn view(&self) -> DatasetView<'_> {
        DatasetView {
            dataset: self,
            indices: (0..self.rows.len()).collect(),
        }
    }
}

/// Row positions selected from a [`Dataset`] without copying or mutating it.
#[derive(Debug, Clone)]
pub struct DatasetView<'a> {
    dataset: &'a Dataset,
    indices: Vec<usize>,
}

impl<'a> DatasetView<'a> {
    pub(crate) fn from_indices(dataset: &'a Dataset, indices: Vec<usize>) -> Self {
        Self { dataset, indices }
    }

    pub fn dataset(&self) -> &'a Dataset {
        self.dataset
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a TransactionRow> + '_ {
        let rows = self.dataset.rows();
        self.indices.iter().map(move |&idx| &rows[idx])
    }

    pub fn rows(&self) -> Vec<&'a TransactionRow> {
        self.iter().collect()
    }
}

/// Upload-level facts shown right after a successful load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub file_name: String,
    pub content_hash: String,
    pub source_format: String,
    pub total_records: usize,
    pub first_order_date: Option<NaiveDate>,
    pub last_order_date: Option<NaiveDate>,
    pub category_count: usize,
    pub categories: Vec<String>,
    pub extra_columns: Vec<String>,
}

/// The value as an `i64` when it is whole and inside the `i64` range.
pub(crate) fn whole_number(value: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, which is itself out of range.
    let in_range = value >= i64::MIN as f64 && value < i64::MAX as f64;
    (value.fract() == 0.0 && in_range).then_some(value as i64)
}

fn numeric_text_columns_as_strings(mut frame: DataFrame) -> Result<DataFrame> {
    for name in TEXT_COLUMNS {
        let rewritten = {
            let column = frame.column(name)?;
            let dtype = column.dtype();
            if !(dtype.is_float() || dtype.is_integer()) {
                continue;
            }
            let numbers = column.cast(&DataType::Float64)?;
            let text: Vec<Option<String>> = numbers
                .f64()?
                .into_iter()
                .map(|value| value.map(format_number))
                .collect();
            Series::new(name.into(), text)
        };
        frame.with_column(rewritten)?;
    }
    Ok(frame)
}

fn distinct_categories(rows: &[TransactionRow]) -> Vec<String> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter(|row| seen.insert(row.category.as_str()))
        .map(|row| row.category.clone())
        .collect()
}

fn required<T>(value: Option<T>, column: &str, row: usize) -> Result<T> {
    value.ok_or_else(|| {
        PipelineError::SchemaValidation(format!(
            "Column '{column}' contains empty values (first at row {})",
            row + 1
        ))
    })
}

pub(crate) fn millis_to_datetime(millis: i64, column: &str, row: usize) -> Result<NaiveDateTime> {
    DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| PipelineError::DateConversion {
            column: column.to_string(),
            row: row + 1,
            message: format!("timestamp {millis}ms is out of range"),
        })
}

pub(crate) fn datetime_to_millis(dt: NaiveDateTime) -> i64 {
    dt.and_utc().timestamp_millis()
}
