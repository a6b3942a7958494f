//! The three-order demonstration table shown to users before they upload anything.

use polars::prelude::*;

use crate::date_normalizer::normalize_dates;
use crate::error::Result;
use crate::types::{
    Dataset, CATEGORY, DISCOUNT, ORDER_DATE, PRODUCT_NAME, PROFIT, QUANTITY, SALES, SHIP_DATE,
    SUB_CATEGORY,
};
use crate::validation::validate_dataset;

/// The demonstration table as an upload would arrive: text dates, untouched numbers.
pub fn sample_frame() -> Result<DataFrame> {
    let columns: Vec<Column> = vec![
        Series::new(ORDER_DATE.into(), ["2023-01-01", "2023-01-02", "2023-01-03"]).into(),
        Series::new(SHIP_DATE.into(), ["2023-01-02", "2023-01-03", "2023-01-04"]).into(),
        Series::new(CATEGORY.into(), ["Technology", "Furniture", "Office Supplies"]).into(),
        Series::new(SUB_CATEGORY.into(), ["Phones", "Chairs", "Binders"]).into(),
        Series::new(
            PRODUCT_NAME.into(),
            ["iPhone 14", "Office Chair", "Binder Clips"],
        )
        .into(),
        Series::new(SALES.into(), [999.99, 299.99, 15.99]).into(),
        Series::new(DISCOUNT.into(), [0.1, 0.0, 0.05]).into(),
        Series::new(PROFIT.into(), [199.99, 59.99, 3.19]).into(),
        Series::new(QUANTITY.into(), [1i64, 1, 5]).into(),
    ];
    Ok(DataFrame::new(columns)?)
}

/// The demonstration table run through validation and date normalization.
pub fn sample_dataset() -> Result<Dataset> {
    let frame = sample_frame()?;
    validate_dataset(&frame).into_result()?;
    Dataset::from_frame(normalize_dates(&frame)?)
}
