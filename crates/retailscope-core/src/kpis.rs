use serde::{Deserialize, Serialize};

use crate::types::DatasetView;

/// Headline numbers for the current view.
///
/// On an empty view every figure is zero and `has_data` is false; callers show
/// "no data" instead of treating this as an error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KpiSummary {
    pub total_sales: f64,
    pub total_profit: f64,
    pub profit_margin: f64,
    pub avg_order_value: f64,
    pub total_orders: usize,
    pub has_data: bool,
}

pub fn calculate_kpis(view: &DatasetView<'_>) -> KpiSummary {
    let (total_sales, total_profit) = view
        .iter()
        .fold((0.0_f64, 0.0_f64), |(sales, profit), row| {
            (sales + row.sales, profit + row.profit)
        });
    let total_orders = view.len();

    KpiSummary {
        total_sales,
        total_profit,
        profit_margin: profit_margin(total_profit, total_sales),
        avg_order_value: guarded_ratio(total_sales, total_orders as f64),
        total_orders,
        has_data: total_orders > 0,
    }
}

/// Profit as a percentage of sales; zero unless sales are positive.
pub fn profit_margin(total_profit: f64, total_sales: f64) -> f64 {
    if total_sales > 0.0 {
        total_profit / total_sales * 100.0
    } else {
        0.0
    }
}

/// `numerator / denominator`, or 0 when the denominator is 0.
pub fn guarded_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}
