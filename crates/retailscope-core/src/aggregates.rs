use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_PRODUCT_COUNT;
use crate::kpis::guarded_ratio;
use crate::types::DatasetView;

const ELLIPSIS: &str = "...";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryProfit {
    pub category: String,
    pub profit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountImpact {
    pub discount: f64,
    pub mean_profit: f64,
    pub mean_sales: f64,
    pub orders: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductProfit {
    pub product_name: String,
    pub short_name: String,
    pub profit: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailySales {
    pub date: NaiveDate,
    pub sales: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankOrder {
    /// Highest total profit first.
    Top,
    /// Lowest total profit first.
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRanking {
    pub order: RankOrder,
    pub count: usize,
}

impl Default for ProductRanking {
    fn default() -> Self {
        Self {
            order: RankOrder::Top,
            count: DEFAULT_PRODUCT_COUNT,
        }
    }
}

/// Total profit per category, sorted by category name.
pub fn profit_by_category(view: &DatasetView<'_>) -> Vec<CategoryProfit> {
    let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
    for row in view.iter() {
        *totals.entry(row.category.as_str()).or_insert(0.0) += row.profit;
    }

    totals
        .into_iter()
        .map(|(category, profit)| CategoryProfit {
            category: category.to_string(),
            profit,
        })
        .collect()
}

/// Mean profit and mean sales for every distinct discount rate, ascending by rate.
///
/// Rates are grouping keys as-is; 0.1 and 0.10000001 are separate groups.
pub fn discount_impact(view: &DatasetView<'_>) -> Vec<DiscountImpact> {
    struct Accumulator {
        discount: f64,
        profit: f64,
        sales: f64,
        orders: usize,
    }

    let mut groups: HashMap<u64, Accumulator> = HashMap::new();
    for row in view.iter() {
        // -0.0 and 0.0 are the same rate.
        let discount = if row.discount == 0.0 { 0.0 } else { row.discount };
        let entry = groups.entry(discount.to_bits()).or_insert(Accumulator {
            discount,
            profit: 0.0,
            sales: 0.0,
            orders: 0,
        });
        entry.profit += row.profit;
        entry.sales += row.sales;
        entry.orders += 1;
    }

    let mut impacts: Vec<DiscountImpact> = groups
        .into_values()
        .map(|acc| DiscountImpact {
            discount: acc.discount,
            mean_profit: guarded_ratio(acc.profit, acc.orders as f64),
            mean_sales: guarded_ratio(acc.sales, acc.orders as f64),
            orders: acc.orders,
        })
        .collect();
    impacts.sort_by(|a, b| a.discount.total_cmp(&b.discount));
    impacts
}

/// Total profit per product name, then the `count` best or worst.
///
/// The sort is stable over first-encounter order, so ties keep the order in which
/// products first appear in the view.
pub fn rank_products(
    view: &DatasetView<'_>,
    ranking: ProductRanking,
    max_name_chars: usize,
) -> Vec<ProductProfit> {
    let mut order: Vec<&str> = Vec::new();
    let mut totals: HashMap<&str, f64> = HashMap::new();
    for row in view.iter() {
        let name = row.product_name.as_str();
        match totals.get_mut(name) {
            Some(total) => *total += row.profit,
            None => {
                order.push(name);
                totals.insert(name, row.profit);
            }
        }
    }

    let mut products: Vec<(&str, f64)> = order
        .into_iter()
        .map(|name| (name, totals[name]))
        .collect();

    match ranking.order {
        RankOrder::Top => products.sort_by(|a, b| b.1.total_cmp(&a.1)),
        RankOrder::Bottom => products.sort_by(|a, b| a.1.total_cmp(&b.1)),
    }

    products
        .into_iter()
        .take(ranking.count)
        .map(|(name, profit)| ProductProfit {
            product_name: name.to_string(),
            short_name: truncate_name(name, max_name_chars),
            profit,
        })
        .collect()
}

/// Cuts names longer than `max_chars` characters and appends `...`.
pub fn truncate_name(name: &str, max_chars: usize) -> String {
    match name.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{}", &name[..byte_idx], ELLIPSIS),
        None => name.to_string(),
    }
}

/// Sales summed per calendar order date, ascending. Days without sales are absent.
pub fn daily_sales(view: &DatasetView<'_>) -> Vec<DailySales> {
    let mut totals: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for row in view.iter() {
        *totals.entry(row.order_day()).or_insert(0.0) += row.sales;
    }

    totals
        .into_iter()
        .map(|(date, sales)| DailySales { date, sales })
        .collect()
}
