use serde::{Deserialize, Serialize};

use crate::aggregates::profit_by_category;
use crate::kpis::guarded_ratio;
use crate::types::DatasetView;

/// Average discount above this rate is flagged.
pub const HIGH_DISCOUNT_THRESHOLD: f64 = 0.2;
/// Share of loss-making orders (percent) above which the view is flagged.
pub const HIGH_LOSS_SHARE_PCT: f64 = 15.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessInsights {
    pub average_discount: f64,
    pub high_discount: bool,
    pub negative_profit_pct: f64,
    pub high_negative_profit: bool,
    pub most_profitable_category: Option<String>,
}

pub fn business_insights(view: &DatasetView<'_>) -> BusinessInsights {
    let orders = view.len() as f64;
    let discount_total: f64 = view.iter().map(|row| row.discount).sum();
    let loss_making = view.iter().filter(|row| row.profit < 0.0).count() as f64;

    let average_discount = guarded_ratio(discount_total, orders);
    let negative_profit_pct = guarded_ratio(loss_making, orders) * 100.0;

    // First maximum in category-name order.
    let most_profitable_category = profit_by_category(view)
        .into_iter()
        .fold(None::<(String, f64)>, |best, entry| match best {
            Some((_, best_profit)) if entry.profit <= best_profit => best,
            _ => Some((entry.category, entry.profit)),
        })
        .map(|(category, _)| category);

    BusinessInsights {
        average_discount,
        high_discount: average_discount > HIGH_DISCOUNT_THRESHOLD,
        negative_profit_pct,
        high_negative_profit: negative_profit_pct > HIGH_LOSS_SHARE_PCT,
        most_profitable_category,
    }
}
