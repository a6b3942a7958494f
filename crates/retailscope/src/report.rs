use comfy_table::presets::UTF8_FULL;
use comfy_table::{Row, Table};
use retailscope_core::aggregates::RankOrder;
use retailscope_core::pipelines::{DashboardReport, ForecastPanel};
use retailscope_core::types::DatasetSummary;

/// Future days listed in the forecast table; the rest are summarized by the JSON output.
const FORECAST_PREVIEW_DAYS: usize = 7;

fn table<R: Into<Row>>(header: R) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(header);
    table
}

fn money(value: f64) -> String {
    format!("${value:.2}")
}

pub fn render_summary(summary: &DatasetSummary) -> String {
    let mut t = table(vec!["Dataset", ""]);
    t.add_row(vec!["File".to_string(), summary.file_name.clone()]);
    t.add_row(vec!["Format".to_string(), summary.source_format.clone()]);
    t.add_row(vec!["Records".to_string(), summary.total_records.to_string()]);
    let range = match (summary.first_order_date, summary.last_order_date) {
        (Some(first), Some(last)) => format!("{first} to {last}"),
        _ => "-".to_string(),
    };
    t.add_row(vec!["Order dates".to_string(), range]);
    t.add_row(vec!["Categories".to_string(), summary.categories.join(", ")]);
    if !summary.extra_columns.is_empty() {
        t.add_row(vec![
            "Extra columns".to_string(),
            summary.extra_columns.join(", "),
        ]);
    }
    t.to_string()
}

pub fn render_report(report: &DashboardReport) -> String {
    let mut sections = Vec::new();

    if let Some(criteria) = &report.criteria {
        let categories: Vec<&str> = criteria.categories().iter().map(String::as_str).collect();
        sections.push(format!(
            "Selection: {} to {} | {}",
            criteria.start(),
            criteria.end(),
            categories.join(", ")
        ));
    }

    if !report.kpis.has_data {
        sections.push("No data for the current selection.".to_string());
    }

    let mut kpis = table(vec![
        "Total Sales",
        "Total Profit",
        "Profit Margin",
        "Avg Order Value",
        "Orders",
    ]);
    kpis.add_row(vec![
        money(report.kpis.total_sales),
        money(report.kpis.total_profit),
        format!("{:.1}%", report.kpis.profit_margin),
        money(report.kpis.avg_order_value),
        report.kpis.total_orders.to_string(),
    ]);
    sections.push(kpis.to_string());

    let mut categories = table(vec!["Category", "Profit"]);
    for row in &report.profit_by_category {
        categories.add_row(vec![row.category.clone(), money(row.profit)]);
    }
    sections.push(categories.to_string());

    let mut discounts = table(vec!["Discount", "Mean Profit", "Mean Sales", "Orders"]);
    for row in &report.discount_impact {
        discounts.add_row(vec![
            format!("{:.0}%", row.discount * 100.0),
            money(row.mean_profit),
            money(row.mean_sales),
            row.orders.to_string(),
        ]);
    }
    sections.push(discounts.to_string());

    let heading = match report.product_ranking.order {
        RankOrder::Top => format!("Top {} Products", report.product_ranking.count),
        RankOrder::Bottom => format!("Bottom {} Products", report.product_ranking.count),
    };
    let mut products = table(vec![heading, "Profit".to_string()]);
    for row in &report.products {
        products.add_row(vec![row.short_name.clone(), money(row.profit)]);
    }
    sections.push(products.to_string());

    let insights = &report.insights;
    let mut lines = vec![format!(
        "Average discount {:.1}%{}",
        insights.average_discount * 100.0,
        if insights.high_discount {
            " (high: review discount strategy)"
        } else {
            ""
        }
    )];
    lines.push(format!(
        "Loss-making orders {:.1}%{}",
        insights.negative_profit_pct,
        if insights.high_negative_profit {
            " (high: review pricing and costs)"
        } else {
            ""
        }
    ));
    if let Some(category) = &insights.most_profitable_category {
        lines.push(format!("Most profitable category: {category}"));
    }
    sections.push(lines.join("\n"));

    sections.push(render_forecast(&report.forecast));
    sections.join("\n\n")
}

fn render_forecast(panel: &ForecastPanel) -> String {
    match panel {
        ForecastPanel::Unavailable { reason } => format!("Forecast unavailable: {reason}"),
        ForecastPanel::Ready(result) => {
            let mut t = table(vec!["Date", "Forecast", "Lower", "Upper"]);
            for point in result.prediction.iter().take(FORECAST_PREVIEW_DAYS) {
                t.add_row(vec![
                    point.date.to_string(),
                    money(point.yhat),
                    money(point.yhat_lower),
                    money(point.yhat_upper),
                ]);
            }
            let since = result
                .last_observed()
                .map(|date| format!(" after {date}"))
                .unwrap_or_default();
            format!(
                "{}-day forecast{since} ({} model, first {} days)\n{t}",
                result.horizon_days,
                result.model,
                FORECAST_PREVIEW_DAYS.min(result.prediction.len())
            )
        }
    }
}
