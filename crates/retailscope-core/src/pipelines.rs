use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::aggregates::{
    daily_sales, discount_impact, profit_by_category, rank_products, CategoryProfit, DailySales,
    DiscountImpact, ProductProfit, ProductRanking, RankOrder,
};
use crate::config::{DashboardConfig, ForecastConfig};
use crate::error::{PipelineError, Result};
use crate::export::{export_csv, export_file_name};
use crate::filters::FilterCriteria;
use crate::forecast::{
    forecast_sales, AdditiveForecaster, CancelFlag, ForecastHorizon, ForecastResult, Forecaster,
    UnavailableForecaster,
};
use crate::ingestion::LoadedDataset;
use crate::insights::{business_insights, BusinessInsights};
use crate::kpis::{calculate_kpis, KpiSummary};
use crate::types::{Dataset, DatasetSummary, DatasetView};

const FORECAST_NOT_RUN: &str = "forecast has not run";
const NO_SALES_IN_RANGE: &str = "no sales in the selected range";

/// One uploaded dataset and the facts about where it came from.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: Uuid,
    pub dataset: Arc<Dataset>,
    pub summary: DatasetSummary,
}

impl SessionContext {
    pub fn new(loaded: LoadedDataset) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            dataset: Arc::new(loaded.dataset),
            summary: loaded.summary,
        }
    }
}

/// What the caller wants to look at. Every field is optional; omitted filters select
/// the whole dataset and omitted knobs fall back to configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisRequest {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub categories: Option<Vec<String>>,
    pub horizon_days: Option<u32>,
    pub product_order: Option<RankOrder>,
    pub product_count: Option<usize>,
}

impl AnalysisRequest {
    /// Fills missing bounds from the dataset's order-date range.
    ///
    /// Returns `None` only when the dataset is empty and no bounds were given.
    pub fn resolve(&self, dataset: &Dataset) -> Result<Option<FilterCriteria>> {
        let range = dataset.order_date_range();
        let start = self.start.or(range.map(|(first, _)| first));
        let end = self.end.or(range.map(|(_, last)| last));
        let (Some(start), Some(end)) = (start, end) else {
            return Ok(None);
        };

        let criteria = match &self.categories {
            Some(categories) => FilterCriteria::new(start, end, categories.iter().cloned())?,
            None => FilterCriteria::new(start, end, dataset.categories().iter().cloned())?,
        };
        criteria.validate_against(dataset)?;
        Ok(Some(criteria))
    }

    pub fn horizon(&self, config: &ForecastConfig) -> Result<ForecastHorizon> {
        ForecastHorizon::new(self.horizon_days.unwrap_or(config.default_horizon_days))
    }

    pub fn ranking(&self, config: &DashboardConfig) -> Result<ProductRanking> {
        let count = self.product_count.unwrap_or(config.products.default_count);
        if count == 0 {
            return Err(PipelineError::InvalidRequest(
                "product count must be at least 1".to_string(),
            ));
        }
        Ok(ProductRanking {
            order: self.product_order.unwrap_or(RankOrder::Top),
            count,
        })
    }
}

/// The forecast section of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ForecastPanel {
    Ready(ForecastResult),
    Unavailable { reason: String },
}

impl ForecastPanel {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        ForecastPanel::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ForecastPanel::Ready(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardReport {
    pub criteria: Option<FilterCriteria>,
    pub kpis: KpiSummary,
    pub profit_by_category: Vec<CategoryProfit>,
    pub discount_impact: Vec<DiscountImpact>,
    pub product_ranking: ProductRanking,
    pub products: Vec<ProductProfit>,
    pub daily_sales: Vec<DailySales>,
    pub insights: BusinessInsights,
    pub forecast: ForecastPanel,
}

impl DashboardReport {
    pub fn with_forecast(mut self, forecast: ForecastPanel) -> Self {
        self.forecast = forecast;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ExportFile {
    pub file_name: String,
    pub contents: Vec<u8>,
}

fn select<'a>(dataset: &'a Dataset, criteria: Option<&FilterCriteria>) -> DatasetView<'a> {
    match criteria {
        Some(criteria) => dataset.filter(criteria),
        None => dataset.view(),
    }
}

/// Everything on the dashboard except the forecast, which is left as not-run.
///
/// An empty selection is not an error: the report carries zeroed KPIs and empty tables.
pub fn build_report(
    ctx: &SessionContext,
    request: &AnalysisRequest,
    config: &DashboardConfig,
) -> Result<DashboardReport> {
    let criteria = request.resolve(&ctx.dataset)?;
    request.horizon(&config.forecast)?;
    let ranking = request.ranking(config)?;

    let view = select(&ctx.dataset, criteria.as_ref());
    debug!(
        session = %ctx.session_id,
        selected = view.len(),
        total = ctx.dataset.len(),
        "building report"
    );

    Ok(DashboardReport {
        kpis: calculate_kpis(&view),
        profit_by_category: profit_by_category(&view),
        discount_impact: discount_impact(&view),
        products: rank_products(&view, ranking, config.products.max_name_chars),
        product_ranking: ranking,
        daily_sales: daily_sales(&view),
        insights: business_insights(&view),
        forecast: ForecastPanel::unavailable(FORECAST_NOT_RUN),
        criteria,
    })
}

/// Forecasts the selected sales; every failure degrades to an unavailable panel.
pub fn run_forecast(
    ctx: &SessionContext,
    request: &AnalysisRequest,
    config: &DashboardConfig,
    forecaster: &dyn Forecaster,
    cancel: &CancelFlag,
) -> ForecastPanel {
    try_forecast(ctx, request, config, forecaster, cancel).unwrap_or_else(|err| {
        warn!(session = %ctx.session_id, error = %err, "forecast unavailable");
        ForecastPanel::unavailable(err.to_string())
    })
}

fn try_forecast(
    ctx: &SessionContext,
    request: &AnalysisRequest,
    config: &DashboardConfig,
    forecaster: &dyn Forecaster,
    cancel: &CancelFlag,
) -> Result<ForecastPanel> {
    let horizon = request.horizon(&config.forecast)?;
    let criteria = request.resolve(&ctx.dataset)?;
    let view = select(&ctx.dataset, criteria.as_ref());
    if view.is_empty() {
        return Ok(ForecastPanel::unavailable(NO_SALES_IN_RANGE));
    }

    let result = forecast_sales(
        &view,
        horizon,
        &config.forecast.seasonality,
        forecaster,
        cancel,
    )?;
    Ok(ForecastPanel::Ready(result))
}

/// Report plus forecast in one synchronous call.
pub fn build_full_report(
    ctx: &SessionContext,
    request: &AnalysisRequest,
    config: &DashboardConfig,
    forecaster: &dyn Forecaster,
    cancel: &CancelFlag,
) -> Result<DashboardReport> {
    let report = build_report(ctx, request, config)?;
    let forecast = run_forecast(ctx, request, config, forecaster, cancel);
    Ok(report.with_forecast(forecast))
}

/// The configured forecaster: the built-in model, or a stand-in when disabled.
pub fn configured_forecaster(config: &ForecastConfig) -> Arc<dyn Forecaster> {
    if config.enabled {
        Arc::new(AdditiveForecaster::default())
    } else {
        Arc::new(UnavailableForecaster::new("disabled in configuration"))
    }
}

pub fn export_selection(ctx: &SessionContext, request: &AnalysisRequest) -> Result<ExportFile> {
    let criteria = request.resolve(&ctx.dataset)?;
    let view = select(&ctx.dataset, criteria.as_ref());
    let file_name = match &criteria {
        Some(criteria) => export_file_name(criteria),
        None => "retail_data.csv".to_string(),
    };

    Ok(ExportFile {
        file_name,
        contents: export_csv(&view)?,
    })
}
