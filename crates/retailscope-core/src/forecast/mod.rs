//! Sales forecasting behind an injectable [`Forecaster`] capability.
//!
//! The adapter turns a view into a daily sales series, hands it to whichever
//! forecaster the caller supplies, and splits the answer into the fitted historical
//! span and the future span.

mod additive;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::aggregates::{daily_sales, DailySales};
use crate::error::{PipelineError, Result};
use crate::types::DatasetView;

pub use additive::AdditiveForecaster;

/// Number of future days to predict, always within `[MIN_DAYS, MAX_DAYS]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct ForecastHorizon(u32);

impl ForecastHorizon {
    pub const MIN_DAYS: u32 = 30;
    pub const MAX_DAYS: u32 = 180;
    pub const DEFAULT_DAYS: u32 = 90;

    pub fn new(days: u32) -> Result<Self> {
        if (Self::MIN_DAYS..=Self::MAX_DAYS).contains(&days) {
            Ok(Self(days))
        } else {
            Err(PipelineError::InvalidRequest(format!(
                "forecast horizon must be between {} and {} days, got {days}",
                Self::MIN_DAYS,
                Self::MAX_DAYS
            )))
        }
    }

    pub fn days(&self) -> u32 {
        self.0
    }
}

impl Default for ForecastHorizon {
    fn default() -> Self {
        Self(Self::DEFAULT_DAYS)
    }
}

impl TryFrom<u32> for ForecastHorizon {
    type Error = PipelineError;

    fn try_from(days: u32) -> Result<Self> {
        Self::new(days)
    }
}

impl From<ForecastHorizon> for u32 {
    fn from(horizon: ForecastHorizon) -> Self {
        horizon.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonalityConfig {
    pub yearly: bool,
    pub weekly: bool,
    pub daily: bool,
}

impl Default for SeasonalityConfig {
    fn default() -> Self {
        Self {
            yearly: true,
            weekly: true,
            daily: false,
        }
    }
}

/// Shared flag a long-running forecast polls so a newer request can abandon it.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// True when both handles point at the same flag.
    pub fn same_as(&self, other: &CancelFlag) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

pub struct ForecastRequest<'a> {
    pub history: &'a [DailySales],
    pub horizon: ForecastHorizon,
    pub seasonality: &'a SeasonalityConfig,
    pub cancel: &'a CancelFlag,
}

/// One model output row: point estimate, bounds and additive components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
    pub trend: f64,
    pub weekly: f64,
    pub yearly: f64,
}

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("need at least {required} days of sales history, found {observations}")]
    InsufficientHistory { observations: usize, required: usize },
    #[error("model fit did not converge: {0}")]
    DidNotConverge(String),
    #[error("forecast was cancelled")]
    Cancelled,
    #[error("forecasting is disabled: {0}")]
    Disabled(String),
    #[error("forecaster returned invalid output: {0}")]
    InvalidOutput(String),
}

pub trait Forecaster: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns one point per history date followed by one per future day.
    fn forecast(
        &self,
        request: &ForecastRequest<'_>,
    ) -> std::result::Result<Vec<ForecastPoint>, ForecastError>;
}

/// Stand-in used when forecasting is switched off in configuration.
#[derive(Debug, Clone)]
pub struct UnavailableForecaster {
    reason: String,
}

impl UnavailableForecaster {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Forecaster for UnavailableForecaster {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn forecast(
        &self,
        _request: &ForecastRequest<'_>,
    ) -> std::result::Result<Vec<ForecastPoint>, ForecastError> {
        Err(ForecastError::Disabled(self.reason.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub model: String,
    pub horizon_days: u32,
    pub history: Vec<DailySales>,
    pub fitted: Vec<ForecastPoint>,
    pub prediction: Vec<ForecastPoint>,
}

impl ForecastResult {
    pub fn last_observed(&self) -> Option<NaiveDate> {
        self.history.last().map(|day| day.date)
    }
}

/// Forecasts the view's daily sales.
pub fn forecast_sales(
    view: &DatasetView<'_>,
    horizon: ForecastHorizon,
    seasonality: &SeasonalityConfig,
    forecaster: &dyn Forecaster,
    cancel: &CancelFlag,
) -> Result<ForecastResult> {
    forecast_history(daily_sales(view), horizon, seasonality, forecaster, cancel)
}

/// Forecasts an already-aggregated daily series (ascending dates, gaps allowed).
pub fn forecast_history(
    history: Vec<DailySales>,
    horizon: ForecastHorizon,
    seasonality: &SeasonalityConfig,
    forecaster: &dyn Forecaster,
    cancel: &CancelFlag,
) -> Result<ForecastResult> {
    let Some(last_observed) = history.last().map(|day| day.date) else {
        return Err(PipelineError::ForecastUnavailable(
            "no sales in the selected range".to_string(),
        ));
    };

    let request = ForecastRequest {
        history: &history,
        horizon,
        seasonality,
        cancel,
    };

    let points = forecaster.forecast(&request).map_err(|err| {
        warn!(model = forecaster.name(), error = %err, "forecast failed");
        PipelineError::ForecastUnavailable(err.to_string())
    })?;

    let (fitted, prediction): (Vec<ForecastPoint>, Vec<ForecastPoint>) = points
        .into_iter()
        .partition(|point| point.date <= last_observed);

    check_prediction(&prediction, last_observed, horizon)
        .map_err(|err| PipelineError::ForecastUnavailable(err.to_string()))?;

    debug!(
        model = forecaster.name(),
        history_days = history.len(),
        horizon = horizon.days(),
        "forecast complete"
    );

    Ok(ForecastResult {
        model: forecaster.name().to_string(),
        horizon_days: horizon.days(),
        history,
        fitted,
        prediction,
    })
}

fn check_prediction(
    prediction: &[ForecastPoint],
    last_observed: NaiveDate,
    horizon: ForecastHorizon,
) -> std::result::Result<(), ForecastError> {
    if prediction.len() != horizon.days() as usize {
        return Err(ForecastError::InvalidOutput(format!(
            "expected {} future days, got {}",
            horizon.days(),
            prediction.len()
        )));
    }

    for (step, point) in prediction.iter().enumerate() {
        let expected = last_observed + Duration::days(step as i64 + 1);
        if point.date != expected {
            return Err(ForecastError::InvalidOutput(format!(
                "future date {} out of sequence, expected {expected}",
                point.date
            )));
        }
        let finite = point.yhat.is_finite()
            && point.yhat_lower.is_finite()
            && point.yhat_upper.is_finite();
        if !finite || point.yhat_lower > point.yhat || point.yhat > point.yhat_upper {
            return Err(ForecastError::InvalidOutput(format!(
                "bounds on {} are not ordered",
                point.date
            )));
        }
    }

    Ok(())
}
