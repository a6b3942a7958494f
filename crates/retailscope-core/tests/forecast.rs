mod common;

use anyhow::Result;
use chrono::Duration;
use common::{date, dataset, month_of_orders, RowBuilder};
use retailscope_core::aggregates::DailySales;
use retailscope_core::error::PipelineError;
use retailscope_core::forecast::{
    forecast_history, forecast_sales, AdditiveForecaster, CancelFlag, ForecastError,
    ForecastHorizon, ForecastPoint, ForecastRequest, Forecaster, SeasonalityConfig,
    UnavailableForecaster,
};

/// Predicts the last observed value forever, with a band of +/- 5.
struct LastValueForecaster;

impl Forecaster for LastValueForecaster {
    fn name(&self) -> &'static str {
        "last-value"
    }

    fn forecast(&self, request: &ForecastRequest<'_>) -> Result<Vec<ForecastPoint>, ForecastError> {
        let last = request.history.last().expect("non-empty history");
        let point = |date, value: f64| ForecastPoint {
            date,
            yhat: value,
            yhat_lower: value - 5.0,
            yhat_upper: value + 5.0,
            trend: value,
            weekly: 0.0,
            yearly: 0.0,
        };

        let mut points: Vec<ForecastPoint> =
            request.history.iter().map(|d| point(d.date, d.sales)).collect();
        for step in 1..=request.horizon.days() as i64 {
            points.push(point(last.date + Duration::days(step), last.sales));
        }
        Ok(points)
    }
}

/// Returns one future day too few.
struct ShortForecaster;

impl Forecaster for ShortForecaster {
    fn name(&self) -> &'static str {
        "short"
    }

    fn forecast(&self, request: &ForecastRequest<'_>) -> Result<Vec<ForecastPoint>, ForecastError> {
        let mut points = LastValueForecaster.forecast(request)?;
        points.pop();
        Ok(points)
    }
}

fn three_days() -> Vec<DailySales> {
    vec![
        DailySales { date: date("2023-01-01"), sales: 100.0 },
        DailySales { date: date("2023-01-02"), sales: 150.0 },
        DailySales { date: date("2023-01-03"), sales: 120.0 },
    ]
}

#[test]
fn three_day_history_with_thirty_day_horizon() -> Result<()> {
    let data = dataset(vec![
        RowBuilder::new("2023-01-01", "Furniture").sales(60.0).build(),
        RowBuilder::new("2023-01-01", "Technology").sales(40.0).build(),
        RowBuilder::new("2023-01-02", "Furniture").sales(150.0).build(),
        RowBuilder::new("2023-01-03", "Furniture").sales(120.0).build(),
    ]);

    let result = forecast_sales(
        &data.view(),
        ForecastHorizon::new(30)?,
        &SeasonalityConfig::default(),
        &LastValueForecaster,
        &CancelFlag::new(),
    )?;

    assert_eq!(result.history, three_days());
    assert_eq!(result.fitted.len(), 3);
    assert_eq!(result.prediction.len(), 30);
    assert_eq!(result.prediction[0].date, date("2023-01-04"));
    assert_eq!(result.prediction[29].date, date("2023-02-02"));
    assert!(result
        .prediction
        .iter()
        .all(|p| p.yhat_lower <= p.yhat && p.yhat <= p.yhat_upper));
    Ok(())
}

#[test]
fn additive_model_satisfies_the_same_contract() -> Result<()> {
    let result = forecast_history(
        three_days(),
        ForecastHorizon::new(30)?,
        &SeasonalityConfig::default(),
        &AdditiveForecaster::default(),
        &CancelFlag::new(),
    )?;

    assert_eq!(result.model, "additive");
    assert_eq!(result.fitted.len(), 3);
    assert_eq!(result.prediction.len(), 30);
    for (step, point) in result.prediction.iter().enumerate() {
        assert_eq!(point.date, date("2023-01-03") + Duration::days(step as i64 + 1));
        assert!(point.yhat.is_finite());
        assert!(point.yhat_lower <= point.yhat && point.yhat <= point.yhat_upper);
    }
    Ok(())
}

#[test]
fn additive_model_on_a_month_of_orders() -> Result<()> {
    let data = month_of_orders();
    let horizon = ForecastHorizon::default();
    let result = forecast_sales(
        &data.view(),
        horizon,
        &SeasonalityConfig::default(),
        &AdditiveForecaster::default(),
        &CancelFlag::new(),
    )?;

    assert_eq!(result.history.len(), 30);
    assert_eq!(result.prediction.len(), 90);
    let widths: Vec<f64> = result
        .prediction
        .iter()
        .map(|p| p.yhat_upper - p.yhat_lower)
        .collect();
    assert!(widths.windows(2).all(|w| w[1] >= w[0]));
    Ok(())
}

#[test]
fn gaps_in_history_do_not_leak_into_the_prediction() -> Result<()> {
    let history = vec![
        DailySales { date: date("2023-01-01"), sales: 10.0 },
        DailySales { date: date("2023-01-05"), sales: 30.0 },
        DailySales { date: date("2023-01-09"), sales: 20.0 },
    ];
    let result = forecast_history(
        history,
        ForecastHorizon::new(30)?,
        &SeasonalityConfig::default(),
        &LastValueForecaster,
        &CancelFlag::new(),
    )?;

    assert_eq!(result.fitted.len(), 3);
    assert_eq!(result.prediction[0].date, date("2023-01-10"));
    Ok(())
}

#[test]
fn single_day_history_is_unavailable() {
    let err = forecast_history(
        vec![DailySales { date: date("2023-01-01"), sales: 10.0 }],
        ForecastHorizon::default(),
        &SeasonalityConfig::default(),
        &AdditiveForecaster::default(),
        &CancelFlag::new(),
    )
    .unwrap_err();

    assert!(matches!(err, PipelineError::ForecastUnavailable(_)));
}

#[test]
fn empty_history_is_unavailable() {
    let err = forecast_history(
        Vec::new(),
        ForecastHorizon::default(),
        &SeasonalityConfig::default(),
        &LastValueForecaster,
        &CancelFlag::new(),
    )
    .unwrap_err();

    assert!(matches!(err, PipelineError::ForecastUnavailable(_)));
}

#[test]
fn disabled_forecaster_reports_its_reason() {
    let err = forecast_history(
        three_days(),
        ForecastHorizon::default(),
        &SeasonalityConfig::default(),
        &UnavailableForecaster::new("turned off for maintenance"),
        &CancelFlag::new(),
    )
    .unwrap_err();

    assert!(err.to_string().contains("turned off for maintenance"));
}

#[test]
fn wrong_number_of_future_days_is_rejected() {
    let err = forecast_history(
        three_days(),
        ForecastHorizon::new(30).unwrap(),
        &SeasonalityConfig::default(),
        &ShortForecaster,
        &CancelFlag::new(),
    )
    .unwrap_err();

    assert!(matches!(err, PipelineError::ForecastUnavailable(_)));
}

#[test]
fn cancelled_forecast_is_unavailable() {
    let cancel = CancelFlag::new();
    cancel.cancel();
    let err = forecast_history(
        three_days(),
        ForecastHorizon::default(),
        &SeasonalityConfig::default(),
        &AdditiveForecaster::default(),
        &cancel,
    )
    .unwrap_err();

    assert!(err.to_string().contains("cancelled"));
}

#[test]
fn horizon_bounds_are_enforced() {
    assert!(ForecastHorizon::new(29).is_err());
    assert!(ForecastHorizon::new(181).is_err());
    assert_eq!(ForecastHorizon::new(30).unwrap().days(), 30);
    assert_eq!(ForecastHorizon::new(180).unwrap().days(), 180);
    assert_eq!(ForecastHorizon::default().days(), 90);
    assert!(matches!(
        ForecastHorizon::new(7),
        Err(PipelineError::InvalidRequest(_))
    ));
}

#[test]
fn horizon_deserializes_with_validation() {
    let ok: ForecastHorizon = serde_json::from_str("45").unwrap();
    assert_eq!(ok.days(), 45);
    assert!(serde_json::from_str::<ForecastHorizon>("400").is_err());
}
