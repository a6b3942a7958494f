use std::f64::consts::PI;

use chrono::{Duration, NaiveDate};
use nalgebra::{DMatrix, DVector};
use tracing::debug;

use super::{ForecastError, ForecastPoint, ForecastRequest, Forecaster};

const YEARLY_PERIOD_DAYS: f64 = 365.25;
const WEEKLY_PERIOD_DAYS: f64 = 7.0;
/// z-score of the 90th percentile; brackets an 80% interval.
const Z_80: f64 = 1.281_551_565_544_600_4;
const MIN_OBSERVATIONS: usize = 2;
const CANCEL_CHECK_EVERY: usize = 64;

/// Additive trend plus Fourier seasonality fitted by penalised least squares.
///
/// The series is scaled by its largest absolute value and time by the history span,
/// so the ridge penalties act like priors on unit-scale coefficients.
#[derive(Debug, Clone)]
pub struct AdditiveForecaster {
    pub yearly_order: usize,
    pub weekly_order: usize,
    pub trend_penalty: f64,
    pub seasonality_penalty: f64,
}

impl Default for AdditiveForecaster {
    fn default() -> Self {
        Self {
            yearly_order: 10,
            weekly_order: 3,
            trend_penalty: 0.04,
            seasonality_penalty: 0.01,
        }
    }
}

/// Column layout of the design matrix for one fit.
struct Layout {
    origin: NaiveDate,
    span_days: f64,
    yearly_order: usize,
    weekly_order: usize,
}

impl Layout {
    fn width(&self) -> usize {
        2 + 2 * self.yearly_order + 2 * self.weekly_order
    }

    fn yearly_range(&self) -> std::ops::Range<usize> {
        2..2 + 2 * self.yearly_order
    }

    fn weekly_range(&self) -> std::ops::Range<usize> {
        let start = 2 + 2 * self.yearly_order;
        start..start + 2 * self.weekly_order
    }

    fn features(&self, date: NaiveDate) -> Vec<f64> {
        let mut row = Vec::with_capacity(self.width());
        row.push(1.0);
        row.push((date - self.origin).num_days() as f64 / self.span_days);

        // Seasonal phase is anchored to the calendar, not to the first observation.
        let epoch_days = days_since_epoch(date);
        push_fourier(&mut row, epoch_days, YEARLY_PERIOD_DAYS, self.yearly_order);
        push_fourier(&mut row, epoch_days, WEEKLY_PERIOD_DAYS, self.weekly_order);
        row
    }
}

fn push_fourier(row: &mut Vec<f64>, t: f64, period: f64, order: usize) {
    for k in 1..=order {
        let angle = 2.0 * PI * k as f64 * t / period;
        row.push(angle.sin());
        row.push(angle.cos());
    }
}

fn days_since_epoch(date: NaiveDate) -> f64 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    (date - epoch).num_days() as f64
}

impl Forecaster for AdditiveForecaster {
    fn name(&self) -> &'static str {
        "additive"
    }

    fn forecast(
        &self,
        request: &ForecastRequest<'_>,
    ) -> Result<Vec<ForecastPoint>, ForecastError> {
        let history = request.history;
        let n = history.len();
        if n < MIN_OBSERVATIONS {
            return Err(ForecastError::InsufficientHistory {
                observations: n,
                required: MIN_OBSERVATIONS,
            });
        }
        if request.seasonality.daily {
            debug!("daily seasonality requested on a daily series; ignoring");
        }

        let origin = history[0].date;
        let last = history[n - 1].date;
        let layout = Layout {
            origin,
            span_days: ((last - origin).num_days() as f64).max(1.0),
            yearly_order: if request.seasonality.yearly { self.yearly_order } else { 0 },
            weekly_order: if request.seasonality.weekly { self.weekly_order } else { 0 },
        };
        let width = layout.width();

        let scale = history
            .iter()
            .map(|day| day.sales.abs())
            .fold(0.0_f64, f64::max);
        let scale = if scale > 0.0 { scale } else { 1.0 };

        let mut design = DMatrix::<f64>::zeros(n, width);
        for (i, day) in history.iter().enumerate() {
            if i % CANCEL_CHECK_EVERY == 0 && request.cancel.is_cancelled() {
                return Err(ForecastError::Cancelled);
            }
            for (j, value) in layout.features(day.date).into_iter().enumerate() {
                design[(i, j)] = value;
            }
        }
        let target = DVector::from_iterator(n, history.iter().map(|day| day.sales / scale));

        let mut penalty = DVector::<f64>::from_element(width, self.seasonality_penalty);
        penalty[0] = 1e-6;
        penalty[1] = self.trend_penalty;

        let normal = design.transpose() * &design + DMatrix::from_diagonal(&penalty);
        let rhs = design.transpose() * &target;
        let beta = normal
            .cholesky()
            .ok_or_else(|| {
                ForecastError::DidNotConverge("normal equations are not positive definite".to_string())
            })?
            .solve(&rhs);
        if beta.iter().any(|coef| !coef.is_finite()) {
            return Err(ForecastError::DidNotConverge(
                "coefficients are not finite".to_string(),
            ));
        }

        if request.cancel.is_cancelled() {
            return Err(ForecastError::Cancelled);
        }

        let residuals = &target - &design * &beta;
        let sigma = (residuals.norm_squared() / (n.saturating_sub(1).max(1)) as f64).sqrt() * scale;

        let horizon = request.horizon.days() as i64;
        let dates = history
            .iter()
            .map(|day| day.date)
            .chain((1..=horizon).map(|step| last + Duration::days(step)));

        let mut points = Vec::with_capacity(n + horizon as usize);
        for (idx, date) in dates.enumerate() {
            if idx % CANCEL_CHECK_EVERY == 0 && request.cancel.is_cancelled() {
                return Err(ForecastError::Cancelled);
            }

            let features = layout.features(date);
            let component = |range: std::ops::Range<usize>| -> f64 {
                range.map(|j| features[j] * beta[j]).sum::<f64>() * scale
            };
            let trend = (beta[0] + beta[1] * features[1]) * scale;
            let yearly = component(layout.yearly_range());
            let weekly = component(layout.weekly_range());
            let yhat = trend + yearly + weekly;

            let steps_ahead = (date - last).num_days().max(0) as f64;
            let band = Z_80 * sigma * (1.0 + steps_ahead / n as f64).sqrt();

            points.push(ForecastPoint {
                date,
                yhat,
                yhat_lower: yhat - band,
                yhat_upper: yhat + band,
                trend,
                weekly,
                yearly,
            });
        }

        Ok(points)
    }
}
