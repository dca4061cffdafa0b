//! Stitches the historical series and the forecast into one windowed series.

use crate::arima::ModelFitError;
use crate::engine::{FittedModel, ForecastEngine, ForecastResult};
use crate::observation::{DateRange, Dataset};
use chrono::{Months, NaiveDate};
use serde::Serialize;
use std::sync::Arc;

/// Years of history shown before the prediction date.
pub const HISTORY_YEARS: u32 = 10;

/// Furthest a prediction may reach past the latest observation (about ten years).
pub const MAX_HORIZON_DAYS: usize = 3660;

/// Marks whether a window point was observed or forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PointKind {
    Historical,
    Predicted,
}

/// An observed point in the window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoricalPoint {
    pub date: NaiveDate,
    /// Trend value (ppm)
    pub value: f64,
    /// Raw reading, kept for display
    pub cycle: f64,
    #[serde(rename = "type")]
    pub kind: PointKind,
}

/// A forecast point with its 95% interval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictedPoint {
    pub date: NaiveDate,
    pub value: f64,
    pub lower95: f64,
    pub upper95: f64,
    #[serde(rename = "type")]
    pub kind: PointKind,
}

/// Historical and predicted segments around one prediction date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendWindow {
    pub historical: Vec<HistoricalPoint>,
    pub predicted: Vec<PredictedPoint>,
    pub latest_data_date: NaiveDate,
    pub prediction_date: NaiveDate,
    pub predicted_value: f64,
}

/// Per-day lower and upper bounds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntervalBand {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

/// Answer to a single-date prediction query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub latest_data_date: NaiveDate,
    pub prediction_date: NaiveDate,
    pub horizon_days: usize,
    pub predicted_value: f64,
    pub mean: Vec<f64>,
    pub ci80: IntervalBand,
    pub ci95: IntervalBand,
}

impl Prediction {
    /// 95% bounds for the prediction date itself.
    pub fn final_ci95(&self) -> (f64, f64) {
        let last = self.horizon_days - 1;
        (self.ci95.lower[last], self.ci95.upper[last])
    }
}

/// Errors from assembling a prediction.
#[derive(Debug, Clone, PartialEq)]
pub enum TrendError {
    /// Prediction date is not after the latest observation
    DateRange {
        latest: NaiveDate,
        requested: NaiveDate,
    },
    /// Prediction date is more than `MAX_HORIZON_DAYS` past the latest observation
    HorizonTooLong {
        latest: NaiveDate,
        requested: NaiveDate,
    },
    /// The forecast model could not be fit
    ModelFit(ModelFitError),
}

impl std::fmt::Display for TrendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrendError::DateRange { latest, requested } => write!(
                f,
                "Prediction date {} must be after the latest data date {}",
                requested, latest
            ),
            TrendError::HorizonTooLong { latest, requested } => write!(
                f,
                "Prediction date {} is more than {} days after the latest data date {}",
                requested, MAX_HORIZON_DAYS, latest
            ),
            TrendError::ModelFit(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for TrendError {}

impl From<ModelFitError> for TrendError {
    fn from(err: ModelFitError) -> Self {
        TrendError::ModelFit(err)
    }
}

/// Builds predictions and trend windows on top of the forecast engine.
#[derive(Debug, Clone)]
pub struct TrendAssembler {
    engine: Arc<ForecastEngine>,
}

impl TrendAssembler {
    pub fn new(engine: Arc<ForecastEngine>) -> Self {
        TrendAssembler { engine }
    }

    pub fn engine(&self) -> &Arc<ForecastEngine> {
        &self.engine
    }

    /// Builds the window of up to ten years of history plus the daily forecast
    /// through `prediction_date`.
    ///
    /// # Errors
    /// `TrendError::DateRange` when `prediction_date` is not after the latest
    /// observation; `TrendError::ModelFit` when the model cannot be fit.
    pub fn assemble(
        &self,
        dataset: &Dataset,
        prediction_date: NaiveDate,
    ) -> Result<TrendWindow, TrendError> {
        self.assemble_with_model(dataset, prediction_date)
            .map(|(window, _)| window)
    }

    /// Same as [`TrendAssembler::assemble`], also returning the model the
    /// forecast came from.
    pub fn assemble_with_model(
        &self,
        dataset: &Dataset,
        prediction_date: NaiveDate,
    ) -> Result<(TrendWindow, Arc<FittedModel>), TrendError> {
        let horizon_days = horizon_days(dataset, prediction_date)?;
        let model = self.engine.model_for(dataset)?;
        let forecast = model.forecast(horizon_days)?;
        let latest = forecast.origin_date;

        let history_start = prediction_date
            .checked_sub_months(Months::new(12 * HISTORY_YEARS))
            .unwrap_or(NaiveDate::MIN);
        let historical = dataset
            .points_between(&DateRange::new(history_start, latest))
            .iter()
            .map(|point| HistoricalPoint {
                date: point.date,
                value: point.trend,
                cycle: point.cycle,
                kind: PointKind::Historical,
            })
            .collect();

        let predicted = (0..forecast.horizon_days)
            .map(|i| PredictedPoint {
                date: forecast.date_at(i),
                value: forecast.mean[i],
                lower95: forecast.lower95[i],
                upper95: forecast.upper95[i],
                kind: PointKind::Predicted,
            })
            .collect();

        let window = TrendWindow {
            historical,
            predicted,
            latest_data_date: latest,
            prediction_date,
            predicted_value: forecast.final_value(),
        };
        Ok((window, model))
    }

    /// Single-date prediction without building the historical window.
    pub fn predict(
        &self,
        dataset: &Dataset,
        prediction_date: NaiveDate,
    ) -> Result<Prediction, TrendError> {
        let forecast = self.forecast_through(dataset, prediction_date)?;
        Ok(Prediction {
            latest_data_date: forecast.origin_date,
            prediction_date,
            horizon_days: forecast.horizon_days,
            predicted_value: forecast.final_value(),
            ci80: IntervalBand {
                lower: forecast.lower80,
                upper: forecast.upper80,
            },
            ci95: IntervalBand {
                lower: forecast.lower95,
                upper: forecast.upper95,
            },
            mean: forecast.mean,
        })
    }

    fn forecast_through(
        &self,
        dataset: &Dataset,
        prediction_date: NaiveDate,
    ) -> Result<ForecastResult, TrendError> {
        let horizon_days = horizon_days(dataset, prediction_date)?;
        Ok(self.engine.forecast(dataset, horizon_days)?)
    }
}

/// Days between the latest observation and `prediction_date`.
///
/// # Errors
/// `TrendError::DateRange` unless `prediction_date` is strictly later;
/// `TrendError::HorizonTooLong` beyond [`MAX_HORIZON_DAYS`].
pub fn horizon_days(dataset: &Dataset, prediction_date: NaiveDate) -> Result<usize, TrendError> {
    let latest = dataset.latest_date();
    let days = (prediction_date - latest).num_days();
    if days <= 0 {
        return Err(TrendError::DateRange {
            latest,
            requested: prediction_date,
        });
    }
    if days as usize > MAX_HORIZON_DAYS {
        return Err(TrendError::HorizonTooLong {
            latest,
            requested: prediction_date,
        });
    }
    Ok(days as usize)
}
