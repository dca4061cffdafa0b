//! Forecast engine: fits the seasonal ARIMA to a dataset's trend series and
//! keeps the fitted model for as long as that dataset version is current.

use crate::arima::{ArimaOrder, ModelFitError, SeasonalArima, Z_80, Z_95};
use crate::cache::RefreshListener;
use crate::observation::Dataset;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// Point forecasts and prediction intervals for consecutive days.
///
/// Index `i` of every sequence refers to `origin_date + (i + 1)` days.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastResult {
    pub origin_date: NaiveDate,
    pub horizon_days: usize,
    pub mean: Vec<f64>,
    pub lower80: Vec<f64>,
    pub upper80: Vec<f64>,
    pub lower95: Vec<f64>,
    pub upper95: Vec<f64>,
}

impl ForecastResult {
    /// Calendar date of forecast step `index` (0-based).
    pub fn date_at(&self, index: usize) -> NaiveDate {
        self.origin_date + Duration::days(index as i64 + 1)
    }

    /// Point estimate for the final day of the horizon.
    pub fn final_value(&self) -> f64 {
        self.mean[self.horizon_days - 1]
    }
}

/// A seasonal ARIMA fitted to one dataset version.
#[derive(Debug, Clone)]
pub struct FittedModel {
    model: SeasonalArima,
    source_version: Uuid,
    origin_date: NaiveDate,
    fitted_at: DateTime<Utc>,
}

impl FittedModel {
    /// Fits a model to the dataset's trend series.
    pub fn fit(dataset: &Dataset) -> Result<Self, ModelFitError> {
        let model = SeasonalArima::auto_fit(&dataset.trend_series())?;
        Ok(FittedModel {
            model,
            source_version: dataset.source_version(),
            origin_date: dataset.latest_date(),
            fitted_at: Utc::now(),
        })
    }

    pub fn source_version(&self) -> Uuid {
        self.source_version
    }

    pub fn fitted_at(&self) -> DateTime<Utc> {
        self.fitted_at
    }

    /// Last observed date; forecasts start the day after.
    pub fn origin_date(&self) -> NaiveDate {
        self.origin_date
    }

    pub fn order(&self) -> ArimaOrder {
        self.model.order()
    }

    pub fn aic(&self) -> f64 {
        self.model.aic()
    }

    /// Forecasts `horizon_days` days past the origin date.
    ///
    /// # Errors
    /// Returns `ModelFitError::InvalidHorizon` when `horizon_days` is zero.
    pub fn forecast(&self, horizon_days: usize) -> Result<ForecastResult, ModelFitError> {
        if horizon_days == 0 {
            return Err(ModelFitError::InvalidHorizon);
        }

        let mean = self.model.point_forecast(horizon_days);
        let std_errors = self.model.forecast_std_errors(horizon_days);
        let band = |z: f64, sign: f64| -> Vec<f64> {
            mean.iter()
                .zip(&std_errors)
                .map(|(m, se)| m + sign * z * se)
                .collect()
        };

        Ok(ForecastResult {
            origin_date: self.origin_date,
            horizon_days,
            lower80: band(Z_80, -1.0),
            upper80: band(Z_80, 1.0),
            lower95: band(Z_95, -1.0),
            upper95: band(Z_95, 1.0),
            mean,
        })
    }
}

/// Fits a fresh model to `series` and forecasts from `origin_date`.
///
/// Nothing is cached; prefer [`ForecastEngine::forecast`] for dataset-backed
/// requests.
pub fn forecast_series(
    series: &[f64],
    origin_date: NaiveDate,
    horizon_days: usize,
) -> Result<ForecastResult, ModelFitError> {
    if horizon_days == 0 {
        return Err(ModelFitError::InvalidHorizon);
    }
    let model = FittedModel {
        model: SeasonalArima::auto_fit(series)?,
        source_version: Uuid::nil(),
        origin_date,
        fitted_at: Utc::now(),
    };
    model.forecast(horizon_days)
}

/// Holds at most one fitted model, bound to the dataset version it came from.
///
/// Fits are serialized: concurrent requests for the same version wait for
/// the one in progress instead of fitting again. Once a refresh has announced
/// the current dataset version, only models for that version are cached;
/// requests still holding a replaced dataset get an uncached model.
#[derive(Debug, Default)]
pub struct ForecastEngine {
    current: RwLock<Option<Arc<FittedModel>>>,
    /// Latest version announced through [`RefreshListener`]
    announced: RwLock<Option<Uuid>>,
    fit_guard: Mutex<()>,
}

impl ForecastEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the model for `dataset`, fitting it if none is cached for its version.
    pub fn model_for(&self, dataset: &Dataset) -> Result<Arc<FittedModel>, ModelFitError> {
        let version = dataset.source_version();
        if let Some(model) = self.cached(version) {
            return Ok(model);
        }

        let _guard = self.fit_guard.lock();
        if let Some(model) = self.cached(version) {
            return Ok(model);
        }

        let started = Instant::now();
        let model = Arc::new(FittedModel::fit(dataset)?);
        info!(
            order = %model.order(),
            aic = model.aic(),
            observations = dataset.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Fitted trend model"
        );

        let announced = *self.announced.read();
        if announced.map_or(true, |current| current == version) {
            *self.current.write() = Some(Arc::clone(&model));
        } else {
            debug!(%version, "Not caching model for a replaced dataset");
        }
        Ok(model)
    }

    /// Forecasts `horizon_days` past the dataset's latest date.
    pub fn forecast(
        &self,
        dataset: &Dataset,
        horizon_days: usize,
    ) -> Result<ForecastResult, ModelFitError> {
        if horizon_days == 0 {
            return Err(ModelFitError::InvalidHorizon);
        }
        self.model_for(dataset)?.forecast(horizon_days)
    }

    /// Version of the cached model, if any.
    pub fn cached_version(&self) -> Option<Uuid> {
        self.current
            .read()
            .as_ref()
            .map(|model| model.source_version())
    }

    /// Drops the cached model.
    pub fn invalidate(&self) {
        *self.current.write() = None;
    }

    fn cached(&self, version: Uuid) -> Option<Arc<FittedModel>> {
        self.current
            .read()
            .as_ref()
            .filter(|model| model.source_version() == version)
            .map(Arc::clone)
    }
}

impl RefreshListener for ForecastEngine {
    fn dataset_replaced(&self, previous: Option<Uuid>, current: Uuid) {
        *self.announced.write() = Some(current);
        if self.cached_version().is_some_and(|version| version != current) {
            debug!(?previous, %current, "Discarding model fitted on replaced dataset");
            self.invalidate();
        }
    }
}
