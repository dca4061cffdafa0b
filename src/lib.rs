pub mod observation;
pub mod payload;
pub mod downloader;
pub mod cache;
pub mod arima;
pub mod engine;
pub mod assembler;
pub mod sampler;
pub mod server;

#[cfg(test)]
mod testing;

#[cfg(test)]
mod integration_tests;

pub use observation::{ObservationPoint, DateRange, Dataset, DatasetError};
pub use payload::{decode_dataset, decode_points, PayloadError};
pub use downloader::{Co2Downloader, DownloaderConfig, DownloadError, DatasetSource, InMemorySource};
pub use cache::{DataCache, CacheConfig, CacheError, TtlEntry, RefreshListener};
pub use arima::{SeasonalArima, ArimaOrder, ModelFitError};
pub use engine::{ForecastEngine, ForecastResult, FittedModel, forecast_series};
pub use assembler::{TrendAssembler, TrendWindow, Prediction, TrendError, PointKind};
pub use sampler::{sample_dates, build_prediction_table, PredictionTable, PredictionRow, FailedDate};
pub use server::{run_server, ServerConfig, AppState, ApiError};
