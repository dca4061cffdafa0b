//! Shared application state for the API server

use crate::assembler::TrendAssembler;
use crate::cache::DataCache;
use crate::engine::ForecastEngine;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Dataset cache; every request reads its snapshot from here
    pub cache: DataCache,
    /// Prediction and trend-window builder over the shared forecast engine
    pub assembler: Arc<TrendAssembler>,
}

impl AppState {
    /// Creates the application state and subscribes the forecast engine to
    /// dataset refreshes, so a replaced dataset drops its fitted model.
    pub fn new(cache: DataCache, engine: Arc<ForecastEngine>) -> Self {
        cache.add_listener(engine.clone());
        AppState {
            cache,
            assembler: Arc::new(TrendAssembler::new(engine)),
        }
    }
}
