//! Route definitions for the API server

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::state::AppState;

/// Creates the main application router with all routes and middleware
pub fn create_router(state: Arc<AppState>) -> Router {
    // Read-only API, any origin may call it
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        // Current dataset
        .route("/co2", get(handlers::get_current))
        // Forecasts
        .route("/predict", get(handlers::predict))
        .route("/trend", get(handlers::trend))
        .route("/prediction-table", get(handlers::prediction_table))
        .route("/prediction-table.csv", get(handlers::prediction_table_csv))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
