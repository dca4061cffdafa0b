//! Error types for the REST API server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::arima::ModelFitError;
use crate::assembler::TrendError;
use crate::cache::CacheError;

/// API error types
#[derive(Debug)]
pub enum ApiError {
    /// Malformed or missing query parameter
    InvalidDate(String),
    /// Requested date is not after the latest observation, or too far past it
    DateRange(String),
    /// Upstream data source unavailable
    Network(String),
    /// Upstream payload was not valid JSON in the expected shape
    Parse(String),
    /// Upstream payload held invalid values
    Validation(String),
    /// The forecast model could not be fit
    ModelFit(String),
    /// Internal server error
    Internal(String),
}

impl ApiError {
    /// Stable error kind reported in the response body.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidDate(_) => "InputError",
            ApiError::DateRange(_) => "DateRangeError",
            ApiError::Network(_) => "NetworkError",
            ApiError::Parse(_) => "ParseError",
            ApiError::Validation(_) => "ValidationError",
            ApiError::ModelFit(_) => "ModelFitError",
            ApiError::Internal(_) => "InternalError",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidDate(_) | ApiError::DateRange(_) => StatusCode::BAD_REQUEST,
            ApiError::Network(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Parse(_) | ApiError::Validation(_) => StatusCode::BAD_GATEWAY,
            ApiError::ModelFit(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &str {
        match self {
            ApiError::InvalidDate(msg)
            | ApiError::DateRange(msg)
            | ApiError::Network(msg)
            | ApiError::Parse(msg)
            | ApiError::Validation(msg)
            | ApiError::ModelFit(msg)
            | ApiError::Internal(msg) => msg,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind(), self.message())
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(kind = self.kind(), "{}", self.message());
        }

        let body = Json(json!({
            "error": self.kind(),
            "message": self.message(),
        }));

        (status, body).into_response()
    }
}

// Conversions from other error types

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Network(e) => ApiError::Network(e.to_string()),
            CacheError::Parse(msg) => ApiError::Parse(msg),
            CacheError::Validation(msg) => ApiError::Validation(msg),
            CacheError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<TrendError> for ApiError {
    fn from(err: TrendError) -> Self {
        match err {
            TrendError::DateRange { .. } | TrendError::HorizonTooLong { .. } => {
                ApiError::DateRange(err.to_string())
            }
            TrendError::ModelFit(e) => e.into(),
        }
    }
}

impl From<ModelFitError> for ApiError {
    fn from(err: ModelFitError) -> Self {
        ApiError::ModelFit(err.to_string())
    }
}

impl From<chrono::ParseError> for ApiError {
    fn from(err: chrono::ParseError) -> Self {
        ApiError::InvalidDate(format!("Date parse error: {}", err))
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("Background task failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::DownloadError;
    use chrono::NaiveDate;

    async fn body_json(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let cases = [
            (ApiError::InvalidDate("x".into()), StatusCode::BAD_REQUEST, "InputError"),
            (ApiError::DateRange("x".into()), StatusCode::BAD_REQUEST, "DateRangeError"),
            (ApiError::Network("x".into()), StatusCode::SERVICE_UNAVAILABLE, "NetworkError"),
            (ApiError::Parse("x".into()), StatusCode::BAD_GATEWAY, "ParseError"),
            (ApiError::Validation("x".into()), StatusCode::BAD_GATEWAY, "ValidationError"),
            (ApiError::ModelFit("x".into()), StatusCode::INTERNAL_SERVER_ERROR, "ModelFitError"),
            (ApiError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR, "InternalError"),
        ];

        for (err, status, kind) in cases {
            let (actual_status, body) = body_json(err).await;
            assert_eq!(actual_status, status);
            assert_eq!(body["error"], kind);
            assert_eq!(body["message"], "x");
        }
    }

    #[test]
    fn test_cache_error_conversion() {
        let err: ApiError =
            CacheError::Network(DownloadError::NetworkError("timed out".into())).into();
        assert!(matches!(err, ApiError::Network(_)));

        let err: ApiError = CacheError::Validation("trend has 2 values".into()).into();
        assert!(matches!(err, ApiError::Validation(msg) if msg == "trend has 2 values"));
    }

    #[test]
    fn test_trend_error_conversion() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let err: ApiError = TrendError::DateRange {
            latest: date,
            requested: date,
        }
        .into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err: ApiError = TrendError::HorizonTooLong {
            latest: date,
            requested: NaiveDate::from_ymd_opt(9999, 12, 31).unwrap(),
        }
        .into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.kind(), "DateRangeError");

        let err: ApiError = TrendError::ModelFit(ModelFitError::Degenerate).into();
        assert_eq!(err.kind(), "ModelFitError");
    }
}
