use futures::future::BoxFuture;
use parking_lot::Mutex;
use reqwest::Client;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Default upstream endpoint for the daily CO2 series.
pub const DEFAULT_API_URL: &str =
    "https://daily-atmosphere-carbon-dioxide-concentration.p.rapidapi.com/api/co2-api";

/// Configuration for the CO2 downloader
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Endpoint returning the column-oriented CO2 payload
    pub url: String,
    /// Value for the `X-RapidAPI-Key` header, if the provider needs one
    pub api_key: Option<String>,
    /// Value for the `X-RapidAPI-Host` header
    pub api_host: Option<String>,
    /// Request timeout in seconds (default: 10)
    pub timeout_seconds: u64,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        DownloaderConfig {
            url: DEFAULT_API_URL.to_string(),
            api_key: None,
            api_host: None,
            timeout_seconds: 10,
        }
    }
}

/// Trait for the upstream source of the raw payload.
///
/// The cache only needs "give me the current body"; implementations can be
/// the HTTP downloader below or the in-memory source used by tests.
pub trait DatasetSource: Send + Sync {
    /// Fetches the raw response body.
    ///
    /// # Errors
    /// Returns `DownloadError` when the source cannot be reached, times out,
    /// or answers with a non-success status.
    fn fetch(&self) -> BoxFuture<'_, Result<String, DownloadError>>;
}

/// HTTP downloader for the daily CO2 series.
#[derive(Debug)]
pub struct Co2Downloader {
    client: Client,
    config: DownloaderConfig,
}

impl Co2Downloader {
    /// Creates a new downloader with default configuration.
    pub fn new() -> Result<Self, DownloadError> {
        Self::with_config(DownloaderConfig::default())
    }

    /// Creates a new downloader with custom configuration.
    ///
    /// # Returns
    /// Returns `Ok(Co2Downloader)` if successful, or an error if HTTP client creation fails.
    pub fn with_config(config: DownloaderConfig) -> Result<Self, DownloadError> {
        let timeout = Duration::from_secs(config.timeout_seconds);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DownloadError::ClientCreation(e.to_string()))?;

        Ok(Co2Downloader { client, config })
    }

    /// Fetches the full historical payload.
    ///
    /// # Errors
    /// Returns `DownloadError::NetworkError` on connection failure or timeout,
    /// `DownloadError::ApiError` on a non-2xx status.
    pub async fn fetch_payload(&self) -> Result<String, DownloadError> {
        let mut request = self.client.get(&self.config.url);
        if let Some(key) = &self.config.api_key {
            request = request.header("X-RapidAPI-Key", key);
        }
        if let Some(host) = &self.config.api_host {
            request = request.header("X-RapidAPI-Host", host);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DownloadError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::ApiError(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown error")
            )));
        }

        response
            .text()
            .await
            .map_err(|e| DownloadError::NetworkError(e.to_string()))
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }
}

impl DatasetSource for Co2Downloader {
    fn fetch(&self) -> BoxFuture<'_, Result<String, DownloadError>> {
        Box::pin(self.fetch_payload())
    }
}

/// In-memory source for tests and offline runs.
///
/// Serves whatever body (or error) was last set and counts fetches, so
/// callers can assert how often the upstream was actually hit.
#[derive(Debug)]
pub struct InMemorySource {
    response: Mutex<Result<String, DownloadError>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl InMemorySource {
    /// Creates a source that always returns `body`.
    pub fn new(body: impl Into<String>) -> Self {
        InMemorySource {
            response: Mutex::new(Ok(body.into())),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Adds an artificial latency to every fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replaces the body served by subsequent fetches.
    pub fn set_body(&self, body: impl Into<String>) {
        *self.response.lock() = Ok(body.into());
    }

    /// Makes subsequent fetches fail with `error`.
    pub fn set_failure(&self, error: DownloadError) {
        *self.response.lock() = Err(error);
    }

    /// Number of fetches served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DatasetSource for InMemorySource {
    fn fetch(&self) -> BoxFuture<'_, Result<String, DownloadError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.response.lock().clone()
        })
    }
}

/// Errors that can occur while downloading the CO2 payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadError {
    /// HTTP client creation failed
    ClientCreation(String),
    /// Connection failure or timeout
    NetworkError(String),
    /// Upstream answered with a non-success status
    ApiError(String),
}

impl std::fmt::Display for DownloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadError::ClientCreation(msg) => write!(f, "Client creation error: {}", msg),
            DownloadError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            DownloadError::ApiError(msg) => write!(f, "API error: {}", msg),
        }
    }
}

impl std::error::Error for DownloadError {}
