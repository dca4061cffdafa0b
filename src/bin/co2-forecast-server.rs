//! CO2 Forecast API Server Binary
//!
//! Run with: `cargo run --bin co2-forecast-server`

use chrono::Duration;
use co2_forecast::{run_server, ServerConfig};

fn env_hours(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<i64>().ok())
        .filter(|hours| *hours > 0)
        .map(Duration::hours)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Note: Tracing is initialized in run_server()
    // Set RUST_LOG environment variable to control log level:
    //   RUST_LOG=debug cargo run --bin co2-forecast-server
    //   RUST_LOG=co2_forecast::cache=debug cargo run --bin co2-forecast-server  (cache only)

    // Create configuration from environment variables or defaults
    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse::<u16>()
        .unwrap_or(3000);

    let mut config = ServerConfig::new(host, port);
    if let Ok(url) = std::env::var("CO2_API_URL") {
        config.downloader.url = url;
    }
    config.downloader.api_key = std::env::var("CO2_API_KEY").ok();
    config.downloader.api_host = std::env::var("CO2_API_HOST").ok();
    if let Some(ttl) = env_hours("CACHE_TTL_HOURS") {
        config.cache.ttl = ttl;
    }
    if let Some(max_staleness) = env_hours("MAX_STALENESS_HOURS") {
        config.cache.max_staleness = max_staleness;
    }

    println!("🚀 Starting CO2 Forecast API Server...");
    println!("   Host: {}", config.host);
    println!("   Port: {}", config.port);
    println!("   Upstream: {}", config.downloader.url);
    println!("   Cache TTL: {}h", config.cache.ttl.num_hours());
    println!();
    println!(
        "Server will be available at: http://{}:{}",
        config.host, config.port
    );
    println!();
    println!("Available endpoints:");
    println!("  GET  /health                                  - Health check");
    println!("  GET  /co2                                     - Current dataset");
    println!("  GET  /predict?date=YYYY-MM-DD                 - Single-date prediction");
    println!("  GET  /trend?date=YYYY-MM-DD                   - History plus forecast");
    println!("  GET  /prediction-table?target=YYYY-MM-DD      - Adaptive prediction table");
    println!("  GET  /prediction-table.csv?target=YYYY-MM-DD  - Table as CSV");
    println!();

    // Run server
    run_server(config).await?;

    Ok(())
}
