use chrono::{Datelike, Duration, NaiveDate, TimeZone, Utc};
use co2_forecast::{
    build_prediction_table, decode_dataset, sample_dates, CacheConfig, DataCache, DatasetSource,
    ForecastEngine, InMemorySource, ModelFitError, TrendAssembler, TrendError,
};
use serde_json::json;
use std::sync::Arc;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// Upstream-shaped payload with numeric date columns and a rising trend.
fn payload(start: NaiveDate, end: NaiveDate) -> String {
    let days = (end - start).num_days() + 1;
    let dates: Vec<NaiveDate> = (0..days).map(|i| start + Duration::days(i)).collect();
    let trend: Vec<f64> = (0..days)
        .map(|i| {
            let t = i as f64;
            405.0 + 0.0065 * t + 0.2 * (t / 60.0).sin() + 0.05 * (t * 1.7).sin() * (t * 0.31).cos()
        })
        .collect();
    let cycle: Vec<f64> = trend
        .iter()
        .enumerate()
        .map(|(i, value)| value + 3.0 * (i as f64 * 2.0 * std::f64::consts::PI / 365.25).sin())
        .collect();

    json!({
        "co2": {
            "year": dates.iter().map(|d| d.year()).collect::<Vec<_>>(),
            "month": dates.iter().map(|d| d.month()).collect::<Vec<_>>(),
            "day": dates.iter().map(|d| d.day()).collect::<Vec<_>>(),
            "cycle": cycle,
            "trend": trend,
        }
    })
    .to_string()
}

#[tokio::test]
async fn pipeline_predicts_from_cached_dataset() {
    init_logging();
    let source = Arc::new(InMemorySource::new(payload(date(2019, 1, 1), date(2023, 12, 31))));
    let cache = DataCache::new(source.clone() as Arc<dyn DatasetSource>, CacheConfig::default());
    let engine = Arc::new(ForecastEngine::new());
    cache.add_listener(engine.clone());
    let assembler = TrendAssembler::new(engine);

    let dataset = cache.get_dataset().await.unwrap();
    assert_eq!(dataset.latest_date(), date(2023, 12, 31));

    let window = assembler.assemble(&dataset, date(2024, 3, 31)).unwrap();
    assert_eq!(window.predicted.len(), 91);
    assert_eq!(window.historical.first().unwrap().date, date(2019, 1, 1));
    assert!(window
        .predicted
        .iter()
        .all(|p| p.lower95 <= p.value && p.value <= p.upper95));

    // A quarter ahead stays close to the last observed level
    let last_observed = window.historical.last().unwrap().value;
    assert!((window.predicted_value - last_observed).abs() < 5.0);
}

#[tokio::test]
async fn pipeline_builds_adaptive_table() {
    init_logging();
    let source = Arc::new(InMemorySource::new(payload(date(2019, 1, 1), date(2023, 12, 31))));
    let cache = DataCache::new(source as Arc<dyn DatasetSource>, CacheConfig::default());
    let assembler = TrendAssembler::new(Arc::new(ForecastEngine::new()));
    let dataset = cache.get_dataset().await.unwrap();

    let today = date(2024, 1, 1);
    let target = date(2025, 6, 15);
    let table = build_prediction_table(&assembler, &dataset, today, target);

    assert!(table.failures.is_empty());
    let dates: Vec<NaiveDate> = table.rows.iter().map(|row| row.date).collect();
    assert_eq!(dates, sample_dates(today, target));
    assert!(dates.contains(&date(2024, 1, 31)));
    assert!(dates.contains(&date(2024, 2, 1)));
    assert_eq!(dates.last(), Some(&target));
}

#[test]
fn short_history_is_a_model_error() {
    let fetched_at = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    let dataset = decode_dataset(&payload(date(2023, 1, 1), date(2023, 12, 31)), fetched_at).unwrap();
    let assembler = TrendAssembler::new(Arc::new(ForecastEngine::new()));

    let result = assembler.predict(&dataset, date(2024, 2, 1));
    assert_eq!(
        result.unwrap_err(),
        TrendError::ModelFit(ModelFitError::InsufficientData {
            required: 731,
            actual: 365,
        })
    );
}
