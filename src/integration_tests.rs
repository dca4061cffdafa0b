// Integration tests for end-to-end workflows and critical user scenarios

#[cfg(test)]
mod integration_tests {
    use crate::assembler::{TrendAssembler, TrendError};
    use crate::cache::{CacheConfig, DataCache};
    use crate::downloader::{DatasetSource, DownloadError, InMemorySource};
    use crate::engine::ForecastEngine;
    use crate::sampler::build_prediction_table;
    use crate::testing::{date, payload_json, synthetic_points};
    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
    use std::sync::Arc;

    fn days_through(start: NaiveDate, end: NaiveDate) -> usize {
        (end - start).num_days() as usize + 1
    }

    fn fetch_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 2, 8, 0, 0).unwrap()
    }

    /// Source serving daily data from 2015-01-01 through `end`.
    fn source_through(end: NaiveDate) -> Arc<InMemorySource> {
        let start = date(2015, 1, 1);
        let points = synthetic_points(start, days_through(start, end));
        Arc::new(InMemorySource::new(payload_json(&points)))
    }

    fn wire(source: &Arc<InMemorySource>) -> (DataCache, Arc<ForecastEngine>, TrendAssembler) {
        let cache = DataCache::new(
            Arc::clone(source) as Arc<dyn DatasetSource>,
            CacheConfig::default(),
        );
        let engine = Arc::new(ForecastEngine::new());
        cache.add_listener(engine.clone());
        let assembler = TrendAssembler::new(Arc::clone(&engine));
        (cache, engine, assembler)
    }

    /// Test end-to-end workflow: Fetch -> Cache -> Fit -> Predict one date
    #[tokio::test]
    async fn test_predict_end_to_end() {
        let source = source_through(date(2024, 6, 1));
        let (cache, engine, assembler) = wire(&source);

        let dataset = cache.get_dataset_at(fetch_time()).await.unwrap();
        assert_eq!(dataset.first_date(), date(2015, 1, 1));
        assert_eq!(dataset.latest_date(), date(2024, 6, 1));

        let prediction = assembler.predict(&dataset, date(2024, 7, 1)).unwrap();
        assert_eq!(prediction.horizon_days, 30);
        assert_eq!(prediction.latest_data_date, date(2024, 6, 1));
        assert_eq!(prediction.predicted_value, prediction.mean[29]);
        assert_eq!(engine.cached_version(), Some(dataset.source_version()));

        let rejected = assembler.predict(&dataset, date(2024, 5, 1));
        assert!(matches!(rejected, Err(TrendError::DateRange { .. })));

        // Within the TTL the same snapshot and model are reused
        let again = cache
            .get_dataset_at(fetch_time() + Duration::hours(1))
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&dataset, &again));
        assert_eq!(source.calls(), 1);
        let window = assembler.assemble(&again, date(2025, 3, 15)).unwrap();
        assert_eq!(window.historical.first().unwrap().date, date(2015, 3, 15));
    }

    /// Test end-to-end workflow: Refresh replaces dataset -> model is refit
    #[tokio::test]
    async fn test_refresh_invalidates_model() {
        let source = source_through(date(2024, 6, 1));
        let (cache, engine, assembler) = wire(&source);

        let first = cache.get_dataset_at(fetch_time()).await.unwrap();
        assembler.predict(&first, date(2024, 6, 10)).unwrap();
        assert_eq!(engine.cached_version(), Some(first.source_version()));

        let start = date(2015, 1, 1);
        let extended = synthetic_points(start, days_through(start, date(2024, 6, 30)));
        source.set_body(payload_json(&extended));

        let second = cache
            .get_dataset_at(fetch_time() + Duration::hours(25))
            .await
            .unwrap();
        assert_ne!(first.source_version(), second.source_version());
        assert_eq!(engine.cached_version(), None);

        let prediction = assembler.predict(&second, date(2024, 7, 10)).unwrap();
        assert_eq!(prediction.latest_data_date, date(2024, 6, 30));
        assert_eq!(prediction.horizon_days, 10);
        assert_eq!(engine.cached_version(), Some(second.source_version()));
    }

    /// Test critical scenario: Upstream outage -> stale data keeps serving predictions
    #[tokio::test]
    async fn test_outage_serves_stale_dataset() {
        let source = source_through(date(2024, 6, 1));
        let (cache, _engine, assembler) = wire(&source);

        let loaded = cache.get_dataset_at(fetch_time()).await.unwrap();
        source.set_failure(DownloadError::NetworkError("connection reset".into()));

        let stale = cache
            .get_dataset_at(fetch_time() + Duration::days(2))
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&loaded, &stale));
        assert!(assembler.predict(&stale, date(2024, 6, 15)).is_ok());

        let expired = cache.get_dataset_at(fetch_time() + Duration::days(8)).await;
        assert!(expired.is_err());
    }

    /// Test end-to-end workflow: Cached dataset -> adaptive prediction table
    #[tokio::test]
    async fn test_prediction_table_end_to_end() {
        let source = source_through(date(2024, 6, 1));
        let (cache, _engine, assembler) = wire(&source);
        let dataset = cache.get_dataset_at(fetch_time()).await.unwrap();

        let today = date(2024, 6, 2);
        let target = date(2025, 6, 2);
        let table = build_prediction_table(&assembler, &dataset, today, target);

        assert!(table.failures.is_empty());
        assert_eq!(table.rows.first().unwrap().date, today);
        assert_eq!(table.rows.last().unwrap().date, target);

        // Rows agree with single-date predictions from the same model
        let row = &table.rows[40];
        let single = assembler.predict(&dataset, row.date).unwrap();
        assert_eq!(row.predicted_value, single.predicted_value);

        let csv = table.to_csv_string().unwrap();
        assert_eq!(csv.lines().count(), table.rows.len() + 1);
    }
}
