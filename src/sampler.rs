//! Adaptive date grid for the prediction table.
//!
//! Near-term dates are sampled densely and long-range dates sparsely:
//! daily for the first month, weekly until about six months out, then
//! monthly up to the target date.

use crate::assembler::TrendAssembler;
use crate::observation::Dataset;
use chrono::{Duration, Months, NaiveDate};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeSet;
use std::io;

/// Last offset (days from today) sampled every day.
pub const DAILY_UNTIL_DAYS: i64 = 30;
/// Last offset (days from today) sampled every week.
pub const WEEKLY_UNTIL_DAYS: i64 = 180;
const WEEK_DAYS: i64 = 7;

/// Builds the sampling grid between `today` and `target`, both included.
///
/// The result is sorted and free of duplicates. It is empty when `target`
/// precedes `today`.
pub fn sample_dates(today: NaiveDate, target: NaiveDate) -> Vec<NaiveDate> {
    if target < today {
        return Vec::new();
    }

    let mut dates = BTreeSet::new();

    let daily_end = target.min(today + Duration::days(DAILY_UNTIL_DAYS));
    let mut day = today;
    while day <= daily_end {
        dates.insert(day);
        day += Duration::days(1);
    }

    let weekly_end = target.min(today + Duration::days(WEEKLY_UNTIL_DAYS));
    let mut day = today + Duration::days(DAILY_UNTIL_DAYS + 1);
    while day <= weekly_end {
        dates.insert(day);
        day += Duration::days(WEEK_DAYS);
    }

    // Offsets are taken from the anchor so month-end clamping never drifts.
    let monthly_anchor = today + Duration::days(WEEKLY_UNTIL_DAYS + 1);
    for months in 0u32.. {
        match monthly_anchor.checked_add_months(Months::new(months)) {
            Some(day) if day <= target => {
                dates.insert(day);
            }
            _ => break,
        }
    }

    dates.insert(target);
    dates.into_iter().collect()
}

/// One successfully predicted row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRow {
    pub date: NaiveDate,
    pub predicted_value: f64,
    pub lower95: f64,
    pub upper95: f64,
}

/// A sampled date whose prediction failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedDate {
    pub date: NaiveDate,
    pub reason: String,
}

/// Predictions over the adaptive grid; failed dates are listed separately.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionTable {
    pub today: NaiveDate,
    pub target: NaiveDate,
    pub rows: Vec<PredictionRow>,
    pub failures: Vec<FailedDate>,
}

impl PredictionTable {
    /// Writes the rows as CSV with a header line.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut writer = csv::Writer::from_writer(writer);
        if self.rows.is_empty() {
            writer.write_record(["date", "predicted_value", "lower95", "upper95"])?;
        }
        for row in &self.rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> Result<String, csv::Error> {
        let mut buffer = Vec::new();
        self.write_csv(&mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// Predicts every sampled date, tolerating per-date failures.
///
/// Dates are predicted in parallel against the same dataset snapshot, so
/// they all share one fitted model.
pub fn build_prediction_table(
    assembler: &TrendAssembler,
    dataset: &Dataset,
    today: NaiveDate,
    target: NaiveDate,
) -> PredictionTable {
    let dates = sample_dates(today, target);

    let outcomes: Vec<_> = dates
        .par_iter()
        .map(|&date| (date, assembler.predict(dataset, date)))
        .collect();

    let mut rows = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();
    for (date, outcome) in outcomes {
        match outcome {
            Ok(prediction) => {
                let (lower95, upper95) = prediction.final_ci95();
                rows.push(PredictionRow {
                    date,
                    predicted_value: prediction.predicted_value,
                    lower95,
                    upper95,
                });
            }
            Err(err) => {
                log::debug!("Skipping {} in prediction table: {}", date, err);
                failures.push(FailedDate {
                    date,
                    reason: err.to_string(),
                });
            }
        }
    }

    if !failures.is_empty() {
        log::warn!(
            "Prediction table {}..{}: {} of {} dates failed",
            today,
            target,
            failures.len(),
            dates.len()
        );
    }

    PredictionTable {
        today,
        target,
        rows,
        failures,
    }
}
