#![allow(dead_code)]

use crate::observation::{Dataset, ObservationPoint};
use chrono::{Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde_json::json;

/// Test helper: a smooth upward CO2-like trend with a small deterministic wobble.
pub(crate) fn synthetic_points(start: NaiveDate, days: usize) -> Vec<ObservationPoint> {
    (0..days)
        .map(|t| {
            let step = t as f64;
            let wobble = noise(t);
            let trend = 400.0 + 0.0068 * step + 0.15 * (step / 45.0).sin() + 0.04 * wobble;
            let seasonal = 3.0 * (2.0 * std::f64::consts::PI * step / 365.25).sin();
            ObservationPoint::new(start + Duration::days(t as i64), trend + seasonal, trend)
        })
        .collect()
}

/// Test helper: deterministic, uncorrelated noise in [-0.5, 0.5) (SplitMix64 output).
pub(crate) fn noise(t: usize) -> f64 {
    let mut z = (t as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    (z >> 11) as f64 / (1u64 << 53) as f64 - 0.5
}

/// Test helper: encodes points in the upstream column layout, dates as strings.
pub(crate) fn payload_json(points: &[ObservationPoint]) -> String {
    json!({
        "co2": {
            "year": points.iter().map(|p| p.date.year().to_string()).collect::<Vec<_>>(),
            "month": points.iter().map(|p| p.date.month().to_string()).collect::<Vec<_>>(),
            "day": points.iter().map(|p| p.date.day().to_string()).collect::<Vec<_>>(),
            "cycle": points.iter().map(|p| p.cycle).collect::<Vec<_>>(),
            "trend": points.iter().map(|p| p.trend).collect::<Vec<_>>(),
        }
    })
    .to_string()
}

/// Test helper: a dataset covering `start..=end` daily.
pub(crate) fn synthetic_dataset(start: NaiveDate, end: NaiveDate) -> Dataset {
    let days = (end - start).num_days() as usize + 1;
    let fetched_at = Utc.with_ymd_and_hms(2024, 6, 2, 8, 0, 0).unwrap();
    Dataset::new(synthetic_points(start, days), fetched_at).unwrap()
}

pub(crate) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}
