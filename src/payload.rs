//! Decoding and validation of the upstream CO2 payload.
//!
//! The provider returns column arrays:
//! `{"co2": {"year": [...], "month": [...], "day": [...], "cycle": [...], "trend": [...]}}`
//! where each element may be a JSON number or a numeric string. Nothing leaves
//! this module unless every element of every column is valid.

use crate::observation::{Dataset, ObservationPoint};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};

const COLUMNS: [&str; 5] = ["year", "month", "day", "cycle", "trend"];

/// Errors produced while turning a response body into a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    /// Body is not JSON or lacks the `co2` object
    Parse(String),
    /// Columns are present but hold missing, non-numeric or impossible values
    Validation(String),
}

impl std::fmt::Display for PayloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadError::Parse(msg) => write!(f, "Parse error: {}", msg),
            PayloadError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for PayloadError {}

/// Decodes a response body into a validated dataset.
///
/// # Errors
/// `PayloadError::Parse` when the body is malformed, `PayloadError::Validation`
/// when any column is missing, lengths differ, a value is not numeric, a date
/// is not a valid calendar day, or two rows share a date.
pub fn decode_dataset(body: &str, fetched_at: DateTime<Utc>) -> Result<Dataset, PayloadError> {
    let points = decode_points(body)?;
    Dataset::new(points, fetched_at).map_err(|e| PayloadError::Validation(e.to_string()))
}

/// Decodes a response body into observation points in upstream order.
pub fn decode_points(body: &str) -> Result<Vec<ObservationPoint>, PayloadError> {
    let root: Value =
        serde_json::from_str(body).map_err(|e| PayloadError::Parse(e.to_string()))?;
    let table = root
        .get("co2")
        .and_then(Value::as_object)
        .ok_or_else(|| PayloadError::Parse("missing `co2` object".to_string()))?;

    let columns = COLUMNS
        .iter()
        .map(|name| numeric_column(table, name))
        .collect::<Result<Vec<_>, _>>()?;

    let rows = columns[0].len();
    if let Some((name, column)) = COLUMNS
        .iter()
        .zip(&columns)
        .find(|(_, column)| column.len() != rows)
    {
        return Err(PayloadError::Validation(format!(
            "column `{}` has {} entries, expected {}",
            name,
            column.len(),
            rows
        )));
    }

    let (years, months, days, cycles, trends) =
        (&columns[0], &columns[1], &columns[2], &columns[3], &columns[4]);

    (0..rows)
        .map(|row| {
            let date = calendar_date(years[row], months[row], days[row]).ok_or_else(|| {
                PayloadError::Validation(format!(
                    "row {}: {}-{}-{} is not a calendar date",
                    row, years[row], months[row], days[row]
                ))
            })?;
            Ok(ObservationPoint::new(date, cycles[row], trends[row]))
        })
        .collect()
}

fn numeric_column(table: &Map<String, Value>, name: &str) -> Result<Vec<f64>, PayloadError> {
    let values = table
        .get(name)
        .ok_or_else(|| PayloadError::Validation(format!("missing column `{}`", name)))?
        .as_array()
        .ok_or_else(|| PayloadError::Validation(format!("column `{}` is not an array", name)))?;

    values
        .iter()
        .enumerate()
        .map(|(row, value)| {
            coerce_numeric(value).ok_or_else(|| {
                PayloadError::Validation(format!(
                    "column `{}` row {}: {} is not numeric",
                    name, row, value
                ))
            })
        })
        .collect()
}

/// Accepts JSON numbers and numeric strings; rejects NaN and infinities.
fn coerce_numeric(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

fn calendar_date(year: f64, month: f64, day: f64) -> Option<NaiveDate> {
    if [year, month, day].iter().any(|v| v.fract() != 0.0) {
        return None;
    }
    if !(i32::MIN as f64..=i32::MAX as f64).contains(&year)
        || !(1.0..=12.0).contains(&month)
        || !(1.0..=31.0).contains(&day)
    {
        return None;
    }
    NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
}
