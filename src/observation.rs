use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single daily CO2 reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservationPoint {
    /// Calendar day of the reading
    pub date: NaiveDate,
    /// Raw daily reading including seasonal variation (ppm)
    pub cycle: f64,
    /// Seasonally-adjusted value (ppm), the series that gets modeled
    pub trend: f64,
}

impl ObservationPoint {
    /// Creates a new ObservationPoint.
    pub fn new(date: NaiveDate, cycle: f64, trend: f64) -> Self {
        ObservationPoint { date, cycle, trend }
    }
}

/// Date range for querying observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    /// Start date (inclusive)
    pub start: NaiveDate,
    /// End date (inclusive)
    pub end: NaiveDate,
}

impl DateRange {
    /// Creates a new DateRange.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }
}

/// A validated, immutable snapshot of the historical series.
///
/// Points are strictly increasing by date and the dataset is never empty.
/// Every successful refresh produces a fresh `source_version`, which is what
/// fitted models are bound to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    points: Vec<ObservationPoint>,
    fetched_at: DateTime<Utc>,
    source_version: Uuid,
}

impl Dataset {
    /// Builds a dataset with a freshly generated source version.
    ///
    /// Points are sorted by date before validation, so callers may pass them
    /// in upstream order.
    ///
    /// # Errors
    /// Returns `DatasetError::Empty` for an empty input and
    /// `DatasetError::DuplicateDate` when two points share a date.
    pub fn new(
        points: Vec<ObservationPoint>,
        fetched_at: DateTime<Utc>,
    ) -> Result<Self, DatasetError> {
        Self::with_version(points, fetched_at, Uuid::new_v4())
    }

    /// Builds a dataset with an explicit source version.
    pub fn with_version(
        mut points: Vec<ObservationPoint>,
        fetched_at: DateTime<Utc>,
        source_version: Uuid,
    ) -> Result<Self, DatasetError> {
        if points.is_empty() {
            return Err(DatasetError::Empty);
        }

        points.sort_by_key(|point| point.date);
        if let Some(pair) = points.windows(2).find(|pair| pair[0].date >= pair[1].date) {
            return Err(DatasetError::DuplicateDate(pair[1].date));
        }

        Ok(Dataset {
            points,
            fetched_at,
            source_version,
        })
    }

    pub fn points(&self) -> &[ObservationPoint] {
        &self.points
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn source_version(&self) -> Uuid {
        self.source_version
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Date of the earliest observation.
    pub fn first_date(&self) -> NaiveDate {
        self.points[0].date
    }

    /// Date of the most recent observation.
    pub fn latest_date(&self) -> NaiveDate {
        self.points[self.points.len() - 1].date
    }

    /// The seasonally-adjusted series in date order.
    pub fn trend_series(&self) -> Vec<f64> {
        self.points.iter().map(|point| point.trend).collect()
    }

    /// Returns the points whose dates fall within `range` (inclusive).
    pub fn points_between(&self, range: &DateRange) -> &[ObservationPoint] {
        if range.start > range.end {
            return &[];
        }
        let start = self.points.partition_point(|point| point.date < range.start);
        let end = self.points.partition_point(|point| point.date <= range.end);
        &self.points[start..end]
    }
}

/// Errors raised when a dataset would violate its ordering invariants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetError {
    /// No observations were supplied
    Empty,
    /// Two observations share the same calendar date
    DuplicateDate(NaiveDate),
}

impl std::fmt::Display for DatasetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatasetError::Empty => write!(f, "Dataset contains no observations"),
            DatasetError::DuplicateDate(date) => {
                write!(f, "Duplicate observation for {}", date)
            }
        }
    }
}

impl std::error::Error for DatasetError {}
