use chrono::{Duration, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

/// How several sub-hourly records are folded into one hourly value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "./series.ts")]
pub enum Resample {
    /// Energy quantities (kWh) are summed
    Sum,
    /// Intensities (kW/m²) are averaged
    Mean,
}

/// A contiguous series with exactly one value per hour.
///
/// Only the first timestamp is stored; value `i` belongs to the hour starting at
/// `start + i hours`, so timestamps are strictly increasing at a fixed one hour step
/// and the series can never contain a gap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export, export_to = "./series.ts")]
pub struct HourlySeries {
    /// Start of the first hour (naive local standard time).
    pub start: NaiveDateTime,
    /// One value per hour.
    pub values: Vec<f64>,
}

impl HourlySeries {
    /// Creates a new series, the start must lie on a full hour
    pub fn new(start: NaiveDateTime, values: Vec<f64>) -> Result<Self, String> {
        if start.minute() != 0 || start.second() != 0 || start.nanosecond() != 0 {
            return Err(format!("Series start {} is not on a full hour", start));
        }
        Ok(Self { start, values })
    }

    /// Builds a series from `(timestamp, value)` records that are already hourly.
    ///
    /// Fails on gaps, duplicates and out-of-order records.
    pub fn from_records(records: &[(NaiveDateTime, f64)]) -> Result<Self, String> {
        let (start, _) = records
            .first()
            .ok_or_else(|| "Series contains no records".to_string())?;

        for (index, pair) in records.windows(2).enumerate() {
            let (previous, current) = (pair[0].0, pair[1].0);
            if current != previous + Duration::hours(1) {
                return Err(format!(
                    "Record {} at {} does not follow {} by exactly one hour",
                    index + 1,
                    current,
                    previous
                ));
            }
        }

        Self::new(*start, records.iter().map(|&(_, value)| value).collect())
    }

    /// Builds an hourly series from sub-hourly (or hourly) records.
    ///
    /// Records are bucketed by the hour they fall into and folded with `how`. Records must be
    /// sorted; the resulting hours must be contiguous.
    pub fn resample_hourly(
        records: &[(NaiveDateTime, f64)],
        how: Resample,
    ) -> Result<Self, String> {
        let mut buckets: Vec<(NaiveDateTime, f64, usize)> = Vec::new();

        for &(timestamp, value) in records {
            let hour = floor_to_hour(timestamp);
            match buckets.last_mut() {
                Some((current, sum, count)) if *current == hour => {
                    *sum += value;
                    *count += 1;
                }
                Some((current, _, _)) if *current > hour => {
                    return Err(format!(
                        "Record at {} is earlier than the preceding hour {}",
                        timestamp, current
                    ));
                }
                _ => buckets.push((hour, value, 1)),
            }
        }

        let hourly: Vec<(NaiveDateTime, f64)> = buckets
            .into_iter()
            .map(|(hour, sum, count)| match how {
                Resample::Sum => (hour, sum),
                Resample::Mean => (hour, sum / count as f64),
            })
            .collect();

        Self::from_records(&hourly)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Timestamp of the hour at `index`
    pub fn timestamp(&self, index: usize) -> NaiveDateTime {
        self.start + Duration::hours(index as i64)
    }

    /// First timestamp after the last hour
    pub fn end(&self) -> NaiveDateTime {
        self.timestamp(self.values.len())
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDateTime, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(|(index, &value)| (self.timestamp(index), value))
    }

    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Same start and same number of hours
    pub fn is_aligned_with(&self, other: &HourlySeries) -> bool {
        self.start == other.start && self.len() == other.len()
    }

    /// Copy of the hours in `from..till`
    pub fn slice(&self, from: usize, till: usize) -> HourlySeries {
        HourlySeries {
            start: self.timestamp(from),
            values: self.values[from..till].to_vec(),
        }
    }

    /// Every value multiplied by `factor` (e.g. 0.001 for Wh to kWh)
    pub fn scaled(&self, factor: f64) -> HourlySeries {
        HourlySeries {
            start: self.start,
            values: self.values.iter().map(|&value| value * factor).collect(),
        }
    }
}

fn floor_to_hour(timestamp: NaiveDateTime) -> NaiveDateTime {
    timestamp
        .date()
        .and_hms_opt(timestamp.hour(), 0, 0)
        .unwrap_or(timestamp)
}
