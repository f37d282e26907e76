//! Derived views over a batch: hourly averages, date-range filtering and the
//! chronological series the charts are drawn from.
//!
//! Every function takes a slice and returns a new collection.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, FixedOffset, TimeZone, Timelike, Utc};
use serde::Serialize;

use crate::domain::{DecodedMeasurement, HourlyAverage};

/// Above this a co2 reading is flagged as high.
pub const HIGH_CO2_PPM: f32 = 1000.0;

/// Round to 2 decimals, ties away from zero.
///
/// The value is nudged by one ulp of relative error before rounding so that
/// decimal ties stored just below .xx5 (1.005, 2.675) still round up.
pub fn round_half_away_from_zero(value: f64) -> f64 {
    let scaled = value * 100.0 * (1.0 + f64::EPSILON);
    scaled.round() / 100.0
}

/// Start of the local hour containing `date`, as an instant carrying the
/// reading's own offset. Repeated wall-clock hours stay distinct and hours
/// whose top was skipped by a transition still get a bucket.
fn hour_bucket<Tz: TimeZone>(date: &DateTime<Utc>, tz: &Tz) -> DateTime<FixedOffset> {
    let local = date.with_timezone(tz).fixed_offset();
    let into_hour = Duration::minutes(i64::from(local.minute()))
        + Duration::seconds(i64::from(local.second()))
        + Duration::nanoseconds(i64::from(local.nanosecond()));
    local - into_hour
}

/// Hourly averages in the host's local time zone.
pub fn hourly_averages(measurements: &[DecodedMeasurement]) -> Vec<HourlyAverage> {
    hourly_averages_in(measurements, &chrono::Local)
}

/// Group by the start of each calendar hour in `tz`; one entry per bucket,
/// ascending.
pub fn hourly_averages_in<Tz: TimeZone>(
    measurements: &[DecodedMeasurement],
    tz: &Tz,
) -> Vec<HourlyAverage> {
    let mut buckets: BTreeMap<DateTime<FixedOffset>, (f64, usize)> = BTreeMap::new();
    for m in measurements {
        let entry = buckets.entry(hour_bucket(&m.date, tz)).or_insert((0.0, 0));
        entry.0 += f64::from(m.value);
        entry.1 += 1;
    }

    buckets
        .into_iter()
        .map(|(hour_bucket, (sum, count))| HourlyAverage {
            hour_bucket,
            average: round_half_away_from_zero(sum / count as f64),
            samples: count,
        })
        .collect()
}

/// Measurements within `[start, end]`, both inclusive. An open bound on
/// either side disables filtering entirely.
pub fn filter_by_date_range(
    measurements: &[DecodedMeasurement],
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Vec<DecodedMeasurement> {
    match (start, end) {
        (Some(start), Some(end)) => measurements
            .iter()
            .filter(|m| m.date >= start && m.date <= end)
            .cloned()
            .collect(),
        _ => measurements.to_vec(),
    }
}

/// Stable sort by measurement time.
pub fn chronological(measurements: &[DecodedMeasurement]) -> Vec<DecodedMeasurement> {
    let mut sorted = measurements.to_vec();
    sorted.sort_by_key(|m| m.date);
    sorted
}

/// Most recent reading, if any.
pub fn latest(measurements: &[DecodedMeasurement]) -> Option<&DecodedMeasurement> {
    measurements.iter().max_by_key(|m| m.date)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Co2Level {
    Normal,
    High,
}

impl Co2Level {
    pub fn classify(value: f32) -> Self {
        if value > HIGH_CO2_PPM {
            Co2Level::High
        } else {
            Co2Level::Normal
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Co2Level::Normal => "Normal level",
            Co2Level::High => "High level",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SummaryStats {
    pub min: f32,
    pub max: f32,
    pub mean: f64,
    pub count: usize,
}

pub fn summary_stats(measurements: &[DecodedMeasurement]) -> Option<SummaryStats> {
    let first = measurements.first()?;
    let (mut min, mut max, mut sum) = (first.value, first.value, 0.0_f64);
    for m in measurements {
        min = min.min(m.value);
        max = max.max(m.value);
        sum += f64::from(m.value);
    }
    Some(SummaryStats {
        min,
        max,
        mean: round_half_away_from_zero(sum / measurements.len() as f64),
        count: measurements.len(),
    })
}
