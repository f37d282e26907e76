use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::payload::SensorType;

/// where a batch of measurements came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// decoded from the uplink endpoint
    Live,
    /// generated locally; never to be shown as live readings
    #[default]
    Demo,
}

impl DataSource {
    pub fn is_demo(&self) -> bool {
        matches!(self, DataSource::Demo)
    }
}

/// one validated co2 reading
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecodedMeasurement {
    /// unique within its batch
    pub id: String,
    /// normalized ISO-8601 text (at most millisecond precision)
    pub timestamp: String,
    pub sensor_type_tag: u8,
    pub value: f32,
    /// parsed from `timestamp`, never written back
    pub date: DateTime<Utc>,
    /// base64 payload exactly as received
    pub raw_data: String,
    /// decoded payload bytes
    pub payload: Vec<u8>,
    pub source: DataSource,
}

impl DecodedMeasurement {
    pub fn sensor_type(&self) -> SensorType {
        SensorType::from_tag(self.sensor_type_tag)
    }
}

/// mean of all values falling in one local-time hour
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HourlyAverage {
    pub hour_bucket: DateTime<FixedOffset>,
    pub average: f64,
    pub samples: usize,
}

/// counters reported alongside every batch
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub errors: usize,
    pub valid: usize,
    /// records with a sensor tag this view does not show
    pub filtered: usize,
}

/// current dashboard contents shared between:
/// - the polling loop (replaces it every cycle)
/// - the web server (reads it for every view)
#[derive(Clone, Debug, Default, Serialize)]
pub struct DashboardSnapshot {
    pub measurements: Vec<DecodedMeasurement>,
    pub summary: BatchSummary,
    pub source: DataSource,
    /// when this snapshot was produced
    pub fetched_at: Option<DateTime<Utc>>,
    /// set when live data was unavailable and demo data is shown instead
    pub fallback_reason: Option<String>,
}
