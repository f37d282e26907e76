//! ==============================================================================
//! mock.rs - demonstration co2 data
//! ==============================================================================
//!
//! purpose:
//!     gives the dashboard something to show when the uplink endpoint is
//!     unreachable or the host is configured for demo mode.
//!
//! shape (deterministic):
//!     `days` days ending today, 8 samples per day at 00:00, 03:00 .. 21:00
//!     local time, oldest first.
//!
//! content (stochastic):
//!     time-of-day base + jitter, with an occasional spike.
//!
//! every generated measurement carries `DataSource::Demo` and an id starting
//! with `mock-`, so it can never pass for a live reading.
//!
//! ==============================================================================

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Days, Local, NaiveTime, SecondsFormat, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::{DataSource, DecodedMeasurement};
use crate::payload::{encode_payload, TAG_CO2};

pub const SAMPLE_INTERVAL_HOURS: u32 = 3;
pub const SAMPLES_PER_DAY: u32 = 24 / SAMPLE_INTERVAL_HOURS;
pub const DEFAULT_SPIKE_PROBABILITY: f64 = 0.05;
/// Longest demo window the host will generate.
pub const MAX_MOCK_DAYS: u32 = 366;

const JITTER_PPM: f32 = 60.0;
const SPIKE_MIN_PPM: f32 = 1200.0;
const SPIKE_MAX_PPM: f32 = 1800.0;

/// typical indoor co2 for the hour of day
fn base_ppm(hour: u32) -> f32 {
    match hour {
        0..=5 => 450.0,
        6..=11 => 650.0,
        12..=17 => 800.0,
        _ => 600.0,
    }
}

// gen_bool panics outside [0, 1]
fn sanitize_probability(p: f64) -> f64 {
    if p.is_finite() {
        p.clamp(0.0, 1.0)
    } else {
        DEFAULT_SPIKE_PROBABILITY
    }
}

pub struct MockGenerator {
    rng: StdRng,
    spike_probability: f64,
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_SPIKE_PROBABILITY)
    }
}

impl MockGenerator {
    pub fn new(spike_probability: f64) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            spike_probability: sanitize_probability(spike_probability),
        }
    }

    /// Same seed, same values.
    pub fn with_seed(seed: u64, spike_probability: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            spike_probability: sanitize_probability(spike_probability),
        }
    }

    fn sample_value(&mut self, hour: u32) -> f32 {
        if self.rng.gen_bool(self.spike_probability) {
            return self.rng.gen_range(SPIKE_MIN_PPM..=SPIKE_MAX_PPM);
        }
        base_ppm(hour) + self.rng.gen_range(-JITTER_PPM..=JITTER_PPM)
    }

    /// Samples for `days` local days ending on the day of `now`, capped at
    /// `MAX_MOCK_DAYS`.
    pub fn generate_in<Tz: TimeZone>(&mut self, days: u32, now: DateTime<Tz>) -> Vec<DecodedMeasurement> {
        let tz = now.timezone();
        let today = now.date_naive();
        let days = days.min(MAX_MOCK_DAYS);
        let mut out = Vec::with_capacity(days as usize * SAMPLES_PER_DAY as usize);

        for day in 0..days {
            let Some(date) = today.checked_sub_days(Days::new(u64::from(days - 1 - day))) else {
                continue;
            };
            for slot in 0..SAMPLES_PER_DAY {
                let hour = slot * SAMPLE_INTERVAL_HOURS;
                let Some(time) = NaiveTime::from_hms_opt(hour, 0, 0) else {
                    continue;
                };
                let Some(local) = tz.from_local_datetime(&date.and_time(time)).earliest() else {
                    continue;
                };

                let value = self.sample_value(hour);
                let payload = encode_payload(TAG_CO2, value);
                let at = local.with_timezone(&Utc);

                out.push(DecodedMeasurement {
                    id: format!("mock-{}-{}", day, slot),
                    timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
                    sensor_type_tag: TAG_CO2,
                    value,
                    date: at,
                    raw_data: STANDARD.encode(payload),
                    payload: payload.to_vec(),
                    source: DataSource::Demo,
                });
            }
        }

        out
    }

    /// Samples for `days` days ending today, in the host's local time.
    pub fn generate(&mut self, days: u32) -> Vec<DecodedMeasurement> {
        self.generate_in(days, Local::now())
    }
}

/// Demo data with the default spike probability.
pub fn generate_mock(days: u32) -> Vec<DecodedMeasurement> {
    MockGenerator::default().generate(days)
}
