//! ==============================================================================
//! payload.rs - binary uplink payload decoder
//! ==============================================================================
//!
//! wire format (one reading per uplink):
//!
//! ```text
//! byte 0      sensor type tag (0x01 = co2)
//! bytes 1..5  ieee-754 f32, big-endian
//! bytes 5..   ignored
//! ```
//!
//! the byte order and offset are fixed here and nowhere else. callers never
//! pick an endianness.
//!
//! relationships:
//!     - used by: pipeline.rs (per-record decode), mock.rs (encode_payload)
//!     - used by: export.rs (to_hex, SensorType::label)
//!
//! ==============================================================================

use crate::error::DecodeError;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// tag byte + 4 value bytes
pub const PAYLOAD_LEN: usize = 5;

pub const TAG_CO2: u8 = 1;
pub const TAG_TEMPERATURE: u8 = 2;
pub const TAG_HUMIDITY: u8 = 3;
pub const TAG_PM25: u8 = 4;
pub const TAG_PM10: u8 = 5;

/// Accepted co2 range in ppm when nothing else is configured.
pub const DEFAULT_CO2_MIN_PPM: f32 = 200.0;
pub const DEFAULT_CO2_MAX_PPM: f32 = 5000.0;

/// Physical quantity announced by the tag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    Co2,
    Temperature,
    Humidity,
    Pm25,
    Pm10,
    Unknown(u8),
}

impl SensorType {
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            TAG_CO2 => SensorType::Co2,
            TAG_TEMPERATURE => SensorType::Temperature,
            TAG_HUMIDITY => SensorType::Humidity,
            TAG_PM25 => SensorType::Pm25,
            TAG_PM10 => SensorType::Pm10,
            other => SensorType::Unknown(other),
        }
    }

    /// Human readable name, as shown in the report's "Type" column.
    pub fn label(&self) -> &'static str {
        match self {
            SensorType::Co2 => "CO₂",
            SensorType::Temperature => "Temperature",
            SensorType::Humidity => "Humidity",
            SensorType::Pm25 => "PM2.5",
            SensorType::Pm10 => "PM10",
            SensorType::Unknown(_) => "Unknown",
        }
    }
}

/// Result of a successful decode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub sensor_tag: u8,
    pub value: f32,
}

impl Reading {
    pub fn sensor_type(&self) -> SensorType {
        SensorType::from_tag(self.sensor_tag)
    }

    pub fn is_co2(&self) -> bool {
        self.sensor_tag == TAG_CO2
    }
}

/// Decoder holding the physical bound applied to co2 readings.
///
/// Only co2 has a bound. Readings with other tags come back unchecked so the
/// batch processor can filter them out without counting an error.
#[derive(Debug, Clone)]
pub struct PayloadDecoder {
    co2_bounds: RangeInclusive<f32>,
}

impl Default for PayloadDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_CO2_MIN_PPM..=DEFAULT_CO2_MAX_PPM)
    }
}

impl PayloadDecoder {
    pub fn new(co2_bounds: RangeInclusive<f32>) -> Self {
        Self { co2_bounds }
    }

    pub fn co2_bounds(&self) -> &RangeInclusive<f32> {
        &self.co2_bounds
    }

    fn bounds_for(&self, tag: u8) -> Option<&RangeInclusive<f32>> {
        match tag {
            TAG_CO2 => Some(&self.co2_bounds),
            _ => None,
        }
    }

    /// Decode an already Base64-decoded payload.
    pub fn decode(&self, bytes: &[u8]) -> Result<Reading, DecodeError> {
        if bytes.len() < PAYLOAD_LEN {
            return Err(DecodeError::InsufficientLength {
                expected: PAYLOAD_LEN,
                actual: bytes.len(),
            });
        }

        let sensor_tag = bytes[0];
        let value = f32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);

        if let Some(bounds) = self.bounds_for(sensor_tag) {
            if !value.is_finite() {
                return Err(DecodeError::NonFinite { tag: sensor_tag });
            }
            if !bounds.contains(&value) {
                return Err(DecodeError::OutOfRange {
                    tag: sensor_tag,
                    value,
                    min: *bounds.start(),
                    max: *bounds.end(),
                });
            }
        }

        Ok(Reading { sensor_tag, value })
    }
}

/// Decode with the default co2 bound.
pub fn decode(bytes: &[u8]) -> Result<Reading, DecodeError> {
    PayloadDecoder::default().decode(bytes)
}

/// Build a payload in the same byte order `decode` reads.
pub fn encode_payload(sensor_tag: u8, value: f32) -> [u8; PAYLOAD_LEN] {
    let v = value.to_be_bytes();
    [sensor_tag, v[0], v[1], v[2], v[3]]
}

/// Uppercase, space separated hex ("01 43 E1 40 00").
pub fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| hex::encode_upper([*b]))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Tag byte formatted the way the report shows sensor ids ("0x01").
pub fn tag_label(tag: u8) -> String {
    format!("0x{}", hex::encode_upper([tag]))
}
