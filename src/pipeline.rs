//! ==============================================================================
//! pipeline.rs - record validation and batch processing
//! ==============================================================================
//!
//! purpose:
//!     turns the untrusted json array delivered by the uplink endpoint into
//!     validated co2 measurements plus summary counters.
//!
//! per record, in input order:
//!     1. validation boundary: object? `data` string? upstream error marker?
//!     2. base64 decode of `data`
//!     3. timestamp normalization (`time`, else `timestamp`)
//!     4. payload decode (payload.rs); foreign sensor tags are filtered
//!     5. id assignment (upstream id, else batch-start + index)
//!
//! every per-record failure is counted and logged at debug level. nothing
//! a single record does can fail the batch.
//!
//! relationships:
//!     - uses: payload.rs (PayloadDecoder)
//!     - used by: source.rs (HttpSource), main.rs (poll loop)
//!
//! ==============================================================================

use std::collections::HashSet;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{Map, Value};

use crate::domain::{BatchSummary, DataSource, DecodedMeasurement};
use crate::error::{PipelineError, RecordError};
use crate::payload::PayloadDecoder;

/// gateway marker for uplinks its codec could not handle
pub const UPLINK_CODEC_ERROR: &str = "UPLINK_CODEC";

/// fractional second digits kept before parsing
pub const MAX_FRACTION_DIGITS: usize = 3;

/// epoch numbers above this are milliseconds, below it seconds
const EPOCH_MILLIS_THRESHOLD: f64 = 1e12;

// padding is optional on the wire
const PAYLOAD_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

// ==============================================================================
// validation boundary
// ==============================================================================

/// A record that passed the shape checks. Nothing is decoded yet.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub data: String,
    pub time: Option<Value>,
    pub id: Option<String>,
}

impl RawRecord {
    pub fn from_value(value: &Value) -> Result<Self, RecordError> {
        let obj = value
            .as_object()
            .ok_or_else(|| RecordError::MalformedRecord("record is not a JSON object".into()))?;

        if has_error_marker(obj) {
            return Err(RecordError::MalformedRecord(
                "record flagged by the gateway as a codec failure".into(),
            ));
        }

        let data = match obj.get("data") {
            Some(Value::String(s)) => s.clone(),
            Some(_) => {
                return Err(RecordError::MalformedRecord("`data` is not a string".into()));
            }
            None => return Err(RecordError::MalformedRecord("missing `data` field".into())),
        };

        let time = ["time", "timestamp"]
            .iter()
            .filter_map(|key| obj.get(*key))
            .find(|v| !v.is_null())
            .cloned();

        let id = ["id", "deduplicationId"]
            .iter()
            .filter_map(|key| obj.get(*key))
            .find_map(id_text);

        Ok(Self { data, time, id })
    }
}

fn has_error_marker(obj: &Map<String, Value>) -> bool {
    let codec_failure = obj.get("code").and_then(Value::as_str) == Some(UPLINK_CODEC_ERROR);
    let error_field = obj.get("error").is_some_and(|v| !v.is_null());
    codec_failure || error_field
}

fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ==============================================================================
// timestamps
// ==============================================================================

/// Cut fractional seconds beyond millisecond precision, keeping any offset.
///
/// `2024-01-01T10:15:30.123456789Z` becomes `2024-01-01T10:15:30.123Z`.
pub fn normalize_fractional_seconds(text: &str) -> String {
    let text = text.trim();
    let Some(time_start) = text.find(['T', 't', ' ']) else {
        return text.to_string();
    };
    let Some(dot) = text[time_start..].find('.').map(|i| i + time_start) else {
        return text.to_string();
    };

    let digits_start = dot + 1;
    let digits_end = text[digits_start..]
        .find(|c: char| !c.is_ascii_digit())
        .map(|i| i + digits_start)
        .unwrap_or(text.len());

    if digits_end - digits_start <= MAX_FRACTION_DIGITS {
        return text.to_string();
    }
    format!(
        "{}{}",
        &text[..digits_start + MAX_FRACTION_DIGITS],
        &text[digits_end..]
    )
}

/// Parse a normalized timestamp. Offset-less forms are read as UTC.
fn parse_timestamp_text(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Normalize the record's time field into its text form and parsed date.
pub fn normalize_timestamp(time: Option<&Value>) -> Result<(String, DateTime<Utc>), RecordError> {
    match time {
        Some(Value::String(raw)) => {
            let text = normalize_fractional_seconds(raw);
            let date = parse_timestamp_text(&text)
                .ok_or_else(|| RecordError::UnparsableTimestamp(raw.clone()))?;
            Ok((text, date))
        }
        Some(Value::Number(n)) => {
            let epoch = n
                .as_f64()
                .ok_or_else(|| RecordError::UnparsableTimestamp(n.to_string()))?;
            let millis = if epoch.abs() > EPOCH_MILLIS_THRESHOLD {
                epoch
            } else {
                epoch * 1000.0
            };
            let date = DateTime::from_timestamp_millis(millis as i64)
                .ok_or_else(|| RecordError::UnparsableTimestamp(n.to_string()))?;
            Ok((date.to_rfc3339_opts(SecondsFormat::Millis, true), date))
        }
        Some(other) => Err(RecordError::UnparsableTimestamp(other.to_string())),
        None => Err(RecordError::UnparsableTimestamp("missing time field".into())),
    }
}

// ==============================================================================
// batch processing
// ==============================================================================

/// What happened to one record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Accepted(DecodedMeasurement),
    /// decoded fine, but not a co2 reading
    Filtered { tag: u8 },
    Rejected(RecordError),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    pub measurements: Vec<DecodedMeasurement>,
    pub error_count: usize,
    pub total_count: usize,
    pub filtered_count: usize,
}

impl BatchResult {
    pub fn valid_count(&self) -> usize {
        self.measurements.len()
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            total: self.total_count,
            errors: self.error_count,
            valid: self.valid_count(),
            filtered: self.filtered_count,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchProcessor {
    decoder: PayloadDecoder,
    batch_started: DateTime<Utc>,
}

impl BatchProcessor {
    /// `batch_started` seeds synthetic ids, so the same input and start time
    /// always give the same output.
    pub fn new(decoder: PayloadDecoder, batch_started: DateTime<Utc>) -> Self {
        Self { decoder, batch_started }
    }

    /// Entry point for a whole response body.
    pub fn process_value(&self, body: &Value) -> Result<BatchResult, PipelineError> {
        match body {
            Value::Array(records) => Ok(self.process(records)),
            Value::Object(_) => Err(PipelineError::NotAnArray("an object")),
            Value::String(_) => Err(PipelineError::NotAnArray("a string")),
            Value::Number(_) => Err(PipelineError::NotAnArray("a number")),
            Value::Bool(_) => Err(PipelineError::NotAnArray("a boolean")),
            Value::Null => Err(PipelineError::NotAnArray("null")),
        }
    }

    pub fn process(&self, records: &[Value]) -> BatchResult {
        let mut result = BatchResult {
            total_count: records.len(),
            ..Default::default()
        };
        let mut seen_ids = HashSet::new();

        for (index, record) in records.iter().enumerate() {
            match self.process_record(index, record) {
                RecordOutcome::Accepted(mut measurement) => {
                    while seen_ids.contains(&measurement.id) {
                        measurement.id = format!("{}-{}", measurement.id, index);
                    }
                    seen_ids.insert(measurement.id.clone());
                    result.measurements.push(measurement);
                }
                RecordOutcome::Filtered { tag } => {
                    tracing::trace!(index, tag, "skipping non-co2 record");
                    result.filtered_count += 1;
                }
                RecordOutcome::Rejected(reason) => {
                    tracing::debug!(index, %reason, "rejected uplink record");
                    result.error_count += 1;
                }
            }
        }

        result
    }

    pub fn process_record(&self, index: usize, record: &Value) -> RecordOutcome {
        match self.try_process_record(index, record) {
            Ok(outcome) => outcome,
            Err(reason) => RecordOutcome::Rejected(reason),
        }
    }

    fn try_process_record(&self, index: usize, record: &Value) -> Result<RecordOutcome, RecordError> {
        let raw = RawRecord::from_value(record)?;

        let payload = PAYLOAD_BASE64
            .decode(raw.data.trim())
            .map_err(|e| RecordError::DecodeFailure(format!("invalid base64: {}", e)))?;

        let (timestamp, date) = normalize_timestamp(raw.time.as_ref())?;

        let reading = self.decoder.decode(&payload)?;
        if !reading.is_co2() {
            return Ok(RecordOutcome::Filtered { tag: reading.sensor_tag });
        }

        let id = raw
            .id
            .unwrap_or_else(|| format!("{}-{}", self.batch_started.timestamp_millis(), index));

        Ok(RecordOutcome::Accepted(DecodedMeasurement {
            id,
            timestamp,
            sensor_type_tag: reading.sensor_tag,
            value: reading.value,
            date,
            raw_data: raw.data,
            payload,
            source: DataSource::Live,
        }))
    }
}

/// Process with the default co2 bound, stamping synthetic ids with now.
pub fn process_batch(records: &[Value]) -> BatchResult {
    BatchProcessor::new(PayloadDecoder::default(), Utc::now()).process(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{encode_payload, TAG_CO2, TAG_TEMPERATURE};
    use serde_json::json;

    fn b64(bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    fn processor() -> BatchProcessor {
        let started = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        BatchProcessor::new(PayloadDecoder::default(), started)
    }

    fn co2_record(value: f32, time: &str) -> Value {
        json!({ "data": b64(&encode_payload(TAG_CO2, value)), "time": time })
    }

    #[test]
    fn test_three_record_scenario() {
        let records = vec![
            co2_record(450.5, "2024-01-01T10:15:30Z"),
            json!({ "data": b64(&encode_payload(TAG_TEMPERATURE, 21.0)), "time": "2024-01-01T10:16:00Z" }),
            json!({ "time": "2024-01-01T10:17:00Z" }),
        ];

        let result = processor().process(&records);
        assert_eq!(result.valid_count(), 1);
        assert_eq!(result.error_count, 1);
        assert_eq!(result.total_count, 3);
        assert_eq!(result.filtered_count, 1);
        assert_eq!(result.measurements[0].value, 450.5);
    }

    #[test]
    fn test_empty_batch_counts() {
        let result = processor().process(&[]);
        assert_eq!(result.summary(), BatchSummary::default());
    }

    #[test]
    fn test_counters_balance_for_mixed_failures() {
        let records = vec![
            co2_record(500.0, "2024-01-01T10:00:00Z"),
            json!({ "data": 42, "time": "2024-01-01T10:00:00Z" }),
            json!({ "data": "!!not base64!!", "time": "2024-01-01T10:00:00Z" }),
            json!({ "data": b64(&[1, 2, 3]), "time": "2024-01-01T10:00:00Z" }),
            co2_record(9000.0, "2024-01-01T10:00:00Z"),
            co2_record(f32::NAN, "2024-01-01T10:00:00Z"),
            co2_record(600.0, "yesterday"),
            co2_record(600.0, "2024-01-01T11:00:00Z"),
            json!("just a string"),
            json!({ "code": "UPLINK_CODEC", "data": b64(&encode_payload(TAG_CO2, 700.0)), "time": "2024-01-01T10:00:00Z" }),
        ];

        let result = processor().process(&records);
        assert_eq!(result.valid_count(), 2);
        assert_eq!(result.error_count, 8);
        assert_eq!(result.filtered_count, 0);
        assert_eq!(result.total_count, result.error_count + result.valid_count());
    }

    #[test]
    fn test_output_preserves_input_order() {
        let records = vec![
            co2_record(700.0, "2024-01-01T12:00:00Z"),
            co2_record(500.0, "2024-01-01T08:00:00Z"),
        ];
        let values: Vec<f32> = processor().process(&records).measurements.iter().map(|m| m.value).collect();
        assert_eq!(values, vec![700.0, 500.0]);
    }

    #[test]
    fn test_record_errors_are_classified() {
        let p = processor();
        let outcome = |v: Value| p.process_record(0, &v);

        assert!(matches!(
            outcome(json!({ "time": "2024-01-01T10:00:00Z" })),
            RecordOutcome::Rejected(RecordError::MalformedRecord(_))
        ));
        assert!(matches!(
            outcome(json!({ "data": b64(&[1, 2]), "time": "2024-01-01T10:00:00Z" })),
            RecordOutcome::Rejected(RecordError::DecodeFailure(_))
        ));
        assert!(matches!(
            outcome(co2_record(100.0, "2024-01-01T10:00:00Z")),
            RecordOutcome::Rejected(RecordError::OutOfRangeValue(_))
        ));
        assert!(matches!(
            outcome(co2_record(400.0, "not a date")),
            RecordOutcome::Rejected(RecordError::UnparsableTimestamp(_))
        ));
        assert!(matches!(
            outcome(json!({ "data": b64(&encode_payload(TAG_CO2, 400.0)) })),
            RecordOutcome::Rejected(RecordError::UnparsableTimestamp(_))
        ));
        assert_eq!(
            outcome(json!({ "data": b64(&encode_payload(3, 55.0)), "time": "2024-01-01T10:00:00Z" })),
            RecordOutcome::Filtered { tag: 3 }
        );
    }

    #[test]
    fn test_error_field_marks_record_malformed() {
        let record = json!({
            "data": b64(&encode_payload(TAG_CO2, 400.0)),
            "time": "2024-01-01T10:00:00Z",
            "error": { "message": "codec crashed" },
        });
        assert!(matches!(
            processor().process_record(0, &record),
            RecordOutcome::Rejected(RecordError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_nanosecond_timestamp_is_truncated_not_rejected() {
        assert_eq!(
            normalize_fractional_seconds("2024-01-01T10:15:30.123456789Z"),
            "2024-01-01T10:15:30.123Z"
        );

        let result = processor().process(&[co2_record(450.5, "2024-01-01T10:15:30.123456789Z")]);
        let m = &result.measurements[0];
        assert_eq!(m.timestamp, "2024-01-01T10:15:30.123Z");
        assert_eq!(m.date, Utc.with_ymd_and_hms(2024, 1, 1, 10, 15, 30).unwrap() + chrono::Duration::milliseconds(123));
    }

    #[test]
    fn test_fraction_normalization_keeps_offsets_and_short_fractions() {
        assert_eq!(
            normalize_fractional_seconds("2024-01-01T10:15:30.1234567+02:00"),
            "2024-01-01T10:15:30.123+02:00"
        );
        assert_eq!(normalize_fractional_seconds("2024-01-01T10:15:30.12Z"), "2024-01-01T10:15:30.12Z");
        assert_eq!(normalize_fractional_seconds("2024-01-01T10:15:30Z"), "2024-01-01T10:15:30Z");
        assert_eq!(normalize_fractional_seconds(" 2024-01-01 10:15:30.98765 "), "2024-01-01 10:15:30.987");
    }

    #[test]
    fn test_offsetless_and_numeric_timestamps() {
        let (_, date) = normalize_timestamp(Some(&json!("2024-03-05T06:07:08"))).unwrap();
        assert_eq!(date, Utc.with_ymd_and_hms(2024, 3, 5, 6, 7, 8).unwrap());

        let expected = Utc.with_ymd_and_hms(2024, 3, 5, 6, 7, 8).unwrap();
        let (text, date) = normalize_timestamp(Some(&json!(expected.timestamp()))).unwrap();
        assert_eq!(date, expected);
        assert_eq!(text, "2024-03-05T06:07:08.000Z");

        let (_, date) = normalize_timestamp(Some(&json!(expected.timestamp_millis()))).unwrap();
        assert_eq!(date, expected);

        assert!(normalize_timestamp(Some(&json!(true))).is_err());
    }

    #[test]
    fn test_timestamp_field_used_when_time_absent() {
        let record = json!({
            "data": b64(&encode_payload(TAG_CO2, 480.0)),
            "timestamp": "2024-01-01T09:00:00Z",
        });
        let result = processor().process(&[record]);
        assert_eq!(result.measurements[0].timestamp, "2024-01-01T09:00:00Z");
    }

    #[test]
    fn test_ids_prefer_upstream_and_stay_unique() {
        let mut a = co2_record(500.0, "2024-01-01T10:00:00Z");
        a["deduplicationId"] = json!("dedup-1");
        let mut b = co2_record(510.0, "2024-01-01T10:01:00Z");
        b["id"] = json!("dedup-1");
        let c = co2_record(520.0, "2024-01-01T10:02:00Z");
        let mut d = co2_record(530.0, "2024-01-01T10:03:00Z");
        d["id"] = json!(77);

        let result = processor().process(&[a, b, c, d]);
        let ids: Vec<&str> = result.measurements.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["dedup-1", "dedup-1-1", "1704067200000-2", "77"]);
    }

    #[test]
    fn test_synthetic_ids_are_reproducible() {
        let records = vec![co2_record(500.0, "2024-01-01T10:00:00Z"), co2_record(510.0, "2024-01-01T10:01:00Z")];
        assert_eq!(processor().process(&records), processor().process(&records));
    }

    #[test]
    fn test_unpadded_base64_is_accepted() {
        let encoded = b64(&encode_payload(TAG_CO2, 450.5));
        let record = json!({ "data": encoded.trim_end_matches('='), "time": "2024-01-01T10:00:00Z" });
        let result = processor().process(&[record]);
        assert_eq!(result.valid_count(), 1);
        assert_eq!(result.measurements[0].raw_data, encoded.trim_end_matches('='));
    }

    #[test]
    fn test_measurement_carries_payload_and_live_source() {
        let result = processor().process(&[co2_record(450.5, "2024-01-01T10:00:00Z")]);
        let m = &result.measurements[0];
        assert_eq!(m.payload, encode_payload(TAG_CO2, 450.5).to_vec());
        assert_eq!(m.raw_data, "AUPhQAA=");
        assert_eq!(m.source, DataSource::Live);
    }

    #[test]
    fn test_process_value_rejects_non_arrays() {
        let p = processor();
        assert!(matches!(p.process_value(&json!({ "data": [] })), Err(PipelineError::NotAnArray(_))));
        assert!(matches!(p.process_value(&Value::Null), Err(PipelineError::NotAnArray("null"))));
        assert_eq!(p.process_value(&json!([])).unwrap().total_count, 0);
    }
}
