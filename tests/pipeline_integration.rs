use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use co2_uplink_host::aggregate::{chronological, filter_by_date_range, hourly_averages_in};
use co2_uplink_host::config::DashboardConfig;
use co2_uplink_host::export::report_csv;
use co2_uplink_host::payload::{encode_payload, TAG_CO2, TAG_HUMIDITY};
use co2_uplink_host::{process_batch, BatchProcessor, DataSource, PayloadDecoder};

fn uplink(tag: u8, value: f32, time: &str) -> Value {
    json!({ "data": STANDARD.encode(encode_payload(tag, value)), "time": time })
}

fn gateway_batch() -> Vec<Value> {
    vec![
        uplink(TAG_CO2, 500.0, "2024-01-01T10:05:00.000000001Z"),
        uplink(TAG_CO2, 600.0, "2024-01-01T10:45:00Z"),
        uplink(TAG_HUMIDITY, 41.0, "2024-01-01T10:50:00Z"),
        json!({ "code": "UPLINK_CODEC", "time": "2024-01-01T10:55:00Z" }),
        uplink(TAG_CO2, 7000.0, "2024-01-01T11:00:00Z"),
        uplink(TAG_CO2, 420.0, "2024-01-01T09:30:00.5Z"),
        uplink(TAG_CO2, 880.0, "2024-01-01T11:20:00Z"),
    ]
}

#[test]
fn batch_to_hourly_view() {
    let started = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
    let batch = BatchProcessor::new(PayloadDecoder::default(), started).process(&gateway_batch());

    assert_eq!(batch.total_count, 7);
    assert_eq!(batch.error_count, 2);
    assert_eq!(batch.filtered_count, 1);
    assert_eq!(batch.valid_count(), 4);
    assert_eq!(
        batch.total_count,
        batch.error_count + batch.valid_count() + batch.filtered_count
    );
    assert!(batch.measurements.iter().all(|m| m.source == DataSource::Live));

    let series = chronological(&batch.measurements);
    let values: Vec<f32> = series.iter().map(|m| m.value).collect();
    assert_eq!(values, vec![420.0, 500.0, 600.0, 880.0]);

    let averages = hourly_averages_in(&series, &Utc);
    let view: Vec<(String, f64)> = averages
        .iter()
        .map(|a| (a.hour_bucket.format("%H:%M").to_string(), a.average))
        .collect();
    assert_eq!(
        view,
        vec![
            ("09:00".to_string(), 420.0),
            ("10:00".to_string(), 550.0),
            ("11:00".to_string(), 880.0),
        ]
    );

    let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 1, 1, 10, 59, 59).unwrap();
    let window = filter_by_date_range(&series, Some(start), Some(end));
    assert_eq!(window.len(), 2);
    assert_eq!(hourly_averages_in(&window, &Utc)[0].average, 550.0);
}

#[test]
fn counters_balance_without_foreign_tags() {
    let batches: Vec<Vec<Value>> = vec![
        vec![],
        vec![json!(null), json!([]), json!({})],
        vec![uplink(TAG_CO2, 450.0, "2024-01-01T00:00:00Z"), json!({ "data": "" , "time": "2024-01-01T00:00:00Z" })],
        vec![uplink(TAG_CO2, 450.0, "bad"), uplink(TAG_CO2, f32::INFINITY, "2024-01-01T00:00:00Z")],
    ];
    for records in batches {
        let batch = process_batch(&records);
        assert_eq!(batch.total_count, records.len());
        assert_eq!(batch.total_count, batch.error_count + batch.valid_count());
    }
}

#[test]
fn report_reflects_batch_counters() {
    let started = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
    let batch = BatchProcessor::new(PayloadDecoder::default(), started).process(&gateway_batch());
    let csv = report_csv(&batch.measurements, &batch.summary());

    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("Total objects received;7"));
    assert_eq!(lines.next(), Some("Records with errors;2"));
    assert_eq!(lines.next(), Some("Records without errors;4"));
    assert_eq!(lines.next(), Some(""));
    assert_eq!(
        lines.next(),
        Some("Sensor ID;Type;Raw Data;Preprocessed Data (hex);Processed Value;Date")
    );
    let first_row = lines.next().unwrap();
    assert_eq!(
        first_row,
        "0x01;CO₂;AUP6AAA=;01 43 FA 00 00;500.000000;2024-01-01T10:05:00.000Z"
    );
    assert_eq!(lines.count(), 3);
}

#[test]
fn shipped_config_parses() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config/dashboard.toml");
    let config = DashboardConfig::load(path).unwrap();
    assert_eq!(config.decoder.co2_min_ppm, 200.0);
    assert_eq!(config.decoder.co2_max_ppm, 5000.0);
    assert_eq!(config.polling.interval_seconds, 60);
}
