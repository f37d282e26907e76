//! CSV exports of a batch.
//!
//! The report uses `;` as separator so values stay intact in spreadsheet
//! tools that read `,` as the decimal mark.

use chrono::{DateTime, Local, TimeZone, Utc};

use crate::domain::{BatchSummary, DecodedMeasurement};
use crate::payload::{tag_label, to_hex};

pub const REPORT_SEPARATOR: char = ';';

pub const REPORT_COLUMNS: [&str; 6] = [
    "Sensor ID",
    "Type",
    "Raw Data",
    "Preprocessed Data (hex)",
    "Processed Value",
    "Date",
];

/// Summary block, blank line, column header, one row per measurement.
pub fn report_csv(measurements: &[DecodedMeasurement], summary: &BatchSummary) -> String {
    let mut out = format!(
        "Total objects received;{}\nRecords with errors;{}\nRecords without errors;{}\n\n",
        summary.total, summary.errors, summary.valid
    );

    out.push_str(&REPORT_COLUMNS.join(";"));
    out.push('\n');

    for m in measurements {
        let row = [
            tag_label(m.sensor_type_tag),
            m.sensor_type().label().to_string(),
            m.raw_data.clone(),
            to_hex(&m.payload),
            format!("{:.6}", m.value),
            m.timestamp.clone(),
        ];
        out.push_str(&row.join(";"));
        out.push('\n');
    }

    out
}

/// Compact per-reading export in local time.
pub fn readings_csv(measurements: &[DecodedMeasurement]) -> String {
    readings_csv_in(measurements, &Local)
}

/// `ID,Date,Time,CO2 (ppm)` with date and time rendered in `tz`.
pub fn readings_csv_in<Tz: TimeZone>(measurements: &[DecodedMeasurement], tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let mut out = String::from("ID,Date,Time,CO2 (ppm)\n");
    for m in measurements {
        let local = m.date.with_timezone(tz);
        out.push_str(&format!(
            "{},{},{},{:.2}\n",
            m.id,
            local.format("%Y-%m-%d"),
            local.format("%H:%M:%S"),
            m.value
        ));
    }
    out
}

/// Suggested download name, e.g. `co2-data-2024-01-01.csv`.
pub fn export_file_name(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{}-{}.csv", prefix, at.with_timezone(&Local).format("%Y-%m-%d"))
}
