//! CO2 uplink dashboard host.
//!
//! Polls a gateway endpoint for sensor uplinks, decodes the 5-byte payload
//! carried in each record, and serves cleaned series, hourly averages and
//! CSV exports over http.

pub mod aggregate;
pub mod config;
pub mod domain;
pub mod error;
pub mod export;
pub mod mock;
pub mod payload;
pub mod pipeline;
pub mod server;
pub mod source;

pub use domain::{BatchSummary, DashboardSnapshot, DataSource, DecodedMeasurement, HourlyAverage};
pub use error::{DecodeError, PipelineError, RecordError, SourceError};
pub use payload::{decode, PayloadDecoder};
pub use pipeline::{process_batch, BatchProcessor, BatchResult};
