//! ==============================================================================
//! source.rs - where a dashboard snapshot comes from
//! ==============================================================================
//!
//! purpose:
//!     two-tier data source. the primary tier fetches the uplink batch over
//!     http and runs it through the pipeline. the fallback tier generates
//!     demonstration data. which tier produced a snapshot is always recorded
//!     in `DashboardSnapshot::source`; the reason for falling back is kept in
//!     `fallback_reason`.
//!
//! fallback triggers:
//!     - demo mode configured (`source.use_mock`)
//!     - request / status / body failure
//!     - the body is not a json array
//!     - the batch contains no valid co2 reading
//!
//! relationships:
//!     - uses: pipeline.rs (BatchProcessor), mock.rs (MockGenerator)
//!     - used by: main.rs (poll loop)
//!
//! ==============================================================================

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::domain::{BatchSummary, DashboardSnapshot, DataSource};
use crate::error::SourceError;
use crate::mock::MockGenerator;
use crate::payload::PayloadDecoder;
use crate::pipeline::BatchProcessor;

/// Something that can hand over the raw uplink batch.
pub trait UplinkSource: Send + Sync {
    fn fetch(&self) -> impl Future<Output = Result<Value, SourceError>> + Send;
}

// ==============================================================================
// http tier
// ==============================================================================

pub struct HttpSource {
    client: reqwest::Client,
    url: String,
}

impl HttpSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let url = url.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| SourceError::Request { url: url.clone(), source })?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl UplinkSource for HttpSource {
    async fn fetch(&self) -> Result<Value, SourceError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|source| SourceError::Request { url: self.url.clone(), source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status { url: self.url.clone(), status: status.as_u16() });
        }

        response.json::<Value>().await.map_err(SourceError::Body)
    }
}

// ==============================================================================
// two-tier feed
// ==============================================================================

/// Shape of the demonstration tier.
#[derive(Debug, Clone)]
pub struct DemoSettings {
    pub days: u32,
    /// serve demo data without trying the primary tier
    pub always: bool,
}

pub struct DataFeed<S> {
    primary: S,
    decoder: PayloadDecoder,
    demo: DemoSettings,
    generator: Mutex<MockGenerator>,
}

impl<S: UplinkSource> DataFeed<S> {
    pub fn new(primary: S, decoder: PayloadDecoder, demo: DemoSettings, generator: MockGenerator) -> Self {
        Self {
            primary,
            decoder,
            demo,
            generator: Mutex::new(generator),
        }
    }

    /// Fetch and process one live batch.
    pub async fn fetch_live(&self) -> Result<DashboardSnapshot, SourceError> {
        let started = Utc::now();
        let body = self.primary.fetch().await?;
        let batch = BatchProcessor::new(self.decoder.clone(), started).process_value(&body)?;

        let summary = batch.summary();
        tracing::info!(
            total = summary.total,
            errors = summary.errors,
            valid = summary.valid,
            filtered = summary.filtered,
            "processed uplink batch"
        );
        if batch.measurements.is_empty() {
            return Err(SourceError::Empty);
        }

        Ok(DashboardSnapshot {
            measurements: batch.measurements,
            summary,
            source: DataSource::Live,
            fetched_at: Some(started),
            fallback_reason: None,
        })
    }

    /// Demo snapshot; `reason` is recorded when it stands in for live data.
    pub async fn demo_snapshot(&self, reason: Option<String>) -> DashboardSnapshot {
        let measurements = self.generator.lock().await.generate(self.demo.days);
        let summary = BatchSummary {
            total: measurements.len(),
            errors: 0,
            valid: measurements.len(),
            filtered: 0,
        };
        DashboardSnapshot {
            measurements,
            summary,
            source: DataSource::Demo,
            fetched_at: Some(Utc::now()),
            fallback_reason: reason,
        }
    }

    /// One refresh cycle. Never fails: a broken primary tier yields a demo
    /// snapshot that says why.
    pub async fn refresh(&self) -> DashboardSnapshot {
        if self.demo.always {
            return self.demo_snapshot(None).await;
        }

        match self.fetch_live().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("[SOURCE] live data unavailable, showing demonstration data: {}", e);
                self.demo_snapshot(Some(e.to_string())).await
            }
        }
    }
}
