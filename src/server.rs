//! ==============================================================================
//! server.rs - dashboard web server
//! ==============================================================================
//!
//! routes:
//!     GET  /                 html overview of the current snapshot
//!     GET  /api              full snapshot as json
//!     GET  /api/summary      batch counters + data source
//!     GET  /api/measurements chronological series, ?start=&end= (rfc 3339)
//!     GET  /api/hourly       hourly averages of the same range
//!     GET  /api/export.csv   semicolon report of the whole batch
//!     GET  /api/readings.csv compact per-reading csv of the range
//!     POST /api/refresh      wake the poll loop now
//!
//! the snapshot is read-only here; only the poll loop replaces it.
//!
//! ==============================================================================

use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::{Notify, RwLock};
use tower_http::cors::CorsLayer;

use crate::aggregate::{self, Co2Level};
use crate::domain::{DashboardSnapshot, DecodedMeasurement, HourlyAverage};
use crate::export;

/// Handles shared between the poll loop and the web server.
#[derive(Clone, Default)]
pub struct AppContext {
    pub snapshot: Arc<RwLock<DashboardSnapshot>>,
    pub refresh: Arc<Notify>,
}

pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/", get(dashboard_handler))
        .route("/api", get(api_handler))
        .route("/api/summary", get(summary_handler))
        .route("/api/measurements", get(measurements_handler))
        .route("/api/hourly", get(hourly_handler))
        .route("/api/export.csv", get(report_csv_handler))
        .route("/api/readings.csv", get(readings_csv_handler))
        .route("/api/refresh", post(refresh_handler))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

pub async fn run_server(bind: &str, ctx: AppContext) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, router(ctx)).await?;
    Ok(())
}

// ==============================================================================
// query handling
// ==============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct RangeParams {
    start: Option<String>,
    end: Option<String>,
}

pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({ "status": "error", "message": self.1 }))).into_response()
    }
}

fn parse_bound(name: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>, ApiError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(text) => DateTime::parse_from_rfc3339(text)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| ApiError(StatusCode::BAD_REQUEST, format!("invalid `{}`: {}", name, e))),
    }
}

impl RangeParams {
    /// Chronological measurements inside the requested range.
    fn select(&self, snapshot: &DashboardSnapshot) -> Result<Vec<DecodedMeasurement>, ApiError> {
        let start = parse_bound("start", self.start.as_deref())?;
        let end = parse_bound("end", self.end.as_deref())?;
        let filtered = aggregate::filter_by_date_range(&snapshot.measurements, start, end);
        Ok(aggregate::chronological(&filtered))
    }
}

// ==============================================================================
// handlers
// ==============================================================================

async fn api_handler(State(ctx): State<AppContext>) -> Json<DashboardSnapshot> {
    let snapshot = ctx.snapshot.read().await;
    Json(snapshot.clone())
}

async fn summary_handler(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    let snapshot = ctx.snapshot.read().await;
    Json(serde_json::json!({
        "total": snapshot.summary.total,
        "errors": snapshot.summary.errors,
        "valid": snapshot.summary.valid,
        "filtered": snapshot.summary.filtered,
        "source": snapshot.source,
        "fetched_at": snapshot.fetched_at,
        "fallback_reason": snapshot.fallback_reason,
        "stats": aggregate::summary_stats(&snapshot.measurements),
    }))
}

async fn measurements_handler(
    State(ctx): State<AppContext>,
    Query(params): Query<RangeParams>,
) -> Result<Json<Vec<DecodedMeasurement>>, ApiError> {
    let snapshot = ctx.snapshot.read().await;
    Ok(Json(params.select(&snapshot)?))
}

async fn hourly_handler(
    State(ctx): State<AppContext>,
    Query(params): Query<RangeParams>,
) -> Result<Json<Vec<HourlyAverage>>, ApiError> {
    let snapshot = ctx.snapshot.read().await;
    let selected = params.select(&snapshot)?;
    Ok(Json(aggregate::hourly_averages(&selected)))
}

fn csv_response(body: String, file_name: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", file_name)),
        ],
        body,
    )
        .into_response()
}

async fn report_csv_handler(State(ctx): State<AppContext>) -> Response {
    let snapshot = ctx.snapshot.read().await;
    let body = export::report_csv(&snapshot.measurements, &snapshot.summary);
    csv_response(body, export::export_file_name("uplink-report", Utc::now()))
}

async fn readings_csv_handler(
    State(ctx): State<AppContext>,
    Query(params): Query<RangeParams>,
) -> Result<Response, ApiError> {
    let snapshot = ctx.snapshot.read().await;
    let selected = params.select(&snapshot)?;
    Ok(csv_response(
        export::readings_csv(&selected),
        export::export_file_name("co2-data", Utc::now()),
    ))
}

async fn refresh_handler(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    ctx.refresh.notify_one();
    Json(serde_json::json!({ "status": "ok", "action": "refresh" }))
}

async fn dashboard_handler(State(ctx): State<AppContext>) -> Html<String> {
    let snapshot = ctx.snapshot.read().await;
    Html(render_dashboard(&snapshot))
}

// ==============================================================================
// html
// ==============================================================================

pub fn render_dashboard(snapshot: &DashboardSnapshot) -> String {
    let mut body = String::new();

    if snapshot.source.is_demo() {
        let reason = snapshot
            .fallback_reason
            .as_deref()
            .map(|r| format!(" Live data unavailable: {}", html_escape(r)))
            .unwrap_or_default();
        body.push_str(&format!(
            r#"<div class="banner">Demonstration data, not live readings.{}</div>"#,
            reason
        ));
    }

    let s = &snapshot.summary;
    body.push_str(&format!(
        r#"<section><h2>Batch</h2><p>Total objects received: {}<br>Records with errors: {}<br>Records without errors: {}<br>Other sensor types: {}</p></section>"#,
        s.total, s.errors, s.valid, s.filtered
    ));

    match aggregate::latest(&snapshot.measurements) {
        Some(m) => {
            let level = Co2Level::classify(m.value);
            body.push_str(&format!(
                r#"<section><h2>Latest CO₂</h2><p class="value">{:.2} ppm <span class="{}">{}</span></p><p>{}</p></section>"#,
                m.value,
                if level == Co2Level::High { "high" } else { "normal" },
                level.label(),
                html_escape(&m.timestamp)
            ));
        }
        None => body.push_str("<section><h2>Latest CO₂</h2><p>No readings.</p></section>"),
    }

    body.push_str("<section><h2>Hourly averages</h2><table><tr><th>Hour</th><th>Average (ppm)</th><th>Samples</th></tr>");
    for avg in aggregate::hourly_averages(&snapshot.measurements) {
        body.push_str(&format!(
            "<tr><td>{}</td><td>{:.2}</td><td>{}</td></tr>",
            avg.hour_bucket.format("%Y-%m-%d %H:00"),
            avg.average,
            avg.samples
        ));
    }
    body.push_str("</table></section>");

    format!(
        r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>CO₂ dashboard</title>
<style>
body {{ font-family: system-ui; padding: 2rem; background: #1a1a2e; color: #eee; }}
.banner {{ background: #fff3cd; color: #856404; padding: 0.75rem; border-radius: 8px; }}
.high {{ color: #ff6b6b; }} .normal {{ color: #4caf50; }}
td, th {{ padding: 0.25rem 1rem; text-align: left; }}
</style></head>
<body><h1>CO₂ dashboard</h1>{}</body>
</html>"#,
        body
    )
}

/// escape html special characters to prevent xss
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
