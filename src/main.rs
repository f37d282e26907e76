//! ==============================================================================
//! main.rs - co2 uplink dashboard host entry point
//! ==============================================================================
//!
//! purpose:
//!     this is the host process behind the co2 dashboard. it polls the
//!     gateway for sensor uplinks, cleans them into a snapshot and serves
//!     that snapshot to browsers and scripts.
//!
//! responsibilities:
//!     - load configuration (dashboard.toml) and initialise logging
//!     - run the polling loop (fetch -> decode/validate -> replace snapshot)
//!     - fall back to flagged demonstration data when live data is missing
//!     - serve the dashboard, json views and csv exports
//!
//! relationships:
//!     - uses: source.rs (two-tier data feed)
//!     - uses: server.rs (axum router, shared AppContext)
//!     - reads: config/dashboard.toml (via config.rs)
//!
//! architecture:
//!
//!     ┌─────────────────────────────────────────────────────────────┐
//!     │                     host (this file)                         │
//!     │  ┌─────────────────────┐        ┌─────────────────────────┐ │
//!     │  │ poll loop           │        │ web server              │ │
//!     │  │ (interval / notify) │        │ (server.bind)           │ │
//!     │  └──────────┬──────────┘        └────────────┬────────────┘ │
//!     │             │ writes                  reads  │              │
//!     │             └──────────► snapshot ◄──────────┘              │
//!     │                  Arc<RwLock<DashboardSnapshot>>              │
//!     └─────────────────────────────────────────────────────────────┘
//!                   │ http get
//!                   ▼
//!            gateway endpoint (json array of uplinks)
//!
//! ==============================================================================

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use co2_uplink_host::config::DashboardConfig;
use co2_uplink_host::mock::MockGenerator;
use co2_uplink_host::server::{self, AppContext};
use co2_uplink_host::source::{DataFeed, DemoSettings, HttpSource};

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // startup banner
    println!("===========================================================");
    println!("  CO2 Uplink Dashboard Host");
    println!("===========================================================");

    // step 1: load configuration
    // logging depends on the config, so the loader's own messages go to a
    // temporary default subscriber
    let config = tracing::subscriber::with_default(
        tracing_subscriber::fmt().finish(),
        DashboardConfig::load_or_default,
    );
    init_logging(&config.logging.level);
    config.print_summary();

    // step 2: initialize shared state
    let ctx = AppContext::default();

    // step 3: build the data feed (live endpoint + demo fallback)
    let primary = HttpSource::new(config.source.endpoint_url.clone(), config.request_timeout())?;
    let feed = DataFeed::new(
        primary,
        config.payload_decoder(),
        DemoSettings {
            days: config.mock.days,
            always: config.source.use_mock,
        },
        MockGenerator::new(config.mock.spike_probability),
    );

    // step 4: start the web server in background
    let web_ctx = ctx.clone();
    let bind = config.server.bind.clone();
    tokio::spawn(async move {
        tracing::info!("[STARTUP] Dashboard live at http://{}", bind);
        if let Err(e) = server::run_server(&bind, web_ctx).await {
            tracing::error!("[ERROR] Web server error: {:#}", e);
        }
    });

    // step 5: main polling loop
    let poll_interval = config.poll_interval();
    let show_data = config.logging.show_sensor_data;
    tracing::info!("[RUNTIME] Polling {} every {}s", config.source.endpoint_url, poll_interval.as_secs());

    loop {
        let snapshot = feed.refresh().await;

        if show_data {
            for m in &snapshot.measurements {
                tracing::info!("[CO2] {} | {:.1} ppm | {}", m.id, m.value, m.timestamp);
            }
        }
        if snapshot.source.is_demo() {
            tracing::info!("[RUNTIME] Serving {} demonstration readings", snapshot.measurements.len());
        }

        *ctx.snapshot.write().await = snapshot;

        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            _ = ctx.refresh.notified() => {
                tracing::info!("[RUNTIME] Refresh requested");
            }
        }
    }
}
