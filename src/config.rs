//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `dashboard.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - PollingConfig: How often the uplink endpoint is polled.
//!     - SourceConfig: Endpoint URL, request timeout, demo-mode toggle.
//!     - DecoderConfig: Accepted CO2 range.
//!     - MockConfig: Shape of the demonstration data.
//!     - ServerConfig: Where the dashboard listens.
//!     - LoggingConfig: Log level and per-reading output.
//!
//! ==============================================================================

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::mock::{DEFAULT_SPIKE_PROBABILITY, MAX_MOCK_DAYS};
use crate::payload::{PayloadDecoder, DEFAULT_CO2_MAX_PPM, DEFAULT_CO2_MIN_PPM};

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct DashboardConfig {
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub decoder: DecoderConfig,
    #[serde(default)]
    pub mock: MockConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    pub interval_seconds: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_seconds: 60 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub endpoint_url: String,
    /// serve demonstration data without contacting the endpoint
    #[serde(default)]
    pub use_mock: bool,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "http://127.0.0.1:8080/sensores".to_string(),
            use_mock: false,
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DecoderConfig {
    pub co2_min_ppm: f32,
    pub co2_max_ppm: f32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            co2_min_ppm: DEFAULT_CO2_MIN_PPM,
            co2_max_ppm: DEFAULT_CO2_MAX_PPM,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MockConfig {
    pub days: u32,
    pub spike_probability: f64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            days: 3,
            spike_probability: DEFAULT_SPIKE_PROBABILITY,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0:3000".to_string() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub show_sensor_data: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_sensor_data: false }
    }
}

impl DashboardConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        let config: DashboardConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))?;

        config.validate()?;
        Ok(config)
    }

    /// Load with default fallback
    pub fn load_or_default() -> Self {
        let paths = [
            std::path::PathBuf::from("config").join("dashboard.toml"),
            std::path::PathBuf::from("..").join("config").join("dashboard.toml"),
        ];

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        tracing::info!("[CONFIG] Loaded from {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("[CONFIG] Failed to load {}: {}", path.display(), e);
                    }
                }
            }
        }

        tracing::warn!("[CONFIG] No config file found - using defaults");
        Self::default()
    }

    fn validate(&self) -> anyhow::Result<()> {
        let d = &self.decoder;
        if !(d.co2_min_ppm.is_finite() && d.co2_max_ppm.is_finite()) || d.co2_min_ppm > d.co2_max_ppm {
            anyhow::bail!(
                "invalid co2 range [{}, {}]",
                d.co2_min_ppm,
                d.co2_max_ppm
            );
        }
        if self.polling.interval_seconds == 0 {
            anyhow::bail!("polling.interval_seconds must be positive");
        }
        let p = self.mock.spike_probability;
        if !(0.0..=1.0).contains(&p) {
            anyhow::bail!("mock.spike_probability must be within [0, 1], got {}", p);
        }
        if self.mock.days > MAX_MOCK_DAYS {
            anyhow::bail!("mock.days must be at most {}, got {}", MAX_MOCK_DAYS, self.mock.days);
        }
        Ok(())
    }

    pub fn payload_decoder(&self) -> PayloadDecoder {
        PayloadDecoder::new(self.decoder.co2_min_ppm..=self.decoder.co2_max_ppm)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.polling.interval_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.source.request_timeout_seconds)
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("┌─────────────────────────────────────────┐");
        println!("│         DASHBOARD CONFIGURATION         │");
        println!("├─────────────────────────────────────────┤");
        println!("│ Endpoint: {}", self.source.endpoint_url);
        println!("│ Demo Mode: {}", self.source.use_mock);
        println!("│ Poll Interval: {}s", self.polling.interval_seconds);
        println!("│ CO2 Range: {}-{} ppm", self.decoder.co2_min_ppm, self.decoder.co2_max_ppm);
        println!("│ Listen: {}", self.server.bind);
        println!("│ Log Level: {}", self.logging.level);
        println!("└─────────────────────────────────────────┘");
    }
}
