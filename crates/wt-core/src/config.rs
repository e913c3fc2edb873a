//! Configuration parsing for the whale-tracker system.
//!
//! All modules read their settings from a single JSON config file.
//!
//! # Example config
//!
//! ```json
//! {
//!   "feed": {
//!     "ws_url": "wss://api.example.com/stream/v1",
//!     "rest_url": "https://api.example.com/v1",
//!     "api_key_id": "pk_live_...",
//!     "private_key_path": "keys/feed_private.pem",
//!     "markets": []
//!   },
//!   "ingest": { "min_notional": 500.0 },
//!   "trends": { "timezone": "US/Eastern" },
//!   "subscribers": [
//!     { "subscriber_id": 1, "min_notional": 10000.0, "topics": ["Economy"] }
//!   ]
//! }
//! ```

use serde::Deserialize;

use crate::types::SubscriberProfile;

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Stream and fallback endpoint settings.
    pub feed: FeedConfig,

    /// Ingest pipeline tuning.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Trend aggregation settings.
    #[serde(default)]
    pub trends: TrendsConfig,

    /// Seed subscriber profiles for the in-memory subscriber store. Real
    /// deployments replace the store and leave this empty.
    #[serde(default)]
    pub subscribers: Vec<SubscriberProfile>,
}

/// Stream connection and fallback endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// WebSocket stream URL.
    pub ws_url: String,

    /// REST base URL for fallback queries.
    pub rest_url: String,

    /// Public key identifier sent in the handshake. Optional: without
    /// credentials the stream is not started and reads are served via REST.
    #[serde(default)]
    pub api_key_id: Option<String>,

    /// Path to the PEM-encoded Ed25519 private key.
    #[serde(default)]
    pub private_key_path: Option<String>,

    /// Market tickers to subscribe at startup. Empty subscribes the
    /// firehose (all markets) on each channel.
    #[serde(default)]
    pub markets: Vec<String>,

    /// Keepalive ping interval in seconds.
    #[serde(default = "default_ping_interval_sec")]
    pub ping_interval_sec: u64,

    /// Missing-pong window in seconds before the session is treated as lost.
    #[serde(default = "default_pong_timeout_sec")]
    pub pong_timeout_sec: u64,

    /// Reconnect backoff base delay in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Reconnect backoff cap in milliseconds.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Correlated-query timeout in milliseconds before REST fallback.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

/// Ingest pipeline tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Bounded capacity of the router → ingest trade queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// How long the router waits on a full trade queue before dropping the
    /// event (block-with-timeout backpressure policy).
    #[serde(default = "default_enqueue_timeout_ms")]
    pub enqueue_timeout_ms: u64,

    /// Size of the recent-trade-id dedup window.
    #[serde(default = "default_dedup_window")]
    pub dedup_window: usize,

    /// Trades below this notional are discarded before history and alerting.
    #[serde(default = "default_min_notional")]
    pub min_notional: f64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            enqueue_timeout_ms: default_enqueue_timeout_ms(),
            dedup_window: default_dedup_window(),
            min_notional: default_min_notional(),
        }
    }
}

/// Trend aggregation settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TrendsConfig {
    /// Trailing window for gainers/losers/most-active, in hours.
    #[serde(default = "default_window_hours")]
    pub window_hours: u64,

    /// Number of entries per ranking.
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// IANA timezone the daily summary is computed in.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Interval between scheduled trend reports, in seconds.
    #[serde(default = "default_report_interval_sec")]
    pub report_interval_sec: u64,

    /// Price-history retention in hours; older points are trimmed.
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
}

impl Default for TrendsConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
            top_n: default_top_n(),
            timezone: default_timezone(),
            report_interval_sec: default_report_interval_sec(),
            retention_hours: default_retention_hours(),
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults (used by serde)
// ---------------------------------------------------------------------------

fn default_ping_interval_sec() -> u64 {
    10
}

fn default_pong_timeout_sec() -> u64 {
    30
}

fn default_backoff_base_ms() -> u64 {
    250
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_query_timeout_ms() -> u64 {
    5_000
}

fn default_queue_capacity() -> usize {
    4096
}

fn default_enqueue_timeout_ms() -> u64 {
    250
}

fn default_dedup_window() -> usize {
    8192
}

fn default_min_notional() -> f64 {
    500.0
}

fn default_window_hours() -> u64 {
    24
}

fn default_top_n() -> usize {
    10
}

fn default_timezone() -> String {
    "UTC".into()
}

fn default_report_interval_sec() -> u64 {
    3600
}

fn default_retention_hours() -> u64 {
    72
}

/// Load and parse a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    Ok(config)
}
