//! REST fallback client.
//!
//! Used when the stream is not ready or a correlated query times out. Only
//! the narrow snapshot lookup lives here; catalog search and other static
//! pass-throughs are external collaborators.

use std::time::Duration;

use serde_json::Value;

use wt_core::error::WtError;
use wt_core::time_util;
use wt_core::types::Market;

/// REST client for the feed's fallback query interface.
pub struct FallbackClient {
    http: reqwest::Client,
    base_url: String,
}

impl FallbackClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client construction cannot fail with static options");
        Self { http, base_url: base_url.into() }
    }

    /// Fetch the current snapshot for one market.
    pub async fn market_snapshot(&self, ticker: &str) -> Result<Market, WtError> {
        let url = format!("{}/markets/{}", self.base_url, ticker);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| WtError::Transport(format!("snapshot request failed: {e}")))?;

        let body: Value = resp
            .error_for_status()
            .map_err(|e| WtError::Transport(format!("snapshot HTTP error: {e}")))?
            .json()
            .await
            .map_err(|e| WtError::Parse(format!("snapshot body: {e}")))?;

        parse_market_snapshot(&body)
            .ok_or_else(|| WtError::Parse(format!("malformed snapshot for {ticker}")))
    }
}

/// Parse a market snapshot payload (REST body or correlated query reply).
///
/// Accepts either `{"market": {...}}` or the bare market object. Prices are
/// integer cents on the wire.
pub fn parse_market_snapshot(v: &Value) -> Option<Market> {
    let m = v.get("market").unwrap_or(v);
    let cents = |key: &str| m.get(key).and_then(|x| x.as_u64()).map(|c| c as f64 / 100.0);

    Some(Market {
        ticker: m.get("ticker")?.as_str()?.to_string(),
        title: m.get("title").and_then(|t| t.as_str()).unwrap_or_default().to_string(),
        tags: m
            .get("tags")
            .and_then(|t| t.as_array())
            .map(|arr| {
                arr.iter().filter_map(|x| x.as_str()).map(str::to_string).collect()
            })
            .unwrap_or_default(),
        last_price: cents("last_price")?,
        reference_price_24h: cents("previous_price"),
        yes_bid: cents("yes_bid").unwrap_or(0.0),
        yes_ask: cents("yes_ask").unwrap_or(0.0),
        volume_24h: m.get("volume_24h").and_then(|x| x.as_f64()).unwrap_or(0.0),
        updated_ts_ms: m
            .get("ts")
            .and_then(|t| t.as_u64())
            .map(|s| s * 1000)
            .unwrap_or_else(time_util::now_ms),
    })
}
