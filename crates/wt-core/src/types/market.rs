//! Market-state and trade structures — the core data flowing through the
//! pipeline.
//!
//! # Price convention
//!
//! The feed quotes prediction-market prices as integer cents of the *yes*
//! side (0–100). Parsers normalize to dollars at the edge and, for trades,
//! convert to the taker-side execution price, so that downstream code can
//! always compute notional as `price * size`.
//!
//! # Timestamp convention
//!
//! All timestamps are **milliseconds since Unix epoch**.

use serde::{Deserialize, Serialize};

use super::enums::TradeSide;

// ---------------------------------------------------------------------------
// Market
// ---------------------------------------------------------------------------

/// Latest known state of one market.
///
/// Mutated only by the market-data cache in response to router events or
/// fallback fetches; readers receive clones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Market {
    /// Exchange ticker, e.g. `"FED-25DEC-T4.75"`.
    pub ticker: String,
    /// Human-readable market title. Empty until metadata is backfilled.
    #[serde(default)]
    pub title: String,
    /// Category tags used for topic filtering. Empty until backfilled.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Last traded yes-price in dollars.
    pub last_price: f64,
    /// Yes-price 24 hours ago, when the fallback snapshot provides it.
    #[serde(default)]
    pub reference_price_24h: Option<f64>,
    /// Best yes bid in dollars.
    #[serde(default)]
    pub yes_bid: f64,
    /// Best yes ask in dollars.
    #[serde(default)]
    pub yes_ask: f64,
    /// Cumulative 24h contract volume.
    #[serde(default)]
    pub volume_24h: f64,
    /// Timestamp of the newest event applied to this state.
    pub updated_ts_ms: u64,
}

impl Market {
    /// Whether title/tags metadata has been resolved for this market.
    pub fn has_metadata(&self) -> bool {
        !self.title.is_empty()
    }
}

/// A market clone tagged with the tier that served it.
#[derive(Debug, Clone)]
pub struct CachedMarket {
    pub market: Market,
    pub source: super::enums::DataSource,
}

// ---------------------------------------------------------------------------
// Trade
// ---------------------------------------------------------------------------

/// A single executed trade. Immutable once constructed.
///
/// Uniqueness key is `(market_ticker, trade_id)`; the ingest pipeline uses it
/// to deduplicate across the stream and fallback paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub market_ticker: String,
    /// Exchange-assigned trade id.
    pub trade_id: String,
    /// Taker-side execution price in dollars.
    pub price: f64,
    /// Yes-side price in dollars. The market-level price axis: history and
    /// trend math use this regardless of which side took the trade.
    pub yes_price: f64,
    /// Contract count.
    pub size: f64,
    pub side: TradeSide,
    pub ts_ms: u64,
}

impl Trade {
    /// Dedup key across stream and fallback observations.
    pub fn dedup_key(&self) -> String {
        format!("{}|{}", self.market_ticker, self.trade_id)
    }

    /// Notional value in dollars: `price * size`.
    pub fn notional(&self) -> f64 {
        self.price * self.size
    }
}

impl std::fmt::Display for Trade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Trade({} {} {:.0}x${:.2} id={})",
            self.market_ticker, self.side, self.size, self.price, self.trade_id
        )
    }
}

// ---------------------------------------------------------------------------
// Ticker / depth events
// ---------------------------------------------------------------------------

/// Best-price and volume update for one market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerEvent {
    pub market_ticker: String,
    /// Last yes-price in dollars.
    pub price: f64,
    #[serde(default)]
    pub yes_bid: f64,
    #[serde(default)]
    pub yes_ask: f64,
    #[serde(default)]
    pub volume_24h: f64,
    pub ts_ms: u64,
}

/// Order book depth delta for one market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthEvent {
    pub market_ticker: String,
    /// Price level in dollars.
    pub price: f64,
    /// Signed contract-count change at the level.
    pub delta: f64,
    pub side: TradeSide,
    pub ts_ms: u64,
}

// ---------------------------------------------------------------------------
// Price history
// ---------------------------------------------------------------------------

/// One append-only price-history record, written by the ingest pipeline and
/// read by the trend aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub market_ticker: String,
    /// Yes-price in dollars at the time of the trade.
    pub price: f64,
    /// Notional of the trade that produced the point, for activity ranking.
    pub notional: f64,
    pub ts_ms: u64,
}
