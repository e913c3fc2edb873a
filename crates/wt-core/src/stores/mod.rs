//! Narrow interfaces to the external collaborators.
//!
//! The core treats persistence as a key-value/append log, subscriber settings
//! as a read-only listing refreshed per evaluation, and delivery as a
//! fire-per-subscriber call. Schema ownership, rendering, and transport all
//! live outside this workspace; [`memory`] ships in-memory implementations
//! used by the runner's default wiring and by tests.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{AlertPayload, Market, PricePoint, SubscriberProfile};

/// Price-history append log plus market snapshot store.
///
/// Each method is a single logical statement; the core never needs multi-step
/// transactions.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    /// Append one price-history point.
    async fn append_price_point(&self, point: &PricePoint) -> Result<()>;

    /// Read one market's history points with `ts_ms >= since_ts_ms`,
    /// ascending by timestamp.
    async fn read_price_history(&self, ticker: &str, since_ts_ms: u64) -> Result<Vec<PricePoint>>;

    /// Read all markets' history points with `ts_ms >= since_ts_ms`,
    /// ascending by timestamp.
    async fn read_history_window(&self, since_ts_ms: u64) -> Result<Vec<PricePoint>>;

    /// Insert or replace the persisted snapshot for a market.
    async fn upsert_market_snapshot(&self, market: &Market) -> Result<()>;

    /// Read the persisted snapshot for a market, if any.
    async fn read_market_snapshot(&self, ticker: &str) -> Result<Option<Market>>;

    /// Delete history points older than `cutoff_ts_ms` (oldest-first
    /// retention trim). Returns the number of points removed.
    async fn trim_history(&self, cutoff_ts_ms: u64) -> Result<usize>;
}

/// Subscriber-settings collaborator.
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    /// All profiles with alerts enabled. Polled at alert-evaluation time,
    /// never cached across trades.
    async fn list_enabled_subscribers(&self) -> Result<Vec<SubscriberProfile>>;
}

/// Delivery collaborator. The core decides *whether* and *to whom*; the sink
/// decides how the payload is rendered and transmitted.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn send(&self, subscriber_id: i64, payload: &AlertPayload) -> Result<()>;
}
