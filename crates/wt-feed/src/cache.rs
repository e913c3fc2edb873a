//! Shared market-data cache with tiered reads.
//!
//! Writes come from the router (stream events) and from fallback fetches;
//! reads come from every consumer. `get` walks the tiers in freshness order —
//! live map, persisted snapshot store, remote fetch — and the first hit wins
//! and backfills the tiers above it. Each result is tagged with its
//! [`DataSource`] so callers and tests can distinguish freshness.
//!
//! Updates are last-writer-by-timestamp: an event older than the cached state
//! is a no-op, regardless of arrival order. Each market has its own lock, so
//! updates for different markets never contend; updates for the same market
//! serialize on its entry mutex.

use std::sync::{Arc, Mutex, RwLock};

use ahash::AHashMap;
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, warn};

use wt_core::error::WtError;
use wt_core::stores::PersistenceStore;
use wt_core::types::{
    CachedMarket, ConnState, DataSource, DepthEvent, Market, TickerEvent, Trade, TradeSide,
};
use wt_core::ws::StreamConnection;

use crate::correlator::RequestCorrelator;
use crate::rest::{FallbackClient, parse_market_snapshot};

/// Stream handles for the query-over-stream remote tier.
pub struct StreamQuery {
    pub conn: Arc<StreamConnection>,
    pub correlator: Arc<RequestCorrelator>,
}

/// Shared in-memory snapshot of the latest known state per market.
pub struct MarketDataCache {
    live: RwLock<AHashMap<String, Arc<Mutex<Market>>>>,
    store: Arc<dyn PersistenceStore>,
    rest: Arc<FallbackClient>,
    stream: Option<StreamQuery>,
    state_rx: watch::Receiver<ConnState>,
}

impl MarketDataCache {
    pub fn new(
        store: Arc<dyn PersistenceStore>,
        rest: Arc<FallbackClient>,
        stream: Option<StreamQuery>,
        state_rx: watch::Receiver<ConnState>,
    ) -> Self {
        Self { live: RwLock::new(AHashMap::new()), store, rest, stream, state_rx }
    }

    fn stream_ready(&self) -> bool {
        *self.state_rx.borrow() == ConnState::Ready
    }

    /// Get or create the live entry for a market.
    fn entry(&self, ticker: &str) -> Arc<Mutex<Market>> {
        if let Some(entry) = self.live.read().unwrap().get(ticker) {
            return Arc::clone(entry);
        }
        let mut map = self.live.write().unwrap();
        Arc::clone(map.entry(ticker.to_string()).or_insert_with(|| {
            Arc::new(Mutex::new(Market { ticker: ticker.to_string(), ..Default::default() }))
        }))
    }

    // -----------------------------------------------------------------------
    // Writes (router + fallback backfill)
    // -----------------------------------------------------------------------

    /// Apply a ticker update. Returns `false` when the event is older than
    /// the cached state (no-op).
    pub fn apply_ticker(&self, ev: &TickerEvent) -> bool {
        let entry = self.entry(&ev.market_ticker);
        let mut market = entry.lock().unwrap();
        if ev.ts_ms <= market.updated_ts_ms {
            return false;
        }
        market.last_price = ev.price;
        market.yes_bid = ev.yes_bid;
        market.yes_ask = ev.yes_ask;
        market.volume_24h = ev.volume_24h;
        market.updated_ts_ms = ev.ts_ms;
        true
    }

    /// Apply a trade's market-level effect (last price moves to the yes
    /// price of the fill). Returns `false` on a stale timestamp.
    pub fn apply_trade(&self, trade: &Trade) -> bool {
        let entry = self.entry(&trade.market_ticker);
        let mut market = entry.lock().unwrap();
        if trade.ts_ms <= market.updated_ts_ms {
            return false;
        }
        market.last_price = trade.yes_price;
        market.volume_24h += trade.size;
        market.updated_ts_ms = trade.ts_ms;
        true
    }

    /// Apply an order-book delta: an added level can improve the touch.
    /// A "no" level at price p is an implied yes ask at 1 − p.
    pub fn apply_depth(&self, ev: &DepthEvent) -> bool {
        let entry = self.entry(&ev.market_ticker);
        let mut market = entry.lock().unwrap();
        if ev.ts_ms <= market.updated_ts_ms {
            return false;
        }
        if ev.delta > 0.0 {
            match ev.side {
                TradeSide::Yes => {
                    if ev.price > market.yes_bid {
                        market.yes_bid = ev.price;
                    }
                }
                TradeSide::No => {
                    let implied_ask = 1.0 - ev.price;
                    if market.yes_ask == 0.0 || implied_ask < market.yes_ask {
                        market.yes_ask = implied_ask;
                    }
                }
            }
        }
        market.updated_ts_ms = ev.ts_ms;
        true
    }

    /// Merge a snapshot from a lower tier into the live map.
    ///
    /// The live state wins on price fields when it is at least as fresh; a
    /// fresh snapshot that disagrees with fresher live data is logged as a
    /// reconciliation warning rather than merged.
    fn backfill_live(&self, snapshot: &Market) -> Market {
        let entry = self.entry(&snapshot.ticker);
        let mut market = entry.lock().unwrap();

        if market.updated_ts_ms == 0 {
            *market = snapshot.clone();
            return market.clone();
        }

        if snapshot.updated_ts_ms > market.updated_ts_ms {
            if (snapshot.last_price - market.last_price).abs() > f64::EPSILON {
                warn!(
                    "[cache] {}: persisted snapshot (ts={}, price={:.2}) newer than live \
                     (ts={}, price={:.2}) — trusting live",
                    market.ticker,
                    snapshot.updated_ts_ms,
                    snapshot.last_price,
                    market.updated_ts_ms,
                    market.last_price,
                );
            }
        }

        // Metadata is not carried on stream events; adopt it from any tier.
        if !market.has_metadata() && snapshot.has_metadata() {
            market.title = snapshot.title.clone();
            market.tags = snapshot.tags.clone();
        }
        if market.reference_price_24h.is_none() {
            market.reference_price_24h = snapshot.reference_price_24h;
        }
        market.clone()
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Freshest known state for a market, walking live → persisted → remote.
    pub async fn get(&self, ticker: &str) -> Result<CachedMarket, WtError> {
        // Tier 1: live map, only while the stream is trustworthy.
        if self.stream_ready() {
            let live = self
                .live
                .read()
                .unwrap()
                .get(ticker)
                .map(|entry| entry.lock().unwrap().clone());
            if let Some(market) = live {
                if market.updated_ts_ms > 0 && market.has_metadata() {
                    return Ok(CachedMarket { market, source: DataSource::LiveCache });
                }
            }
        }

        // Tier 2: persisted snapshot store.
        match self.store.read_market_snapshot(ticker).await {
            Ok(Some(snapshot)) => {
                let market = self.backfill_live(&snapshot);
                return Ok(CachedMarket { market, source: DataSource::PersistedCache });
            }
            Ok(None) => {}
            Err(e) => warn!("[cache] snapshot read failed for {ticker}: {e}"),
        }

        // Tier 3: remote fetch, backfilling both tiers above.
        let market = self.fetch_remote(ticker).await?;
        if let Err(e) = self.store.upsert_market_snapshot(&market).await {
            warn!("[cache] snapshot backfill failed for {ticker}: {e}");
        }
        let market = self.backfill_live(&market);
        Ok(CachedMarket { market, source: DataSource::FallbackFetch })
    }

    /// Query the stream when it is ready, falling back to REST on timeout or
    /// any stream-side failure.
    async fn fetch_remote(&self, ticker: &str) -> Result<Market, WtError> {
        if let Some(stream) = &self.stream {
            if self.stream_ready() {
                match stream
                    .correlator
                    .query(&stream.conn, "get_market", json!({ "ticker": ticker }))
                    .await
                {
                    Ok(msg) => {
                        if let Some(market) = parse_market_snapshot(&msg) {
                            return Ok(market);
                        }
                        warn!("[cache] malformed get_market reply for {ticker}, trying REST");
                    }
                    Err(e @ WtError::Timeout(_)) => {
                        warn!("[cache] get_market timed out for {ticker}: {e}, trying REST");
                    }
                    Err(e) => {
                        debug!("[cache] get_market failed for {ticker}: {e}, trying REST");
                    }
                }
            }
        }
        self.rest.market_snapshot(ticker).await
    }
}
