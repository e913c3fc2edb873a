//! In-memory collaborator implementations.
//!
//! [`MemoryStore`] backs the runner's default wiring and the test suites.
//! History is an append-only vector trimmed oldest-first; snapshots are a
//! ticker-keyed map. All operations are single short critical sections.

use std::sync::Mutex;

use ahash::AHashMap;
use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use super::{DeliverySink, PersistenceStore, SubscriberStore};
use crate::types::{AlertPayload, Market, PricePoint, SubscriberProfile};

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-memory [`PersistenceStore`].
#[derive(Default)]
pub struct MemoryStore {
    history: Mutex<Vec<PricePoint>>,
    snapshots: Mutex<AHashMap<String, Market>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of history points currently held.
    pub fn history_len(&self) -> usize {
        self.history.lock().unwrap().len()
    }
}

#[async_trait]
impl PersistenceStore for MemoryStore {
    async fn append_price_point(&self, point: &PricePoint) -> Result<()> {
        self.history.lock().unwrap().push(point.clone());
        Ok(())
    }

    async fn read_price_history(&self, ticker: &str, since_ts_ms: u64) -> Result<Vec<PricePoint>> {
        let mut points: Vec<PricePoint> = self
            .history
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.market_ticker == ticker && p.ts_ms >= since_ts_ms)
            .cloned()
            .collect();
        points.sort_by_key(|p| p.ts_ms);
        Ok(points)
    }

    async fn read_history_window(&self, since_ts_ms: u64) -> Result<Vec<PricePoint>> {
        let mut points: Vec<PricePoint> = self
            .history
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.ts_ms >= since_ts_ms)
            .cloned()
            .collect();
        points.sort_by_key(|p| p.ts_ms);
        Ok(points)
    }

    async fn upsert_market_snapshot(&self, market: &Market) -> Result<()> {
        self.snapshots.lock().unwrap().insert(market.ticker.clone(), market.clone());
        Ok(())
    }

    async fn read_market_snapshot(&self, ticker: &str) -> Result<Option<Market>> {
        Ok(self.snapshots.lock().unwrap().get(ticker).cloned())
    }

    async fn trim_history(&self, cutoff_ts_ms: u64) -> Result<usize> {
        let mut history = self.history.lock().unwrap();
        let before = history.len();
        history.retain(|p| p.ts_ms >= cutoff_ts_ms);
        Ok(before - history.len())
    }
}

// ---------------------------------------------------------------------------
// MemorySubscribers
// ---------------------------------------------------------------------------

/// In-memory [`SubscriberStore`] seeded from config or tests.
#[derive(Default)]
pub struct MemorySubscribers {
    profiles: Mutex<Vec<SubscriberProfile>>,
}

impl MemorySubscribers {
    pub fn new(profiles: Vec<SubscriberProfile>) -> Self {
        Self { profiles: Mutex::new(profiles) }
    }

    /// Replace the full profile list.
    pub fn set(&self, profiles: Vec<SubscriberProfile>) {
        *self.profiles.lock().unwrap() = profiles;
    }
}

#[async_trait]
impl SubscriberStore for MemorySubscribers {
    async fn list_enabled_subscribers(&self) -> Result<Vec<SubscriberProfile>> {
        Ok(self.profiles.lock().unwrap().iter().filter(|p| p.enabled).cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// LogDelivery
// ---------------------------------------------------------------------------

/// [`DeliverySink`] that logs each alert instead of transmitting it. The
/// runner's default when no real delivery collaborator is wired.
#[derive(Default)]
pub struct LogDelivery;

#[async_trait]
impl DeliverySink for LogDelivery {
    async fn send(&self, subscriber_id: i64, payload: &AlertPayload) -> Result<()> {
        info!(
            "[delivery] subscriber={} {} {} ${:.0} ({:.0} @ ${:.2}) at {}",
            subscriber_id,
            payload.market_ticker,
            payload.side,
            payload.notional,
            payload.size,
            payload.price,
            payload.local_time,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(ticker: &str, price: f64, ts_ms: u64) -> PricePoint {
        PricePoint { market_ticker: ticker.into(), price, notional: price * 100.0, ts_ms }
    }

    #[tokio::test]
    async fn history_window_filters_and_sorts() {
        let store = MemoryStore::new();
        store.append_price_point(&point("A", 0.5, 300)).await.unwrap();
        store.append_price_point(&point("A", 0.4, 100)).await.unwrap();
        store.append_price_point(&point("B", 0.6, 200)).await.unwrap();

        let a = store.read_price_history("A", 0).await.unwrap();
        assert_eq!(a.len(), 2);
        assert!(a[0].ts_ms < a[1].ts_ms);

        let recent = store.read_history_window(200).await.unwrap();
        assert_eq!(recent.len(), 2);
    }

    #[tokio::test]
    async fn trim_removes_only_older_points() {
        let store = MemoryStore::new();
        store.append_price_point(&point("A", 0.4, 100)).await.unwrap();
        store.append_price_point(&point("A", 0.5, 200)).await.unwrap();
        let removed = store.trim_history(150).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.history_len(), 1);
        assert_eq!(store.read_price_history("A", 0).await.unwrap()[0].ts_ms, 200);
    }

    #[tokio::test]
    async fn snapshot_round_trip() {
        let store = MemoryStore::new();
        let market = Market { ticker: "A".into(), last_price: 0.55, ..Default::default() };
        store.upsert_market_snapshot(&market).await.unwrap();
        let got = store.read_market_snapshot("A").await.unwrap().unwrap();
        assert_eq!(got.last_price, 0.55);
        assert!(store.read_market_snapshot("B").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn disabled_subscribers_filtered() {
        let subs = MemorySubscribers::new(vec![
            SubscriberProfile {
                subscriber_id: 1,
                enabled: true,
                min_notional: 1000.0,
                topics: vec![],
                timezone: "UTC".into(),
            },
            SubscriberProfile {
                subscriber_id: 2,
                enabled: false,
                min_notional: 1000.0,
                topics: vec![],
                timezone: "UTC".into(),
            },
        ]);
        let enabled = subs.list_enabled_subscribers().await.unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].subscriber_id, 1);
    }
}
