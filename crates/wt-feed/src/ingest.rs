//! Trade ingest pipeline.
//!
//! For each trade from the router: dedup against a bounded recent-id window,
//! apply the minimum-notional floor, append a price-history point, evaluate
//! every enabled subscriber profile, and emit one alert job per qualifying
//! trade. History persistence and alerting are isolated failure domains: a
//! failed append never blocks alert evaluation, and vice versa.
//!
//! A duplicate trade (stream replay, fallback overlap, reconnect duplication)
//! is discarded silently — it is the correctness backstop for the absence of
//! cross-reconnect ordering guarantees, not an error.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use wt_core::config::IngestConfig;
use wt_core::dedup::RecentKeyWindow;
use wt_core::stores::{PersistenceStore, SubscriberStore};
use wt_core::types::{AlertJob, AlertMatch, PricePoint, Trade};

use crate::cache::MarketDataCache;

/// Run the ingest worker until the trade channel closes.
pub async fn run_ingest(
    mut trade_rx: mpsc::Receiver<Trade>,
    cache: Arc<MarketDataCache>,
    store: Arc<dyn PersistenceStore>,
    subscribers: Arc<dyn SubscriberStore>,
    alert_tx: mpsc::Sender<AlertJob>,
    config: IngestConfig,
) {
    let mut dedup = RecentKeyWindow::new(config.dedup_window);
    let enqueue_timeout = Duration::from_millis(config.enqueue_timeout_ms);
    let mut seq: u64 = 0;

    while let Some(trade) = trade_rx.recv().await {
        // (a) At-most-once: a trade id seen within the window is discarded
        // silently, however it arrived.
        if !dedup.insert(&trade.dedup_key()) {
            debug!("[ingest] duplicate {} discarded", trade);
            continue;
        }

        // (b) Notional, with the ingest floor.
        let notional = trade.notional();
        if notional < config.min_notional {
            continue;
        }

        // (c) History append — isolated from alerting.
        let point = PricePoint {
            market_ticker: trade.market_ticker.clone(),
            price: trade.yes_price,
            notional,
            ts_ms: trade.ts_ms,
        };
        if let Err(e) = store.append_price_point(&point).await {
            warn!("[ingest] history append failed for {}: {e} — alerting continues", trade);
        }

        // Market context for topic matching; a cache miss degrades to an
        // untagged market rather than blocking the trade.
        let (title, tags) = match cache.get(&trade.market_ticker).await {
            Ok(hit) => (hit.market.title, hit.market.tags),
            Err(e) => {
                debug!("[ingest] no market context for {}: {e}", trade.market_ticker);
                (String::new(), Vec::new())
            }
        };

        // (d) Evaluate subscriber filters, refreshed per trade.
        let profiles = match subscribers.list_enabled_subscribers().await {
            Ok(profiles) => profiles,
            Err(e) => {
                warn!("[ingest] subscriber listing failed: {e}");
                continue;
            }
        };
        let matches: Vec<AlertMatch> = profiles
            .iter()
            .filter(|p| notional >= p.min_notional && p.topic_matches(&tags))
            .map(|p| AlertMatch { subscriber_id: p.subscriber_id, timezone: p.timezone.clone() })
            .collect();

        if matches.is_empty() {
            continue;
        }

        // (e) Hand the job to the fanout.
        seq += 1;
        let job = AlertJob {
            seq,
            notional,
            market_title: if title.is_empty() { trade.market_ticker.clone() } else { title },
            tags,
            trade,
            matches,
        };
        match alert_tx.send_timeout(job, enqueue_timeout).await {
            Ok(()) => {}
            Err(mpsc::error::SendTimeoutError::Timeout(job)) => {
                warn!("[ingest] alert queue full, dropped job seq={}", job.seq);
            }
            Err(mpsc::error::SendTimeoutError::Closed(_)) => {
                warn!("[ingest] alert queue closed, stopping");
                return;
            }
        }
    }

    debug!("[ingest] trade channel closed, exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use tokio::sync::watch;

    use wt_core::stores::memory::{MemoryStore, MemorySubscribers};
    use wt_core::types::{ConnState, Market, SubscriberProfile, TradeSide};

    use crate::rest::FallbackClient;

    struct Fixture {
        trade_tx: mpsc::Sender<Trade>,
        alert_rx: mpsc::Receiver<AlertJob>,
        _state_tx: watch::Sender<ConnState>,
    }

    async fn start_ingest(profiles: Vec<SubscriberProfile>, market: Option<Market>) -> Fixture {
        start_ingest_with_store(Arc::new(MemoryStore::new()), profiles, market).await
    }

    async fn start_ingest_with_store(
        history: Arc<dyn PersistenceStore>,
        profiles: Vec<SubscriberProfile>,
        market: Option<Market>,
    ) -> Fixture {
        // The cache reads snapshots from its own store so history failures
        // stay isolated from metadata lookups.
        let snapshot_store = Arc::new(MemoryStore::new());
        if let Some(market) = market {
            snapshot_store.upsert_market_snapshot(&market).await.unwrap();
        }
        let (state_tx, state_rx) = watch::channel(ConnState::Reconnecting);
        let cache = Arc::new(MarketDataCache::new(
            snapshot_store,
            Arc::new(FallbackClient::new("http://127.0.0.1:9")),
            None,
            state_rx,
        ));

        let (trade_tx, trade_rx) = mpsc::channel(64);
        let (alert_tx, alert_rx) = mpsc::channel(64);

        tokio::spawn(run_ingest(
            trade_rx,
            cache,
            history,
            Arc::new(MemorySubscribers::new(profiles)),
            alert_tx,
            IngestConfig::default(),
        ));

        Fixture { trade_tx, alert_rx, _state_tx: state_tx }
    }

    fn trade(id: &str, yes_price: f64, size: f64, ts_ms: u64) -> Trade {
        Trade {
            market_ticker: "FED-25DEC".into(),
            trade_id: id.into(),
            price: yes_price,
            yes_price,
            size,
            side: TradeSide::Yes,
            ts_ms,
        }
    }

    fn subscriber(id: i64, min_notional: f64, topics: &[&str]) -> SubscriberProfile {
        SubscriberProfile {
            subscriber_id: id,
            enabled: true,
            min_notional,
            topics: topics.iter().map(|s| s.to_string()).collect(),
            timezone: "UTC".into(),
        }
    }

    fn tagged_market() -> Market {
        Market {
            ticker: "FED-25DEC".into(),
            title: "Fed cuts rates?".into(),
            tags: vec!["Economy".into()],
            last_price: 0.40,
            updated_ts_ms: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn duplicate_trade_yields_one_point_and_one_job() {
        let store = Arc::new(MemoryStore::new());
        let mut fx = start_ingest_with_store(
            store.clone(),
            vec![subscriber(1, 1000.0, &[])],
            Some(tagged_market()),
        )
        .await;

        // Same exchange trade id observed twice, seconds apart (stream then
        // fallback replay).
        fx.trade_tx.send(trade("t-1", 0.40, 25000.0, 1_000)).await.unwrap();
        fx.trade_tx.send(trade("t-1", 0.40, 25000.0, 4_000)).await.unwrap();
        fx.trade_tx.send(trade("t-2", 0.40, 25000.0, 5_000)).await.unwrap();

        let first = fx.alert_rx.recv().await.unwrap();
        assert_eq!(first.trade.trade_id, "t-1");
        let second = fx.alert_rx.recv().await.unwrap();
        assert_eq!(second.trade.trade_id, "t-2");

        assert_eq!(store.history_len(), 2); // exactly one point per unique trade
    }

    #[tokio::test]
    async fn threshold_boundary_is_inclusive() {
        let mut fx =
            start_ingest(vec![subscriber(1, 10_000.0, &[])], Some(tagged_market())).await;

        // $9,999 notional → no alert; $10,001 → alert.
        fx.trade_tx.send(trade("t-low", 0.9999, 10_000.0, 1_000)).await.unwrap();
        fx.trade_tx.send(trade("t-high", 1.0001, 10_000.0, 2_000)).await.unwrap();

        let job = fx.alert_rx.recv().await.unwrap();
        assert_eq!(job.trade.trade_id, "t-high");
        assert_eq!(job.matches.len(), 1);
    }

    #[tokio::test]
    async fn topic_filter_selects_subscribers() {
        let mut fx = start_ingest(
            vec![
                subscriber(1, 1000.0, &["Economy"]),
                subscriber(2, 1000.0, &["Sports"]),
                subscriber(3, 1000.0, &[]),
            ],
            Some(tagged_market()),
        )
        .await;

        fx.trade_tx.send(trade("t-1", 0.40, 25000.0, 1_000)).await.unwrap();
        let job = fx.alert_rx.recv().await.unwrap();
        let ids: Vec<i64> = job.matches.iter().map(|m| m.subscriber_id).collect();
        assert_eq!(ids, vec![1, 3]); // Sports-only subscriber filtered out
        assert_eq!(job.market_title, "Fed cuts rates?");
    }

    #[tokio::test]
    async fn sub_floor_trades_are_not_persisted() {
        let store = Arc::new(MemoryStore::new());
        let mut fx = start_ingest_with_store(
            store.clone(),
            vec![subscriber(1, 100.0, &[])],
            Some(tagged_market()),
        )
        .await;

        fx.trade_tx.send(trade("t-small", 0.40, 100.0, 1_000)).await.unwrap(); // $40
        fx.trade_tx.send(trade("t-big", 0.40, 25000.0, 2_000)).await.unwrap();

        let job = fx.alert_rx.recv().await.unwrap();
        assert_eq!(job.trade.trade_id, "t-big");
        assert_eq!(store.history_len(), 1);
    }

    struct FailingHistory;

    #[async_trait]
    impl PersistenceStore for FailingHistory {
        async fn append_price_point(&self, _point: &PricePoint) -> Result<()> {
            Err(anyhow!("disk full"))
        }
        async fn read_price_history(&self, _t: &str, _s: u64) -> Result<Vec<PricePoint>> {
            Ok(vec![])
        }
        async fn read_history_window(&self, _s: u64) -> Result<Vec<PricePoint>> {
            Ok(vec![])
        }
        async fn upsert_market_snapshot(&self, _m: &Market) -> Result<()> {
            Ok(())
        }
        async fn read_market_snapshot(&self, _t: &str) -> Result<Option<Market>> {
            Ok(None)
        }
        async fn trim_history(&self, _c: u64) -> Result<usize> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn history_failure_does_not_block_alerting() {
        let mut fx = start_ingest_with_store(
            Arc::new(FailingHistory),
            vec![subscriber(1, 1000.0, &[])],
            Some(tagged_market()),
        )
        .await;

        fx.trade_tx.send(trade("t-1", 0.40, 25000.0, 1_000)).await.unwrap();
        let job = fx.alert_rx.recv().await.unwrap();
        assert_eq!(job.matches.len(), 1);
    }

    #[tokio::test]
    async fn jobs_carry_monotonic_sequence_numbers() {
        let mut fx = start_ingest(vec![subscriber(1, 100.0, &[])], Some(tagged_market())).await;
        fx.trade_tx.send(trade("t-1", 0.40, 25000.0, 1_000)).await.unwrap();
        fx.trade_tx.send(trade("t-2", 0.40, 25000.0, 2_000)).await.unwrap();
        let a = fx.alert_rx.recv().await.unwrap();
        let b = fx.alert_rx.recv().await.unwrap();
        assert!(b.seq > a.seq);
    }
}
