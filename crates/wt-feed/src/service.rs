//! Feed service — explicit construction and lifecycle for the live pipeline.
//!
//! Owns the stream connection, subscription manager, correlator, cache, and
//! the router/ingest worker tasks. Consumers receive the service object from
//! startup wiring; nothing here is process-global. Shutdown drains the
//! pipeline by closing the channels in flow order and fails any in-flight
//! correlated queries with a cancellation error.
//!
//! ```text
//! StreamConnection ──frames──► router ──trades──► ingest ──jobs──► (alert fanout)
//!        │                        │                  │
//!        │ state watch            ▼                  ▼
//!        └──────────────► MarketDataCache ◄── persistence / REST fallback
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{info, warn};

use wt_core::auth::FeedSigner;
use wt_core::config::AppConfig;
use wt_core::stores::{PersistenceStore, SubscriberStore};
use wt_core::types::{AlertJob, Channel, ConnState};
use wt_core::ws::{StreamConfig, StreamConnection, SubscriptionManager};

use crate::cache::{MarketDataCache, StreamQuery};
use crate::correlator::RequestCorrelator;
use crate::ingest::run_ingest;
use crate::rest::FallbackClient;
use crate::router::run_router;

/// Capacity of the connection → router frame channel.
const FRAME_CHANNEL_CAPACITY: usize = 1024;
/// Capacity of the ingest → fanout alert channel.
const ALERT_CHANNEL_CAPACITY: usize = 1024;

/// The assembled live pipeline.
pub struct FeedService {
    conn: Option<Arc<StreamConnection>>,
    subs: Arc<SubscriptionManager>,
    correlator: Arc<RequestCorrelator>,
    cache: Arc<MarketDataCache>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl FeedService {
    /// Build and start the pipeline.
    ///
    /// Returns the service plus the alert-job receiver the caller hands to
    /// the fanout. Without feed credentials the stream is left closed and
    /// cache reads are served through REST only.
    pub async fn start(
        config: &AppConfig,
        store: Arc<dyn PersistenceStore>,
        subscribers: Arc<dyn SubscriberStore>,
    ) -> Result<(Self, mpsc::Receiver<AlertJob>)> {
        let feed = &config.feed;

        let signer = match (&feed.api_key_id, &feed.private_key_path) {
            (Some(key_id), Some(path)) => Some(Arc::new(
                FeedSigner::from_pem_file(key_id.clone(), std::path::Path::new(path))
                    .context("loading feed signing key")?,
            )),
            _ => {
                warn!("[service] no feed credentials — stream disabled, REST fallback only");
                None
            }
        };

        // Desired subscriptions are registered before the connection starts,
        // so the first connect's replay covers them.
        let subs = Arc::new(SubscriptionManager::new());
        if feed.markets.is_empty() {
            let _ = subs.subscribe_all(Channel::Trade).await;
            let _ = subs.subscribe_all(Channel::Ticker).await;
        } else {
            let _ = subs.subscribe(Channel::Trade, &feed.markets).await;
            let _ = subs.subscribe(Channel::Ticker, &feed.markets).await;
            let _ = subs.subscribe(Channel::OrderbookDelta, &feed.markets).await;
        }

        let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let (trade_tx, trade_rx) = mpsc::channel(config.ingest.queue_capacity);
        let (alert_tx, alert_rx) = mpsc::channel(ALERT_CHANNEL_CAPACITY);

        let correlator =
            RequestCorrelator::new(Duration::from_millis(feed.query_timeout_ms));
        let rest = Arc::new(FallbackClient::new(feed.rest_url.clone()));

        let conn = signer.map(|signer| {
            Arc::new(StreamConnection::start(
                StreamConfig {
                    url: feed.ws_url.clone(),
                    ping_interval: Duration::from_secs(feed.ping_interval_sec),
                    pong_timeout: Duration::from_secs(feed.pong_timeout_sec),
                    backoff_base: Duration::from_millis(feed.backoff_base_ms),
                    backoff_max: Duration::from_millis(feed.backoff_max_ms),
                },
                Some(signer),
                subs.clone(),
                frame_tx,
            ))
        });

        // Without a stream the state watch stays pinned to Closed, which
        // steers every cache read to the fallback tiers.
        let state_rx = match &conn {
            Some(conn) => conn.state_watch(),
            None => tokio::sync::watch::channel(ConnState::Closed).1,
        };

        let stream_query = conn.as_ref().map(|conn| StreamQuery {
            conn: conn.clone(),
            correlator: correlator.clone(),
        });
        let cache = Arc::new(MarketDataCache::new(
            store.clone(),
            rest,
            stream_query,
            state_rx.clone(),
        ));

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(run_router(
            frame_rx,
            cache.clone(),
            correlator.clone(),
            trade_tx,
            state_rx,
            Duration::from_millis(config.ingest.enqueue_timeout_ms),
        )));
        tasks.push(tokio::spawn(run_ingest(
            trade_rx,
            cache.clone(),
            store,
            subscribers,
            alert_tx,
            config.ingest.clone(),
        )));

        info!(
            "[service] pipeline started (stream={})",
            if conn.is_some() { "enabled" } else { "disabled" },
        );

        Ok((Self { conn, subs, correlator, cache, tasks }, alert_rx))
    }

    /// Shared market-data cache.
    pub fn cache(&self) -> Arc<MarketDataCache> {
        self.cache.clone()
    }

    /// Current stream state (`Closed` when the stream is disabled).
    pub fn connection_state(&self) -> ConnState {
        self.conn.as_ref().map(|c| c.state()).unwrap_or(ConnState::Closed)
    }

    /// Add markets to a channel's desired set; takes effect on the live
    /// session immediately and is replayed after every reconnect.
    pub async fn subscribe(&self, channel: Channel, tickers: &[String]) {
        let Some(frame) = self.subs.subscribe(channel, tickers).await else {
            return;
        };
        if let Some(conn) = &self.conn {
            if let Err(e) = conn.send(frame).await {
                // Desired set already updated; the next replay covers it.
                warn!("[service] incremental subscribe not sent ({e}), will replay");
            }
        }
    }

    /// Drop markets from a channel's desired set.
    pub async fn unsubscribe(&self, channel: Channel, tickers: &[String]) {
        let Some(frame) = self.subs.unsubscribe(channel, tickers).await else {
            return;
        };
        if let Some(conn) = &self.conn {
            if let Err(e) = conn.send(frame).await {
                warn!("[service] unsubscribe not sent ({e}), desired set updated");
            }
        }
    }

    /// Stop the stream, cancel in-flight queries, and drain the workers.
    pub async fn shutdown(&mut self) {
        if let Some(conn) = &self.conn {
            conn.stop().await;
        }
        self.correlator.cancel_all("service shutdown").await;
        // The connection task dropped its frame sender; the router and
        // ingest workers drain their queues and exit in cascade.
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        info!("[service] stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    use wt_core::config::{FeedConfig, IngestConfig, TrendsConfig};
    use wt_core::stores::memory::{MemoryStore, MemorySubscribers};
    use wt_core::types::{Market, SubscriberProfile};

    fn app_config(port: u16) -> AppConfig {
        AppConfig {
            feed: FeedConfig {
                ws_url: format!("ws://127.0.0.1:{port}/stream/v1"),
                rest_url: "http://127.0.0.1:9".into(),
                api_key_id: None,
                private_key_path: None,
                markets: vec!["FED-25DEC".into()],
                ping_interval_sec: 5,
                pong_timeout_sec: 30,
                backoff_base_ms: 10,
                backoff_max_ms: 100,
                query_timeout_ms: 500,
            },
            ingest: IngestConfig { min_notional: 100.0, ..IngestConfig::default() },
            trends: TrendsConfig::default(),
            subscribers: vec![],
        }
    }

    /// Build a service whose stream runs against a local WS server. The
    /// credential-less path skips the stream, so the test wires the
    /// connection the same way `start` does, just without a signer.
    async fn start_with_stream(
        config: &AppConfig,
        store: Arc<dyn PersistenceStore>,
        subscribers: Arc<dyn SubscriberStore>,
    ) -> (FeedService, mpsc::Receiver<AlertJob>) {
        let subs = Arc::new(SubscriptionManager::new());
        let _ = subs.subscribe(Channel::Trade, &config.feed.markets).await;

        let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let (trade_tx, trade_rx) = mpsc::channel(config.ingest.queue_capacity);
        let (alert_tx, alert_rx) = mpsc::channel(ALERT_CHANNEL_CAPACITY);

        let correlator =
            RequestCorrelator::new(Duration::from_millis(config.feed.query_timeout_ms));
        let rest = Arc::new(FallbackClient::new(config.feed.rest_url.clone()));

        let conn = Arc::new(StreamConnection::start(
            StreamConfig {
                url: config.feed.ws_url.clone(),
                ping_interval: Duration::from_secs(config.feed.ping_interval_sec),
                pong_timeout: Duration::from_secs(config.feed.pong_timeout_sec),
                backoff_base: Duration::from_millis(config.feed.backoff_base_ms),
                backoff_max: Duration::from_millis(config.feed.backoff_max_ms),
            },
            None,
            subs.clone(),
            frame_tx,
        ));
        let state_rx = conn.state_watch();

        let cache = Arc::new(MarketDataCache::new(
            store.clone(),
            rest,
            Some(StreamQuery { conn: conn.clone(), correlator: correlator.clone() }),
            state_rx.clone(),
        ));

        let tasks = vec![
            tokio::spawn(run_router(
                frame_rx,
                cache.clone(),
                correlator.clone(),
                trade_tx,
                state_rx,
                Duration::from_millis(config.ingest.enqueue_timeout_ms),
            )),
            tokio::spawn(run_ingest(
                trade_rx,
                cache.clone(),
                store,
                subscribers,
                alert_tx,
                config.ingest.clone(),
            )),
        ];

        (FeedService { conn: Some(conn), subs, correlator, cache, tasks }, alert_rx)
    }

    #[tokio::test]
    async fn trade_flows_end_to_end_into_an_alert_job() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = app_config(port);

        let store = Arc::new(MemoryStore::new());
        store
            .upsert_market_snapshot(&Market {
                ticker: "FED-25DEC".into(),
                title: "Fed cuts rates?".into(),
                tags: vec!["Economy".into()],
                last_price: 0.40,
                updated_ts_ms: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        let subscribers = Arc::new(MemorySubscribers::new(vec![SubscriberProfile {
            subscriber_id: 42,
            enabled: true,
            min_notional: 5000.0,
            topics: vec![],
            timezone: "UTC".into(),
        }]));

        let (mut service, mut alert_rx) =
            start_with_stream(&config, store.clone(), subscribers).await;

        let (tcp, _) = listener.accept().await.unwrap();
        let mut server = tokio_tungstenite::accept_async(tcp).await.unwrap();

        // Server sees the subscribe replay...
        let sub = tokio::time::timeout(Duration::from_secs(5), server.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let Message::Text(sub_text) = sub else { panic!("expected text subscribe frame") };
        assert!(sub_text.contains("\"subscribe\""));

        // ...then pushes a qualifying trade.
        server
            .send(Message::Text(
                r#"{"type":"trade","msg":{"market_ticker":"FED-25DEC","trade_id":"t-9",
                    "yes_price":40,"count":25000,"taker_side":"yes","ts":1727000000}}"#
                    .into(),
            ))
            .await
            .unwrap();

        let job = tokio::time::timeout(Duration::from_secs(5), alert_rx.recv())
            .await
            .expect("no alert job produced")
            .unwrap();
        assert_eq!(job.trade.trade_id, "t-9");
        assert_eq!(job.notional, 10_000.0);
        assert_eq!(job.matches.len(), 1);
        assert_eq!(job.matches[0].subscriber_id, 42);
        assert_eq!(job.market_title, "Fed cuts rates?");
        assert_eq!(store.history_len(), 1);

        service.shutdown().await;
        assert_eq!(service.connection_state(), ConnState::Closed);
    }
}
