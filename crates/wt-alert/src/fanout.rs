//! Alert fanout.
//!
//! Consumes alert jobs from the ingest pipeline and delivers one payload per
//! matched subscriber. Subscribers are isolated failure domains: deliveries
//! for one job run concurrently and a failure is logged per subscriber
//! without affecting the others or future jobs.
//!
//! Exactly-once intent is enforced with a bounded idempotency window keyed
//! by (subscriber id, market ticker, trade id): if the delivery transport
//! retries a job, repeats are skipped before they reach the sink.

use std::sync::Arc;

use chrono::TimeZone;
use chrono_tz::Tz;
use futures_util::future::join_all;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use wt_core::dedup::RecentKeyWindow;
use wt_core::stores::DeliverySink;
use wt_core::types::{AlertJob, AlertPayload};

/// Size of the (subscriber, trade) idempotency window.
const DELIVERY_LEDGER_CAPACITY: usize = 16384;

/// Render a millisecond timestamp in the subscriber's timezone.
///
/// An unknown timezone name falls back to UTC rather than failing delivery.
pub fn format_local_time(ts_ms: u64, timezone: &str) -> String {
    let tz: Tz = timezone.parse().unwrap_or(chrono_tz::UTC);
    match tz.timestamp_millis_opt(ts_ms as i64) {
        chrono::LocalResult::Single(dt) => dt.format("%b %d %H:%M").to_string(),
        _ => String::new(),
    }
}

fn payload_for(job: &AlertJob, timezone: &str) -> AlertPayload {
    AlertPayload {
        market_ticker: job.trade.market_ticker.clone(),
        market_title: job.market_title.clone(),
        side: job.trade.side,
        price: job.trade.price,
        size: job.trade.size,
        notional: job.notional,
        ts_ms: job.trade.ts_ms,
        local_time: format_local_time(job.trade.ts_ms, timezone),
    }
}

/// Run the fanout worker until the job channel closes.
pub async fn run_fanout(mut job_rx: mpsc::Receiver<AlertJob>, sink: Arc<dyn DeliverySink>) {
    let mut ledger = RecentKeyWindow::new(DELIVERY_LEDGER_CAPACITY);

    while let Some(job) = job_rx.recv().await {
        let deliveries: Vec<_> = job
            .matches
            .iter()
            .filter(|m| {
                let fresh = ledger.insert(&job.delivery_key(m.subscriber_id));
                if !fresh {
                    debug!(
                        "[fanout] duplicate delivery suppressed: subscriber={} trade={}",
                        m.subscriber_id, job.trade.trade_id,
                    );
                }
                fresh
            })
            .map(|m| {
                let sink = sink.clone();
                let payload = payload_for(&job, &m.timezone);
                let subscriber_id = m.subscriber_id;
                async move {
                    if let Err(e) = sink.send(subscriber_id, &payload).await {
                        warn!("[fanout] delivery to subscriber {subscriber_id} failed: {e}");
                    }
                }
            })
            .collect();

        if !deliveries.is_empty() {
            debug!(
                "[fanout] job seq={} → {} delivery(ies) for {}",
                job.seq,
                deliveries.len(),
                job.trade.market_ticker,
            );
            join_all(deliveries).await;
        }
    }

    debug!("[fanout] job channel closed, exiting");
}
