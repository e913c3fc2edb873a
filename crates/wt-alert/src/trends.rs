//! Trend aggregation over price history.
//!
//! Stateless relative to the live pipeline: every view is computed on demand
//! from the persistence collaborator's history records within a trailing
//! window. Gainers and losers rank by percentage change between the earliest
//! and latest point in the window (ties broken by higher notional volume);
//! markets with fewer than two points have no defined change and are
//! excluded from both rankings, though their volume still counts toward the
//! most-active view.

use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use anyhow::{Context, Result};
use chrono::TimeZone;
use chrono_tz::Tz;

use wt_core::stores::PersistenceStore;
use wt_core::time_util;
use wt_core::types::PricePoint;

/// Percentage move of one market across the window.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketMove {
    pub market_ticker: String,
    pub first_price: f64,
    pub last_price: f64,
    /// Change in percent: `(last - first) / first * 100`.
    pub pct_change: f64,
    /// Total trade notional in the window, the ranking tie-breaker.
    pub notional_volume: f64,
}

/// Notional activity of one market across the window.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityEntry {
    pub market_ticker: String,
    pub notional_volume: f64,
    pub trade_count: usize,
}

/// Aggregate counts for the current calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct DailySummary {
    /// The day, rendered in the configured timezone.
    pub date: chrono::NaiveDate,
    pub trade_count: usize,
    pub total_notional: f64,
    pub distinct_markets: usize,
}

/// One ranked whale print.
#[derive(Debug, Clone, PartialEq)]
pub struct TopPrint {
    pub market_ticker: String,
    pub price: f64,
    pub notional: f64,
    pub ts_ms: u64,
}

/// Computes gainers/losers/most-active/daily-summary views.
pub struct TrendAggregator {
    store: Arc<dyn PersistenceStore>,
    timezone: Tz,
}

impl TrendAggregator {
    /// `timezone` is the IANA zone the daily summary is computed in.
    pub fn new(store: Arc<dyn PersistenceStore>, timezone: &str) -> Result<Self> {
        let timezone: Tz =
            timezone.parse().ok().context(format!("unknown timezone '{timezone}'"))?;
        Ok(Self { store, timezone })
    }

    async fn window_points(
        &self,
        window: Duration,
    ) -> Result<AHashMap<String, Vec<PricePoint>>> {
        let cutoff = time_util::now_ms().saturating_sub(window.as_millis() as u64);
        let points = self.store.read_history_window(cutoff).await?;
        let mut grouped: AHashMap<String, Vec<PricePoint>> = AHashMap::new();
        for point in points {
            grouped.entry(point.market_ticker.clone()).or_default().push(point);
        }
        Ok(grouped)
    }

    /// Top markets by percentage gain across the window.
    pub async fn gainers(&self, window: Duration, limit: usize) -> Result<Vec<MarketMove>> {
        let mut moves = ranked_moves(&self.window_points(window).await?);
        moves.truncate(limit);
        Ok(moves)
    }

    /// Top markets by percentage loss: exactly the gainers ranking reversed.
    pub async fn losers(&self, window: Duration, limit: usize) -> Result<Vec<MarketMove>> {
        let mut moves = ranked_moves(&self.window_points(window).await?);
        moves.reverse();
        moves.truncate(limit);
        Ok(moves)
    }

    /// Markets ranked by summed trade notional in the window.
    pub async fn most_active(
        &self,
        window: Duration,
        limit: usize,
    ) -> Result<Vec<ActivityEntry>> {
        let grouped = self.window_points(window).await?;
        let mut entries: Vec<ActivityEntry> = grouped
            .iter()
            .map(|(ticker, points)| ActivityEntry {
                market_ticker: ticker.clone(),
                notional_volume: points.iter().map(|p| p.notional).sum(),
                trade_count: points.len(),
            })
            .collect();
        entries.sort_by(|a, b| {
            b.notional_volume
                .partial_cmp(&a.notional_volume)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.market_ticker.cmp(&b.market_ticker))
        });
        entries.truncate(limit);
        Ok(entries)
    }

    /// Largest single prints in the window, by notional.
    pub async fn top_prints(&self, window: Duration, limit: usize) -> Result<Vec<TopPrint>> {
        let cutoff = time_util::now_ms().saturating_sub(window.as_millis() as u64);
        let mut prints: Vec<TopPrint> = self
            .store
            .read_history_window(cutoff)
            .await?
            .into_iter()
            .map(|p| TopPrint {
                market_ticker: p.market_ticker,
                price: p.price,
                notional: p.notional,
                ts_ms: p.ts_ms,
            })
            .collect();
        prints.sort_by(|a, b| {
            b.notional.partial_cmp(&a.notional).unwrap_or(std::cmp::Ordering::Equal)
        });
        prints.truncate(limit);
        Ok(prints)
    }

    /// Aggregate counts and volume for the current calendar day in the
    /// configured timezone.
    pub async fn daily_summary(&self) -> Result<DailySummary> {
        let now_ms = time_util::now_ms();
        let now_local = self
            .timezone
            .timestamp_millis_opt(now_ms as i64)
            .single()
            .context("current time is not representable in the configured timezone")?;
        let today = now_local.date_naive();
        let midnight = self
            .timezone
            .from_local_datetime(&today.and_hms_opt(0, 0, 0).expect("midnight is valid"))
            .earliest()
            .context("no midnight in the configured timezone today")?;
        let cutoff = midnight.timestamp_millis().max(0) as u64;

        let points = self.store.read_history_window(cutoff).await?;
        let mut markets = ahash::AHashSet::new();
        let mut total_notional = 0.0;
        for p in &points {
            markets.insert(p.market_ticker.clone());
            total_notional += p.notional;
        }

        Ok(DailySummary {
            date: today,
            trade_count: points.len(),
            total_notional,
            distinct_markets: markets.len(),
        })
    }
}

/// Rank per-market moves by percentage change, descending. Ties break toward
/// the higher notional volume; markets with fewer than two points (or a zero
/// first price) have no defined change and are excluded.
fn ranked_moves(grouped: &AHashMap<String, Vec<PricePoint>>) -> Vec<MarketMove> {
    let mut moves: Vec<MarketMove> = grouped
        .iter()
        .filter_map(|(ticker, points)| {
            if points.len() < 2 {
                return None;
            }
            let first = points.first().expect("len checked");
            let last = points.last().expect("len checked");
            if first.price <= f64::EPSILON {
                return None;
            }
            Some(MarketMove {
                market_ticker: ticker.clone(),
                first_price: first.price,
                last_price: last.price,
                pct_change: (last.price - first.price) / first.price * 100.0,
                notional_volume: points.iter().map(|p| p.notional).sum(),
            })
        })
        .collect();

    moves.sort_by(|a, b| {
        b.pct_change
            .partial_cmp(&a.pct_change)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.notional_volume
                    .partial_cmp(&a.notional_volume)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.market_ticker.cmp(&b.market_ticker))
    });
    moves
}

#[cfg(test)]
mod tests {
    use super::*;
    use wt_core::stores::memory::MemoryStore;

    const DAY: Duration = Duration::from_secs(24 * 3600);

    async fn seed(store: &MemoryStore, ticker: &str, price: f64, notional: f64, age: Duration) {
        let ts_ms = time_util::now_ms() - age.as_millis() as u64;
        store
            .append_price_point(&PricePoint {
                market_ticker: ticker.into(),
                price,
                notional,
                ts_ms,
            })
            .await
            .unwrap();
    }

    async fn aggregator(store: Arc<MemoryStore>) -> TrendAggregator {
        TrendAggregator::new(store, "UTC").unwrap()
    }

    #[tokio::test]
    async fn gainer_at_plus_thirty_seven_and_a_half_percent() {
        let store = Arc::new(MemoryStore::new());
        // 0.40 a day ago (just inside the window), 0.55 now, nothing else.
        seed(&store, "FED-25DEC", 0.40, 10_000.0, DAY - Duration::from_secs(60)).await;
        seed(&store, "FED-25DEC", 0.55, 14_000.0, Duration::ZERO).await;

        let gainers = aggregator(store).await.gainers(DAY, 10).await.unwrap();
        assert_eq!(gainers.len(), 1);
        assert_eq!(gainers[0].market_ticker, "FED-25DEC");
        assert!((gainers[0].pct_change - 37.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn losers_are_the_reverse_of_gainers() {
        let store = Arc::new(MemoryStore::new());
        for (ticker, first, last) in
            [("UP-BIG", 0.20, 0.40), ("UP-SMALL", 0.50, 0.55), ("DOWN", 0.60, 0.30)]
        {
            seed(&store, ticker, first, 1_000.0, Duration::from_secs(3600)).await;
            seed(&store, ticker, last, 1_000.0, Duration::ZERO).await;
        }

        let agg = aggregator(store).await;
        let gainers = agg.gainers(DAY, 10).await.unwrap();
        let losers = agg.losers(DAY, 10).await.unwrap();

        let g: Vec<&str> = gainers.iter().map(|m| m.market_ticker.as_str()).collect();
        assert_eq!(g, vec!["UP-BIG", "UP-SMALL", "DOWN"]);
        let mut reversed = gainers.clone();
        reversed.reverse();
        assert_eq!(losers, reversed);
    }

    #[tokio::test]
    async fn single_point_markets_rank_in_activity_only() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "LONELY", 0.50, 50_000.0, Duration::from_secs(60)).await;
        seed(&store, "PAIRED", 0.40, 1_000.0, Duration::from_secs(3600)).await;
        seed(&store, "PAIRED", 0.44, 1_000.0, Duration::ZERO).await;

        let agg = aggregator(store).await;
        let gainers = agg.gainers(DAY, 10).await.unwrap();
        let losers = agg.losers(DAY, 10).await.unwrap();
        assert!(gainers.iter().all(|m| m.market_ticker != "LONELY"));
        assert!(losers.iter().all(|m| m.market_ticker != "LONELY"));

        let active = agg.most_active(DAY, 10).await.unwrap();
        assert_eq!(active[0].market_ticker, "LONELY"); // $50k beats $2k
        assert_eq!(active[0].trade_count, 1);
    }

    #[tokio::test]
    async fn ties_break_toward_higher_volume() {
        let store = Arc::new(MemoryStore::new());
        // Identical +10% moves, different volume.
        for (ticker, notional) in [("SMALL", 1_000.0), ("BIG", 9_000.0)] {
            seed(&store, ticker, 0.50, notional, Duration::from_secs(3600)).await;
            seed(&store, ticker, 0.55, notional, Duration::ZERO).await;
        }

        let gainers = aggregator(store).await.gainers(DAY, 10).await.unwrap();
        assert_eq!(gainers[0].market_ticker, "BIG");
    }

    #[tokio::test]
    async fn points_outside_the_window_are_invisible() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "OLD", 0.10, 99_000.0, DAY + Duration::from_secs(3600)).await;
        seed(&store, "OLD", 0.90, 99_000.0, DAY + Duration::from_secs(60)).await;

        let agg = aggregator(store).await;
        assert!(agg.gainers(DAY, 10).await.unwrap().is_empty());
        assert!(agg.most_active(DAY, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn top_prints_rank_by_notional() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "A", 0.40, 10_000.0, Duration::from_secs(60)).await;
        seed(&store, "B", 0.60, 70_000.0, Duration::from_secs(120)).await;
        seed(&store, "A", 0.45, 30_000.0, Duration::from_secs(30)).await;

        let prints = aggregator(store).await.top_prints(DAY, 2).await.unwrap();
        assert_eq!(prints.len(), 2);
        assert_eq!(prints[0].market_ticker, "B");
        assert_eq!(prints[1].notional, 30_000.0);
    }

    #[tokio::test]
    async fn daily_summary_counts_todays_trades() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "A", 0.40, 10_000.0, Duration::ZERO).await;
        seed(&store, "B", 0.60, 5_000.0, Duration::ZERO).await;
        seed(&store, "A", 0.41, 2_000.0, Duration::ZERO).await;
        // Two days old: never part of today, whatever the hour.
        seed(&store, "C", 0.10, 80_000.0, Duration::from_secs(48 * 3600)).await;

        let summary = aggregator(store).await.daily_summary().await.unwrap();
        assert_eq!(summary.trade_count, 3);
        assert_eq!(summary.distinct_markets, 2);
        assert!((summary.total_notional - 17_000.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_timezone_is_a_config_error() {
        let store: Arc<dyn PersistenceStore> = Arc::new(MemoryStore::new());
        assert!(TrendAggregator::new(store, "Mars/OlympusMons").is_err());
    }
}
