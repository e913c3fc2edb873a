//! # wt-runner
//!
//! Main entry point for the whale-tracker system.
//!
//! Loads a JSON configuration file, wires the feed service, alert fanout,
//! trend reporting, and history retention, and manages their lifecycle.
//!
//! # Usage
//!
//! ```bash
//! wt-runner config.json --log-level info
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

use wt_alert::{TrendAggregator, run_fanout};
use wt_core::stores::PersistenceStore;
use wt_core::stores::memory::{LogDelivery, MemoryStore, MemorySubscribers};
use wt_core::time_util;
use wt_feed::FeedService;

/// Whale-Trade Stream Ingestion & Alerting Runner.
#[derive(Parser)]
#[command(name = "wt-runner", about = "Whale-Trade Stream Ingestion & Alerting Runner")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output.
    #[arg(long)]
    log_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Initialize logging
    wt_core::logging::init_logging(&cli.log_level, cli.log_dir.as_deref(), "wt-runner");

    info!("wt-runner starting — config={}, log_level={}", cli.config.display(), cli.log_level,);

    // 2. Load configuration
    let config = wt_core::config::load_config(&cli.config)?;
    info!(
        "config loaded — {} seed subscriber(s), {} configured market(s)",
        config.subscribers.len(),
        config.feed.markets.len(),
    );

    // 3. Collaborators: in-memory defaults; real deployments substitute their
    // own store/settings/delivery implementations here.
    let store = Arc::new(MemoryStore::new());
    let subscribers = Arc::new(MemorySubscribers::new(config.subscribers.clone()));
    let delivery = Arc::new(LogDelivery);

    // 4. Start the live pipeline and hand its alert jobs to the fanout.
    let (mut service, alert_rx) =
        FeedService::start(&config, store.clone(), subscribers).await?;
    let fanout_task = tokio::spawn(run_fanout(alert_rx, delivery));

    // 5. Scheduled trend reports.
    let trends = TrendAggregator::new(store.clone(), &config.trends.timezone)?;
    let window = Duration::from_secs(config.trends.window_hours * 3600);
    let top_n = config.trends.top_n;
    let report_interval = Duration::from_secs(config.trends.report_interval_sec);
    let trends_task = tokio::spawn(async move {
        let mut tick = tokio::time::interval(report_interval);
        tick.tick().await; // skip the immediate first tick
        loop {
            tick.tick().await;
            match trends.gainers(window, top_n).await {
                Ok(gainers) => {
                    for m in &gainers {
                        info!(
                            "[trends] gainer {}: {:+.1}% (${:.0} volume)",
                            m.market_ticker, m.pct_change, m.notional_volume,
                        );
                    }
                }
                Err(e) => warn!("[trends] gainers computation failed: {e}"),
            }
            match trends.daily_summary().await {
                Ok(s) => info!(
                    "[trends] {} so far: {} trade(s), ${:.0} notional, {} market(s)",
                    s.date, s.trade_count, s.total_notional, s.distinct_markets,
                ),
                Err(e) => warn!("[trends] daily summary failed: {e}"),
            }
        }
    });

    // 6. History retention trim, independent of the live path.
    let retention = Duration::from_secs(config.trends.retention_hours * 3600);
    let trim_store = store.clone();
    let trim_task = tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(3600));
        tick.tick().await;
        loop {
            tick.tick().await;
            let cutoff = time_util::now_ms().saturating_sub(retention.as_millis() as u64);
            match trim_store.trim_history(cutoff).await {
                Ok(0) => {}
                Ok(n) => info!("[retention] trimmed {n} price point(s)"),
                Err(e) => warn!("[retention] trim failed: {e}"),
            }
        }
    });

    info!("pipeline running — press Ctrl+C to stop");

    // 7. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    // 8. Stop everything: the service drains its workers, which closes the
    // fanout's channel; periodic tasks are simply aborted.
    trends_task.abort();
    trim_task.abort();
    service.shutdown().await;
    if let Err(e) = fanout_task.await {
        if !e.is_cancelled() {
            error!("fanout task failed: {e}");
        }
    }

    info!("all workers stopped — goodbye");
    Ok(())
}
