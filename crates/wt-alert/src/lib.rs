//! # wt-alert
//!
//! Alert fanout and trend aggregation.
//!
//! - [`fanout`] — delivers alert jobs to matched subscribers with isolated
//!   per-subscriber failure domains and an idempotent-delivery window
//! - [`trends`] — gainers/losers/most-active/daily-summary views computed
//!   from price history on demand

pub mod fanout;
pub mod trends;

pub use fanout::run_fanout;
pub use trends::TrendAggregator;
