//! # wt-feed
//!
//! The live ingestion pipeline: wire-frame parsing, typed routing, request
//! correlation, the tiered market-data cache, the REST fallback client, and
//! the trade ingest worker, assembled by [`service::FeedService`].
//!
//! ## Data flow
//!
//! ```text
//! stream ──frames──► router ──trades──► ingest ──alert jobs──► fanout
//!                      │                   │
//!                      ▼                   ▼
//!                MarketDataCache     price history
//! ```
//!
//! Workers communicate over bounded channels with a block-with-timeout
//! backpressure policy; overload drops are counted and logged instead of
//! growing memory.

pub mod cache;
pub mod correlator;
pub mod frame;
pub mod ingest;
pub mod rest;
pub mod router;
pub mod service;

pub use cache::MarketDataCache;
pub use correlator::RequestCorrelator;
pub use rest::FallbackClient;
pub use service::FeedService;
