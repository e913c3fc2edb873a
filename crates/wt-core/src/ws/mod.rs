//! Stream connection: auto-reconnect WebSocket client, backoff schedule, and
//! the channel subscription manager replayed on every (re)connect.

pub mod backoff;
pub mod client;
pub mod subs;

pub use backoff::Backoff;
pub use client::{StreamConfig, StreamConnection};
pub use subs::SubscriptionManager;
