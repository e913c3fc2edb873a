//! # wt-core
//!
//! Core crate for the whale-tracker system, providing:
//!
//! - **Types** (`types`) — markets, trades, price history, subscribers, alerts
//! - **Configuration** (`config`) — JSON config deserialization
//! - **Error types** (`error`) — domain-specific `WtError` via thiserror
//! - **Auth** (`auth`) — Ed25519 signed-handshake headers
//! - **Deduplication** (`dedup`) — bounded recent-key window
//! - **Stream** (`ws`) — WS connection with auto-reconnect + subscription replay
//! - **Collaborator interfaces** (`stores`) — persistence, subscribers, delivery
//! - **Time utilities** (`time_util`) — epoch-millisecond timestamps
//! - **Logging** (`logging`) — tracing-based structured logging

pub mod auth;
pub mod config;
pub mod dedup;
pub mod error;
pub mod logging;
pub mod stores;
pub mod time_util;
pub mod types;
pub mod ws;

// Re-export types at crate root for convenience.
pub use types::*;
