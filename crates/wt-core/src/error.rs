//! Typed error definitions for the whale-tracker system.
//!
//! Provides [`WtError`] for domain-specific errors that are more informative
//! than plain `anyhow::Error` strings. All variants implement `std::error::Error`
//! via `thiserror`, so they integrate seamlessly with `anyhow::Result`.
//!
//! A duplicate trade is deliberately *not* an error: the ingest pipeline
//! discards duplicates silently, so no variant exists for it.

use std::time::Duration;

use thiserror::Error;

/// Domain-specific errors for the whale-tracker system.
#[derive(Debug, Error)]
pub enum WtError {
    /// Feed authentication failure (bad credentials, rejected handshake).
    /// Fatal for the connection attempt; the connection retries with backoff.
    #[error("auth error: {0}")]
    Auth(String),

    /// Network-level failure on the stream or a fallback call. Triggers
    /// reconnect.
    #[error("transport error: {0}")]
    Transport(String),

    /// An operation required a live stream session and none exists.
    #[error("not connected")]
    NotConnected,

    /// A correlated query did not receive its response in time. The caller
    /// should fall back to the REST interface.
    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    /// An in-flight operation was abandoned because the system is shutting
    /// down.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Inbound frame or REST payload could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// The persistence collaborator rejected or failed an operation. Logged
    /// and isolated; never halts the pipeline.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Delivery to a single subscriber failed. Isolated per subscriber.
    #[error("delivery error: {0}")]
    Delivery(String),
}
