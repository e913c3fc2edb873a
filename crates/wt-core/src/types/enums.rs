//! Enumerations used throughout the whale-tracker system.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Trade side
// ---------------------------------------------------------------------------

/// Taker side of a prediction-market trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Yes,
    No,
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Yes => write!(f, "yes"),
            Self::No => write!(f, "no"),
        }
    }
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

/// A named stream of one event kind offered by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Executed trades.
    Trade,
    /// Best-price / volume ticker updates.
    Ticker,
    /// Order book depth deltas.
    OrderbookDelta,
}

impl Channel {
    /// Wire name of the channel, as used in subscribe frames.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trade => "trade",
            Self::Ticker => "ticker",
            Self::OrderbookDelta => "orderbook_delta",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Connection state
// ---------------------------------------------------------------------------

/// Lifecycle state of the stream connection, observable by consumers through
/// a watch channel. The cache treats anything other than `Ready` as a signal
/// to prefer the fallback source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnState {
    /// First connection attempt in progress.
    #[default]
    Connecting,
    /// Session live and fully re-subscribed.
    Ready,
    /// Session lost; backoff/retry in progress.
    Reconnecting,
    /// Shut down; no further attempts.
    Closed,
}

impl std::fmt::Display for ConnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Ready => write!(f, "ready"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Data source tag
// ---------------------------------------------------------------------------

/// Which tier a cache read was satisfied from. Lets callers and tests
/// distinguish freshness without hidden state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    /// Live in-memory cache fed by the stream.
    LiveCache,
    /// Secondary persisted snapshot store.
    PersistedCache,
    /// Direct remote fetch (stream query or REST).
    FallbackFetch,
}
