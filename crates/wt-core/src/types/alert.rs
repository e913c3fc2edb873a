//! Subscriber and alert structures.

use serde::{Deserialize, Serialize};

use super::market::Trade;

// ---------------------------------------------------------------------------
// Subscriber profile
// ---------------------------------------------------------------------------

/// Alert preferences for one subscriber.
///
/// Owned by the external settings collaborator; the pipeline treats profiles
/// as read-only input refreshed at alert-evaluation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriberProfile {
    pub subscriber_id: i64,
    /// Master switch; disabled subscribers are never evaluated.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Minimum trade notional (dollars) that triggers an alert.
    #[serde(default = "default_min_notional")]
    pub min_notional: f64,
    /// Topic filter: a trade matches when any market tag is in this set.
    /// Empty means all topics.
    #[serde(default)]
    pub topics: Vec<String>,
    /// IANA timezone name for timestamp localization, e.g. `"US/Eastern"`.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_enabled() -> bool {
    true
}

fn default_min_notional() -> f64 {
    5000.0
}

fn default_timezone() -> String {
    "UTC".into()
}

impl SubscriberProfile {
    /// Whether this profile's topic filter accepts a market with `tags`.
    pub fn topic_matches(&self, tags: &[String]) -> bool {
        if self.topics.is_empty() {
            return true;
        }
        tags.iter().any(|t| self.topics.iter().any(|f| f.eq_ignore_ascii_case(t)))
    }
}

// ---------------------------------------------------------------------------
// Alert job
// ---------------------------------------------------------------------------

/// One matched subscriber within an [`AlertJob`].
#[derive(Debug, Clone, PartialEq)]
pub struct AlertMatch {
    pub subscriber_id: i64,
    /// Subscriber timezone captured at evaluation time.
    pub timezone: String,
}

/// A qualifying trade plus its matched market context and subscribers.
///
/// Transient: constructed by the ingest pipeline, consumed once by the
/// fanout. `seq` increases monotonically for delivery bookkeeping.
#[derive(Debug, Clone)]
pub struct AlertJob {
    pub seq: u64,
    pub trade: Trade,
    pub notional: f64,
    pub market_title: String,
    pub tags: Vec<String>,
    pub matches: Vec<AlertMatch>,
}

impl AlertJob {
    /// Idempotency key for one subscriber's delivery of this job's trade.
    pub fn delivery_key(&self, subscriber_id: i64) -> String {
        format!("{}|{}|{}", subscriber_id, self.trade.market_ticker, self.trade.trade_id)
    }
}

// ---------------------------------------------------------------------------
// Delivery payload
// ---------------------------------------------------------------------------

/// Structured payload handed to the delivery collaborator. Rendering and
/// transport live outside this core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub market_ticker: String,
    pub market_title: String,
    pub side: super::enums::TradeSide,
    /// Taker-side execution price in dollars.
    pub price: f64,
    /// Contract count.
    pub size: f64,
    pub notional: f64,
    pub ts_ms: u64,
    /// Trade time rendered in the subscriber's timezone, `"%b %d %H:%M"`.
    pub local_time: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(topics: &[&str]) -> SubscriberProfile {
        SubscriberProfile {
            subscriber_id: 1,
            enabled: true,
            min_notional: 5000.0,
            topics: topics.iter().map(|s| s.to_string()).collect(),
            timezone: "UTC".into(),
        }
    }

    #[test]
    fn empty_topic_filter_matches_everything() {
        let p = profile(&[]);
        assert!(p.topic_matches(&["Economy".into()]));
        assert!(p.topic_matches(&[]));
    }

    #[test]
    fn topic_filter_intersects_tags() {
        let p = profile(&["Crypto", "Economy"]);
        assert!(p.topic_matches(&["Economy".into(), "Politics".into()]));
        assert!(!p.topic_matches(&["Sports".into()]));
        // no tags on the market → cannot match a non-empty filter
        assert!(!p.topic_matches(&[]));
    }

    #[test]
    fn topic_match_is_case_insensitive() {
        let p = profile(&["crypto"]);
        assert!(p.topic_matches(&["Crypto".into()]));
    }
}
