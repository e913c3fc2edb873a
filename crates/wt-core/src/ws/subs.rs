//! Channel subscription manager.
//!
//! Tracks the desired set of (channel, market-set) subscriptions as the
//! single source of truth. The stream connection replays the full set after
//! every (re)connect *before* marking the session ready; the replay holds the
//! set's lock across its sends, so a subscription request arriving mid-replay
//! waits on the lock and then goes out incrementally on the now-ready
//! connection — queued, never lost.

use ahash::{AHashMap, AHashSet};
use serde_json::json;
use tokio::sync::{Mutex, MutexGuard};

use crate::types::Channel;

/// Desired market set for one channel.
///
/// `None` means the whole-feed firehose for that channel; `Some` is an
/// explicit ticker set.
type TickerSet = Option<AHashSet<String>>;

/// Desired subscription state. Accessed through [`SubscriptionManager`].
#[derive(Default)]
pub struct SubState {
    desired: AHashMap<Channel, TickerSet>,
}

impl SubState {
    /// Build one subscribe frame per desired channel, covering the full set.
    /// Idempotent: frames are derived from desired state only.
    pub fn subscribe_frames(&self) -> Vec<String> {
        let mut entries: Vec<(&Channel, &TickerSet)> = self.desired.iter().collect();
        entries.sort_by_key(|(channel, _)| channel.as_str());
        entries
            .into_iter()
            .map(|(channel, tickers)| build_subscribe_frame(*channel, tickers.as_ref()))
            .collect()
    }

    /// Number of desired channels.
    pub fn channel_count(&self) -> usize {
        self.desired.len()
    }
}

fn build_subscribe_frame(channel: Channel, tickers: Option<&AHashSet<String>>) -> String {
    let id = uuid::Uuid::new_v4().to_string();
    let params = match tickers {
        Some(set) => {
            let mut sorted: Vec<&String> = set.iter().collect();
            sorted.sort();
            json!({ "channels": [channel.as_str()], "market_tickers": sorted })
        }
        None => json!({ "channels": [channel.as_str()] }),
    };
    json!({ "id": id, "cmd": "subscribe", "params": params }).to_string()
}

fn build_unsubscribe_frame(channel: Channel, tickers: &[String]) -> String {
    let id = uuid::Uuid::new_v4().to_string();
    json!({
        "id": id,
        "cmd": "unsubscribe",
        "params": { "channels": [channel.as_str()], "market_tickers": tickers }
    })
    .to_string()
}

/// Tracks desired subscriptions and produces the frames that realize them.
#[derive(Default)]
pub struct SubscriptionManager {
    inner: Mutex<SubState>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Desire the whole-feed firehose on `channel`.
    ///
    /// Returns the incremental subscribe frame for the live session.
    pub async fn subscribe_all(&self, channel: Channel) -> String {
        let mut state = self.inner.lock().await;
        state.desired.insert(channel, None);
        build_subscribe_frame(channel, None)
    }

    /// Desire `tickers` on `channel` (unioned with any existing set).
    ///
    /// Returns the incremental subscribe frame for the live session. If the
    /// channel is already a firehose subscription, the tickers are implied
    /// and `None` is returned.
    pub async fn subscribe(&self, channel: Channel, tickers: &[String]) -> Option<String> {
        let mut state = self.inner.lock().await;
        match state.desired.entry(channel).or_insert_with(|| Some(AHashSet::new())) {
            None => None,
            Some(set) => {
                set.extend(tickers.iter().cloned());
                let added: AHashSet<String> = tickers.iter().cloned().collect();
                Some(build_subscribe_frame(channel, Some(&added)))
            }
        }
    }

    /// Drop interest in `tickers` on `channel`.
    ///
    /// Returns the unsubscribe frame for the live session, or `None` when
    /// nothing was actually subscribed.
    pub async fn unsubscribe(&self, channel: Channel, tickers: &[String]) -> Option<String> {
        let mut state = self.inner.lock().await;
        let Some(Some(set)) = state.desired.get_mut(&channel) else {
            return None;
        };
        let removed: Vec<String> =
            tickers.iter().filter(|t| set.remove(t.as_str())).cloned().collect();
        if set.is_empty() {
            state.desired.remove(&channel);
        }
        if removed.is_empty() { None } else { Some(build_unsubscribe_frame(channel, &removed)) }
    }

    /// Lock the desired set for a replay pass. The connection holds this
    /// guard across its resubscribe sends and the ready transition, which is
    /// what serializes concurrent subscription requests against the replay.
    pub async fn begin_replay(&self) -> MutexGuard<'_, SubState> {
        self.inner.lock().await
    }

    /// Snapshot of desired channels, for logging and tests.
    pub async fn channel_count(&self) -> usize {
        self.inner.lock().await.channel_count()
    }
}
