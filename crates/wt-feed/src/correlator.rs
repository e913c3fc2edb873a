//! Request/response correlation over the stream.
//!
//! Outbound queries carry a UUID correlation id; the feed echoes the id on
//! the matching response or error frame. A pending oneshot waiter is stored
//! per id and resolved by the router. A query that sees no response within
//! the timeout fails with [`WtError::Timeout`], which callers treat as the
//! signal to use the REST fallback rather than retrying the stream.
//!
//! Ids are UUIDv4, so no id is reused while a waiter is outstanding, and
//! concurrent queries hold independent waiters.

use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use serde_json::{Value, json};
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use wt_core::error::WtError;
use wt_core::ws::StreamConnection;

/// A correlated frame delivered by the router, or a local cancellation.
#[derive(Debug)]
pub enum CorrelatedReply {
    Response(Value),
    Error(String),
    Cancelled(String),
}

/// Issues correlation ids and resolves responses to their waiters.
pub struct RequestCorrelator {
    pending: Mutex<AHashMap<String, oneshot::Sender<CorrelatedReply>>>,
    timeout: Duration,
}

/// An issued query waiting for its reply.
pub struct PendingQuery<'a> {
    correlator: &'a RequestCorrelator,
    id: String,
    rx: oneshot::Receiver<CorrelatedReply>,
}

impl RequestCorrelator {
    pub fn new(timeout: Duration) -> Arc<Self> {
        Arc::new(Self { pending: Mutex::new(AHashMap::new()), timeout })
    }

    /// Register a waiter and build the command frame that carries its id.
    pub async fn begin(&self, cmd: &str, params: Value) -> (PendingQuery<'_>, String) {
        let id = Uuid::new_v4().to_string();
        let frame = json!({ "id": id, "cmd": cmd, "params": params }).to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);
        (PendingQuery { correlator: self, id, rx }, frame)
    }

    /// Issue a query on the stream and await its correlated reply.
    pub async fn query(
        &self,
        conn: &StreamConnection,
        cmd: &str,
        params: Value,
    ) -> Result<Value, WtError> {
        let (pending, frame) = self.begin(cmd, params).await;
        if let Err(e) = conn.send(frame).await {
            self.abandon(pending.id()).await;
            return Err(e);
        }
        pending.await_reply().await
    }

    /// Deliver a correlated frame from the router. Returns `false` when no
    /// waiter exists for the id (late or unsolicited reply — dropped).
    pub async fn resolve(&self, id: &str, reply: CorrelatedReply) -> bool {
        match self.pending.lock().await.remove(id) {
            Some(tx) => tx.send(reply).is_ok(),
            None => {
                debug!("[correlator] no waiter for id {id}, dropping reply");
                false
            }
        }
    }

    /// Fail every in-flight query with a cancellation error. Called on
    /// shutdown so no waiter is left pending.
    pub async fn cancel_all(&self, reason: &str) {
        let mut pending = self.pending.lock().await;
        let n = pending.len();
        for (_, tx) in pending.drain() {
            let _ = tx.send(CorrelatedReply::Cancelled(reason.to_string()));
        }
        drop(pending);
        if n > 0 {
            warn!("[correlator] cancelled {n} in-flight query(ies): {reason}");
        }
    }

    /// Number of queries currently awaiting replies.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    async fn abandon(&self, id: &str) {
        self.pending.lock().await.remove(id);
    }
}

impl PendingQuery<'_> {
    /// Correlation id carried by the frame.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Await the correlated reply, or time out.
    pub async fn await_reply(self) -> Result<Value, WtError> {
        let timeout = self.correlator.timeout;
        match tokio::time::timeout(timeout, self.rx).await {
            Err(_elapsed) => {
                self.correlator.abandon(&self.id).await;
                Err(WtError::Timeout(timeout))
            }
            Ok(Err(_dropped)) => Err(WtError::Cancelled("correlator dropped".into())),
            Ok(Ok(CorrelatedReply::Response(v))) => Ok(v),
            Ok(Ok(CorrelatedReply::Error(msg))) => {
                Err(WtError::Transport(format!("feed error: {msg}")))
            }
            Ok(Ok(CorrelatedReply::Cancelled(reason))) => Err(WtError::Cancelled(reason)),
        }
    }
}
