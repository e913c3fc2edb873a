//! Inbound frame parsing.
//!
//! Every frame from the feed is a JSON object with a `type` discriminator, an
//! optional correlation `id`, and a `msg` payload. Prices arrive as integer
//! cents of the yes side; parsers normalize to dollars and, for trades,
//! compute the taker-side execution price so notional is always
//! `price * size` downstream.

use serde_json::Value;
use wt_core::time_util;
use wt_core::types::{Channel, DepthEvent, TickerEvent, Trade, TradeSide};

/// A parsed inbound frame.
#[derive(Debug, Clone)]
pub enum InboundFrame {
    Trade(Trade),
    Ticker(TickerEvent),
    Depth(DepthEvent),
    /// Correlated response to an outbound query.
    Response { id: String, msg: Value },
    /// Subscription acknowledgement.
    Subscribed { channel: Option<Channel> },
    /// Feed-reported error, correlated when `id` is present.
    Error { id: Option<String>, message: String },
    /// Recognized JSON envelope with an unknown `type` — logged and dropped.
    Unknown { frame_type: String },
}

/// Parse one frame. Returns `None` when the text is not a JSON object with a
/// `type` field (malformed frames are dropped, never fatal).
pub fn parse_frame(text: &str) -> Option<InboundFrame> {
    let v: Value = serde_json::from_str(text).ok()?;
    let frame_type = v.get("type")?.as_str()?.to_string();
    let msg = v.get("msg");

    let frame = match frame_type.as_str() {
        "trade" => InboundFrame::Trade(parse_trade(msg?)?),
        "ticker" => InboundFrame::Ticker(parse_ticker(msg?)?),
        "orderbook_delta" => InboundFrame::Depth(parse_depth(msg?)?),
        "response" => InboundFrame::Response {
            id: v.get("id")?.as_str()?.to_string(),
            msg: msg.cloned().unwrap_or(Value::Null),
        },
        "subscribed" => InboundFrame::Subscribed {
            channel: msg
                .and_then(|m| m.get("channel"))
                .and_then(|c| c.as_str())
                .and_then(parse_channel),
        },
        "error" => InboundFrame::Error {
            id: v.get("id").and_then(|i| i.as_str()).map(str::to_string),
            message: msg
                .and_then(|m| m.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("unspecified")
                .to_string(),
        },
        _ => InboundFrame::Unknown { frame_type },
    };
    Some(frame)
}

fn parse_channel(s: &str) -> Option<Channel> {
    match s {
        "trade" => Some(Channel::Trade),
        "ticker" => Some(Channel::Ticker),
        "orderbook_delta" => Some(Channel::OrderbookDelta),
        _ => None,
    }
}

fn parse_side(s: &str) -> Option<TradeSide> {
    match s {
        "yes" => Some(TradeSide::Yes),
        "no" => Some(TradeSide::No),
        _ => None,
    }
}

/// Yes-cents → dollars.
#[inline]
fn cents_to_dollars(cents: u64) -> f64 {
    cents as f64 / 100.0
}

/// Event timestamp: feed sends whole seconds; missing means "now".
fn parse_ts_ms(v: &Value) -> u64 {
    v.get("ts").and_then(|t| t.as_u64()).map(|s| s * 1000).unwrap_or_else(time_util::now_ms)
}

fn parse_trade(msg: &Value) -> Option<Trade> {
    let side = parse_side(msg.get("taker_side")?.as_str()?)?;
    let yes_cents = msg.get("yes_price")?.as_u64()?;
    let yes_price = cents_to_dollars(yes_cents);
    // Taker-side execution price: no-takers pay the complement.
    let price = match side {
        TradeSide::Yes => yes_price,
        TradeSide::No => cents_to_dollars(100u64.saturating_sub(yes_cents)),
    };

    Some(Trade {
        market_ticker: msg.get("market_ticker")?.as_str()?.to_string(),
        trade_id: msg.get("trade_id")?.as_str()?.to_string(),
        price,
        yes_price,
        size: msg.get("count")?.as_u64()? as f64,
        side,
        ts_ms: parse_ts_ms(msg),
    })
}

fn parse_ticker(msg: &Value) -> Option<TickerEvent> {
    Some(TickerEvent {
        market_ticker: msg.get("market_ticker")?.as_str()?.to_string(),
        price: cents_to_dollars(msg.get("price")?.as_u64()?),
        yes_bid: msg.get("yes_bid").and_then(|b| b.as_u64()).map(cents_to_dollars).unwrap_or(0.0),
        yes_ask: msg.get("yes_ask").and_then(|a| a.as_u64()).map(cents_to_dollars).unwrap_or(0.0),
        volume_24h: msg.get("volume_24h").and_then(|v| v.as_f64()).unwrap_or(0.0),
        ts_ms: parse_ts_ms(msg),
    })
}

fn parse_depth(msg: &Value) -> Option<DepthEvent> {
    Some(DepthEvent {
        market_ticker: msg.get("market_ticker")?.as_str()?.to_string(),
        price: cents_to_dollars(msg.get("price")?.as_u64()?),
        delta: msg.get("delta")?.as_f64()?,
        side: parse_side(msg.get("side")?.as_str()?)?,
        ts_ms: parse_ts_ms(msg),
    })
}
