//! Wall-clock time utilities.
//!
//! All timestamps in the system are **milliseconds since Unix epoch** unless a
//! field name says otherwise. The feed reports trade times in whole seconds;
//! parsers multiply up to milliseconds at the edge.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as **milliseconds** since Unix epoch.
#[inline]
pub fn now_ms() -> u64 {
    let d = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    d.as_millis() as u64
}

/// Current time as **microseconds** since Unix epoch.
#[inline]
pub fn now_us() -> u64 {
    let d = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    d.as_micros() as u64
}
