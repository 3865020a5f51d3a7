//! Wall clock used for expiry and de-duplication bookkeeping.

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
